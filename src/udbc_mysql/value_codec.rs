use crate::udbc::params::Params;
use crate::udbc::value::Value;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::Value as MyValue;

pub fn from_mysql_value(v: MyValue) -> Value {
    match v {
        MyValue::NULL => Value::Null,
        MyValue::Int(i) => Value::I64(i),
        MyValue::UInt(u) => Value::U64(u),
        MyValue::Float(f) => Value::F64(f as f64),
        MyValue::Double(d) => Value::F64(d),
        MyValue::Bytes(b) => Value::Bytes(b),
        MyValue::Date(y, m, d, h, min, s, micro) => {
            let date = match NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32) {
                Some(date) => date,
                // zero dates such as 0000-00-00 have no chrono counterpart
                None => return Value::Str(format!("{:04}-{:02}-{:02}", y, m, d)),
            };
            if h == 0 && min == 0 && s == 0 && micro == 0 {
                Value::Date(date)
            } else {
                date.and_hms_micro_opt(h as u32, min as u32, s as u32, micro)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Date(date))
            }
        }
        MyValue::Time(is_neg, days, h, min, s, micro) => {
            let hours = days * 24 + h as u32;
            match NaiveTime::from_hms_micro_opt(hours, min as u32, s as u32, micro) {
                Some(t) if !is_neg => Value::Time(t),
                _ => Value::Str(format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    if is_neg { "-" } else { "" },
                    hours,
                    min,
                    s,
                    micro
                )),
            }
        }
    }
}

pub fn to_mysql_value(v: &Value) -> MyValue {
    match v {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(*b as i64),
        Value::I64(i) => MyValue::Int(*i),
        Value::U64(u) => MyValue::UInt(*u),
        Value::F64(f) => MyValue::Double(*f),
        Value::Str(s) => MyValue::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => MyValue::Bytes(b.clone()),
        Value::Date(d) => MyValue::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::Time(t) => MyValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        Value::DateTime(dt) => MyValue::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1000,
        ),
        Value::DateTimeUtc(dt) => to_mysql_value(&Value::DateTime(dt.naive_utc())),
        Value::Decimal(d) => MyValue::Bytes(d.to_string().into_bytes()),
    }
}

pub fn to_mysql_params(params: &Params) -> mysql_async::Params {
    match params {
        Params::Empty => mysql_async::Params::Empty,
        Params::Positional(values) => {
            mysql_async::Params::Positional(values.iter().map(to_mysql_value).collect())
        }
        Params::Named(values) => mysql_async::Params::Named(
            values
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), to_mysql_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_date_falls_back_to_text() {
        let v = from_mysql_value(MyValue::Date(0, 0, 0, 0, 0, 0, 0));
        assert_eq!(v, Value::Str("0000-00-00".to_string()));
    }

    #[test]
    fn test_datetime_conversion() {
        let v = from_mysql_value(MyValue::Date(2025, 7, 17, 9, 30, 0, 0));
        let expected = NaiveDate::from_ymd_opt(2025, 7, 17)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .map(Value::DateTime);
        assert_eq!(Some(v.clone()), expected);
        assert_eq!(to_mysql_value(&v), MyValue::Date(2025, 7, 17, 9, 30, 0, 0));
    }

    #[test]
    fn test_named_params() {
        let params = Params::Named(vec![("id".to_string(), Value::I64(5))]);
        match to_mysql_params(&params) {
            mysql_async::Params::Named(map) => {
                assert_eq!(map.get(b"id".as_slice()), Some(&MyValue::Int(5)));
            }
            other => panic!("expected named params, got {:?}", other),
        }
    }
}
