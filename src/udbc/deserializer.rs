use crate::error::DbError;
use crate::udbc::value::{Row, Value};
use serde::de::{self, Deserializer, IntoDeserializer, MapAccess, Visitor};

/// Maps one row onto any `DeserializeOwned` type, matching fields by column name.
pub fn from_row<R: de::DeserializeOwned>(row: &Row) -> Result<R, DbError> {
    R::deserialize(RowDeserializer { row })
}

pub struct RowDeserializer<'a> {
    row: &'a Row,
}

impl<'de> Deserializer<'de> for RowDeserializer<'_> {
    type Error = DbError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DbError> {
        visitor.visit_map(RowMapAccess {
            iter: self.row.iter(),
            current: None,
        })
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        unit seq tuple tuple_struct map struct enum identifier ignored_any
        unit_struct newtype_struct bytes byte_buf option
    }
}

struct RowMapAccess<'a> {
    iter: std::collections::hash_map::Iter<'a, String, Value>,
    current: Option<&'a Value>,
}

impl<'de> MapAccess<'de> for RowMapAccess<'_> {
    type Error = DbError;

    fn next_key_seed<K: de::DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, DbError> {
        match self.iter.next() {
            Some((k, v)) => {
                self.current = Some(v);
                seed.deserialize(k.as_str().into_deserializer()).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: de::DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, DbError> {
        let value = self
            .current
            .take()
            .ok_or_else(|| DbError::Value("column value requested before its name".to_string()))?;
        seed.deserialize(ValueDeserializer { value })
    }
}

pub struct ValueDeserializer<'a> {
    pub value: &'a Value,
}

impl<'de> Deserializer<'de> for ValueDeserializer<'_> {
    type Error = DbError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DbError> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(v) => visitor.visit_bool(*v),
            Value::I64(v) => visitor.visit_i64(*v),
            Value::U64(v) => visitor.visit_u64(*v),
            Value::F64(v) => visitor.visit_f64(*v),
            Value::Str(v) => visitor.visit_str(v),
            Value::Bytes(v) => match std::str::from_utf8(v) {
                Ok(s) => visitor.visit_str(s),
                Err(_) => visitor.visit_bytes(v),
            },
            Value::Date(d) => visitor.visit_string(d.to_string()),
            Value::Time(t) => visitor.visit_string(t.to_string()),
            Value::DateTime(dt) => visitor.visit_string(dt.to_string()),
            Value::DateTimeUtc(dt) => visitor.visit_string(dt.to_rfc3339()),
            Value::Decimal(d) => visitor.visit_string(d.to_string()),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DbError> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, DbError> {
        // TINYINT(1) columns come back as integers
        match self.value {
            Value::I64(v) => visitor.visit_bool(*v != 0),
            Value::U64(v) => visitor.visit_bool(*v != 0),
            _ => self.deserialize_any(visitor),
        }
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        unit seq tuple tuple_struct map struct enum identifier ignored_any
        unit_struct newtype_struct bytes byte_buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct UserRow {
        id: i64,
        username: String,
        email: Option<String>,
        is_active: bool,
    }

    #[test]
    fn test_from_row() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::I64(3));
        row.insert("username".to_string(), Value::Bytes(b"carol".to_vec()));
        row.insert("email".to_string(), Value::Null);
        row.insert("is_active".to_string(), Value::I64(1));

        let user: UserRow = from_row(&row).unwrap();
        assert_eq!(
            user,
            UserRow {
                id: 3,
                username: "carol".to_string(),
                email: None,
                is_active: true,
            }
        );
    }

    #[test]
    fn test_missing_column_fails() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::I64(3));
        let err = from_row::<UserRow>(&row).unwrap_err();
        assert!(matches!(err, DbError::Value(_)));
    }
}
