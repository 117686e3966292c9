use crate::error::DbError;
use crate::udbc::value::Value;
use serde::Serialize;
use serde::ser::{self, Impossible, Serializer as _};

/// Statement parameters, either positional (`?`) or named (`:name`).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    Empty,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    /// Converts any serializable argument into statement parameters.
    ///
    /// `()` and `None` give no parameters, tuples and sequences give
    /// positional parameters, structs and maps give named ones and a lone
    /// scalar becomes a single positional parameter.
    pub fn from_serialize<T: Serialize + ?Sized>(args: &T) -> Result<Self, DbError> {
        args.serialize(ParamsSerializer)
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Empty => 0,
            Params::Positional(v) => v.len(),
            Params::Named(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Params::Named(v) => v.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        if values.is_empty() {
            Params::Empty
        } else {
            Params::Positional(values)
        }
    }
}

impl Serialize for Params {
    fn serialize<S: ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use ser::{SerializeMap, SerializeSeq};
        match self {
            Params::Empty => serializer.serialize_unit(),
            Params::Positional(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            Params::Named(values) => {
                let mut map = serializer.serialize_map(Some(values.len()))?;
                for (k, v) in values {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

fn nested() -> DbError {
    DbError::Value("nested collections cannot be bound as a parameter".to_string())
}

/// Serializes one scalar into a [`Value`].
pub struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = DbError;
    type SerializeSeq = Impossible<Value, DbError>;
    type SerializeTuple = Impossible<Value, DbError>;
    type SerializeTupleStruct = Impossible<Value, DbError>;
    type SerializeTupleVariant = Impossible<Value, DbError>;
    type SerializeMap = Impossible<Value, DbError>;
    type SerializeStruct = Impossible<Value, DbError>;
    type SerializeStructVariant = Impossible<Value, DbError>;

    fn serialize_bool(self, v: bool) -> Result<Value, DbError> {
        Ok(Value::Bool(v))
    }
    fn serialize_i8(self, v: i8) -> Result<Value, DbError> {
        Ok(Value::I64(v as i64))
    }
    fn serialize_i16(self, v: i16) -> Result<Value, DbError> {
        Ok(Value::I64(v as i64))
    }
    fn serialize_i32(self, v: i32) -> Result<Value, DbError> {
        Ok(Value::I64(v as i64))
    }
    fn serialize_i64(self, v: i64) -> Result<Value, DbError> {
        Ok(Value::I64(v))
    }
    fn serialize_u8(self, v: u8) -> Result<Value, DbError> {
        Ok(Value::U64(v as u64))
    }
    fn serialize_u16(self, v: u16) -> Result<Value, DbError> {
        Ok(Value::U64(v as u64))
    }
    fn serialize_u32(self, v: u32) -> Result<Value, DbError> {
        Ok(Value::U64(v as u64))
    }
    fn serialize_u64(self, v: u64) -> Result<Value, DbError> {
        Ok(Value::U64(v))
    }
    fn serialize_f32(self, v: f32) -> Result<Value, DbError> {
        Ok(Value::F64(v as f64))
    }
    fn serialize_f64(self, v: f64) -> Result<Value, DbError> {
        Ok(Value::F64(v))
    }
    fn serialize_char(self, v: char) -> Result<Value, DbError> {
        Ok(Value::Str(v.to_string()))
    }
    fn serialize_str(self, v: &str) -> Result<Value, DbError> {
        Ok(Value::Str(v.to_string()))
    }
    fn serialize_bytes(self, v: &[u8]) -> Result<Value, DbError> {
        Ok(Value::Bytes(v.to_vec()))
    }
    fn serialize_none(self) -> Result<Value, DbError> {
        Ok(Value::Null)
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, DbError> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<Value, DbError> {
        Ok(Value::Null)
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<Value, DbError> {
        Ok(Value::Null)
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<Value, DbError> {
        Ok(Value::Str(variant.to_string()))
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<Value, DbError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<Value, DbError> {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, DbError> {
        Err(nested())
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, DbError> {
        Err(nested())
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, DbError> {
        Err(nested())
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, DbError> {
        Err(nested())
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, DbError> {
        Err(nested())
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, DbError> {
        Err(nested())
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, DbError> {
        Err(nested())
    }
}

struct ParamsSerializer;

macro_rules! forward_scalar {
    ($($method:ident: $t:ty),*) => {
        $(fn $method(self, v: $t) -> Result<Params, DbError> {
            Ok(Params::Positional(vec![ValueSerializer.$method(v)?]))
        })*
    };
}

impl ser::Serializer for ParamsSerializer {
    type Ok = Params;
    type Error = DbError;
    type SerializeSeq = PositionalSerializer;
    type SerializeTuple = PositionalSerializer;
    type SerializeTupleStruct = PositionalSerializer;
    type SerializeTupleVariant = PositionalSerializer;
    type SerializeMap = NamedSerializer;
    type SerializeStruct = NamedSerializer;
    type SerializeStructVariant = NamedSerializer;

    forward_scalar!(
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_f32: f32,
        serialize_f64: f64,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8]
    );

    fn serialize_none(self) -> Result<Params, DbError> {
        Ok(Params::Empty)
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Params, DbError> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<Params, DbError> {
        Ok(Params::Empty)
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<Params, DbError> {
        Ok(Params::Empty)
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<Params, DbError> {
        Ok(Params::Positional(vec![Value::Str(variant.to_string())]))
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<Params, DbError> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<Params, DbError> {
        value.serialize(self)
    }
    fn serialize_seq(self, len: Option<usize>) -> Result<PositionalSerializer, DbError> {
        Ok(PositionalSerializer {
            values: Vec::with_capacity(len.unwrap_or(0)),
        })
    }
    fn serialize_tuple(self, len: usize) -> Result<PositionalSerializer, DbError> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        len: usize,
    ) -> Result<PositionalSerializer, DbError> {
        self.serialize_seq(Some(len))
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        len: usize,
    ) -> Result<PositionalSerializer, DbError> {
        self.serialize_seq(Some(len))
    }
    fn serialize_map(self, len: Option<usize>) -> Result<NamedSerializer, DbError> {
        Ok(NamedSerializer {
            values: Vec::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }
    fn serialize_struct(self, _: &'static str, len: usize) -> Result<NamedSerializer, DbError> {
        self.serialize_map(Some(len))
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        len: usize,
    ) -> Result<NamedSerializer, DbError> {
        self.serialize_map(Some(len))
    }
}

pub struct PositionalSerializer {
    values: Vec<Value>,
}

macro_rules! impl_positional {
    ($trait:ident, $method:ident) => {
        impl ser::$trait for PositionalSerializer {
            type Ok = Params;
            type Error = DbError;

            fn $method<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DbError> {
                self.values.push(value.serialize(ValueSerializer)?);
                Ok(())
            }

            fn end(self) -> Result<Params, DbError> {
                Ok(Params::from(self.values))
            }
        }
    };
}

impl_positional!(SerializeSeq, serialize_element);
impl_positional!(SerializeTuple, serialize_element);
impl_positional!(SerializeTupleStruct, serialize_field);
impl_positional!(SerializeTupleVariant, serialize_field);

pub struct NamedSerializer {
    values: Vec<(String, Value)>,
    key: Option<String>,
}

impl NamedSerializer {
    fn finish(self) -> Params {
        if self.values.is_empty() {
            Params::Empty
        } else {
            Params::Named(self.values)
        }
    }
}

impl ser::SerializeMap for NamedSerializer {
    type Ok = Params;
    type Error = DbError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), DbError> {
        match key.serialize(ValueSerializer)? {
            Value::Str(s) => {
                self.key = Some(s);
                Ok(())
            }
            other => Err(DbError::Value(format!(
                "parameter names must be strings, got {:?}",
                other
            ))),
        }
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), DbError> {
        let key = self
            .key
            .take()
            .ok_or_else(|| DbError::Value("parameter value without a name".to_string()))?;
        self.values.push((key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Params, DbError> {
        Ok(self.finish())
    }
}

macro_rules! impl_named {
    ($trait:ident) => {
        impl ser::$trait for NamedSerializer {
            type Ok = Params;
            type Error = DbError;

            fn serialize_field<T: ?Sized + Serialize>(
                &mut self,
                key: &'static str,
                value: &T,
            ) -> Result<(), DbError> {
                self.values
                    .push((key.to_string(), value.serialize(ValueSerializer)?));
                Ok(())
            }

            fn end(self) -> Result<Params, DbError> {
                Ok(self.finish())
            }
        }
    };
}

impl_named!(SerializeStruct);
impl_named!(SerializeStructVariant);
