//! The basic building block of the template language: the value.
//! Floats, integers, strings, lists, hashes and models
//! are all represented using the value.
//!
//! This allows operations across data types, like multiplying lists by integers,
//! or reading model properties.
use serde::{Deserialize, Serialize};

use super::super::Error;
use crate::model::PropertyBag;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// A constant or runtime value, e.g. `5`, `"hello world"` or the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Hash(HashMap<String, Value>),
    Null,
    // Property bag, e.g. the model. Members are looked up on access.
    #[serde(skip)]
    Object(Arc<dyn PropertyBag>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(i1), Value::Integer(i2)) => i1 == i2,
            (Value::Integer(i1), Value::Float(f2)) => (*i1 as f64) == *f2,
            (Value::Float(f1), Value::Integer(i2)) => *f1 == (*i2 as f64),
            (Value::Float(f1), Value::Float(f2)) => f1 == f2,
            (Value::String(s1), Value::String(s2)) => s1 == s2,
            (Value::Boolean(b1), Value::Boolean(b2)) => b1 == b2,
            (Value::List(l1), Value::List(l2)) => l1 == l2,
            (Value::Hash(h1), Value::Hash(h2)) => h1 == h2,
            (Value::Null, Value::Null) => true,
            (Value::Object(o1), Value::Object(o2)) => Arc::ptr_eq(o1, o2),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(i1), Value::Integer(i2)) => i1.partial_cmp(i2),
            (Value::Integer(i1), Value::Float(f2)) => (*i1 as f64).partial_cmp(f2),
            (Value::Float(f1), Value::Integer(i2)) => f1.partial_cmp(&(*i2 as f64)),
            (Value::Float(f1), Value::Float(f2)) => f1.partial_cmp(f2),
            (Value::String(s1), Value::String(s2)) => s1.partial_cmp(s2),
            (Value::Boolean(b1), Value::Boolean(b2)) => b1.partial_cmp(b2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    write!(f, "{}", v)?;
                    if i < l.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "]")
            }
            Value::Hash(h) => {
                write!(f, "{{")?;
                for (i, (k, v)) in h.iter().enumerate() {
                    write!(f, "{}: {}", k, v)?;
                    if i < h.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, "}}")
            }
            // Nulls print nothing.
            Value::Null => Ok(()),
            Value::Object(bag) => write!(f, "{}", bag.type_name().unwrap_or("object")),
        }
    }
}

impl Value {
    /// If the value, when evaluated in the context of a `if` statement
    /// would result in the `if` statement being executed.
    ///
    /// e.g. `<% if 5 %>five is true<% end %>`
    /// would output "five is true" since `5` is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Null => false,
            Value::List(list) => !list.is_empty(),
            Value::Hash(hash) => !hash.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn add(&self, other: &Self) -> Self {
        match (self, other) {
            (Value::Integer(i1), Value::Integer(i2)) => Value::Integer(i1.wrapping_add(*i2)),
            (Value::Integer(i1), Value::Float(f2)) => Value::Float(*i1 as f64 + f2),
            (Value::Float(f1), Value::Integer(i2)) => Value::Float(f1 + *i2 as f64),
            (Value::Float(f1), Value::Float(f2)) => Value::Float(f1 + f2),
            (Value::String(s1), Value::String(s2)) => Value::String(format!("{}{}", s1, s2)),
            (Value::String(s1), Value::Integer(i2)) => Value::String(format!("{}{}", s1, i2)),
            (Value::Integer(i1), Value::String(s2)) => Value::String(format!("{}{}", i1, s2)),
            (Value::String(s1), Value::Float(f2)) => Value::String(format!("{}{}", s1, f2)),
            (Value::Float(f1), Value::String(s2)) => Value::String(format!("{}{}", f1, s2)),
            (Value::List(list), other) => {
                let mut list = list.clone();
                list.push(other.clone());
                Value::List(list)
            }
            (value, Value::List(list)) => {
                let mut new = vec![value.clone()];
                new.extend(list.clone());
                Value::List(new)
            }
            _ => Value::Null,
        }
    }

    pub fn sub(&self, other: &Self) -> Self {
        match (self, other) {
            (Value::Integer(i1), Value::Integer(i2)) => Value::Integer(i1.wrapping_sub(*i2)),
            (Value::Integer(i1), Value::Float(f2)) => Value::Float(*i1 as f64 - f2),
            (Value::Float(f1), Value::Integer(i2)) => Value::Float(f1 - *i2 as f64),
            (Value::Float(f1), Value::Float(f2)) => Value::Float(f1 - f2),
            (Value::String(s1), Value::String(s2)) => Value::String(s1.replace(s2, "")),
            (Value::List(list), other) => {
                let mut list = list.clone();
                list.retain(|v| v != other);
                Value::List(list)
            }
            _ => Value::Null,
        }
    }

    pub fn div(&self, other: &Self) -> Result<Self, Error> {
        Ok(match (self, other) {
            (Value::Integer(_), Value::Integer(0)) => return Err(Error::DivisionByZero),
            (Value::Integer(i1), Value::Integer(i2)) => {
                Value::Integer(i1.checked_div(*i2).ok_or(Error::Overflow("/"))?)
            }
            (Value::Integer(i1), Value::Float(f2)) => Value::Float(*i1 as f64 / f2),
            (Value::Float(f1), Value::Integer(i2)) => Value::Float(f1 / *i2 as f64),
            (Value::Float(f1), Value::Float(f2)) => Value::Float(f1 / f2),
            _ => Value::Null,
        })
    }

    pub fn rem(&self, other: &Self) -> Result<Self, Error> {
        Ok(match (self, other) {
            (Value::Integer(_), Value::Integer(0)) => return Err(Error::DivisionByZero),
            (Value::Integer(i1), Value::Integer(i2)) => {
                Value::Integer(i1.checked_rem(*i2).ok_or(Error::Overflow("%"))?)
            }
            (Value::Float(f1), Value::Float(f2)) => Value::Float(f1 % f2),
            (Value::Integer(i1), Value::Float(f2)) => Value::Float(*i1 as f64 % f2),
            (Value::Float(f1), Value::Integer(i2)) => Value::Float(f1 % *i2 as f64),
            _ => Value::Null,
        })
    }

    pub fn mul(&self, other: &Self) -> Self {
        match (self, other) {
            (Value::Integer(i1), Value::Integer(i2)) => Value::Integer(i1.wrapping_mul(*i2)),
            (Value::Integer(i1), Value::Float(f2)) => Value::Float(*i1 as f64 * f2),
            (Value::Float(f1), Value::Integer(i2)) => Value::Float(f1 * *i2 as f64),
            (Value::Float(f1), Value::Float(f2)) => Value::Float(f1 * f2),
            (Value::String(s1), Value::Integer(i1)) => {
                Value::String(s1.repeat((*i1).max(0) as usize))
            }
            (Value::Integer(i1), Value::String(s1)) => {
                Value::String(s1.repeat((*i1).max(0) as usize))
            }
            (Value::List(list), Value::Integer(i1)) => {
                let mut new_list = vec![];
                for _ in 0..*i1 {
                    new_list.extend(list.clone());
                }
                Value::List(new_list)
            }
            _ => Value::Null,
        }
    }

    /// Call a method or read a member, e.g. `name.upcase` or `Model.Name`.
    pub fn call(&self, method_name: &str, args: &[Value]) -> Result<Self, Error> {
        Ok(match self {
            Value::Integer(value) => match method_name {
                "abs" => Value::Integer(value.checked_abs().ok_or(Error::Overflow("abs"))?),
                "to_string" | "to_s" => Value::String(value.to_string()),
                "to_f" | "to_float" => Value::Float(*value as f64),
                "times" => Value::List((0..*value).map(Value::Integer).collect()),
                method_name => return Err(Error::UnknownMethod(method_name.into(), "integer")),
            },

            Value::Float(value) => match method_name {
                "abs" => Value::Float(value.abs()),
                "ceil" => Value::Float(value.ceil()),
                "floor" => Value::Float(value.floor()),
                "round" => Value::Float(value.round()),
                "to_string" | "to_s" => Value::String(value.to_string()),
                "to_i" | "to_integer" => Value::Integer(*value as i64),
                _ => return Err(Error::UnknownMethod(method_name.into(), "float")),
            },

            Value::String(value) => match method_name {
                "to_uppercase" | "upcase" => Value::String(value.to_uppercase()),
                "to_lowercase" | "downcase" => Value::String(value.to_lowercase()),
                "trim" => Value::String(value.trim().to_string()),
                "capitalize" => Value::String(crate::capitalize(value)),
                "underscore" | "to_snake_case" => Value::String(crate::snake_case(value)),
                "len" | "length" => Value::Integer(value.chars().count() as i64),
                "empty" => Value::Boolean(value.is_empty()),
                _ => return Err(Error::UnknownMethod(method_name.into(), "string")),
            },

            Value::List(list) => match method_name.parse::<usize>() {
                Ok(index) => list.get(index).cloned().unwrap_or(Value::Null),

                Err(_) => match method_name {
                    "enumerate" => Value::List(
                        list.iter()
                            .enumerate()
                            .map(|(i, v)| Value::List(vec![Value::Integer(i as i64), v.clone()]))
                            .collect(),
                    ),

                    "reverse" | "rev" => Value::List(list.iter().rev().cloned().collect()),

                    "contains" => match args {
                        [needle] => Value::Boolean(list.contains(needle)),
                        _ => Value::Boolean(false),
                    },

                    "join" => {
                        let separator = match args {
                            [separator] => separator.to_string(),
                            _ => String::new(),
                        };

                        Value::String(
                            list.iter()
                                .map(|v| v.to_string())
                                .collect::<Vec<_>>()
                                .join(&separator),
                        )
                    }

                    "empty" => Value::Boolean(list.is_empty()),

                    "len" | "length" => Value::Integer(list.len() as i64),

                    _ => return Err(Error::UnknownMethod(method_name.into(), "list")),
                },
            },

            Value::Hash(hash) => match method_name {
                "keys" => Value::List(hash.keys().map(|k| Value::String(k.clone())).collect()),
                "values" => Value::List(hash.values().cloned().collect()),
                "iter" => Value::List(
                    hash.iter()
                        .map(|(k, v)| Value::List(vec![Value::String(k.clone()), v.clone()]))
                        .collect(),
                ),
                key => hash.get(key).cloned().unwrap_or(Value::Null),
            },

            Value::Object(bag) => match bag.try_get(method_name) {
                Some(value) => value,
                None => {
                    return Err(Error::UnknownMember(
                        method_name.into(),
                        bag.type_name().unwrap_or("anonymous model").to_string(),
                    ))
                }
            },

            Value::Boolean(value) => match method_name {
                "to_string" | "to_s" => Value::String(value.to_string()),
                _ => return Err(Error::UnknownMethod(method_name.into(), "boolean")),
            },

            Value::Null => match method_name {
                "empty" | "nil?" => Value::Boolean(true),
                _ => return Err(Error::UnknownMethod(method_name.into(), "null")),
            },
        })
    }
}

pub trait ToValue {
    fn to_value(&self) -> Result<Value, Error>;
}

impl ToValue for String {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(Value::String(self.clone()))
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(Value::String(self.to_string()))
    }
}

macro_rules! impl_integer {
    ($ty:ty) => {
        impl ToValue for $ty {
            fn to_value(&self) -> Result<Value, Error> {
                Ok(Value::Integer(*self as i64))
            }
        }
    };
}

impl_integer!(i64);
impl_integer!(i32);
impl_integer!(i16);
impl_integer!(i8);
impl_integer!(u64); // Could very much overflow
impl_integer!(u32);
impl_integer!(u16);
impl_integer!(u8);
impl_integer!(usize);

impl ToValue for f64 {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(Value::Float(*self))
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(Value::Float(*self as f64))
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(Value::Boolean(*self))
    }
}

impl ToValue for time::OffsetDateTime {
    fn to_value(&self) -> Result<Value, Error> {
        let fmt = time::format_description::well_known::Rfc2822;
        Ok(Value::String(self.format(&fmt)?))
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(self.clone())
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Result<Value, Error> {
        Ok(Value::from(self.clone()))
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Result<Value, Error> {
        let mut list = vec![];

        for value in self.iter() {
            list.push(value.to_value()?);
        }

        Ok(Value::List(list))
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Result<Value, Error> {
        match self {
            Some(value) => value.to_value(),
            None => Ok(Value::Null),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(list) => {
                Value::List(list.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Hash(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl TryFrom<Value> for serde_json::Value {
    type Error = Error;

    fn try_from(value: Value) -> Result<serde_json::Value, Self::Error> {
        use serde_json::value::Number;
        match value {
            Value::Integer(i) => Ok(serde_json::Value::Number(i.into())),
            Value::Float(f) => Ok(Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)),
            Value::String(s) => Ok(serde_json::Value::String(s)),
            Value::Boolean(b) => Ok(serde_json::Value::Bool(b)),
            Value::List(l) => {
                let mut list = vec![];
                for v in l {
                    list.push(v.try_into()?);
                }
                Ok(serde_json::Value::Array(list))
            }
            Value::Hash(h) => {
                let mut hash = serde_json::Map::new();
                for (k, v) in h {
                    hash.insert(k, v.try_into()?);
                }
                Ok(serde_json::Value::Object(hash))
            }
            Value::Null => Ok(serde_json::Value::Null),
            Value::Object(bag) => bag
                .to_wire()
                .map_err(|err| Error::Serialization(err.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"name": "Joe", "visits": [1, 2.5], "admin": false}));

        match value {
            Value::Hash(ref hash) => {
                assert_eq!(hash["name"], Value::String("Joe".into()));
                assert_eq!(
                    hash["visits"],
                    Value::List(vec![Value::Integer(1), Value::Float(2.5)])
                );
                assert_eq!(hash["admin"], Value::Boolean(false));
            }
            _ => panic!("expected a hash"),
        }
    }

    #[test]
    fn test_division_by_zero() {
        assert!(Value::Integer(5).div(&Value::Integer(0)).is_err());
        assert_eq!(
            Value::Float(5.0).div(&Value::Integer(2)).ok(),
            Some(Value::Float(2.5))
        );
    }

    #[test]
    fn test_null_prints_nothing() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(
            Value::List(vec![Value::Integer(1), Value::String("a".into())]).to_string(),
            "[1, a]"
        );
    }
}
