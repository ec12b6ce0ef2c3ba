//! Property bag implementations.
use super::PropertyBag;
use crate::template::Value;
use crate::{snake_case, Error};

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Map;

use std::any::Any;

// Exact name first, then the snake_case spelling, e.g. `FirstName` finds `first_name`.
fn lookup(map: &Map<String, serde_json::Value>, name: &str) -> Option<Value> {
    if let Some(value) = map.iter().find(|(key, _)| key.as_str() == name) {
        return Some(Value::from(value.1.clone()));
    }

    let snake = snake_case(name);
    map.iter()
        .find(|(key, _)| key.as_str() == snake || snake_case(key) == snake)
        .map(|(_, value)| Value::from(value.clone()))
}

/// Typed accessor for any serializable Rust value.
///
/// The value is serialized once, on first access, and members are read
/// from that snapshot.
pub struct Typed<T> {
    value: T,
    snapshot: OnceCell<Result<serde_json::Value, String>>,
}

impl<T: Serialize + Send + Sync + 'static> Typed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            snapshot: OnceCell::new(),
        }
    }

    fn snapshot(&self) -> &Result<serde_json::Value, String> {
        self.snapshot
            .get_or_init(|| serde_json::to_value(&self.value).map_err(|err| err.to_string()))
    }
}

impl<T> std::fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Typed")
            .field("type_name", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Serialize + Send + Sync + 'static> PropertyBag for Typed<T> {
    fn try_get(&self, name: &str) -> Option<Value> {
        match self.snapshot() {
            Ok(serde_json::Value::Object(map)) => lookup(map, name),
            _ => None,
        }
    }

    fn type_name(&self) -> Option<&str> {
        Some(std::any::type_name::<T>())
    }

    fn to_wire(&self) -> Result<serde_json::Value, Error> {
        self.snapshot()
            .clone()
            .map_err(|err| Error::ModelMarshaling(format!("{}: {}", std::any::type_name::<T>(), err)))
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}

/// Reflection adapter for models without a nameable type.
///
/// Every access is a linear scan over the members.
#[derive(Debug, Clone)]
pub struct DynamicModel {
    value: serde_json::Value,
}

impl DynamicModel {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }
}

impl PropertyBag for DynamicModel {
    fn try_get(&self, name: &str) -> Option<Value> {
        match &self.value {
            serde_json::Value::Object(map) => lookup(map, name),
            _ => None,
        }
    }

    fn type_name(&self) -> Option<&str> {
        None
    }

    fn to_wire(&self) -> Result<serde_json::Value, Error> {
        Ok(self.value.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A typed model that crossed the isolation boundary. Keeps the type name
/// so templates declaring a model type still activate.
#[derive(Debug, Clone)]
pub struct JsonBag {
    type_name: String,
    value: serde_json::Value,
}

impl JsonBag {
    pub fn new(type_name: impl ToString, value: serde_json::Value) -> Self {
        Self {
            type_name: type_name.to_string(),
            value,
        }
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

impl PropertyBag for JsonBag {
    fn try_get(&self, name: &str) -> Option<Value> {
        match &self.value {
            serde_json::Value::Object(map) => lookup(map, name),
            _ => None,
        }
    }

    fn type_name(&self) -> Option<&str> {
        Some(&self.type_name)
    }

    fn to_wire(&self) -> Result<serde_json::Value, Error> {
        Ok(self.value.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
