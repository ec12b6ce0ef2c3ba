//! Models passed to templates.
//!
//! Templates read the model through [`PropertyBag`], never through the
//! concrete type. Anything `Serialize` can be a model:
//!
//! ```
//! use stencil::model::Model;
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Invoice {
//!     total: i64,
//! }
//!
//! let model = Model::new(Invoice { total: 25 });
//! assert_eq!(model.downcast_ref::<Invoice>().map(|i| i.total), Some(25));
//! ```
//!
//! Values without a nameable type, e.g. `json!({"Name": "Joe"})`, use
//! [`Model::anonymous`] and are read through the reflection adapter.
use crate::template::Value;
use crate::Error;
use serde::{Deserialize, Serialize};

use std::any::Any;
use std::sync::Arc;

pub mod bag;

pub use bag::{DynamicModel, JsonBag, Typed};

/// Read-only access to model members by name.
pub trait PropertyBag: std::fmt::Debug + Send + Sync {
    /// Get a member by name, e.g. `Name` for `Model.Name`.
    fn try_get(&self, name: &str) -> Option<Value>;

    /// Fully qualified type name, `None` for anonymous models.
    fn type_name(&self) -> Option<&str>;

    /// Serialized form used to cross the isolation boundary.
    fn to_wire(&self) -> Result<serde_json::Value, Error>;

    fn as_any(&self) -> &dyn Any;
}

/// The model slot of a template.
#[derive(Debug, Clone, Default)]
pub enum Model {
    #[default]
    None,
    Typed(Arc<dyn PropertyBag>),
    Anonymous(Arc<serde_json::Value>),
}

impl Model {
    /// Model backed by a typed accessor.
    pub fn new<T: Serialize + Send + Sync + 'static>(value: T) -> Self {
        Model::Typed(Arc::new(Typed::new(value)))
    }

    /// Model without a nameable type.
    pub fn anonymous(value: serde_json::Value) -> Self {
        Model::Anonymous(Arc::new(value))
    }

    pub fn from_bag(bag: Arc<dyn PropertyBag>) -> Self {
        Model::Typed(bag)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Model::None)
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            Model::Typed(bag) => bag.type_name(),
            _ => None,
        }
    }

    /// Module that defines the model type, e.g. `reports` for `reports::Invoice`.
    pub fn module_path(&self) -> Option<String> {
        self.type_name().and_then(module_of)
    }

    /// Strongly-typed view of the model.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Model::Typed(bag) => bag.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Value bound to `Model` inside the template.
    pub fn to_value(&self) -> Value {
        match self {
            Model::None => Value::Null,
            Model::Typed(bag) => match bag.to_wire() {
                // Scalars and lists are plain values, objects stay behind the bag.
                Ok(json) if !json.is_object() => Value::from(json),
                _ => Value::Object(bag.clone()),
            },
            Model::Anonymous(json) => {
                Value::Object(Arc::new(DynamicModel::new(json.as_ref().clone())))
            }
        }
    }

    /// Copy the model into a form that can cross the isolation boundary.
    pub fn to_wire(&self) -> Result<WireModel, Error> {
        Ok(match self {
            Model::None => WireModel::None,
            Model::Anonymous(json) => WireModel::Anonymous(json.as_ref().clone()),
            Model::Typed(bag) => match bag.type_name() {
                Some(type_name) => WireModel::Typed {
                    type_name: type_name.to_string(),
                    value: bag.to_wire()?,
                },
                None => WireModel::Anonymous(bag.to_wire()?),
            },
        })
    }
}

/// Model as it crosses the isolation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireModel {
    None,
    Anonymous(serde_json::Value),
    Typed {
        type_name: String,
        value: serde_json::Value,
    },
}

impl WireModel {
    pub fn into_model(self) -> Model {
        match self {
            WireModel::None => Model::None,
            WireModel::Anonymous(value) => Model::anonymous(value),
            WireModel::Typed { type_name, value } => {
                Model::from_bag(Arc::new(JsonBag::new(type_name, value)))
            }
        }
    }
}

/// Module part of a type name, ignoring generic arguments.
pub fn module_of(type_name: &str) -> Option<String> {
    let path = type_name.split('<').next().unwrap_or(type_name);
    path.rsplit_once("::").map(|(module, _)| module.to_string())
}

/// Does a declared model type, possibly unqualified, name the actual type?
pub fn type_matches(declared: &str, actual: &str) -> bool {
    let declared = declared.trim();
    actual == declared || actual.ends_with(&format!("::{}", declared))
}
