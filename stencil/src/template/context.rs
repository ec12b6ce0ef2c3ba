use super::{Error, ToValue, Value};
use std::collections::HashMap;

/// Host-provided helpers, e.g. `render_partial("footer")`.
///
/// The template language knows nothing about hosts or engines, it only
/// forwards calls it can't resolve itself.
pub trait Runtime {
    /// Call a helper by name. Unknown helpers should return [`Error::UnknownHelper`].
    fn helper(&self, name: &str, args: &[Value]) -> Result<Value, Error>;
}

/// Variables in scope and the runtime helpers are dispatched to.
#[derive(Default, Clone)]
pub struct Context<'a> {
    values: HashMap<String, Value>,
    runtime: Option<&'a dyn Runtime>,
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("values", &self.values)
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that forwards unknown helpers to the runtime.
    pub fn with_runtime(runtime: &'a dyn Runtime) -> Self {
        Self {
            values: HashMap::new(),
            runtime: Some(runtime),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl ToValue) -> Result<&mut Self, Error> {
        self.values.insert(key.to_string(), value.to_value()?);
        Ok(self)
    }

    /// Call a global helper. `default` and `html_encode` are always available,
    /// everything else goes to the runtime.
    pub fn helper(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        match name {
            "default" => Ok(match args {
                [value, fallback] => {
                    if value == &Value::Null {
                        fallback.clone()
                    } else {
                        value.clone()
                    }
                }
                [value] => value.clone(),
                _ => Value::Null,
            }),

            "html_encode" => Ok(match args {
                [value] => Value::String(crate::html_encode(&value.to_string())),
                _ => Value::Null,
            }),

            name => match self.runtime {
                Some(runtime) => runtime.helper(name, args),
                None => Err(Error::UnknownHelper(name.to_string())),
            },
        }
    }
}

impl TryFrom<HashMap<String, Value>> for Context<'_> {
    type Error = Error;

    fn try_from(values: HashMap<String, Value>) -> Result<Self, Self::Error> {
        Ok(Context {
            values,
            runtime: None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Shouting;

    impl Runtime for Shouting {
        fn helper(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
            match (name, args) {
                ("shout", [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
                _ => Err(Error::UnknownHelper(name.to_string())),
            }
        }
    }

    #[test]
    fn test_context_set() -> Result<(), Error> {
        let mut context = Context::default();
        context.set("test", "value")?;

        assert_eq!(context.get("test"), Some(Value::String("value".to_string())));
        assert_eq!(context.get("missing"), None);

        Ok(())
    }

    #[test]
    fn test_helpers() -> Result<(), Error> {
        let runtime = Shouting;
        let context = Context::with_runtime(&runtime);

        assert_eq!(
            context.helper("shout", &[Value::String("hi".into())])?,
            Value::String("HI".into())
        );
        assert_eq!(
            context.helper("html_encode", &[Value::String("<b>".into())])?,
            Value::String("&lt;b&gt;".into())
        );
        assert!(matches!(
            Context::new().helper("shout", &[]),
            Err(Error::UnknownHelper(_))
        ));

        Ok(())
    }
}
