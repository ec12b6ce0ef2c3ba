//! A running template.
//!
//! The instance holds the model slot, the per-request configuration and the
//! render callback, and answers the helpers templates call. Templates never
//! see the engine or the host directly.
use super::{Engine, RequestConfig};
use crate::compiler::BaseContract;
use crate::model::Model;
use crate::template::{Context, Error, Program, Runtime, Value};

use std::io::Write;

/// Placeholder layouts print where the page goes, replaced by the host
/// after both are rendered.
pub const BODY_MARKER: &str = "@RenderBody()";

/// Narrow capability to render other templates from inside a template.
pub trait RenderCallback {
    /// Render a partial template with the model.
    fn render_partial(&self, path: &str, model: &Model) -> Result<String, crate::Error>;
}

pub struct TemplateInstance<'a> {
    engine: &'a Engine,
    model: &'a Model,
    request_config: Option<RequestConfig>,
    contract: BaseContract,
    callback: Option<&'a dyn RenderCallback>,
}

impl<'a> TemplateInstance<'a> {
    pub fn new(
        engine: &'a Engine,
        model: &'a Model,
        request_config: Option<RequestConfig>,
        contract: BaseContract,
        callback: Option<&'a dyn RenderCallback>,
    ) -> Self {
        Self {
            engine,
            model,
            request_config,
            contract,
            callback,
        }
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    /// The model as its concrete type, if it is one.
    pub fn typed_model<T: 'static>(&self) -> Option<&T> {
        self.model.downcast_ref::<T>()
    }

    pub fn request_config(&self) -> Option<&RequestConfig> {
        self.request_config.as_ref()
    }

    /// Execute the program. With a writer, output goes there and the
    /// result is empty.
    pub fn run(
        &self,
        program: &Program,
        writer: Option<&mut (dyn Write + '_)>,
    ) -> Result<String, Error> {
        let mut context = Context::with_runtime(self);
        context.set("Model", self.model.to_value())?;

        let config = match self.request_config {
            Some(ref config) => serde_json::to_value(config)
                .map_err(|err| Error::Serialization(err.to_string()))?,
            None => serde_json::Value::Null,
        };
        context.set("Config", config)?;

        match writer {
            Some(writer) => {
                program.evaluate_into(&context, writer)?;
                Ok(String::new())
            }
            None => program.evaluate(&context),
        }
    }

    // Optional model argument of `render_partial` and `render_template`,
    // defaults to the current model.
    fn model_argument(&self, value: Option<&Value>) -> Result<Model, Error> {
        Ok(match value {
            None => self.model.clone(),
            Some(Value::Null) => Model::None,
            Some(Value::Object(bag)) => Model::from_bag(bag.clone()),
            Some(value) => Model::anonymous(serde_json::Value::try_from(value.clone())?),
        })
    }

    fn folder_only(&self, name: &str) -> Result<(), Error> {
        match self.contract {
            BaseContract::FolderTemplate => Ok(()),
            BaseContract::Template => Err(Error::UnknownHelper(name.to_string())),
        }
    }
}

impl Runtime for TemplateInstance<'_> {
    fn helper(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        match (name, args) {
            ("layout", [Value::String(layout)]) => {
                self.folder_only(name)?;
                self.engine.set_layout(layout);
                Ok(Value::Null)
            }

            ("render_body", []) => {
                self.folder_only(name)?;
                Ok(Value::String(BODY_MARKER.to_string()))
            }

            ("render_partial", [Value::String(path), rest @ ..]) if rest.len() <= 1 => {
                self.folder_only(name)?;
                let model = self.model_argument(rest.first())?;
                let callback = self
                    .callback
                    .ok_or_else(|| Error::Helper("partials can't be rendered here".into()))?;

                callback
                    .render_partial(path, &model)
                    .map(Value::String)
                    .map_err(|err| Error::Helper(err.to_string()))
            }

            ("render_template", [Value::String(text), rest @ ..]) if rest.len() <= 1 => {
                // Plain text doesn't need a compile.
                if !text.contains("<%") {
                    return Ok(Value::String(text.clone()));
                }

                let model = self.model_argument(rest.first())?;
                self.engine
                    .render_nested(text, &model, self.callback)
                    .map(Value::String)
                    .map_err(|err| Error::Helper(err.to_string()))
            }

            ("layout" | "render_body" | "render_partial" | "render_template", _) => Err(
                Error::Helper(format!("wrong arguments for \"{}\"", name)),
            ),

            _ => Err(Error::UnknownHelper(name.to_string())),
        }
    }
}
