//! Render engine.
//!
//! Owns the compilation pipeline and the registry of compiled units, and
//! runs units against a model. Failures never escape as panics: they are
//! returned as [`Error`] and recorded in the engine state, which is reset at
//! the start of every call.
use crate::compiler::{BaseContract, BuildOptions, Pipeline, UnitDescriptor};
use crate::config::{get_config, Config};
use crate::model::{module_of, type_matches, Model};
use crate::template::Error as TemplateError;
use crate::unit::{EntrySelector, TemplateUnit};
use crate::Error;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use std::any::Any;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

pub mod instance;

pub use instance::{RenderCallback, TemplateInstance, BODY_MARKER};

/// Settings an engine is created with. Serializable, so an isolated
/// context can be created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub base_contract: BaseContract,
    pub namespace: String,
    pub namespaces: Vec<String>,
    pub references: Vec<String>,
    pub compile_to_memory: bool,
    pub temp_module_path: PathBuf,
}

impl EngineConfig {
    pub fn from_config(config: &Config, base_contract: BaseContract) -> Self {
        Self {
            base_contract,
            namespace: config.compiler.namespace.clone(),
            namespaces: config.compiler.namespaces.clone(),
            references: config.compiler.references.clone(),
            compile_to_memory: config.compiler.compile_to_memory,
            temp_module_path: config.compiler.temp_module_path.clone(),
        }
    }

    pub fn base_contract(mut self, base_contract: BaseContract) -> Self {
        self.base_contract = base_contract;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(get_config(), BaseContract::Template)
    }
}

/// Per-request configuration visible to the running template as `Config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Absolute path of the template being rendered.
    pub template_path: String,
    /// Path as the caller wrote it.
    pub relative_path: String,
    /// Layout set by the template with `layout("...")`.
    pub layout: Option<String>,
    /// This render is a layout page.
    pub is_layout: bool,
    /// Arbitrary data for the template.
    pub data: serde_json::Value,
}

/// What to name the compiled unit and which model type to specialize on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub namespace: Option<String>,
    pub class_name: Option<String>,
    pub model_type: Option<String>,
}

/// Error state of the last call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub error_message: Option<String>,
    pub last_error: Option<Error>,
    pub last_generated_source: Option<String>,
}

/// How to run a unit: where output goes, which entry type, and who to call
/// for partials.
#[derive(Default)]
pub struct Invocation<'a> {
    pub writer: Option<&'a mut dyn Write>,
    pub entry: Option<EntrySelector>,
    pub callback: Option<&'a dyn RenderCallback>,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    pipeline: RwLock<Pipeline>,
    units: RwLock<HashMap<String, Arc<TemplateUnit>>>,
    nested: RwLock<HashMap<(Option<String>, String), Arc<TemplateUnit>>>,
    state: Mutex<EngineState>,
    request_config: Mutex<Option<RequestConfig>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Create an engine with the default template compiler and backend.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_pipeline(config, Pipeline::default())
    }

    /// Create an engine with a custom pipeline.
    pub fn with_pipeline(config: EngineConfig, pipeline: Pipeline) -> Self {
        let mut pipeline = pipeline.options(BuildOptions {
            in_memory: config.compile_to_memory,
            output_path: Some(config.temp_module_path.clone()),
        });

        for namespace in &config.namespaces {
            pipeline.add_namespace(namespace);
        }

        for reference in &config.references {
            pipeline.add_reference(reference);
        }

        Self {
            config,
            pipeline: RwLock::new(pipeline),
            units: RwLock::new(HashMap::new()),
            nested: RwLock::new(HashMap::new()),
            state: Mutex::new(EngineState::default()),
            request_config: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compile the template and register the unit. Returns the unit id.
    pub fn compile_template(
        &self,
        source: &str,
        namespace: Option<&str>,
        class_name: Option<&str>,
    ) -> Result<String, Error> {
        let request = CompileRequest {
            namespace: namespace.map(|n| n.to_string()),
            class_name: class_name.map(|c| c.to_string()),
            model_type: None,
        };

        Ok(self.compile(source, &request)?.id.clone())
    }

    pub fn compile_template_from_reader(
        &self,
        reader: &mut dyn Read,
        namespace: Option<&str>,
        class_name: Option<&str>,
    ) -> Result<String, Error> {
        let source = self.read(reader)?;
        self.compile_template(&source, namespace, class_name)
    }

    /// Compile the template and register the unit.
    pub fn compile(
        &self,
        source: &str,
        request: &CompileRequest,
    ) -> Result<Arc<TemplateUnit>, Error> {
        self.reset();

        let namespace = request.namespace.as_deref().unwrap_or(&self.config.namespace);
        let mut descriptor = UnitDescriptor::new(namespace, self.config.base_contract)
            .model_type(request.model_type.as_deref());
        if let Some(ref class_name) = request.class_name {
            descriptor = descriptor.class_name(class_name);
        }

        let result = self.pipeline.read().compile(source, &descriptor);

        match result {
            Ok(unit) => {
                let unit = Arc::new(unit);
                self.state.lock().last_generated_source = Some(unit.generated_source.clone());
                self.units.write().insert(unit.id.clone(), unit.clone());

                Ok(unit)
            }

            Err(failure) => {
                self.fail(&failure.error, failure.generated_source);
                Err(failure.error)
            }
        }
    }

    /// Compile the template and render it with the model.
    ///
    /// The module defining the model type is referenced automatically, and the
    /// template is specialized on the model type unless it declares its own.
    pub fn render_template(
        &self,
        source: &str,
        model: &Model,
        mut writer: Option<&mut dyn Write>,
    ) -> Result<String, Error> {
        self.add_referenced_module_from_instance(model);

        let request = CompileRequest {
            model_type: model.type_name().map(|t| t.to_string()),
            ..Default::default()
        };

        let unit = match self.compile(source, &request) {
            Ok(unit) => unit,
            Err(err) => {
                if let Some(writer) = writer.as_mut() {
                    let _ = writer.flush();
                }
                return Err(err);
            }
        };

        self.render_template_from_unit(&unit.id, model, writer)
    }

    pub fn render_template_from_reader(
        &self,
        reader: &mut dyn Read,
        model: &Model,
        writer: Option<&mut dyn Write>,
    ) -> Result<String, Error> {
        let source = self.read(reader)?;
        self.render_template(&source, model, writer)
    }

    /// Render a unit compiled earlier.
    pub fn render_template_from_unit(
        &self,
        unit_id: &str,
        model: &Model,
        writer: Option<&mut dyn Write>,
    ) -> Result<String, Error> {
        self.render_entry(
            unit_id,
            model,
            Invocation {
                writer,
                ..Default::default()
            },
        )
    }

    /// Run an entry type of a unit. With a writer, output is streamed to it
    /// and the result is an empty string.
    pub fn render_entry(
        &self,
        unit_id: &str,
        model: &Model,
        mut invocation: Invocation<'_>,
    ) -> Result<String, Error> {
        self.reset();

        let result = self.execute(unit_id, model, &mut invocation);

        if let Some(writer) = invocation.writer.as_mut() {
            if let Err(err) = writer.flush() {
                warn!("failed to flush template output: {}", err);
            }
        }

        result
    }

    fn execute(
        &self,
        unit_id: &str,
        model: &Model,
        invocation: &mut Invocation<'_>,
    ) -> Result<String, Error> {
        let unit = match self.unit(unit_id) {
            Some(unit) => unit,
            None => return self.failed(Error::UnitNotFound(unit_id.to_string()), None),
        };

        self.execute_unit(&unit, model, invocation)
    }

    fn execute_unit(
        &self,
        unit: &TemplateUnit,
        model: &Model,
        invocation: &mut Invocation<'_>,
    ) -> Result<String, Error> {
        let generated_source = Some(unit.generated_source.clone());

        let entry = match unit.module.entry(invocation.entry.as_ref()) {
            Some(entry) => entry,
            None => {
                let name = invocation
                    .entry
                    .as_ref()
                    .map(|e| format!("{}::{}", e.namespace, e.name))
                    .unwrap_or_default();
                return self.failed(
                    Error::TypeActivation(format!("type \"{}\" not found in unit {}", name, unit.id)),
                    generated_source,
                );
            }
        };

        let contract = match BaseContract::from_name(&entry.base_type) {
            Some(contract) if self.config.base_contract.accepts(contract) => contract,
            _ => {
                return self.failed(
                    Error::TypeActivation(format!(
                        "\"{}\" inherits \"{}\", which doesn't implement \"{}\"",
                        entry.full_name(),
                        entry.base_type,
                        self.config.base_contract.name()
                    )),
                    generated_source,
                )
            }
        };

        if let (Some(declared), Some(actual)) = (&entry.model_type, model.type_name()) {
            if !type_matches(declared, actual) {
                return self.failed(
                    Error::TypeActivation(format!(
                        "\"{}\" expects a model of type \"{}\", got \"{}\"",
                        entry.full_name(),
                        declared,
                        actual
                    )),
                    generated_source,
                );
            }
        }

        let instance = TemplateInstance::new(
            self,
            model,
            self.request_config(),
            contract,
            invocation.callback,
        );

        // Templates run host code through helpers, a panic there is a template fault.
        let writer = invocation.writer.as_deref_mut();
        let output = catch_unwind(AssertUnwindSafe(|| instance.run(&entry.program, writer)))
            .unwrap_or_else(|panic| Err(TemplateError::Helper(panic_message(panic))));

        debug!("rendered {}", entry.full_name());

        match output {
            Ok(output) => Ok(output),
            Err(err) => self.failed(Error::Execution(err.to_string()), generated_source),
        }
    }

    /// Render template text from inside a running template.
    ///
    /// Units are kept apart from the registry, one per distinct text and
    /// model type, and the engine state of the outer render is left alone.
    pub(crate) fn render_nested(
        &self,
        source: &str,
        model: &Model,
        callback: Option<&dyn RenderCallback>,
    ) -> Result<String, Error> {
        let key = (model.type_name().map(|t| t.to_string()), source.to_string());
        let cached = self.nested.read().get(&key).cloned();

        let unit = match cached {
            Some(unit) => unit,
            None => {
                self.add_referenced_module_from_instance(model);
                let namespace = &self.config.namespace;
                let descriptor = UnitDescriptor::new(namespace, self.config.base_contract)
                    .model_type(key.0.as_deref());
                let unit = self
                    .pipeline
                    .read()
                    .compile(source, &descriptor)
                    .map(Arc::new)
                    .map_err(|failure| failure.error)?;

                self.nested.write().insert(key, unit.clone());
                unit
            }
        };

        self.execute_unit(
            &unit,
            model,
            &mut Invocation {
                callback,
                ..Default::default()
            },
        )
    }

    /// Import a namespace into templates compiled from now on.
    pub fn add_namespace(&self, namespace: &str) {
        self.pipeline.write().add_namespace(namespace);
    }

    /// Allow templates compiled from now on to use types from this module.
    pub fn add_referenced_module(&self, module: &str) {
        self.pipeline.write().add_reference(module);
    }

    /// Reference the module defining `T`.
    pub fn add_referenced_module_from<T: ?Sized>(&self) {
        if let Some(module) = module_of(std::any::type_name::<T>()) {
            self.add_referenced_module(&module);
        }
    }

    /// Reference the module defining the model's type.
    pub fn add_referenced_module_from_instance(&self, model: &Model) {
        if let Some(module) = model.module_path() {
            self.add_referenced_module(&module);
        }
    }

    /// Replace the per-request configuration, returning the previous one.
    pub fn set_request_config(&self, config: Option<RequestConfig>) -> Option<RequestConfig> {
        std::mem::replace(&mut *self.request_config.lock(), config)
    }

    pub fn request_config(&self) -> Option<RequestConfig> {
        self.request_config.lock().clone()
    }

    /// Set the layout of the current request.
    pub(crate) fn set_layout(&self, layout: &str) {
        let mut guard = self.request_config.lock();
        let config = guard.get_or_insert_with(RequestConfig::default);
        config.layout = Some(layout.to_string());
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.state.lock().error_message.clone()
    }

    pub fn unit(&self, unit_id: &str) -> Option<Arc<TemplateUnit>> {
        self.units.read().get(unit_id).cloned()
    }

    pub fn units(&self) -> usize {
        self.units.read().len()
    }

    fn read(&self, reader: &mut dyn Read) -> Result<String, Error> {
        let mut source = String::new();
        if let Err(err) = reader.read_to_string(&mut source) {
            self.reset();
            return self.failed(Error::from(err), None);
        }

        Ok(source)
    }

    fn reset(&self) {
        *self.state.lock() = EngineState::default();
    }

    fn fail(&self, error: &Error, generated_source: Option<String>) {
        let mut state = self.state.lock();
        state.error_message = Some(error.to_string());
        state.last_error = Some(error.clone());
        if generated_source.is_some() {
            state.last_generated_source = generated_source;
        }
    }

    fn failed<T>(&self, error: Error, generated_source: Option<String>) -> Result<T, Error> {
        self.fail(&error, generated_source);
        Err(error)
    }
}

/// Text of a caught panic.
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "template panicked".to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::new(EngineConfig::from_config(&Config::default(), BaseContract::Template))
    }

    #[test]
    fn test_render_from_unit() -> Result<(), Error> {
        let engine = engine();
        let id = engine.compile_template("Hello <%= Model.Name %>", None, None)?;

        let joe = Model::anonymous(json!({"Name": "Joe Doe"}));
        let ann = Model::anonymous(json!({"Name": "Ann"}));

        assert_eq!(engine.render_template_from_unit(&id, &joe, None)?, "Hello Joe Doe");
        assert_eq!(engine.render_template_from_unit(&id, &ann, None)?, "Hello Ann");
        assert_eq!(engine.units(), 1);

        Ok(())
    }

    #[test]
    fn test_unit_not_found() {
        let engine = engine();
        let result = engine.render_template_from_unit("_missing", &Model::None, None);

        assert_eq!(result, Err(Error::UnitNotFound("_missing".into())));
        assert!(engine.error_message().is_some());
    }

    #[test]
    fn test_state_reset() {
        let engine = engine();

        assert!(engine.compile_template("<% if %>", None, None).is_err());
        assert!(engine.state().last_error.is_some());

        assert!(engine.compile_template("fine", None, None).is_ok());
        assert_eq!(engine.state().error_message, None);
        assert_eq!(engine.state().last_error, None);
    }

    #[test]
    fn test_execution_fault() {
        let engine = engine();
        let result = engine.render_template("<%= Model.Missing %>", &Model::anonymous(json!({})), None);

        assert!(matches!(result, Err(Error::Execution(_))));
        let state = engine.state();
        assert!(state.error_message.unwrap().contains("Missing"));
        assert!(state.last_generated_source.is_some());
    }

    #[test]
    fn test_writer() -> Result<(), Error> {
        let engine = engine();
        let mut output = vec![];
        let result = engine.render_template(
            "<% for i in [1, 2] %><%= i %><% end %>",
            &Model::None,
            Some(&mut output),
        )?;

        assert_eq!(result, "");
        assert_eq!(String::from_utf8_lossy(&output), "12");

        Ok(())
    }

    struct Explodes;

    impl RenderCallback for Explodes {
        fn render_partial(&self, path: &str, _model: &Model) -> Result<String, Error> {
            panic!("partial {} exploded", path)
        }
    }

    #[test]
    fn test_panic_is_execution_fault() -> Result<(), Error> {
        let engine = Engine::new(EngineConfig::from_config(
            &Config::default(),
            BaseContract::FolderTemplate,
        ));
        let id = engine.compile_template(r#"a<%- render_partial("side.html") %>"#, None, None)?;

        let result = engine.render_entry(
            &id,
            &Model::None,
            Invocation {
                callback: Some(&Explodes),
                ..Default::default()
            },
        );

        match result {
            Err(Error::Execution(message)) => assert!(message.contains("partial side.html exploded")),
            other => panic!("expected an execution fault, got {:?}", other),
        }
        assert!(engine.error_message().is_some());

        Ok(())
    }

    #[test]
    fn test_integer_overflow_fault() {
        let engine = engine();
        let model = Model::anonymous(json!({"a": i64::MIN, "b": -1}));

        for source in ["<%= Model.a / Model.b %>", "<%= Model.a % Model.b %>"] {
            let result = engine.render_template(source, &model, None);
            assert!(matches!(result, Err(Error::Execution(_))), "{}", source);
        }
    }

    #[test]
    fn test_nested_templates_are_cached() -> Result<(), Error> {
        let engine = engine();
        let id = engine.compile_template(
            r#"<%- render_template("<%= Model.Name %>.") %>"#,
            None,
            None,
        )?;

        let ann = Model::anonymous(json!({"Name": "Ann"}));
        let joe = Model::anonymous(json!({"Name": "Joe"}));

        assert_eq!(engine.render_template_from_unit(&id, &ann, None)?, "Ann.");
        assert_eq!(engine.render_template_from_unit(&id, &joe, None)?, "Joe.");
        assert_eq!(engine.units(), 1);
        assert_eq!(engine.nested.read().len(), 1);

        Ok(())
    }

    #[test]
    fn test_nested_template_keeps_outer_state() -> Result<(), Error> {
        let engine = engine();
        let id = engine.compile_template(r#"<%- render_template("<%= 1 %>") %>"#, None, None)?;

        assert_eq!(engine.render_template_from_unit(&id, &Model::None, None)?, "1");
        assert_eq!(engine.state(), EngineState::default());

        Ok(())
    }

    #[test]
    fn test_request_config() {
        let engine = engine();
        assert_eq!(engine.set_request_config(Some(RequestConfig::default())), None);

        engine.set_layout("main.html");
        assert_eq!(
            engine.request_config().and_then(|c| c.layout).as_deref(),
            Some("main.html")
        );
    }
}
