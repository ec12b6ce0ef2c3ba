//! Host for templates held in strings.
//!
//! Units are cached by the SHA-1 of the template text, with line endings
//! normalized. Identical text always hits the cache, no matter where the
//! render was called from.
use super::{hash_key, CacheEntry, EngineHandle, HostCore};
use crate::compiler::{declares_model, rewrite_model_declaration, BaseContract};
use crate::config::{get_config, Config};
use crate::engine::CompileRequest;
use crate::fault::FaultRecord;
use crate::model::Model;
use crate::sandbox::SandboxHandle;
use crate::Error;

use time::OffsetDateTime;
use tracing::info;

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct StringHost {
    core: HostCore,
    infer_model_type: AtomicBool,
}

impl Default for StringHost {
    fn default() -> Self {
        Self::new(get_config().clone())
    }
}

impl Deref for StringHost {
    type Target = HostCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl StringHost {
    pub fn new(config: Config) -> Self {
        Self {
            core: HostCore::new(config, BaseContract::Template),
            infer_model_type: AtomicBool::new(false),
        }
    }

    /// Host running its engine in a context shared with others.
    pub fn with_sandbox(config: Config, sandbox: SandboxHandle) -> Self {
        Self {
            core: HostCore::new(config, BaseContract::Template).with_sandbox(sandbox),
            infer_model_type: AtomicBool::new(false),
        }
    }

    /// Specialize templates that don't declare a model type on the type of
    /// the model they're rendered with.
    pub fn set_infer_model_type(&self, infer_model_type: bool) {
        self.infer_model_type
            .store(infer_model_type, Ordering::Relaxed);
    }

    // Text that gets compiled and hashed.
    fn prepare<'a>(&self, source: &'a str, model: &Model) -> Cow<'a, str> {
        let source = if source.contains("\r\n") {
            Cow::Owned(source.replace("\r\n", "\n"))
        } else {
            Cow::Borrowed(source)
        };

        match model.type_name() {
            Some(model_type)
                if self.infer_model_type.load(Ordering::Relaxed) && !declares_model(&source) =>
            {
                Cow::Owned(
                    rewrite_model_declaration(
                        &source,
                        self.contract().name(),
                        Some(model_type),
                    )
                    .into_owned(),
                )
            }
            _ => source,
        }
    }

    /// Cache key of the template when rendered with this model.
    pub fn cache_key(&self, source: &str, model: &Model) -> String {
        hash_key(&self.prepare(source, model))
    }

    pub fn cached_unit(&self, source: &str, model: &Model) -> Option<Arc<CacheEntry>> {
        self.cached(&self.cache_key(source, model))
    }

    // Cached unit id, compiling on a miss.
    fn resolve(
        &self,
        engine: &EngineHandle,
        source: &str,
        model: &Model,
    ) -> Result<String, FaultRecord> {
        let text = self.prepare(source, model);
        let key = hash_key(&text);

        if let Some(entry) = self.cache_lookup(&key) {
            return Ok(entry.unit_id.clone());
        }

        if self.infer_model_type.load(Ordering::Relaxed) {
            if let Some(module) = model.module_path() {
                engine
                    .add_referenced_module(&module)
                    .map_err(FaultRecord::new)?;
            }
        }

        let unit_id = match engine.compile(&text, CompileRequest::default()) {
            Ok(unit_id) => unit_id,
            Err(err) => return Err(self.engine_fault(engine, err)),
        };

        info!("string template cached as {}", unit_id);

        self.cache_store(CacheEntry {
            key,
            unit_id: unit_id.clone(),
            compiled_at: OffsetDateTime::now_utc(),
            file: None,
            layout: None,
        });

        Ok(unit_id)
    }

    /// Compile the template, or find it in the cache. Returns the unit id.
    pub fn compile_template(&self, source: &str) -> Result<Option<String>, FaultRecord> {
        self.reset_errors();

        let result = self
            .engine()
            .map_err(FaultRecord::new)
            .and_then(|engine| self.resolve(&engine, source, &Model::None));

        match result {
            Ok(unit_id) => Ok(Some(unit_id)),
            Err(record) => self.fail(record),
        }
    }

    pub fn compile_template_from_reader(
        &self,
        reader: &mut dyn Read,
    ) -> Result<Option<String>, FaultRecord> {
        match read(reader) {
            Ok(source) => self.compile_template(&source),
            Err(err) => {
                self.reset_errors();
                self.fail(FaultRecord::new(err))
            }
        }
    }

    /// Render the template with the model. With a writer, output is
    /// streamed to it and the result is an empty string.
    pub fn render_template(
        &self,
        source: &str,
        model: &Model,
        mut writer: Option<&mut dyn Write>,
    ) -> Result<Option<String>, FaultRecord> {
        self.reset_errors();

        let engine = match self.engine() {
            Ok(engine) => engine,
            Err(err) => return self.fail(FaultRecord::new(err)),
        };

        let unit_id = match self.resolve(&engine, source, model) {
            Ok(unit_id) => unit_id,
            Err(record) => {
                if let Some(writer) = writer.as_mut() {
                    let _ = writer.flush();
                }
                return self.fail(record);
            }
        };

        match engine.render(&unit_id, model, writer, None) {
            Ok(output) => Ok(Some(output)),
            Err(err) => {
                let record = self.engine_fault(&engine, err);
                self.fail(record)
            }
        }
    }

    pub fn render_template_from_reader(
        &self,
        reader: &mut dyn Read,
        model: &Model,
        writer: Option<&mut dyn Write>,
    ) -> Result<Option<String>, FaultRecord> {
        match read(reader) {
            Ok(source) => self.render_template(&source, model, writer),
            Err(err) => {
                self.reset_errors();
                self.fail(FaultRecord::new(err))
            }
        }
    }

    /// Render the template into a file, replacing it.
    pub fn render_template_to_file(
        &self,
        source: &str,
        model: &Model,
        path: impl AsRef<Path>,
    ) -> Result<bool, FaultRecord> {
        let file = match File::create(path.as_ref()) {
            Ok(file) => file,
            Err(err) => {
                self.reset_errors();
                return self
                    .fail::<()>(FaultRecord::new(Error::from(err)).active_template(path.as_ref().display()))
                    .map(|_| false);
            }
        };

        let mut writer = BufWriter::new(file);
        Ok(self
            .render_template(source, model, Some(&mut writer))?
            .is_some())
    }
}

fn read(reader: &mut dyn Read) -> Result<String, Error> {
    let mut source = String::new();
    reader.read_to_string(&mut source)?;
    Ok(source)
}
