//! Host containers.
//!
//! A host owns one engine between `start()` and `stop()`, caches compiled
//! units by template identity and turns engine failures into
//! [`FaultRecord`]s. Two variants are provided:
//!
//! - [`StringHost`] renders template text, keyed by the SHA-1 of the text,
//! - [`FolderHost`] renders files under a folder, keyed by path and
//!   revalidated against the file's modification time.
//!
//! Whether failures are returned as `Ok(None)` (with the error available from
//! [`HostCore::error_message`]) or as `Err(FaultRecord)` is decided by
//! `throw_exceptions`, at every failure point.
use crate::colors::MaybeColorize;
use crate::compiler::BaseContract;
use crate::config::Config;
use crate::engine::{Engine, EngineConfig, RequestConfig};
use crate::fault::FaultRecord;
use crate::model::{module_of, Model};
use crate::sandbox::{create_isolated_context, SandboxHandle};
use crate::{html_encode, Error};

use parking_lot::{Mutex, RwLock};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod folder;
pub mod handle;
pub mod string;

pub use folder::FolderHost;
pub use handle::EngineHandle;
pub use string::StringHost;

/// Hex SHA-1 of the text, used as a cache key.
pub fn hash_key(text: &str) -> String {
    format!("{:x}", Sha1::digest(text.as_bytes()))
}

/// A compiled unit remembered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub unit_id: String,
    pub compiled_at: OffsetDateTime,
    /// Source file, for file-backed templates.
    pub file: Option<PathBuf>,
    /// Layout the template asked for the last time it was rendered.
    pub layout: Option<String>,
}

#[derive(Debug)]
enum Lifecycle {
    Uninitialized,
    Started { engine: EngineHandle, owned: bool },
    Stopped,
}

#[derive(Debug, Default)]
struct Errors {
    error_message: Option<String>,
    last_fault: Option<FaultRecord>,
}

/// Lifecycle, caching and error reporting shared by all hosts.
#[derive(Debug)]
pub struct HostCore {
    contract: BaseContract,
    config: Config,
    lifecycle: RwLock<Lifecycle>,
    throw_exceptions: AtomicBool,
    use_isolated_context: AtomicBool,
    sandbox: Option<SandboxHandle>,
    namespaces: Mutex<Vec<String>>,
    references: Mutex<Vec<String>>,
    cache: Mutex<HashMap<String, Arc<CacheEntry>>>,
    errors: Mutex<Errors>,
}

impl HostCore {
    pub fn new(config: Config, contract: BaseContract) -> Self {
        Self {
            contract,
            throw_exceptions: AtomicBool::new(config.general.throw_exceptions),
            use_isolated_context: AtomicBool::new(config.general.use_isolated_context),
            config,
            lifecycle: RwLock::new(Lifecycle::Uninitialized),
            sandbox: None,
            namespaces: Mutex::new(vec![]),
            references: Mutex::new(vec![]),
            cache: Mutex::new(HashMap::new()),
            errors: Mutex::new(Errors::default()),
        }
    }

    /// Use an isolated context created by the caller. The host doesn't
    /// destroy it on `stop()`.
    pub fn with_sandbox(mut self, sandbox: SandboxHandle) -> Self {
        self.sandbox = Some(sandbox);
        self.use_isolated_context.store(true, Ordering::Relaxed);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn contract(&self) -> BaseContract {
        self.contract
    }

    /// Start the host. Does nothing if it's already started.
    pub fn start(&self) -> Result<bool, FaultRecord> {
        let mut lifecycle = self.lifecycle.write();
        if let Lifecycle::Started { .. } = *lifecycle {
            return Ok(true);
        }

        let config = EngineConfig::from_config(&self.config, self.contract);

        let (engine, owned) = if self.use_isolated_context.load(Ordering::Relaxed) {
            match self.sandbox {
                Some(ref sandbox) if sandbox.is_destroyed() => {
                    drop(lifecycle);
                    return self
                        .fail::<()>(FaultRecord::new(Error::Sandbox(format!(
                            "context {} was destroyed",
                            sandbox.id()
                        ))))
                        .map(|_| false);
                }
                Some(ref sandbox) => (EngineHandle::Isolated(sandbox.clone()), false),
                None => (EngineHandle::Isolated(create_isolated_context(config)), true),
            }
        } else {
            (EngineHandle::Local(Arc::new(Engine::new(config))), false)
        };

        let setup = self
            .namespaces
            .lock()
            .iter()
            .try_for_each(|namespace| engine.add_namespace(namespace))
            .and_then(|_| {
                self.references
                    .lock()
                    .iter()
                    .try_for_each(|module| engine.add_referenced_module(module))
            });

        if let Err(err) = setup {
            if owned {
                if let EngineHandle::Isolated(ref sandbox) = engine {
                    sandbox.destroy();
                }
            }
            drop(lifecycle);
            return self.fail::<()>(FaultRecord::new(err)).map(|_| false);
        }

        info!(
            "{} host started{}",
            self.contract.name().green(),
            if owned { " in an isolated context" } else { "" }
        );

        *lifecycle = Lifecycle::Started { engine, owned };

        Ok(true)
    }

    /// Stop the host, releasing the engine and clearing the cache.
    pub fn stop(&self) -> bool {
        let mut cache = self.cache.lock();
        let mut lifecycle = self.lifecycle.write();

        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        cache.clear();

        match previous {
            Lifecycle::Started { engine, owned } => {
                if owned {
                    if let EngineHandle::Isolated(sandbox) = engine {
                        sandbox.destroy();
                    }
                }
                info!("{} host stopped", self.contract.name().yellow());
                true
            }
            _ => false,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.lifecycle.read(), Lifecycle::Started { .. })
    }

    pub fn set_throw_exceptions(&self, throw_exceptions: bool) {
        self.throw_exceptions
            .store(throw_exceptions, Ordering::Relaxed);
    }

    pub fn throw_exceptions(&self) -> bool {
        self.throw_exceptions.load(Ordering::Relaxed)
    }

    /// Run the engine in an isolated context. Takes effect on the next `start()`.
    pub fn set_use_isolated_context(&self, use_isolated_context: bool) {
        self.use_isolated_context
            .store(use_isolated_context, Ordering::Relaxed);
    }

    pub fn use_isolated_context(&self) -> bool {
        self.use_isolated_context.load(Ordering::Relaxed)
    }

    /// Import a namespace into templates compiled from now on.
    pub fn add_namespace(&self, namespace: &str) -> Result<(), FaultRecord> {
        self.namespaces.lock().push(namespace.to_string());
        self.forward(|engine| engine.add_namespace(namespace))
    }

    /// Reference a module in templates compiled from now on.
    pub fn add_referenced_module(&self, module: &str) -> Result<(), FaultRecord> {
        self.references.lock().push(module.to_string());
        self.forward(|engine| engine.add_referenced_module(module))
    }

    /// Reference the module defining `T`.
    pub fn add_referenced_module_from<T: ?Sized>(&self) -> Result<(), FaultRecord> {
        match module_of(std::any::type_name::<T>()) {
            Some(module) => self.add_referenced_module(&module),
            None => Ok(()),
        }
    }

    // Apply to the running engine, if there is one.
    fn forward(
        &self,
        f: impl FnOnce(&EngineHandle) -> Result<(), Error>,
    ) -> Result<(), FaultRecord> {
        let engine = match *self.lifecycle.read() {
            Lifecycle::Started { ref engine, .. } => engine.clone(),
            _ => return Ok(()),
        };

        match f(&engine) {
            Ok(()) => Ok(()),
            Err(err) => self.fail::<()>(FaultRecord::new(err)).map(|_| ()),
        }
    }

    /// The running engine.
    pub fn engine(&self) -> Result<EngineHandle, Error> {
        let engine = match *self.lifecycle.read() {
            Lifecycle::Started { ref engine, .. } => engine.clone(),
            _ => return Err(Error::NotStarted),
        };

        if engine.is_alive() {
            Ok(engine)
        } else {
            // Units died with the context.
            self.cache.lock().clear();
            Err(Error::Sandbox("isolated context was destroyed".into()))
        }
    }

    /// Render a unit compiled earlier, by id.
    pub fn render_template_from_unit(
        &self,
        unit_id: &str,
        model: &Model,
        writer: Option<&mut dyn Write>,
    ) -> Result<Option<String>, FaultRecord> {
        self.reset_errors();

        let engine = match self.engine() {
            Ok(engine) => engine,
            Err(err) => return self.fail(FaultRecord::new(err)),
        };

        match engine.render(unit_id, model, writer, None) {
            Ok(output) => Ok(Some(output)),
            Err(err) => {
                let record = self.engine_fault(&engine, err);
                self.fail(record)
            }
        }
    }

    /// Message of the last failure.
    pub fn error_message(&self) -> Option<String> {
        self.errors.lock().error_message.clone()
    }

    pub fn last_fault(&self) -> Option<FaultRecord> {
        self.errors.lock().last_fault.clone()
    }

    /// Per-request configuration of the running engine.
    pub fn request_config(&self) -> Option<RequestConfig> {
        self.engine().ok()?.request_config().ok()?
    }

    /// All cache entries.
    pub fn compiled_units(&self) -> Vec<Arc<CacheEntry>> {
        self.cache.lock().values().cloned().collect()
    }

    pub fn cached(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.cache.lock().get(key).cloned()
    }

    /// HTML page describing the last failure.
    pub fn render_html_error_page(&self, title: Option<&str>) -> String {
        let errors = self.errors.lock();
        let title = html_encode(title.unwrap_or("Template Rendering Error"));
        let message = html_encode(errors.error_message.as_deref().unwrap_or(""));
        let fault = errors.last_fault.as_ref();
        let template = fault
            .and_then(|fault| fault.active_template.as_deref().map(|name| (fault, name)))
            .map(|(fault, name)| {
                let file = fault
                    .request_config
                    .as_ref()
                    .map(|config| config.template_path.as_str())
                    .filter(|path| !path.is_empty());

                match file {
                    Some(file) => format!(
                        "<p>Source template: <a href=\"file://{}\">{}</a></p>\n",
                        html_encode(file),
                        html_encode(name)
                    ),
                    None => format!("<p>Source template: {}</p>\n", html_encode(name)),
                }
            })
            .unwrap_or_default();
        let source = fault
            .and_then(|fault| fault.generated_source.as_deref())
            .map(|source| format!("<h3>Generated source</h3>\n<pre>{}</pre>\n", html_encode(source)))
            .unwrap_or_default();

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<pre>{message}</pre>\n{template}{source}</body>\n</html>\n"
        )
    }

    pub(crate) fn reset_errors(&self) {
        *self.errors.lock() = Errors::default();
    }

    /// Record the failure, then return it or swallow it.
    pub(crate) fn fail<T>(&self, record: FaultRecord) -> Result<Option<T>, FaultRecord> {
        warn!("{}", record.message.red());

        {
            let mut errors = self.errors.lock();
            errors.error_message = Some(record.message.clone());
            errors.last_fault = Some(record.clone());
        }

        if self.throw_exceptions() {
            Err(record)
        } else {
            Ok(None)
        }
    }

    /// Fault record for an engine failure, with the engine's generated source.
    pub(crate) fn engine_fault(&self, engine: &EngineHandle, err: Error) -> FaultRecord {
        let state = engine.state();
        FaultRecord::new(err).generated_source(state.last_generated_source)
    }

    pub(crate) fn cache_lookup(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = self.cache.lock().get(key).cloned();
        if entry.is_some() {
            debug!("cache hit {}", key);
        }
        entry
    }

    /// Store or replace a cache entry.
    pub(crate) fn cache_store(&self, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        self.cache.lock().insert(entry.key.clone(), entry.clone());
        entry
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn host() -> HostCore {
        HostCore::new(Config::default(), BaseContract::Template)
    }

    #[test]
    fn test_lifecycle() -> Result<(), FaultRecord> {
        let host = host();
        assert!(!host.is_started());
        assert!(matches!(host.engine(), Err(Error::NotStarted)));

        assert!(host.start()?);
        assert!(host.start()?);
        assert!(host.is_started());

        assert!(host.stop());
        assert!(!host.stop());
        assert!(matches!(host.engine(), Err(Error::NotStarted)));

        // Restart with a fresh engine.
        assert!(host.start()?);
        assert!(host.engine().is_ok());

        Ok(())
    }

    #[test]
    fn test_fail_modes() {
        let host = host();
        let result = host.render_template_from_unit("_missing", &Model::None, None);

        assert_eq!(result, Ok(None));
        assert_eq!(host.error_message().as_deref(), Some("host container is not started"));

        host.set_throw_exceptions(true);
        let result = host.render_template_from_unit("_missing", &Model::None, None);
        assert!(matches!(result, Err(FaultRecord { fault: Some(Error::NotStarted), .. })));
    }

    #[test]
    fn test_hash_key() {
        assert_eq!(hash_key("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_error_page() {
        let host = host();
        let _ = host.fail::<String>(
            FaultRecord::new(Error::Execution("<bad>".into()))
                .generated_source(Some("struct _page".into())),
        );

        let page = host.render_html_error_page(None);
        assert!(page.contains("<pre>&lt;bad&gt;</pre>"));
        assert!(page.contains("struct _page"));
        assert!(!page.contains("Source template"));
    }

    #[test]
    fn test_error_page_source_template() {
        let host = host();
        let _ = host.fail::<String>(
            FaultRecord::new(Error::Execution("bad".into())).active_template("a&b.html"),
        );
        assert!(host
            .render_html_error_page(None)
            .contains("<p>Source template: a&amp;b.html</p>"));

        let _ = host.fail::<String>(
            FaultRecord::new(Error::Execution("bad".into()))
                .active_template("index.html")
                .request_config(Some(RequestConfig {
                    template_path: "/srv/templates/index.html".into(),
                    ..Default::default()
                })),
        );
        assert!(host.render_html_error_page(None).contains(
            r#"<p>Source template: <a href="file:///srv/templates/index.html">index.html</a></p>"#
        ));
    }
}
