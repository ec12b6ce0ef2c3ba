//! Host for templates stored in a folder.
//!
//! Paths are relative to the template folder, `~/` included, e.g.
//! `~/pages/index.html`. A cached unit is reused only while the file hasn't
//! been modified since it was compiled.
//!
//! Pages can use a layout:
//!
//! ```html
//! <% layout("layout.html") %>
//! <h1><%= Model.title %></h1>
//! ```
//!
//! The layout is rendered after the page, with the same model, and its
//! `render_body()` marker is replaced with the page output. Layouts don't get
//! layouts of their own.
//!
//! The modification time has the resolution of the filesystem: a file
//! rewritten within the same tick it was compiled in is not noticed.
use super::{hash_key, CacheEntry, EngineHandle, HostCore};
use crate::compiler::BaseContract;
use crate::config::{get_config, Config};
use crate::engine::{CompileRequest, RenderCallback, RequestConfig, BODY_MARKER};
use crate::fault::{FaultRecord, RenderLayer};
use crate::model::Model;
use crate::sandbox::SandboxHandle;
use crate::Error;

use time::OffsetDateTime;
use tracing::{debug, info};

use std::fs::{metadata, read_to_string};
use std::io::Write;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct FolderHost {
    core: HostCore,
    template_path: PathBuf,
    extension: String,
}

impl Default for FolderHost {
    fn default() -> Self {
        Self::new(get_config().clone())
    }
}

impl Deref for FolderHost {
    type Target = HostCore;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Page,
    Layout,
    Partial,
}

impl Kind {
    fn layer(&self) -> RenderLayer {
        match self {
            Kind::Page => RenderLayer::Content,
            Kind::Layout => RenderLayer::Layout,
            Kind::Partial => RenderLayer::Partial,
        }
    }
}

// Partials call back into the host that's rendering the page.
struct FolderCallback<'a> {
    host: &'a FolderHost,
}

impl RenderCallback for FolderCallback<'_> {
    fn render_partial(&self, path: &str, model: &Model) -> Result<String, Error> {
        self.host.render_partial(path, model)
    }
}

impl FolderHost {
    pub fn new(config: Config) -> Self {
        let template_path = absolute(&config.folder.template_path);
        let extension = config.folder.extension.clone();

        Self {
            core: HostCore::new(config, BaseContract::FolderTemplate),
            template_path,
            extension,
        }
    }

    /// Host rendering templates from this folder.
    pub fn with_folder(config: Config, template_path: impl AsRef<Path>) -> Self {
        let mut host = Self::new(config);
        host.template_path = absolute(template_path.as_ref());
        host
    }

    /// Host running its engine in a context shared with others.
    pub fn with_sandbox(mut self, sandbox: SandboxHandle) -> Self {
        self.core = self.core.with_sandbox(sandbox);
        self
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Absolute path of a template. `.` and `..` are resolved without
    /// touching the filesystem, and `..` never leaves the template folder.
    pub fn resolve_path(&self, relative_path: &str) -> PathBuf {
        let relative = relative_path
            .trim()
            .trim_start_matches("~/")
            .trim_start_matches('~')
            .trim_start_matches(['/', '\\']);

        let mut path = self.template_path.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::ParentDir if path != self.template_path => {
                    path.pop();
                }
                _ => (),
            }
        }

        path
    }

    /// Cache entry of the template, if it was compiled.
    pub fn cached_unit(&self, relative_path: &str) -> Option<Arc<CacheEntry>> {
        self.cached(&hash_key(&self.resolve_path(relative_path).to_string_lossy()))
    }

    /// Compile the template, or find it in the cache. Returns the unit id.
    pub fn compile_template(&self, relative_path: &str) -> Result<Option<String>, FaultRecord> {
        self.reset_errors();

        let result = self
            .engine()
            .map_err(|err| FaultRecord::new(err).active_template(relative_path))
            .and_then(|engine| self.resolve(&engine, relative_path));

        match result {
            Ok(unit_id) => Ok(Some(unit_id)),
            Err(record) => self.fail(record),
        }
    }

    /// Render the template, and its layout if it sets one.
    ///
    /// With a writer, the output is written to it and the result is an empty string.
    pub fn render_template(
        &self,
        relative_path: &str,
        model: &Model,
        writer: Option<&mut dyn Write>,
    ) -> Result<Option<String>, FaultRecord> {
        self.reset_errors();

        let result = self.render(relative_path, model, Kind::Page);

        let output = match (result, writer) {
            (Ok(output), None) => return Ok(Some(output)),
            (Ok(output), Some(writer)) => writer
                .write_all(output.as_bytes())
                .and_then(|_| writer.flush())
                .map(|_| String::new())
                .map_err(|err| FaultRecord::new(Error::from(err)).active_template(relative_path)),
            (Err(record), Some(writer)) => {
                let _ = writer.flush();
                Err(record)
            }
            (Err(record), None) => Err(record),
        };

        match output {
            Ok(output) => Ok(Some(output)),
            Err(record) => self.fail(record),
        }
    }

    /// Render a partial template, adding the default extension if the path
    /// doesn't have one. Partials never get layouts.
    pub fn render_partial(&self, relative_path: &str, model: &Model) -> Result<String, Error> {
        let path = if Path::new(relative_path).extension().is_none() {
            format!("{}.{}", relative_path, self.extension)
        } else {
            relative_path.to_string()
        };

        self.render(&path, model, Kind::Partial)
            .map_err(|record| Error::Execution(record.message))
    }

    fn render(&self, relative_path: &str, model: &Model, kind: Kind) -> Result<String, FaultRecord> {
        let engine = self
            .engine()
            .map_err(|err| FaultRecord::new(err).active_template(relative_path))?;

        let file = self.resolve_path(relative_path);

        let previous = engine
            .request_config()
            .map_err(|err| FaultRecord::new(err).active_template(relative_path))?;

        let config = RequestConfig {
            template_path: file.display().to_string(),
            relative_path: relative_path.to_string(),
            layout: None,
            is_layout: kind == Kind::Layout,
            data: previous
                .as_ref()
                .map(|config| config.data.clone())
                .unwrap_or_default(),
        };

        let result = engine
            .set_request_config(Some(config))
            .map_err(FaultRecord::new)
            .and_then(|_| self.render_layers(&engine, relative_path, model, kind));

        // The caller's configuration comes back no matter what happened.
        let restored = engine.set_request_config(previous);

        match (result, restored) {
            (Ok(output), Ok(_)) => Ok(output),
            (Ok(_), Err(err)) => Err(FaultRecord::new(err).active_template(relative_path)),
            (Err(record), _) => Err(record),
        }
    }

    fn render_layers(
        &self,
        engine: &EngineHandle,
        relative_path: &str,
        model: &Model,
        kind: Kind,
    ) -> Result<String, FaultRecord> {
        let callback = FolderCallback { host: self };

        let output = self
            .resolve(engine, relative_path)
            .and_then(|unit_id| {
                engine
                    .render(&unit_id, model, None, Some(&callback))
                    .map_err(|err| self.engine_fault(engine, err))
            })
            .map_err(|record| {
                let message = format!("Failed to render Page {}: {}", relative_path, record.message);
                record
                    .message(message)
                    .active_template(relative_path)
                    .request_config(engine.request_config().ok().flatten())
                    .layer(kind.layer())
            })?;

        if kind != Kind::Page {
            return Ok(output);
        }

        let layout = match engine.request_config().ok().flatten().and_then(|c| c.layout) {
            Some(layout) => layout,
            None => return Ok(output),
        };

        self.remember_layout(relative_path, &layout);

        let layout_output = self.render(&layout, model, Kind::Layout).map_err(|record| {
            let message = format!("Failed to render Layout Page {}: {}", layout, record.message);
            record.message(message).layer(RenderLayer::Layout)
        })?;

        debug!("{} rendered with layout {}", relative_path, layout);

        Ok(layout_output.replace(BODY_MARKER, &output))
    }

    // Cached unit id, compiling when the file changed or was never compiled.
    fn resolve(&self, engine: &EngineHandle, relative_path: &str) -> Result<String, FaultRecord> {
        let file = self.resolve_path(relative_path);
        let key = hash_key(&file.to_string_lossy());

        let modified = match metadata(&file).and_then(|metadata| metadata.modified()) {
            Ok(modified) => OffsetDateTime::from(modified),
            Err(_) => {
                return Err(FaultRecord::new(Error::TemplateNotFound(
                    file.display().to_string(),
                ))
                .active_template(relative_path))
            }
        };

        if let Some(entry) = self.cache_lookup(&key) {
            if modified <= entry.compiled_at {
                return Ok(entry.unit_id.clone());
            }

            info!("{} changed, recompiling", relative_path);
        }

        let source = read_to_string(&file)
            .map_err(|err| FaultRecord::new(Error::from(err)).active_template(relative_path))?;

        let request = CompileRequest {
            class_name: file.file_stem().map(|stem| stem.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let unit_id = engine
            .compile(&source, request)
            .map_err(|err| self.engine_fault(engine, err).active_template(relative_path))?;

        self.cache_store(CacheEntry {
            key,
            unit_id: unit_id.clone(),
            compiled_at: OffsetDateTime::now_utc(),
            file: Some(file),
            layout: None,
        });

        Ok(unit_id)
    }

    // Cache entries are immutable, so replace it with one naming the layout.
    fn remember_layout(&self, relative_path: &str, layout: &str) {
        let key = hash_key(&self.resolve_path(relative_path).to_string_lossy());

        if let Some(entry) = self.cached(&key) {
            if entry.layout.as_deref() != Some(layout) {
                self.cache_store(CacheEntry {
                    layout: Some(layout.to_string()),
                    ..entry.as_ref().clone()
                });
            }
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_owned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let host = FolderHost::with_folder(Config::default(), "/srv/templates");

        assert_eq!(
            host.resolve_path("~/pages/index.html"),
            PathBuf::from("/srv/templates/pages/index.html")
        );
        assert_eq!(
            host.resolve_path("index.html"),
            PathBuf::from("/srv/templates/index.html")
        );
        assert_eq!(
            host.resolve_path("/index.html"),
            PathBuf::from("/srv/templates/index.html")
        );
    }

    #[test]
    fn test_resolve_path_dots() {
        let host = FolderHost::with_folder(Config::default(), "/srv/templates");

        assert_eq!(
            host.resolve_path("pages/../index.html"),
            PathBuf::from("/srv/templates/index.html")
        );
        assert_eq!(
            host.resolve_path("./pages/./index.html"),
            PathBuf::from("/srv/templates/pages/index.html")
        );
        assert_eq!(
            host.resolve_path("../../etc/index.html"),
            PathBuf::from("/srv/templates/etc/index.html")
        );
    }
}
