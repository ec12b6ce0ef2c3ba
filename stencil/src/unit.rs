//! Compiled templates.
//!
//! A [`TemplateUnit`] is what the engine registers after a successful compile:
//! the loadable [`Module`], the generated source listing kept for diagnostics,
//! and when it was created. Units are immutable, recompiling a template produces
//! a new unit with a new id.
use crate::template::Program;
use crate::Error;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use std::fs::{create_dir_all, read_to_string, write};
use std::path::{Path, PathBuf};

/// Extension of module images written to disk.
pub const MODULE_EXTENSION: &str = "stencil";

/// Generate a unique unit id, e.g. `_5f0c6e0f0b5a4a3e9d3c1e2f4b6a8c0d`.
pub fn unique_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

/// Executable type inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryType {
    pub namespace: String,
    pub name: String,
    /// Base contract the type implements, e.g. `stencil::TemplateBase`.
    pub base_type: String,
    /// Model type the template declared, if any.
    pub model_type: Option<String>,
    pub imports: Vec<String>,
    pub program: Program,
}

impl EntryType {
    /// `namespace::name`
    pub fn full_name(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }
}

/// Selects an entry type other than the default one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySelector {
    pub namespace: String,
    pub name: String,
}

impl EntrySelector {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Loadable module produced by the code generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    /// Image on disk, if the module wasn't compiled to memory.
    #[serde(skip)]
    pub path: Option<PathBuf>,
    pub entries: Vec<EntryType>,
}

impl Module {
    pub fn new(id: impl ToString, entries: Vec<EntryType>) -> Self {
        Self {
            id: id.to_string(),
            path: None,
            entries,
        }
    }

    /// Find the entry type. Without a selector, that's the first one.
    pub fn entry(&self, selector: Option<&EntrySelector>) -> Option<&EntryType> {
        match selector {
            None => self.entries.first(),
            Some(selector) => self
                .entries
                .iter()
                .find(|entry| entry.namespace == selector.namespace && entry.name == selector.name),
        }
    }

    /// Write the module image to `<directory>/<id>.stencil`.
    pub fn persist(&self, directory: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let directory = directory.as_ref();
        create_dir_all(directory)?;

        let path = directory.join(format!("{}.{}", self.id, MODULE_EXTENSION));
        write(&path, serde_json::to_vec(self)?)?;

        debug!("module image written to \"{}\"", path.display());

        Ok(path)
    }

    /// Load a module image from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut module: Module = serde_json::from_str(&read_to_string(path)?)
            .map_err(|err| Error::TypeActivation(format!("{}: {}", path.display(), err)))?;
        module.path = Some(path.to_owned());

        Ok(module)
    }
}

/// A compiled template registered with the engine.
#[derive(Debug, Clone)]
pub struct TemplateUnit {
    pub id: String,
    pub module: Module,
    pub generated_source: String,
    pub created_at: OffsetDateTime,
}

impl TemplateUnit {
    pub fn new(module: Module, generated_source: String) -> Self {
        Self {
            id: module.id.clone(),
            module,
            generated_source,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn entry(name: &str) -> Result<EntryType, crate::template::Error> {
        Ok(EntryType {
            namespace: "__stencil".into(),
            name: name.into(),
            base_type: "stencil::TemplateBase".into(),
            model_type: None,
            imports: vec![],
            program: Program::from_str("Hello <%= 1 + 1 %>")?,
        })
    }

    #[test]
    fn test_entry_selection() -> Result<(), crate::template::Error> {
        let module = Module::new(unique_id(), vec![entry("_first")?, entry("_second")?]);

        assert_eq!(module.entry(None).map(|e| e.name.as_str()), Some("_first"));
        assert_eq!(
            module
                .entry(Some(&EntrySelector::new("__stencil", "_second")))
                .map(|e| e.full_name()),
            Some("__stencil::_second".to_string())
        );
        assert!(module
            .entry(Some(&EntrySelector::new("other", "_second")))
            .is_none());

        Ok(())
    }

    #[test]
    fn test_persist_and_load() {
        let dir = TempDir::new("stencil-modules").unwrap();
        let module = Module::new(unique_id(), vec![entry("_page").unwrap()]);

        let path = module.persist(dir.path()).unwrap();
        assert!(path.ends_with(format!("{}.stencil", module.id)));

        let loaded = Module::load(&path).unwrap();
        assert_eq!(loaded.id, module.id);
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));

        let output = loaded
            .entry(None)
            .unwrap()
            .program
            .evaluate(&Default::default())
            .unwrap();
        assert_eq!(output, "Hello 2");
    }

    #[test]
    fn test_unique_ids() {
        assert_ne!(unique_id(), unique_id());
        assert!(unique_id().starts_with('_'));
    }
}
