//! Configuration for hosts and engines.
//!
//! Loaded from `stencil.toml` in the working directory if one exists,
//! otherwise defaults are used. A few settings can be overridden with
//! `STENCIL_*` environment variables.
//!
//! ```toml
//! [general]
//! throw_exceptions = true
//!
//! [compiler]
//! compile_to_memory = false
//! temp_module_path = "/tmp/stencil"
//!
//! [folder]
//! template_path = "templates"
//! extension = "html"
//! ```
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env::var;
use std::fs::read_to_string;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Error, Debug)]
pub enum Error {
    #[error("config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config file not found")]
    Io(#[from] std::io::Error),

    #[error("config not found")]
    NoConfig,
}

/// Global configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub compiler: Compiler,
    #[serde(default)]
    pub folder: Folder,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct General {
    /// Raise a [`crate::FaultRecord`] instead of returning `None`.
    #[serde(default)]
    pub throw_exceptions: bool,
    /// Run the engine inside an isolated context owned by the host.
    #[serde(default)]
    pub use_isolated_context: bool,
    #[serde(skip, default = "General::default_tty")]
    pub tty: bool,
}

impl General {
    fn default_tty() -> bool {
        std::io::stderr().is_terminal()
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            throw_exceptions: false,
            use_isolated_context: false,
            tty: General::default_tty(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Compiler {
    /// Keep compiled modules in memory only. When disabled, module images
    /// are written to `temp_module_path` and loaded back from disk.
    #[serde(default = "Compiler::default_compile_to_memory")]
    pub compile_to_memory: bool,
    #[serde(default = "Compiler::default_temp_module_path")]
    pub temp_module_path: PathBuf,
    /// Namespace generated template types are placed in.
    #[serde(default = "Compiler::default_namespace")]
    pub namespace: String,
    /// Namespaces imported into every template.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Modules every template may reference.
    #[serde(default)]
    pub references: Vec<String>,
}

impl Compiler {
    fn default_compile_to_memory() -> bool {
        true
    }

    fn default_temp_module_path() -> PathBuf {
        std::env::temp_dir().join("stencil")
    }

    fn default_namespace() -> String {
        "__stencil".into()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            compile_to_memory: Compiler::default_compile_to_memory(),
            temp_module_path: Compiler::default_temp_module_path(),
            namespace: Compiler::default_namespace(),
            namespaces: vec![],
            references: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Folder {
    /// Root directory relative template paths are resolved against.
    #[serde(default = "Folder::default_template_path")]
    pub template_path: PathBuf,
    /// Extension added to partial paths that don't have one.
    #[serde(default = "Folder::default_extension")]
    pub extension: String,
}

impl Folder {
    fn default_template_path() -> PathBuf {
        PathBuf::from("templates")
    }

    fn default_extension() -> String {
        "html".into()
    }
}

impl Default for Folder {
    fn default() -> Self {
        Self {
            template_path: Folder::default_template_path(),
            extension: Folder::default_extension(),
        }
    }
}

impl Config {
    /// Load configuration from `stencil.toml` in the current directory.
    pub fn load() -> Result<Config, Error> {
        for name in ["stencil.toml", "Stencil.toml"] {
            let path = PathBuf::from(name);
            if path.exists() {
                return Config::load_from(&path);
            }
        }

        Err(Error::NoConfig)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, Error> {
        let file = read_to_string(path.as_ref())?;
        let mut config = Config::from_toml(&file)?;
        config.path = Some(path.as_ref().to_owned());

        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Config, Error> {
        let config: Config = toml::from_str(text)?;
        Ok(config.from_env())
    }

    /// Apply `STENCIL_*` environment overrides.
    pub fn from_env(mut self) -> Self {
        if let Ok(path) = var("STENCIL_TEMPLATE_PATH") {
            self.folder.template_path = PathBuf::from(path);
        }

        if let Ok(path) = var("STENCIL_TEMP_MODULE_PATH") {
            self.compiler.temp_module_path = PathBuf::from(path);
        }

        if var("STENCIL_THROW_EXCEPTIONS").is_ok() {
            self.general.throw_exceptions = true;
        }

        self
    }

    /// Path the configuration was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log_info(&self) {
        match self.path {
            Some(ref path) => info!("Configuration loaded from \"{}\"", path.display()),
            None => info!("Configuration file not found, using defaults"),
        }
    }

    pub fn get() -> &'static Config {
        get_config()
    }
}

pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load()
            .unwrap_or_else(|_| Config::default().from_env())
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_defaults() -> Result<(), Error> {
        let config = Config::from_toml("")?;

        assert!(config.compiler.compile_to_memory);
        assert_eq!(config.compiler.namespace, "__stencil");
        assert_eq!(config.folder.extension, "html");
        assert!(config.path().is_none());

        Ok(())
    }

    #[test]
    fn test_config_sections() -> Result<(), Error> {
        let config = Config::from_toml(
            r#"
[general]
use_isolated_context = true

[compiler]
compile_to_memory = false
temp_module_path = "/tmp/stencil-test"
namespaces = ["reports"]

[folder]
extension = "tpl"
"#,
        )?;

        assert!(config.general.use_isolated_context);
        assert!(!config.compiler.compile_to_memory);
        assert_eq!(
            config.compiler.temp_module_path,
            PathBuf::from("/tmp/stencil-test")
        );
        assert_eq!(config.compiler.namespaces, vec!["reports".to_string()]);
        assert_eq!(config.folder.extension, "tpl");
        assert_eq!(config.folder.template_path, PathBuf::from("templates"));

        Ok(())
    }
}
