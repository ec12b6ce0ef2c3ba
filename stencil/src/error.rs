//! Global error type.
//!
//! Every variant carries plain strings, so errors can be serialized and
//! returned from an isolated context the same way they are returned locally.
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The template compiler rejected the template grammar.
    #[error("template parse error: {0}")]
    Parse(String),

    /// The code generation backend reported one or more diagnostics.
    #[error("template build failed:\n{0}")]
    Build(String),

    /// No unit with this id is registered with the engine.
    #[error("template unit \"{0}\" is not registered")]
    UnitNotFound(String),

    /// The model can't be copied into an isolated context.
    #[error("model can't be marshaled across the isolation boundary: {0}")]
    ModelMarshaling(String),

    /// File-backed template doesn't exist.
    #[error("template file doesn't exist: {0}")]
    TemplateNotFound(String),

    /// The template raised an error while running.
    #[error("{0}")]
    Execution(String),

    /// The entry type can't be instantiated or doesn't satisfy the base contract.
    #[error("template type activation failed: {0}")]
    TypeActivation(String),

    #[error("host container is not started")]
    NotStarted,

    #[error("io error: {0}")]
    Io(String),

    #[error("isolated context: {0}")]
    Sandbox(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Sandbox(err.to_string())
    }
}

impl Error {
    /// Short name of the fault kind, used in logs and error pages.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Parse(_) => "ParseFault",
            Error::Build(_) => "BuildFault",
            Error::UnitNotFound(_) => "UnitNotFound",
            Error::ModelMarshaling(_) => "ModelMarshalingError",
            Error::TemplateNotFound(_) => "TemplateNotFound",
            Error::Execution(_) => "ExecutionFault",
            Error::TypeActivation(_) => "TypeActivationFault",
            Error::NotStarted => "NotStarted",
            Error::Io(_) => "IoError",
            Error::Sandbox(_) => "SandboxError",
        }
    }
}
