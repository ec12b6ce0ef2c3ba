//! Types needed to host and render templates.
//!
//! ```
//! use stencil::prelude::*;
//! ```
pub use crate::compiler::BaseContract;
pub use crate::config::Config;
pub use crate::engine::{CompileRequest, Engine, EngineConfig, RequestConfig};
pub use crate::error::Error;
pub use crate::fault::{FaultRecord, RenderLayer};
pub use crate::host::{FolderHost, HostCore, StringHost};
pub use crate::logging::Logger;
pub use crate::model::{Model, PropertyBag};
pub use crate::sandbox::{create_isolated_context, SandboxHandle};
pub use crate::template::Value;

pub use serde::{Deserialize, Serialize};
pub use time::OffsetDateTime;
