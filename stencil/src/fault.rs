//! Fault records raised by host containers.
//!
//! A record carries everything needed to diagnose a failed render without
//! a debugger: the generated source of the unit, the underlying fault, the
//! template that was active and the per-request configuration at the time.
use crate::engine::RequestConfig;
use crate::Error;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which layer of a composed render failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderLayer {
    Content,
    Layout,
    Partial,
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct FaultRecord {
    pub message: String,
    pub generated_source: Option<String>,
    #[source]
    pub fault: Option<Error>,
    pub active_template: Option<String>,
    pub request_config: Option<RequestConfig>,
    pub layer: Option<RenderLayer>,
}

impl FaultRecord {
    pub fn new(fault: Error) -> Self {
        Self {
            message: fault.to_string(),
            generated_source: None,
            fault: Some(fault),
            active_template: None,
            request_config: None,
            layer: None,
        }
    }

    pub fn message(mut self, message: impl ToString) -> Self {
        self.message = message.to_string();
        self
    }

    pub fn generated_source(mut self, generated_source: Option<String>) -> Self {
        if generated_source.is_some() {
            self.generated_source = generated_source;
        }
        self
    }

    pub fn active_template(mut self, template: impl ToString) -> Self {
        self.active_template = Some(template.to_string());
        self
    }

    pub fn request_config(mut self, config: Option<RequestConfig>) -> Self {
        self.request_config = config;
        self
    }

    pub fn layer(mut self, layer: RenderLayer) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Fault kind, e.g. `ExecutionFault`.
    pub fn kind(&self) -> Option<&'static str> {
        self.fault.as_ref().map(|fault| fault.kind())
    }
}

impl From<Error> for FaultRecord {
    fn from(fault: Error) -> Self {
        FaultRecord::new(fault)
    }
}
