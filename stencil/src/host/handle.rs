use crate::engine::{
    CompileRequest, Engine, EngineState, Invocation, RenderCallback, RequestConfig,
};
use crate::model::Model;
use crate::sandbox::SandboxHandle;
use crate::Error;

use std::io::Write;
use std::sync::Arc;

/// The engine a host talks to, local or behind an isolation boundary.
#[derive(Debug, Clone)]
pub enum EngineHandle {
    Local(Arc<Engine>),
    Isolated(SandboxHandle),
}

impl EngineHandle {
    pub fn compile(&self, source: &str, request: CompileRequest) -> Result<String, Error> {
        match self {
            EngineHandle::Local(engine) => Ok(engine.compile(source, &request)?.id.clone()),
            EngineHandle::Isolated(sandbox) => sandbox.compile(source, request),
        }
    }

    pub fn render<'a>(
        &self,
        unit_id: &str,
        model: &Model,
        writer: Option<&'a mut dyn Write>,
        callback: Option<&'a dyn RenderCallback>,
    ) -> Result<String, Error> {
        match self {
            EngineHandle::Local(engine) => engine.render_entry(
                unit_id,
                model,
                Invocation {
                    writer,
                    entry: None,
                    callback,
                },
            ),
            EngineHandle::Isolated(sandbox) => {
                sandbox.render(unit_id, model, None, writer, callback)
            }
        }
    }

    pub fn add_namespace(&self, namespace: &str) -> Result<(), Error> {
        match self {
            EngineHandle::Local(engine) => {
                engine.add_namespace(namespace);
                Ok(())
            }
            EngineHandle::Isolated(sandbox) => sandbox.add_namespace(namespace),
        }
    }

    pub fn add_referenced_module(&self, module: &str) -> Result<(), Error> {
        match self {
            EngineHandle::Local(engine) => {
                engine.add_referenced_module(module);
                Ok(())
            }
            EngineHandle::Isolated(sandbox) => sandbox.add_referenced_module(module),
        }
    }

    pub fn set_request_config(
        &self,
        config: Option<RequestConfig>,
    ) -> Result<Option<RequestConfig>, Error> {
        match self {
            EngineHandle::Local(engine) => Ok(engine.set_request_config(config)),
            EngineHandle::Isolated(sandbox) => sandbox.set_request_config(config),
        }
    }

    pub fn request_config(&self) -> Result<Option<RequestConfig>, Error> {
        match self {
            EngineHandle::Local(engine) => Ok(engine.request_config()),
            EngineHandle::Isolated(sandbox) => sandbox.request_config(),
        }
    }

    /// Error state of the last engine call.
    pub fn state(&self) -> EngineState {
        match self {
            EngineHandle::Local(engine) => engine.state(),
            EngineHandle::Isolated(sandbox) => sandbox.state().unwrap_or_default(),
        }
    }

    pub fn has_unit(&self, unit_id: &str) -> bool {
        match self {
            EngineHandle::Local(engine) => engine.unit(unit_id).is_some(),
            EngineHandle::Isolated(sandbox) => sandbox.has_unit(unit_id).unwrap_or(false),
        }
    }

    /// False once the isolated context behind the handle is destroyed.
    pub fn is_alive(&self) -> bool {
        match self {
            EngineHandle::Local(_) => true,
            EngineHandle::Isolated(sandbox) => !sandbox.is_destroyed(),
        }
    }
}
