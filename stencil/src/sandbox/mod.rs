//! Isolated execution context.
//!
//! An isolated context hosts one [`Engine`] and every unit compiled by it.
//! Callers reach the engine only through a [`SandboxHandle`], which serializes
//! each request and response. Destroying the context drops the engine and all
//! of its units at once; nothing else can unload them.
//!
//! Isolation here is about resource lifecycle, not about running hostile code.
use crate::colors::MaybeColorize;
use crate::engine::{
    CompileRequest, Engine, EngineConfig, EngineState, Invocation, RenderCallback, RequestConfig,
    panic_message,
};
use crate::model::Model;
use crate::unit::EntrySelector;
use crate::Error;

use parking_lot::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

pub mod protocol;

pub use protocol::{decode, encode, Request, Response};

#[derive(Debug)]
struct Inner {
    id: Uuid,
    engine: RwLock<Option<Arc<Engine>>>,
}

/// Handle to an isolated context. Cloning the handle shares the context.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    inner: Arc<Inner>,
}

/// Create an isolated context running an engine with this configuration.
///
/// The context lives until [`SandboxHandle::destroy`] is called.
pub fn create_isolated_context(config: EngineConfig) -> SandboxHandle {
    let id = Uuid::new_v4();
    info!("isolated context {} created", id.to_string().green());

    SandboxHandle {
        inner: Arc::new(Inner {
            id,
            engine: RwLock::new(Some(Arc::new(Engine::new(config)))),
        }),
    }
}

impl SandboxHandle {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Tear down the context, releasing the engine and every unit it compiled.
    ///
    /// Calls already in progress finish first.
    pub fn destroy(&self) -> bool {
        let engine = self.inner.engine.write().take();
        if engine.is_some() {
            info!("isolated context {} destroyed", self.inner.id.to_string().yellow());
        }
        engine.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.engine.read().is_none()
    }

    /// Send a request to the engine inside the context.
    pub fn call<'a>(
        &self,
        request: &Request,
        writer: Option<&'a mut dyn Write>,
        callback: Option<&'a dyn RenderCallback>,
    ) -> Result<Response, Error> {
        let engine = self
            .inner
            .engine
            .read()
            .clone()
            .ok_or_else(|| Error::Sandbox(format!("context {} was destroyed", self.inner.id)))?;

        let request = encode(request)?;

        let response = catch_unwind(AssertUnwindSafe(|| {
            dispatch(&engine, &request, writer, callback)
        }))
        .unwrap_or_else(|panic| {
            let message = panic_message(panic);
            warn!("isolated context {} recovered from panic: {}", self.inner.id, message);
            Response::Fault(Error::Execution(message))
        });

        decode(&encode(&response)?)
    }

    pub fn compile(&self, source: &str, request: CompileRequest) -> Result<String, Error> {
        let request = Request::Compile {
            source: source.to_string(),
            request,
        };

        match self.call(&request, None, None)? {
            Response::UnitId(id) => Ok(id),
            response => unexpected(response),
        }
    }

    pub fn render_template(
        &self,
        source: &str,
        model: &Model,
        writer: Option<&mut dyn Write>,
    ) -> Result<String, Error> {
        let request = Request::RenderSource {
            source: source.to_string(),
            model: model.to_wire()?,
        };

        match self.call(&request, writer, None)? {
            Response::Output(output) => Ok(output),
            response => unexpected(response),
        }
    }

    pub fn render<'a>(
        &self,
        unit_id: &str,
        model: &Model,
        entry: Option<EntrySelector>,
        writer: Option<&'a mut dyn Write>,
        callback: Option<&'a dyn RenderCallback>,
    ) -> Result<String, Error> {
        let request = Request::Render {
            unit_id: unit_id.to_string(),
            model: model.to_wire()?,
            entry,
        };

        match self.call(&request, writer, callback)? {
            Response::Output(output) => Ok(output),
            response => unexpected(response),
        }
    }

    pub fn add_namespace(&self, namespace: &str) -> Result<(), Error> {
        self.done(&Request::AddNamespace(namespace.to_string()))
    }

    pub fn add_referenced_module(&self, module: &str) -> Result<(), Error> {
        self.done(&Request::AddReference(module.to_string()))
    }

    pub fn set_request_config(
        &self,
        config: Option<RequestConfig>,
    ) -> Result<Option<RequestConfig>, Error> {
        match self.call(&Request::SetRequestConfig(config), None, None)? {
            Response::RequestConfig(previous) => Ok(previous),
            response => unexpected(response),
        }
    }

    pub fn request_config(&self) -> Result<Option<RequestConfig>, Error> {
        match self.call(&Request::RequestConfig, None, None)? {
            Response::RequestConfig(config) => Ok(config),
            response => unexpected(response),
        }
    }

    pub fn state(&self) -> Result<EngineState, Error> {
        match self.call(&Request::State, None, None)? {
            Response::State(state) => Ok(state),
            response => unexpected(response),
        }
    }

    pub fn has_unit(&self, unit_id: &str) -> Result<bool, Error> {
        match self.call(&Request::HasUnit(unit_id.to_string()), None, None)? {
            Response::Bool(found) => Ok(found),
            response => unexpected(response),
        }
    }

    fn done(&self, request: &Request) -> Result<(), Error> {
        match self.call(request, None, None)? {
            Response::Done => Ok(()),
            response => unexpected(response),
        }
    }
}

fn unexpected<T>(response: Response) -> Result<T, Error> {
    match response {
        Response::Fault(error) => Err(error),
        response => Err(Error::Sandbox(format!(
            "unexpected response \"{}\"",
            response.name()
        ))),
    }
}

// Runs inside the context.
fn dispatch<'a>(
    engine: &Engine,
    request: &[u8],
    writer: Option<&'a mut dyn Write>,
    callback: Option<&'a dyn RenderCallback>,
) -> Response {
    let request: Request = match decode(request) {
        Ok(request) => request,
        Err(err) => return Response::Fault(err),
    };

    let result = match request {
        Request::Compile { source, request } => engine
            .compile(&source, &request)
            .map(|unit| Response::UnitId(unit.id.clone())),

        Request::RenderSource { source, model } => engine
            .render_template(&source, &model.into_model(), writer)
            .map(Response::Output),

        Request::Render {
            unit_id,
            model,
            entry,
        } => engine
            .render_entry(
                &unit_id,
                &model.into_model(),
                Invocation {
                    writer,
                    entry,
                    callback,
                },
            )
            .map(Response::Output),

        Request::AddNamespace(namespace) => {
            engine.add_namespace(&namespace);
            Ok(Response::Done)
        }

        Request::AddReference(module) => {
            engine.add_referenced_module(&module);
            Ok(Response::Done)
        }

        Request::SetRequestConfig(config) => {
            Ok(Response::RequestConfig(engine.set_request_config(config)))
        }

        Request::RequestConfig => Ok(Response::RequestConfig(engine.request_config())),
        Request::State => Ok(Response::State(engine.state())),
        Request::HasUnit(unit_id) => Ok(Response::Bool(engine.unit(&unit_id).is_some())),
    };

    result.unwrap_or_else(Response::Fault)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::BaseContract;
    use crate::config::Config;
    use serde_json::json;

    fn sandbox() -> SandboxHandle {
        create_isolated_context(EngineConfig::from_config(
            &Config::default(),
            BaseContract::Template,
        ))
    }

    #[test]
    fn test_compile_and_render() -> Result<(), Error> {
        let sandbox = sandbox();
        let id = sandbox.compile("Hello <%= Model.Name %>", CompileRequest::default())?;

        let output = sandbox.render(
            &id,
            &Model::anonymous(json!({"Name": "Joe Doe"})),
            None,
            None,
            None,
        )?;

        assert_eq!(output, "Hello Joe Doe");
        assert!(sandbox.has_unit(&id)?);

        Ok(())
    }

    #[test]
    fn test_destroy() -> Result<(), Error> {
        let sandbox = sandbox();
        let id = sandbox.compile("Hello", CompileRequest::default())?;
        let shared = sandbox.clone();

        assert!(sandbox.destroy());
        assert!(!sandbox.destroy());
        assert!(shared.is_destroyed());
        assert!(matches!(
            shared.render(&id, &Model::None, None, None, None),
            Err(Error::Sandbox(_))
        ));

        Ok(())
    }

    #[test]
    fn test_fault_crosses_boundary() -> Result<(), Error> {
        let sandbox = sandbox();
        let result = sandbox.render("_missing", &Model::None, None, None, None);

        assert_eq!(result, Err(Error::UnitNotFound("_missing".into())));
        assert!(sandbox.state()?.error_message.is_some());

        Ok(())
    }

    struct Explodes;

    impl RenderCallback for Explodes {
        fn render_partial(&self, _path: &str, _model: &Model) -> Result<String, Error> {
            panic!("callback exploded")
        }
    }

    #[test]
    fn test_panic_contained() -> Result<(), Error> {
        let sandbox = create_isolated_context(EngineConfig::from_config(
            &Config::default(),
            BaseContract::FolderTemplate,
        ));
        let id = sandbox.compile(r#"<%- render_partial("side") %>"#, CompileRequest::default())?;

        let result = sandbox.render(&id, &Model::None, None, None, Some(&Explodes));

        match result {
            Err(Error::Execution(message)) => assert!(message.contains("callback exploded")),
            other => panic!("expected an execution fault, got {:?}", other),
        }

        // The context survives and keeps its units.
        assert!(!sandbox.is_destroyed());
        assert!(sandbox.has_unit(&id)?);
        assert_eq!(sandbox.render_template("ok", &Model::None, None)?, "ok");

        Ok(())
    }

    #[test]
    fn test_streaming() -> Result<(), Error> {
        let sandbox = sandbox();
        let mut output = vec![];
        let result = sandbox.render_template("<%= 1 + 2 %>", &Model::None, Some(&mut output))?;

        assert_eq!(result, "");
        assert_eq!(output, b"3");

        Ok(())
    }
}
