//! Messages exchanged with an isolated context.
//!
//! Everything crosses the boundary as JSON. The output writer and the render
//! callback are the only things passed by reference.
use crate::engine::{CompileRequest, EngineState, RequestConfig};
use crate::model::WireModel;
use crate::unit::EntrySelector;
use crate::Error;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Compile a template, returns the unit id.
    Compile {
        source: String,
        request: CompileRequest,
    },
    /// Compile a template and render it.
    RenderSource { source: String, model: WireModel },
    /// Render a unit compiled earlier.
    Render {
        unit_id: String,
        model: WireModel,
        entry: Option<EntrySelector>,
    },
    AddNamespace(String),
    AddReference(String),
    SetRequestConfig(Option<RequestConfig>),
    RequestConfig,
    State,
    HasUnit(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    UnitId(String),
    Output(String),
    RequestConfig(Option<RequestConfig>),
    State(EngineState),
    Bool(bool),
    Done,
    Fault(Error),
}

impl Response {
    /// Name of the response, for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Response::UnitId(_) => "UnitId",
            Response::Output(_) => "Output",
            Response::RequestConfig(_) => "RequestConfig",
            Response::State(_) => "State",
            Response::Bool(_) => "Bool",
            Response::Done => "Done",
            Response::Fault(_) => "Fault",
        }
    }
}

/// Serialize a message for the other side.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, Error> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_roundtrip() -> Result<(), Error> {
        let request = Request::Render {
            unit_id: "_abc".into(),
            model: WireModel::Typed {
                type_name: "app::Invoice".into(),
                value: json!({"total": 5}),
            },
            entry: Some(EntrySelector::new("__stencil", "_abc")),
        };

        let back: Request = decode(&encode(&request)?)?;
        assert_eq!(back, request);

        let fault = Response::Fault(Error::Execution("boom".into()));
        let back: Response = decode(&encode(&fault)?)?;
        assert_eq!(back, fault);

        Ok(())
    }
}
