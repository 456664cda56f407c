//! JSON wire frames.
//!
//! ```text
//! request:  {"id":7,"src":"dev-a","dst":"tcp://b:1884","method":"Example.Increment","args":{"num":1}}
//! response: {"id":7,"src":"dev-b","dst":"dev-a","result":{"num":2}}
//! error:    {"id":7,"src":"dev-b","dst":"dev-a","error":{"code":404,"message":"No handler for Foo"}}
//! ```
//!
//! A frame carrying `method` is a request; anything else with an `id` is a
//! response. Requests without an `id` are notifications and never answered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CallError, RpcError};

/// Error object inside a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// One request or response as it travels on a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub src: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dst: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// How the dispatcher should treat an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Request,
    Response,
    /// Neither a method nor an id: nothing to route.
    Invalid,
}

impl Frame {
    pub fn request(
        id: Option<u64>,
        src: &str,
        dst: &str,
        method: &str,
        args: Value,
    ) -> Self {
        Self {
            id,
            src: src.to_owned(),
            dst: dst.to_owned(),
            method: Some(method.to_owned()),
            args: Some(args),
            ..Self::default()
        }
    }

    /// Success response. A `null` result is omitted from the wire.
    pub fn response(id: u64, src: &str, dst: &str, result: Value) -> Self {
        Self {
            id: Some(id),
            src: src.to_owned(),
            dst: dst.to_owned(),
            result: (!result.is_null()).then_some(result),
            ..Self::default()
        }
    }

    pub fn error(id: u64, src: &str, dst: &str, code: i32, message: &str) -> Self {
        Self {
            id: Some(id),
            src: src.to_owned(),
            dst: dst.to_owned(),
            error: Some(ErrorBody {
                code,
                message: message.to_owned(),
            }),
            ..Self::default()
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, RpcError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn kind(&self) -> FrameKind {
        if self.method.is_some() {
            FrameKind::Request
        } else if self.id.is_some() {
            FrameKind::Response
        } else {
            FrameKind::Invalid
        }
    }

    /// Request arguments; absent or `null` args read as an empty object.
    pub fn take_args(&mut self) -> Value {
        match self.args.take() {
            Some(Value::Null) | None => Value::Object(serde_json::Map::new()),
            Some(v) => v,
        }
    }

    /// Outcome carried by a response frame. An error object wins over a
    /// result; a frame with neither is a success with a `null` result.
    pub fn into_outcome(self) -> Result<Value, CallError> {
        match self.error {
            Some(e) => Err(CallError::new(e.code, e.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
