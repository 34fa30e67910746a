//! JSON-RPC 2.0 envelopes
//!
//! Outbound notifications:
//!
//! - `documentUpdated` with the encoded document and the reference delta
//! - `documentError` when a render or encode fails
//! - `sendEvent` for events raised by components
//!
//! Inbound requests name a callable id as their method. Requests with an id
//! get a [`Response`]; requests without one are fire-and-forget.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::encoder::EncodedNode;
use crate::error::{Result, WireError};

pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound method names
pub mod methods {
    pub const DOCUMENT_UPDATED: &str = "documentUpdated";
    pub const DOCUMENT_ERROR: &str = "documentError";
    pub const SEND_EVENT: &str = "sendEvent";
}

/// Standard JSON-RPC error codes
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification<P> {
    pub jsonrpc: String,
    pub method: String,
    pub params: P,
}

impl<P: Serialize> Notification<P> {
    pub fn new(method: &str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.to_owned(),
            params,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpdated {
    pub document: Json,
    pub new_references: Vec<u32>,
    pub removed_references: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEvent {
    pub name: String,
    pub params: Json,
}

/// `documentUpdated` notification for an encoded document
pub fn document_updated(encoded: &EncodedNode) -> Result<Vec<u8>> {
    Notification::new(
        methods::DOCUMENT_UPDATED,
        DocumentUpdated {
            document: encoded.document.clone(),
            new_references: encoded.references.new_reference_ids.clone(),
            removed_references: encoded.references.removed_reference_ids.clone(),
        },
    )
    .to_bytes()
}

/// `documentError` notification
pub fn document_error(kind: &str, message: &str) -> Result<Vec<u8>> {
    Notification::new(
        methods::DOCUMENT_ERROR,
        DocumentError {
            kind: kind.to_owned(),
            message: message.to_owned(),
        },
    )
    .to_bytes()
}

/// `sendEvent` notification
pub fn send_event(name: &str, params: Json) -> Result<Vec<u8>> {
    Notification::new(
        methods::SEND_EVENT,
        SendEvent {
            name: name.to_owned(),
            params,
        },
    )
    .to_bytes()
}

/// Inbound call of a callable
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Json>,
    pub method: String,
    #[serde(default)]
    pub params: Json,
}

impl Request {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let request: Request = serde_json::from_slice(payload)?;
        match request.jsonrpc.as_deref() {
            None | Some(JSONRPC_VERSION) => Ok(request),
            Some(other) => Err(WireError::InvalidMessage(format!(
                "unsupported jsonrpc version `{other}`"
            ))),
        }
    }

    /// Whether the caller expects a response
    pub fn expects_response(&self) -> bool {
        self.id.as_ref().is_some_and(|id| !id.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn result(id: Json, result: Json) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Json, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
