//! Plinth Wire Protocol
//!
//! Everything between a rendered tree and the bytes a client sees:
//!
//! - **Exporter**: stable indices for objects that cannot be serialized
//! - **NodeEncoder**: rendered nodes to JSON documents with callable and
//!   object markers
//! - **Decoder**: client arguments back into engine values
//! - **Messages**: JSON-RPC 2.0 envelopes for documents, errors and events
//!
//! # Example
//!
//! ```rust
//! use plinth_core::{BaseElement, Callable, Renderer, Session, TreeRenderer};
//! use plinth_wire::{Exporter, NodeEncoder};
//!
//! let mut renderer = Renderer::with_session(Session::detached());
//! let node = renderer
//!     .render(&BaseElement::new("Button").prop("on_press", Callable::action(|| {})).into())
//!     .unwrap();
//!
//! let encoded = NodeEncoder::new().encode(&node, &mut Exporter::new()).unwrap();
//! assert_eq!(encoded.document["props"]["on_press"]["__dh_cbid"], "cb0");
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod exporter;
pub mod message;

pub use decoder::{decode_args, decode_value};
pub use encoder::{
    EncodedNode, NodeEncoder, CALLABLE_KEY, DEFAULT_CALLABLE_ID_PREFIX, ELEMENT_KEY, OBJECT_KEY, PROPS_KEY,
};
pub use error::{Result, WireError};
pub use exporter::{Exporter, Reference, ReferenceDelta};
pub use message::{DocumentError, DocumentUpdated, Notification, Request, Response, RpcError, SendEvent};
