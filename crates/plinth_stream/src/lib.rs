//! Plinth Message Stream
//!
//! Connects a Plinth render tree to one client:
//!
//! - **ElementMessageStream**: renders, encodes and sends documents, and
//!   routes client requests to the callables of the current document
//! - **MessageTransport**: the outbound half of a connection
//! - **StreamConfig**: callable id prefix and error reporting policy
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use plinth_core::{BaseElement, Element, ManualRenderQueue, ObjectRef};
//! use plinth_stream::{ElementMessageStream, StreamConfig};
//!
//! let queue = Arc::new(ManualRenderQueue::new());
//! let root = Element::function("hello", |_| Ok(BaseElement::new("Text").child("hi").into()));
//! let transport = |payload: Vec<u8>, _objects: Vec<ObjectRef>| -> anyhow::Result<()> {
//!     println!("{}", String::from_utf8_lossy(&payload));
//!     Ok(())
//! };
//!
//! let stream = ElementMessageStream::new(root, transport, queue.clone(), StreamConfig::default());
//! stream.start().unwrap();
//! queue.run_pending();
//! stream.close();
//! ```

pub mod config;
pub mod error;
pub mod stream;
pub mod transport;

pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use stream::{ElementMessageStream, StreamState};
pub use transport::MessageTransport;
