//! Transport contract

use plinth_core::ObjectRef;

/// Delivers outbound messages to one client
///
/// `objects` is the positional list of objects first exported by the
/// message; it is empty for everything but document updates.
pub trait MessageTransport: Send + Sync {
    fn send(&self, payload: Vec<u8>, objects: Vec<ObjectRef>) -> anyhow::Result<()>;
}

impl<F> MessageTransport for F
where
    F: Fn(Vec<u8>, Vec<ObjectRef>) -> anyhow::Result<()> + Send + Sync,
{
    fn send(&self, payload: Vec<u8>, objects: Vec<ObjectRef>) -> anyhow::Result<()> {
        self(payload, objects)
    }
}
