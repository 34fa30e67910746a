//! Element message stream
//!
//! Binds one render tree to one client connection. The stream renders the
//! root element, encodes the result and sends it as a `documentUpdated`
//! notification; every state change inside the tree schedules another pass on
//! the render queue. Client requests invoke the callables of the last document
//! that was sent.
//!
//! ```text
//! setter.set(..) ─► on_change ─► schedule_render ─► queue ─► render ─► encode ─► send
//!                                 (coalesced)
//! on_data(request) ─► callable lookup ─► call (unlocked) ─► response
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use plinth_core::{
    Callable, Element, ObjectRef, RenderError, Renderer, Session, SharedRenderQueue, TreeRenderer, Value,
};
use plinth_wire::message::{self, codes};
use plinth_wire::{decode_args, EncodedNode, Exporter, NodeEncoder, Request, Response};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::transport::MessageTransport;

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Running,
    /// Stopped after a fatal render error
    Failed,
    Closed,
}

struct StreamInner {
    state: StreamState,
    renderer: Box<dyn TreeRenderer>,
    exporter: Exporter,
    /// Callables of the last document sent, by wire id
    callables: FxHashMap<String, Callable>,
    documents_sent: u64,
}

/// Drives a render tree over a client connection
pub struct ElementMessageStream {
    element: Element,
    config: StreamConfig,
    encoder: NodeEncoder,
    transport: Arc<dyn MessageTransport>,
    queue: SharedRenderQueue,
    render_pending: AtomicBool,
    inner: Mutex<StreamInner>,
    this: Weak<ElementMessageStream>,
}

impl ElementMessageStream {
    /// Create a stream rendering `element`
    ///
    /// Re-renders run as tasks on `queue`. Nothing is sent before
    /// [`ElementMessageStream::start`].
    pub fn new<T>(element: Element, transport: T, queue: SharedRenderQueue, config: StreamConfig) -> Arc<Self>
    where
        T: MessageTransport + 'static,
    {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let on_change = this.clone();
            let events = this.clone();
            let session = Session::new(move || {
                if let Some(stream) = on_change.upgrade() {
                    stream.schedule_render();
                }
            })
            .with_render_queue(queue.clone())
            .with_event_sink(move |name, params| match events.upgrade() {
                Some(stream) => stream.send_event(name, &params),
                None => Ok(()),
            });

            Self {
                element,
                encoder: NodeEncoder::new().with_callable_id_prefix(config.callable_id_prefix.clone()),
                config,
                transport: Arc::new(transport),
                queue,
                render_pending: AtomicBool::new(false),
                inner: Mutex::new(StreamInner {
                    state: StreamState::NotStarted,
                    renderer: Box::new(Renderer::with_session(session)),
                    exporter: Exporter::new(),
                    callables: FxHashMap::default(),
                    documents_sent: 0,
                }),
                this: this.clone(),
            }
        })
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// Number of `documentUpdated` notifications sent so far
    pub fn documents_sent(&self) -> u64 {
        self.inner.lock().documents_sent
    }

    /// Render the initial document and send it
    ///
    /// Runs on the calling thread, which should be the render thread.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        match guard.state {
            StreamState::NotStarted => {}
            StreamState::Running => return Err(StreamError::AlreadyStarted),
            StreamState::Failed | StreamState::Closed => return Err(StreamError::Closed),
        }
        guard.state = StreamState::Running;
        tracing::debug!(root = self.element.name(), "stream started");
        self.render_and_send(&mut guard)
    }

    /// Queue a re-render unless one is already pending
    pub fn schedule_render(&self) {
        if self.render_pending.swap(true, Ordering::AcqRel) {
            tracing::trace!("render already pending; change coalesced");
            return;
        }

        let this = self.this.clone();
        self.queue.queue(Box::new(move || {
            let Some(stream) = this.upgrade() else {
                return;
            };
            // Cleared first so changes made during the pass schedule another one
            stream.render_pending.store(false, Ordering::Release);

            let mut guard = stream.inner.lock();
            if guard.state != StreamState::Running {
                tracing::trace!(state = ?guard.state, "skipping render on inactive stream");
                return;
            }
            if let Err(err) = stream.render_and_send(&mut guard) {
                tracing::debug!(error = %err, "scheduled render did not produce a document");
            }
        }));
    }

    /// Handle one inbound request
    ///
    /// `references` is the positional object list that arrived with the
    /// payload. The callable runs without any stream lock held, so it may set
    /// state or send events.
    pub fn on_data(&self, payload: &[u8], references: Vec<ObjectRef>) -> Result<()> {
        let request = Request::parse(payload).map_err(|err| {
            tracing::warn!(error = %err, "dropping malformed request");
            err
        })?;

        let callable = {
            let inner = self.inner.lock();
            match inner.state {
                StreamState::Running => {}
                StreamState::NotStarted => return Err(StreamError::NotStarted),
                StreamState::Failed | StreamState::Closed => return Err(StreamError::Closed),
            }
            inner.callables.get(&request.method).cloned()
        };

        let Some(callable) = callable else {
            tracing::warn!(method = %request.method, "request for unknown callable");
            self.respond_error(&request, codes::METHOD_NOT_FOUND, format!("unknown callable `{}`", request.method))?;
            return Err(StreamError::UnknownCallable(request.method));
        };

        let args = match decode_args(&request.params, &references) {
            Ok(args) => args,
            Err(err) => {
                self.respond_error(&request, codes::INVALID_PARAMS, err.to_string())?;
                return Err(err.into());
            }
        };

        let result = callable.call(args);
        let Some(id) = request.id.clone().filter(|id| !id.is_null()) else {
            if let Err(err) = result {
                let error = format!("{err:#}");
                tracing::warn!(method = %request.method, %error, "callable failed");
            }
            return Ok(());
        };

        let response = match result.map(|value| self.encoder.encode_plain(&value)) {
            Ok(Ok(json)) => Response::result(id, json),
            Ok(Err(err)) => Response::error(id, codes::INTERNAL_ERROR, err.to_string()),
            Err(err) => Response::error(id, codes::INTERNAL_ERROR, format!("{err:#}")),
        };
        self.send(response.to_bytes()?, Vec::new())
    }

    /// Unmount the tree and forget every exported object
    ///
    /// Effect cleanups run on the calling thread. Closing twice is a no-op.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.state == StreamState::Closed {
            return;
        }
        inner.state = StreamState::Closed;

        for err in inner.renderer.unmount() {
            tracing::warn!(error = %err, "cleanup failed while closing stream");
        }
        let released = inner.exporter.clear();
        inner.callables.clear();
        tracing::debug!(released = released.len(), "stream closed");
    }

    fn render_and_send(&self, inner: &mut StreamInner) -> Result<()> {
        let node = match inner.renderer.render(&self.element) {
            Ok(node) => node,
            Err(err) => {
                self.report_render_error(inner, &err)?;
                return Err(err.into());
            }
        };

        for err in inner.renderer.take_effect_errors() {
            if self.config.report_effect_errors {
                self.send_document_error(err.kind(), &err.to_string())?;
            } else {
                tracing::warn!(error = %err, "effect failed");
            }
        }

        let encoded = match self.encoder.prepare(&node, &mut inner.exporter) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.send_document_error(err.kind(), &err.to_string())?;
                return Err(err.into());
            }
        };

        let EncodedNode {
            callables,
            references,
            ..
        } = &encoded;
        let sent = message::document_updated(&encoded)
            .map_err(StreamError::from)
            .and_then(|payload| self.send(payload, references.new_objects.clone()));
        if let Err(err) = sent {
            // The client never saw this delta
            inner.exporter.rollback();
            return Err(err);
        }
        inner.exporter.references();

        inner.callables = encoded
            .callable_ids()
            .iter()
            .cloned()
            .zip(callables.iter().cloned())
            .collect();
        inner.documents_sent += 1;
        tracing::debug!(
            document = inner.documents_sent,
            callables = inner.callables.len(),
            new_references = references.new_reference_ids.len(),
            removed_references = references.removed_reference_ids.len(),
            "document sent"
        );
        Ok(())
    }

    fn report_render_error(&self, inner: &mut StreamInner, err: &RenderError) -> Result<()> {
        if err.is_fatal() && self.config.close_on_fatal {
            tracing::error!(error = %err, "fatal render error; stream stopped");
            inner.state = StreamState::Failed;
        }
        self.send_document_error(err.kind(), &err.to_string())
    }

    fn send_document_error(&self, kind: &str, text: &str) -> Result<()> {
        self.send(message::document_error(kind, text)?, Vec::new())
    }

    fn send_event(&self, name: &str, params: &Value) -> anyhow::Result<()> {
        let params = self.encoder.encode_plain(params)?;
        self.send(message::send_event(name, params)?, Vec::new())?;
        Ok(())
    }

    fn respond_error(&self, request: &Request, code: i64, text: String) -> Result<()> {
        match request.id.clone().filter(|id| !id.is_null()) {
            Some(id) => self.send(Response::error(id, code, text).to_bytes()?, Vec::new()),
            None => Ok(()),
        }
    }

    fn send(&self, payload: Vec<u8>, objects: Vec<ObjectRef>) -> Result<()> {
        self.transport.send(payload, objects).map_err(|err| {
            let error = format!("{err:#}");
            tracing::error!(%error, "transport send failed");
            StreamError::Transport(err)
        })
    }
}

impl fmt::Debug for ElementMessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementMessageStream")
            .field("root", &self.element.name())
            .field("state", &self.state())
            .field("render_pending", &self.render_pending.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
