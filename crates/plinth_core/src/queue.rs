//! Render queues
//!
//! State setters may be called from any thread. The actual re-render has to
//! happen on the single logical thread that owns a render session, so change
//! notifications are turned into tasks and marshalled through a
//! [`RenderQueue`].

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

/// A unit of work to run on the render thread
pub type RenderTask = Box<dyn FnOnce() + Send>;

/// Marshals work onto the thread that owns rendering for a session
pub trait RenderQueue: Send + Sync {
    /// Queue `task` to run on the render thread
    fn queue(&self, task: RenderTask);
}

/// Shared handle to a render queue
pub type SharedRenderQueue = Arc<dyn RenderQueue>;

// =========================================================================
// Manual queue
// =========================================================================

/// Queue drained explicitly by its owner
///
/// The thread calling [`ManualRenderQueue::run_pending`] is the render thread.
/// Suited to hosts that already run their own loop, and to tests.
#[derive(Default)]
pub struct ManualRenderQueue {
    tasks: Mutex<VecDeque<RenderTask>>,
}

impl ManualRenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued tasks until the queue is empty, including tasks queued by
    /// the tasks themselves. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Lock released before running so tasks can queue more work
            let next = self.tasks.lock().pop_front();
            let Some(task) = next else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl RenderQueue for ManualRenderQueue {
    fn queue(&self, task: RenderTask) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for ManualRenderQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualRenderQueue")
            .field("pending", &self.len())
            .finish()
    }
}

// =========================================================================
// Thread queue
// =========================================================================

/// Queue backed by a dedicated render thread
///
/// Tasks run in submission order. A panicking task is logged and does not take
/// the thread down. Dropping the queue stops accepting tasks, lets the thread
/// finish what was already queued and joins it.
pub struct ThreadRenderQueue {
    sender: Mutex<Option<mpsc::Sender<RenderTask>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadRenderQueue {
    /// Spawn the render thread
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<RenderTask>();
        let name = name.into();
        let thread_name = name.clone();

        let handle = std::thread::Builder::new().name(name).spawn(move || {
            tracing::debug!(thread = %thread_name, "render thread started");
            while let Ok(task) = receiver.recv() {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!(thread = %thread_name, "render task panicked");
                }
            }
            tracing::debug!(thread = %thread_name, "render thread stopped");
        })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop accepting tasks and wait for the render thread to finish
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                // Shutting down from a render task; the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                tracing::error!("render thread terminated abnormally");
            }
        }
    }
}

impl RenderQueue for ThreadRenderQueue {
    fn queue(&self, task: RenderTask) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(task).is_err() {
                    tracing::warn!("render thread gone; dropping task");
                }
            }
            None => tracing::warn!("render queue shut down; dropping task"),
        }
    }
}

impl Drop for ThreadRenderQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadRenderQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRenderQueue")
            .field("running", &self.sender.lock().is_some())
            .finish()
    }
}
