//! Effect queue
//!
//! Effects requested during a render pass are held by their context until the
//! pass commits, then drained in post-order (children before parents). Each
//! entry pairs the effect with the slot that holds the cleanup of its previous
//! run.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RenderError;

/// Effect body; may hand back a cleanup to run before the next run or on unmount
pub type EffectFn = Box<dyn FnOnce() -> anyhow::Result<Option<Cleanup>> + Send>;

/// Cleanup returned by an effect
pub struct Cleanup(Box<dyn FnOnce() -> anyhow::Result<()> + Send>);

impl Cleanup {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(move || {
            cleanup();
            Ok(())
        }))
    }

    pub fn fallible<F>(cleanup: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self(Box::new(cleanup))
    }

    pub(crate) fn run(self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Per-hook storage for the cleanup of the last effect run
#[derive(Default)]
pub(crate) struct EffectCell {
    pub(crate) cleanup: Option<Cleanup>,
}

pub(crate) type SharedEffectCell = Arc<Mutex<EffectCell>>;

/// An effect requested during render, waiting for its pass to commit
pub(crate) struct QueuedEffect {
    pub(crate) cell: SharedEffectCell,
    pub(crate) effect: EffectFn,
    /// Records the new dependencies once the pass is known to succeed
    pub(crate) commit_deps: Box<dyn FnOnce() + Send>,
}

pub(crate) enum EffectJob {
    Run {
        context: String,
        cell: SharedEffectCell,
        effect: EffectFn,
    },
    Cleanup {
        context: String,
        cleanup: Cleanup,
    },
}

/// Effects and cleanups collected from a committed pass
#[derive(Default)]
pub struct EffectQueue {
    jobs: Vec<EffectJob>,
}

impl EffectQueue {
    pub(crate) fn push(&mut self, job: EffectJob) {
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Run every job in order; failures are collected, never short-circuit
    pub fn run(self) -> Vec<RenderError> {
        let mut errors = Vec::new();
        for job in self.jobs {
            match job {
                EffectJob::Run {
                    context,
                    cell,
                    effect,
                } => {
                    let previous = cell.lock().cleanup.take();
                    if let Some(cleanup) = previous {
                        if let Err(source) = cleanup.run() {
                            errors.push(effect_error(&context, source));
                        }
                    }
                    match effect() {
                        Ok(cleanup) => cell.lock().cleanup = cleanup,
                        Err(source) => errors.push(effect_error(&context, source)),
                    }
                }
                EffectJob::Cleanup { context, cleanup } => {
                    if let Err(source) = cleanup.run() {
                        errors.push(effect_error(&context, source));
                    }
                }
            }
        }
        errors
    }
}

fn effect_error(context: &str, source: anyhow::Error) -> RenderError {
    tracing::warn!(context, error = %source, "effect failed");
    RenderError::Effect {
        context: context.to_owned(),
        source,
    }
}

impl fmt::Debug for EffectQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectQueue")
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
