//! Resource retention across render passes
//!
//! Host resources such as live tables are reference counted by the host. A
//! [`LivenessScope`] holds one reference to every resource managed through it
//! and gives each of them up exactly once, when the scope is released or
//! dropped.
//!
//! The renderer keeps the previous pass's scope alive until the next pass has
//! succeeded, so a resource referenced by both passes never sees its count
//! drop to zero in between.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

/// A host resource whose lifetime is tied to render output
pub trait LivenessReferent: Send + Sync {
    /// Take one reference
    fn retain(&self);

    /// Give one reference back
    fn release(&self);
}

/// Owner of a set of resource references
#[derive(Default)]
pub struct LivenessScope {
    referents: SmallVec<[Arc<dyn LivenessReferent>; 4]>,
}

impl LivenessScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain `referent` for as long as this scope lives
    pub fn manage(&mut self, referent: Arc<dyn LivenessReferent>) {
        referent.retain();
        self.referents.push(referent);
    }

    /// Take over every reference held by `other` without touching counts
    pub fn absorb(&mut self, mut other: LivenessScope) {
        self.referents.extend(other.referents.drain(..));
    }

    pub fn len(&self) -> usize {
        self.referents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.referents.is_empty()
    }

    /// Release every held reference, returning how many were released
    pub fn release(mut self) -> usize {
        self.release_all()
    }

    fn release_all(&mut self) -> usize {
        let released = self.referents.len();
        for referent in self.referents.drain(..) {
            referent.release();
        }
        released
    }
}

impl Drop for LivenessScope {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for LivenessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessScope")
            .field("referents", &self.referents.len())
            .finish()
    }
}
