//! Disposed-state lifecycle guard
//!
//! Resource-owning types (output channels, engine sessions, players)
//! compose a `DisposedGuard` and call [`DisposedGuard::check`] at the top
//! of every public operation. Once disposed, further use is a hard error
//! rather than undefined behavior against a closed native handle.
//!
//! The guard is cheaply clonable so completion callbacks can hold a copy
//! and bail out when the owner has already been torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Error raised when a disposed object is used, or disposed twice.
#[derive(Debug, Clone, Error)]
#[error("cannot access disposed object: {name}")]
pub struct DisposedError {
    /// Name of the owning object, for diagnostics.
    pub name: &'static str,
}

/// Tracks whether the owning object has been disposed.
#[derive(Debug, Clone)]
pub struct DisposedGuard {
    name: &'static str,
    disposed: Arc<AtomicBool>,
}

impl DisposedGuard {
    /// Create a guard for the named owner.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fails if the owner has been disposed.
    pub fn check(&self) -> Result<(), DisposedError> {
        if self.is_disposed() {
            return Err(DisposedError { name: self.name });
        }
        Ok(())
    }

    /// True once [`DisposedGuard::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Mark the owner disposed. Disposing twice is an error, so callers
    /// surface double-dispose bugs instead of silently ignoring them.
    pub fn dispose(&self) -> Result<(), DisposedError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(DisposedError { name: self.name });
        }
        Ok(())
    }
}
