//! # Tonecast Common Library
//!
//! Shared code for the tonecast daemons including:
//! - API request/response types
//! - Disposed-state lifecycle guard

pub mod api;
pub mod guard;

pub use guard::{DisposedError, DisposedGuard};
