//! REST API for the playback daemon

pub mod handlers;
pub mod server;

pub use server::{create_router, AppContext};
