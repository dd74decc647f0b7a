//! HTTP API: control endpoints, media route, event stream

pub mod handlers;
pub mod media;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
