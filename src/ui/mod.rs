//! HTTP control API

pub mod handlers;
pub mod server;

pub use server::{router, AppState, WebServer};
