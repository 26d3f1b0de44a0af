//! HTTP and WebSocket surface of SwarmBoard.

pub mod error;
pub mod handlers;
pub mod rest;
pub mod state;
pub mod tracing_init;

pub use error::ApiError;
pub use rest::build_router;
pub use state::AppState;
