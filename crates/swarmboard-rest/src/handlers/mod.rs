pub mod health;
pub mod proxy;
pub mod realtime;
pub mod runs;

pub use health::{health_handler, metrics};
pub use proxy::{engine_stats, metrics_query};
pub use realtime::websocket_handler;
pub use runs::{current_run, get_run, history, start_run, stop_run};
