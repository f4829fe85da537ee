pub mod config;
pub mod core;
pub mod dialer;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod store;

// Re-export commonly used items for convenience
pub use config::{ConfigError, RelayConfig};
pub use core::*;
pub use state::AppState;
