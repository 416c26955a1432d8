// HTTP API routes
//
// Each submodule handles one resource with its own AppState.

pub mod common;
pub mod tasks;
pub mod worker;

// Re-export common types
pub use common::{ApiError, ErrorResponse};
