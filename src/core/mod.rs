/*!
 * Core Module
 * Shared value types, error handling, limits and configuration
 */

pub mod config;
pub mod errors;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::RuntimeConfig;
pub use errors::*;
pub use types::*;
