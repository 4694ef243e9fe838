// Library module for fetchsync
// Re-exports modules for use in integration tests and the binary

pub mod backend;
pub mod config;
pub mod eligibility;
pub mod logging;
pub mod state;
pub mod sync;
