// Library root: re-exports all modules so integration tests and the CLI
// can access the engine's public API.

pub mod cancel;
pub mod clustering;
pub mod config;
pub mod engine;
pub mod index;
pub mod ingest;
pub mod metrics;
pub mod roles;
pub mod similarity;
pub mod store;
