// Shared foundation for the draft services: the draft document model, the
// document store abstraction (with its SQLite implementation and change feed),
// configuration loading, and tracing setup.

pub mod config;
pub mod draft;
pub mod page;
pub mod paths;
pub mod store;
pub mod team;
pub mod telemetry;
