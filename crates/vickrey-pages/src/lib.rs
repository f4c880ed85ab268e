//! Page synchronizer: renders a draft into its public and per-team pages
//! whenever the draft changes.

pub mod builder;
pub mod components;
pub mod pages;
pub mod sync;
pub mod worker;

pub use sync::{SyncError, SyncOutcome, SyncReport, Synchronizer};
pub use worker::{run_sync_worker, SYNC_CONSUMER};
