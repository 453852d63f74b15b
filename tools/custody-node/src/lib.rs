//! Host process for a custody ledger.
//!
//! Owns one [`custody_common::ProductLedger`] for the lifetime of the
//! process, authenticates signed commands, persists snapshots and fans
//! ledger events out to HTTP and WebSocket clients.

pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod store;

pub use api::router;
pub use config::Cli;
pub use error::{ApiError, ErrorResponse};
pub use state::AppState;
pub use store::{PersistedState, SnapshotStore};
