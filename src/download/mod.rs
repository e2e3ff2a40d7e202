//! Download phase: state machine, validation, and the run coordinator.
//!
//! One generic engine executes every configured site; behavior differences
//! live entirely in the [`crate::adapter::SiteAdapter`] data. See
//! [`machine::DownloadStateMachine`] for the per-document lifecycle and
//! [`engine::SyncEngine`] for scheduling, pacing, and persistence.

mod engine;
mod error;
mod machine;
mod validate;

pub use engine::{DEFAULT_CONCURRENCY, EngineError, EngineOptions, RateGate, RunStats, SyncEngine};
pub use error::{DownloadError, ValidationFailure, classify_download_error};
pub use machine::{DownloadStateMachine, MachineOutcome};
pub use validate::{ValidationRules, file_extension, validate_file};
