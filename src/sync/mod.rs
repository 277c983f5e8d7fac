// =============================================================================
// Sync pipeline
// =============================================================================

pub mod orchestrator;
pub mod retry;

pub use orchestrator::{Orchestrator, PassReport, SyncOutcome, SyncSettings};
pub use retry::{RetryError, RetryPolicy};
