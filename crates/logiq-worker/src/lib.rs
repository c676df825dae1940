//! Logiq ingestion worker
//! Consumes ingestion envelopes from a NATS JetStream work queue, embeds and stores each log with retry.

pub mod bootstrap;
pub mod retry;
pub mod task;
pub mod worker;

pub use bootstrap::SchemaGuard;
pub use retry::{run_with_retry, AttemptState, Retriable, RetryPolicy, TaskAttempts, TaskFailure};
pub use task::{build_record, IngestError, IngestOutcome, IngestTask};
pub use worker::{QueueConfig, Worker};
