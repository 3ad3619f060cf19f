//! Processor error types.

use thiserror::Error;
use uuid::Uuid;

use cadence_queue::QueueError;
use cadence_scheduler::SchedulerError;
use cadence_store::StoreError;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("queue entry not found: {0}")]
    NotFound(Uuid),
}
