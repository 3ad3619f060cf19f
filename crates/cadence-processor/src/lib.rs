//! Background queue processing: due-entry dispatch, schedule
//! materialization, and terminal-entry cleanup on a polling loop.

mod error;
mod processor;

pub use error::ProcessorError;
pub use processor::{PassSummary, ProcessorConfig, ProcessorStatus, QueueProcessor};
