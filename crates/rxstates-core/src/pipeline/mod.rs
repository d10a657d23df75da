//! Batch validation pipeline.
//!
//! - **batch**: Partition records into fixed-size batches
//! - **checkpoint**: Persist run progress so an interrupted run can resume
//! - **orchestrator**: The sequential retry/downgrade loop over batches

pub mod batch;
pub mod checkpoint;
pub mod orchestrator;

pub use batch::{batch_count, partition, Batch};
pub use checkpoint::{RunCheckpoint, RunFingerprint, RunSettings};
pub use orchestrator::{
    BatchEvent, BatchOutcome, RunOptions, RunOutcome, RunPlan, RunReport, Validator,
};
