pub mod event_sink;
pub mod job_strategy;
pub mod repository;

pub use event_sink::RunEventSink;
pub use job_strategy::{ExecutionContext, ExecutionOutput, JobStrategy};
pub use repository::{
    CursorStore, InventoryRepository, JobRepository, PoolRepository, TaskRepository,
};
