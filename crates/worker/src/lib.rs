//! 作业运行器与内置执行策略

pub mod device_locks;
pub mod job_runner;
pub mod retry_delay;
pub mod strategies;

pub use device_locks::DeviceLocks;
pub use job_runner::JobRunner;
pub use retry_delay::{RetryDelay, TokioDelay};
pub use strategies::{default_registry, PropertyValidationStrategy, UpdatePropertyStrategy};
