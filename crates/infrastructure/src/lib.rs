//! 编排核心的基础设施实现：内存仓储、游标文件、设备清单加载与可观测性

pub mod file_cursor_store;
pub mod fleet;
pub mod memory;
pub mod observability;

pub use file_cursor_store::FileCursorStore;
pub use fleet::{FleetDefinition, FleetRepositories};
pub use memory::{
    InMemoryCursorStore, InMemoryInventory, InMemoryJobRepository, InMemoryPoolRepository,
    InMemoryTaskRepository,
};
pub use observability::{
    CompositeEventSink, MetricsCollector, StructuredLogger, TracingEventSink,
};
