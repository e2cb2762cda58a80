//! 网络设备自动化编排核心
//!
//! 领域模型、错误类型、外部协作方接口、结果汇总与轮询资源池。
//! 作业运行器、工作流引擎和调度器分别位于 `orchestrator-worker`
//! 与 `orchestrator-dispatcher`。

pub mod aggregation;
pub mod config;
pub mod errors;
pub mod models;
pub mod resource_pool;
pub mod strategy_registry;
pub mod traits;

pub use aggregation::{AggregationPolicy, ResultAggregator, ResultSummary};
pub use config::AppConfig;
pub use errors::{OrchestratorError, Result};
pub use resource_pool::ResourcePool;
pub use strategy_registry::StrategyRegistry;

pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;
