//! # Orchestrator Testing Utils
//!
//! 编排器各 crate 共用的测试工具：
//!
//! - **builders**: 设备、服务、工作流、计划任务的构造器
//! - **mocks**: 按脚本返回结果的执行策略、并发探针、记录型事件出口与延时
//! - **helpers**: 轮询等待等常用辅助函数
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
