//! 作业执行策略接口
//!
//! 每种服务类型对应一个实现了 [`JobStrategy`] 的执行策略，按类型标签注册到
//! [`StrategyRegistry`](crate::StrategyRegistry)。执行策略只负责对单台设备做一次
//! 尝试，重试、并发和汇总由作业运行器负责。
//!
//! ## 使用示例
//!
//! ```rust
//! use async_trait::async_trait;
//! use orchestrator_core::traits::{ExecutionContext, ExecutionOutput, JobStrategy};
//! use orchestrator_core::Result;
//!
//! pub struct EchoStrategy;
//!
//! #[async_trait]
//! impl JobStrategy for EchoStrategy {
//!     fn name(&self) -> &str {
//!         "echo_service"
//!     }
//!
//!     async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionOutput> {
//!         Ok(ExecutionOutput::success(format!("hello {}", context.device.name)))
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Device;
use crate::traits::repository::InventoryRepository;
use crate::Result;

/// 单次尝试的执行上下文
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: Uuid,
    pub job_id: i64,
    pub job_name: String,
    pub device: Device,
    /// 服务参数，运行期间只读
    pub parameters: Arc<serde_json::Value>,
    /// 工作流中已完成节点的结果
    pub payload: Arc<serde_json::Value>,
    /// 当前尝试序号，从1开始
    pub attempt: u32,
    pub inventory: Arc<dyn InventoryRepository>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("job_id", &self.job_id)
            .field("job_name", &self.job_name)
            .field("device", &self.device.name)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// 单次尝试的输出
///
/// 返回 `Err` 或 `success == false` 都会被作业运行器视为一次失败的尝试。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub success: bool,
    pub output: String,
}

impl ExecutionOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

#[async_trait]
pub trait JobStrategy: Send + Sync {
    /// 注册时使用的服务类型标签
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// 在作业定义加载时校验服务参数
    fn validate_parameters(&self, _parameters: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionOutput>;
}
