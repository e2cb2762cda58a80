use thiserror::Error;

/// 编排器错误类型定义
///
/// 前四个变体对应执行核心的错误分类：
/// - `TargetResolution`: 设备池筛选规则有误，在分发之前终止本次作业调用
/// - `Execution`: 单台设备上的连接器失败，按重试策略处理，只记录在该设备的结果中
/// - `Configuration`: 工作流结构或作业配置错误，终止整个运行并记录原因
/// - `Scheduling`: 触发器定义无效，本轮跳过该计划任务并记录日志
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("目标解析错误 (设备池 {pool}): {message}")]
    TargetResolution { pool: String, message: String },

    #[error("执行错误: {0}")]
    Execution(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("调度错误: {0}")]
    Scheduling(String),

    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("计划任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("设备池未找到: {id}")]
    PoolNotFound { id: i64 },

    #[error("设备未找到: {name}")]
    DeviceNotFound { name: String },

    #[error("运行实例未找到: {id}")]
    RunNotFound { id: String },

    #[error("未注册的服务类型: {service_type}")]
    StrategyNotFound { service_type: String },

    #[error("资产库错误: {0}")]
    Inventory(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl OrchestratorError {
    pub fn target_resolution(pool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetResolution {
            pool: pool.into(),
            message: message.into(),
        }
    }

    /// 结构性错误会终止整个运行
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::StrategyNotFound { .. } | Self::JobNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, OrchestratorError>;
