use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::NodeState;

/// 单台设备结果事件，每个设备结果对应一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOutcomeEvent {
    pub run_id: Uuid,
    pub job_id: i64,
    pub job_name: String,
    pub device: String,
    pub success: bool,
    pub output_or_error: String,
    pub attempt_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// 节点进入或退出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeTransition {
    Entered,
    Exited,
}

/// 工作流节点状态变迁事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTransitionEvent {
    pub run_id: Uuid,
    pub workflow_id: i64,
    pub job_id: i64,
    pub job_name: String,
    pub transition: NodeTransition,
    pub state: NodeState,
    pub timestamp: DateTime<Utc>,
}
