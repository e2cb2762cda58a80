use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregation::ResultSummary;

/// 单台设备在一次作业调用中的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub output_or_error: String,
    pub attempt_count: u32,
}

impl RunResult {
    pub fn success(output: impl Into<String>, attempt_count: u32) -> Self {
        Self {
            success: true,
            output_or_error: output.into(),
            attempt_count,
        }
    }

    pub fn failure(error: impl Into<String>, attempt_count: u32) -> Self {
        Self {
            success: false,
            output_or_error: error.into(),
            attempt_count,
        }
    }
}

/// 一次服务作业调用的汇总结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub run_id: Uuid,
    pub job_id: i64,
    pub job_name: String,
    pub success: bool,
    /// 设备名称 -> 设备结果
    pub results: BTreeMap<String, RunResult>,
    pub summary: ResultSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobRun {
    pub fn result_for(&self, device: &str) -> Option<&RunResult> {
        self.results.get(device)
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// 作为工作流后继节点负载的摘要
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "success": self.success,
            "devices": self.results,
        })
    }
}

/// 工作流节点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl NodeState {
    pub fn from_success(success: bool) -> Self {
        if success {
            NodeState::Success
        } else {
            NodeState::Failure
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, NodeState::Success | NodeState::Failure)
    }
}

/// 运行的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failure,
}

impl RunOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            RunOutcome::Success
        } else {
            RunOutcome::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

/// 工作流节点的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeResult {
    Job(JobRun),
    Workflow(Box<WorkflowRun>),
    /// 节点在分发之前被终止，例如目标解析失败
    Aborted { reason: String },
}

impl NodeResult {
    pub fn success(&self) -> bool {
        match self {
            NodeResult::Job(run) => run.success,
            NodeResult::Workflow(run) => run.outcome.is_success(),
            NodeResult::Aborted { .. } => false,
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            NodeResult::Job(run) => run.to_payload(),
            NodeResult::Workflow(run) => serde_json::json!({
                "success": run.outcome.is_success(),
                "nodes": run.states,
            }),
            NodeResult::Aborted { reason } => serde_json::json!({
                "success": false,
                "error": reason,
            }),
        }
    }
}

/// 一次工作流调用的遍历状态与结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub workflow_id: i64,
    pub workflow_name: String,
    pub outcome: RunOutcome,
    pub states: BTreeMap<i64, NodeState>,
    /// 按进入顺序记录的已访问节点
    pub visit_order: Vec<i64>,
    pub node_results: BTreeMap<i64, NodeResult>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn state_of(&self, job_id: i64) -> Option<NodeState> {
        self.states.get(&job_id).copied()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// 运行类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Service,
    Workflow,
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => RunStatus::Success,
            RunOutcome::Failure => RunStatus::Failure,
        }
    }
}

/// 运行状态快照，按节点和设备展示当前进度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub job_id: i64,
    pub job_name: String,
    pub kind: RunKind,
    pub status: RunStatus,
    pub nodes: BTreeMap<i64, NodeState>,
    /// 按作业ID分组的设备结果，工作流中不同节点可以命中同一台设备
    pub devices: BTreeMap<i64, BTreeMap<String, RunResult>>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    pub fn started(run_id: Uuid, job_id: i64, job_name: impl Into<String>, kind: RunKind) -> Self {
        Self {
            run_id,
            job_id,
            job_name: job_name.into(),
            kind,
            status: RunStatus::Running,
            nodes: BTreeMap::new(),
            devices: BTreeMap::new(),
            failure_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != RunStatus::Running
    }

    pub fn device_result(&self, job_id: i64, device: &str) -> Option<&RunResult> {
        self.devices.get(&job_id).and_then(|results| results.get(device))
    }

    pub fn device_count(&self) -> usize {
        self.devices.values().map(BTreeMap::len).sum()
    }
}
