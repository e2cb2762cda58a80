use serde::{Deserialize, Serialize};

use crate::aggregation::AggregationPolicy;
use crate::errors::{OrchestratorError, Result};

/// 作业定义
///
/// 作业是自动化工作的基本单元，有两种形态：
/// - `Service`: 叶子作业，对每台目标设备执行一次已注册的执行策略
/// - `Workflow`: 组合作业，由成员作业和带结果类型的边组成有向无环图
///
/// # 字段说明
///
/// - `number_of_retries`: 单台设备失败后的额外重试次数，总尝试次数不超过 `number_of_retries + 1`
/// - `time_between_retries`: 同一设备两次尝试之间的等待秒数
/// - `max_processes`: 单次调用中并发执行的设备数上限，必须大于0
/// - `multiprocessing`: 为假时强制逐台串行执行
/// - `devices` / `pools`: 显式选择的设备名称和目标设备池，两者取并集
/// - `waiting_time`: 工作流中该节点结束后、进入后继节点之前的等待秒数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub number_of_retries: u32,
    #[serde(default)]
    pub time_between_retries: u64,
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    #[serde(default)]
    pub multiprocessing: bool,
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub pools: Vec<i64>,
    #[serde(default)]
    pub aggregation: AggregationPolicy,
    #[serde(default)]
    pub waiting_time: u64,
    pub kind: JobKind,
}

fn default_max_processes() -> usize {
    5
}

/// 作业形态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    Service(ServiceSpec),
    Workflow(WorkflowSpec),
}

/// 服务作业配置，`parameters` 在加载时校验，运行期间只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub service_type: String,
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// 工作流作业配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// 成员作业ID
    #[serde(default)]
    pub jobs: Vec<i64>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    /// 显式指定的起始作业，未指定时使用所有入度为0的成员
    #[serde(default)]
    pub start_job: Option<i64>,
    /// 为真时运行的目标覆盖列表会下发给所有成员服务
    #[serde(default)]
    pub use_workflow_targets: bool,
}

/// 工作流中的有向边
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub source_job_id: i64,
    pub destination_job_id: i64,
    pub subtype: EdgeSubtype,
}

impl WorkflowEdge {
    pub fn success(source_job_id: i64, destination_job_id: i64) -> Self {
        Self {
            source_job_id,
            destination_job_id,
            subtype: EdgeSubtype::Success,
        }
    }

    pub fn failure(source_job_id: i64, destination_job_id: i64) -> Self {
        Self {
            source_job_id,
            destination_job_id,
            subtype: EdgeSubtype::Failure,
        }
    }
}

/// 边的类型，只有源节点的结果与之一致时该边才可通行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeSubtype {
    Success,
    Failure,
}

impl EdgeSubtype {
    pub fn matches(&self, success: bool) -> bool {
        match self {
            EdgeSubtype::Success => success,
            EdgeSubtype::Failure => !success,
        }
    }
}

impl Job {
    pub fn is_workflow(&self) -> bool {
        matches!(self.kind, JobKind::Workflow(_))
    }

    pub fn service(&self) -> Option<&ServiceSpec> {
        match &self.kind {
            JobKind::Service(spec) => Some(spec),
            JobKind::Workflow(_) => None,
        }
    }

    pub fn workflow(&self) -> Option<&WorkflowSpec> {
        match &self.kind {
            JobKind::Workflow(spec) => Some(spec),
            JobKind::Service(_) => None,
        }
    }

    /// 单次调用的实际并发数
    pub fn worker_count(&self, target_count: usize) -> usize {
        if !self.multiprocessing {
            return 1;
        }
        self.max_processes.min(target_count).max(1)
    }

    /// 加载作业定义时进行的配置校验
    pub fn validate(&self) -> Result<()> {
        if self.max_processes == 0 {
            return Err(OrchestratorError::Configuration(format!(
                "作业 {} 的 max_processes 必须大于0",
                self.name
            )));
        }
        match &self.kind {
            JobKind::Service(spec) => {
                if spec.service_type.trim().is_empty() {
                    return Err(OrchestratorError::Configuration(format!(
                        "服务 {} 未指定服务类型",
                        self.name
                    )));
                }
                if !spec.parameters.is_object() {
                    return Err(OrchestratorError::Configuration(format!(
                        "服务 {} 的参数必须是JSON对象",
                        self.name
                    )));
                }
            }
            JobKind::Workflow(spec) => {
                if spec.jobs.contains(&self.id) {
                    return Err(OrchestratorError::Configuration(format!(
                        "工作流 {} 不能包含自身",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}
