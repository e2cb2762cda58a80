use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 计划任务
///
/// 将一个作业（服务或工作流）绑定到触发时间上。
///
/// # 字段说明
///
/// - `start_date`: 首次触发时间
/// - `end_date`: 截止时间，过后不再触发
/// - `frequency`: 触发周期（秒），为空表示一次性任务
/// - `is_active`: 暂停时为假，调度器跳过该任务
/// - `next_run_time`: 下次触发时间，由调度器维护
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub job_id: i64,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frequency: Option<u64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub next_run_time: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Task {
    pub fn new(id: i64, name: impl Into<String>, job_id: i64, start_date: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            job_id,
            start_date,
            end_date: None,
            frequency: None,
            is_active: true,
            next_run_time: None,
        }
    }
}
