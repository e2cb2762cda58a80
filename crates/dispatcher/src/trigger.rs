use chrono::{DateTime, Duration, Utc};

use orchestrator_core::models::Task;
use orchestrator_core::{OrchestratorError, Result};

/// 计划任务的触发时间计算
///
/// 周期任务的触发点为 `start_date + k·frequency`，一次性任务只在 `start_date` 触发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSchedule {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    frequency: Option<Duration>,
}

impl TriggerSchedule {
    /// 校验并构建触发器，定义无效时返回调度错误
    pub fn from_task(task: &Task) -> Result<Self> {
        if let Some(end) = task.end_date {
            if end < task.start_date {
                return Err(OrchestratorError::Scheduling(format!(
                    "计划任务 {} 的截止时间 {} 早于开始时间 {}",
                    task.name, end, task.start_date
                )));
            }
        }

        let frequency = match task.frequency {
            None => None,
            Some(0) => {
                return Err(OrchestratorError::Scheduling(format!(
                    "计划任务 {} 的触发周期必须大于0",
                    task.name
                )))
            }
            Some(seconds) => {
                let seconds = i64::try_from(seconds).map_err(|_| {
                    OrchestratorError::Scheduling(format!(
                        "计划任务 {} 的触发周期过大: {}",
                        task.name, seconds
                    ))
                })?;
                Some(Duration::try_seconds(seconds).ok_or_else(|| {
                    OrchestratorError::Scheduling(format!(
                        "计划任务 {} 的触发周期过大: {}",
                        task.name, seconds
                    ))
                })?)
            }
        };

        Ok(Self {
            start: task.start_date,
            end: task.end_date,
            frequency,
        })
    }

    pub fn first_run_time(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| now > end)
    }

    /// 本次触发之后的下一个触发点，严格晚于 `now`
    ///
    /// 错过的多个周期合并为一次触发，一次性任务返回 `None`。
    pub fn next_after(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let Some(frequency) = self.frequency else {
            return Ok(None);
        };
        let period = frequency.num_seconds();
        let elapsed = (now - due).num_seconds();
        let periods = if elapsed < 0 { 1 } else { elapsed / period + 1 };
        shift(due, period, periods).map(Some)
    }

    /// 恢复任务时的下一个触发点：不早于 `now` 的第一个触发点
    pub fn resume_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let Some(frequency) = self.frequency else {
            return Ok(self.start.max(now));
        };
        if now <= self.start {
            return Ok(self.start);
        }

        let period = frequency.num_seconds();
        let elapsed = (now - self.start).num_seconds();
        let periods = elapsed / period;
        let candidate = shift(self.start, period, periods)?;
        if candidate < now {
            shift(self.start, period, periods + 1)
        } else {
            Ok(candidate)
        }
    }
}

/// `from + period·periods`，超出可表示的时间范围时返回调度错误
fn shift(from: DateTime<Utc>, period: i64, periods: i64) -> Result<DateTime<Utc>> {
    period
        .checked_mul(periods)
        .and_then(Duration::try_seconds)
        .and_then(|offset| from.checked_add_signed(offset))
        .ok_or_else(|| {
            OrchestratorError::Scheduling(format!(
                "触发时间超出范围: {from} + {periods} × {period} 秒"
            ))
        })
}
