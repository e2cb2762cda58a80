//! 计划任务调度器
//!
//! 单一调度循环：每个周期扫描计划任务，到期的任务通过 [`RunLauncher`] 异步启动，
//! 调度器只决定何时启动，不等待运行结束。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use orchestrator_core::models::Task;
use orchestrator_core::traits::TaskRepository;
use orchestrator_core::{OrchestratorError, Result};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::trigger::TriggerSchedule;

/// 启动一次作业运行并立即返回运行ID
#[async_trait]
pub trait RunLauncher: Send + Sync {
    async fn launch(&self, job_id: i64) -> Result<Uuid>;
}

/// 一次调度周期中被触发的任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task_id: i64,
    pub job_id: i64,
    pub run_id: Uuid,
}

pub struct Scheduler {
    tasks: Arc<dyn TaskRepository>,
    launcher: Arc<dyn RunLauncher>,
    metrics: Arc<MetricsCollector>,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        launcher: Arc<dyn RunLauncher>,
        metrics: Arc<MetricsCollector>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            tasks,
            launcher,
            metrics,
            tick_interval,
        }
    }

    /// 为尚未设置下次触发时间的任务写入 `start_date`
    pub async fn initialize(&self) -> Result<usize> {
        let mut initialized = 0;
        for task in self.tasks.list_tasks().await? {
            if task.next_run_time.is_none() && task.is_active {
                self.tasks
                    .update_next_run_time(task.id, Some(task.start_date))
                    .await?;
                initialized += 1;
            }
        }
        info!("调度器初始化完成，{} 个计划任务设置了首次触发时间", initialized);
        Ok(initialized)
    }

    /// 执行一个调度周期
    ///
    /// 单个任务的错误只记录日志，不影响其他任务，也不终止调度循环。
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<Dispatch>> {
        let mut dispatched = Vec::new();
        for task in self.tasks.list_tasks().await? {
            if !task.is_active {
                continue;
            }
            match self.process_task(&task, now).await {
                Ok(Some(dispatch)) => dispatched.push(dispatch),
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_scheduling_error();
                    StructuredLogger::log_scheduling_error(task.id, &task.name, &e.to_string());
                }
            }
        }

        if !dispatched.is_empty() {
            info!("本次调度触发了 {} 个计划任务", dispatched.len());
        }
        Ok(dispatched)
    }

    async fn process_task(&self, task: &Task, now: DateTime<Utc>) -> Result<Option<Dispatch>> {
        let schedule = TriggerSchedule::from_task(task)?;
        if schedule.has_ended(now) {
            debug!("计划任务 {} 已过截止时间，跳过", task.name);
            return Ok(None);
        }

        let due = task.next_run_time.unwrap_or(schedule.first_run_time());
        if now < due {
            if task.next_run_time.is_none() {
                self.tasks.update_next_run_time(task.id, Some(due)).await?;
            }
            return Ok(None);
        }

        // 下次触发时间无法计算时不启动，避免每个周期重复触发
        let next = schedule.next_after(due, now)?;
        let launched = self.launcher.launch(task.job_id).await;

        // 无论启动是否成功都推进触发时间
        match next {
            Some(next) => {
                self.tasks.update_next_run_time(task.id, Some(next)).await?;
                StructuredLogger::log_task_rescheduled(task.id, &task.name, Some(next));
            }
            None => {
                self.tasks.set_active(task.id, false).await?;
                self.tasks.update_next_run_time(task.id, None).await?;
                StructuredLogger::log_task_rescheduled(task.id, &task.name, None);
            }
        }

        let run_id = launched?;
        self.metrics.record_task_dispatch();
        StructuredLogger::log_task_dispatched(task.id, &task.name, task.job_id, run_id);
        Ok(Some(Dispatch {
            task_id: task.id,
            job_id: task.job_id,
            run_id,
        }))
    }

    /// 暂停计划任务，已经启动的运行不受影响
    pub async fn pause(&self, task_id: i64) -> Result<()> {
        pause_task(self.tasks.as_ref(), task_id).await
    }

    /// 恢复计划任务，下次触发时间从当前时间重新计算
    pub async fn resume(&self, task_id: i64, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        resume_task(self.tasks.as_ref(), task_id, now).await
    }

    /// 调度循环，收到关闭信号后退出
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("调度循环已启动，间隔 {:?}", self.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("收到关闭信号，调度循环退出");
                    break;
                }
                _ = interval.tick() => {
                    let span = info_span!("scheduler_tick");
                    if let Err(e) = self.tick(Utc::now()).instrument(span).await {
                        error!("调度周期执行失败: {}", e);
                    }
                }
            }
        }
    }
}

async fn load_task(tasks: &dyn TaskRepository, task_id: i64) -> Result<Task> {
    tasks
        .get_task(task_id)
        .await?
        .ok_or(OrchestratorError::TaskNotFound { id: task_id })
}

pub(crate) async fn pause_task(tasks: &dyn TaskRepository, task_id: i64) -> Result<()> {
    let task = load_task(tasks, task_id).await?;
    tasks.set_active(task_id, false).await?;
    StructuredLogger::log_task_state_changed(task_id, &task.name, false);
    Ok(())
}

pub(crate) async fn resume_task(
    tasks: &dyn TaskRepository,
    task_id: i64,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let task = load_task(tasks, task_id).await?;
    let next = TriggerSchedule::from_task(&task)?.resume_from(now)?;

    tasks.update_next_run_time(task_id, Some(next)).await?;
    tasks.set_active(task_id, true).await?;
    StructuredLogger::log_task_state_changed(task_id, &task.name, true);
    StructuredLogger::log_task_rescheduled(task_id, &task.name, Some(next));
    Ok(next)
}
