//! 运行控制器
//!
//! 对外提供的操作面：立即运行作业或工作流、查询运行快照、取消运行、
//! 暂停与恢复计划任务。调度器通过 [`RunLauncher`] 在后台启动运行，
//! 所有后台运行由同一个 `TaskTracker` 跟踪，关闭时可以等待它们结束。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use orchestrator_core::models::{Device, Job, JobKind, JobRun, RunKind, RunSnapshot, WorkflowRun};
use orchestrator_core::traits::{JobRepository, TaskRepository};
use orchestrator_core::{OrchestratorError, Result};
use orchestrator_worker::JobRunner;

use crate::run_registry::RunRegistry;
use crate::scheduler::{pause_task, resume_task, RunLauncher};
use crate::target_resolver::TargetResolver;
use crate::workflow_engine::WorkflowEngine;

#[derive(Clone)]
pub struct RunController {
    jobs: Arc<dyn JobRepository>,
    tasks: Arc<dyn TaskRepository>,
    resolver: Arc<TargetResolver>,
    runner: Arc<JobRunner>,
    engine: Arc<WorkflowEngine>,
    registry: Arc<RunRegistry>,
    tracker: TaskTracker,
}

impl RunController {
    /// `registry` 应当同时挂在运行器的事件出口上，快照才能实时反映设备和节点进度
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        tasks: Arc<dyn TaskRepository>,
        resolver: Arc<TargetResolver>,
        runner: Arc<JobRunner>,
        registry: Arc<RunRegistry>,
    ) -> Self {
        let engine = Arc::new(WorkflowEngine::new(
            Arc::clone(&jobs),
            Arc::clone(&resolver),
            Arc::clone(&runner),
        ));
        Self {
            jobs,
            tasks,
            resolver,
            runner,
            engine,
            registry,
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> Arc<RunRegistry> {
        Arc::clone(&self.registry)
    }

    /// 立即运行一个服务作业并等待结果
    ///
    /// `target_override` 为设备名称列表，提供时替代作业自身的目标选择。
    pub async fn run_job(&self, job_id: i64, target_override: Option<Vec<String>>) -> Result<JobRun> {
        let job = self.get_job(job_id).await?;
        if job.is_workflow() {
            return Err(OrchestratorError::Configuration(format!(
                "作业 {} 是工作流，请使用工作流运行接口",
                job.name
            )));
        }

        let run_id = Uuid::new_v4();
        let cancel = self
            .registry
            .register(RunSnapshot::started(run_id, job.id, &job.name, RunKind::Service));
        self.execute_service(run_id, &job, target_override, &cancel).await
    }

    /// 立即运行一个工作流并等待结果
    ///
    /// 工作流本身的结构错误体现在返回的运行记录里，只有工作流不存在或
    /// 目标覆盖列表无法解析时才返回 `Err`。
    pub async fn run_workflow(
        &self,
        workflow_id: i64,
        target_override: Option<Vec<String>>,
    ) -> Result<WorkflowRun> {
        let workflow = self.get_job(workflow_id).await?;
        if !workflow.is_workflow() {
            return Err(OrchestratorError::Configuration(format!(
                "作业 {} 不是工作流",
                workflow.name
            )));
        }

        let run_id = Uuid::new_v4();
        let cancel = self.registry.register(RunSnapshot::started(
            run_id,
            workflow.id,
            &workflow.name,
            RunKind::Workflow,
        ));
        self.execute_workflow(run_id, &workflow, target_override, &cancel)
            .await
    }

    async fn execute_service(
        &self,
        run_id: Uuid,
        job: &Job,
        target_override: Option<Vec<String>>,
        cancel: &CancellationToken,
    ) -> Result<JobRun> {
        let span = info_span!("job", run_id = %run_id, job = %job.name);
        let result = async {
            let targets = self.targets_for(job, target_override).await?;
            self.runner
                .run(run_id, job, targets, Arc::new(serde_json::json!({})), cancel)
                .await
        }
        .instrument(span)
        .await;

        match &result {
            Ok(run) => self.registry.complete_job(run),
            Err(e) => self.registry.fail(run_id, e.to_string()),
        }
        result
    }

    async fn execute_workflow(
        &self,
        run_id: Uuid,
        workflow: &Job,
        target_override: Option<Vec<String>>,
        cancel: &CancellationToken,
    ) -> Result<WorkflowRun> {
        let targets = match target_override {
            Some(names) => match self.resolver.resolve_devices(&workflow.name, &names).await {
                Ok(devices) => Some(devices),
                Err(e) => {
                    self.registry.fail(run_id, e.to_string());
                    return Err(e);
                }
            },
            None => None,
        };

        let run = self.engine.run(run_id, workflow, targets, cancel).await;
        self.registry.complete_workflow(&run);
        Ok(run)
    }

    async fn targets_for(&self, job: &Job, target_override: Option<Vec<String>>) -> Result<Vec<Device>> {
        match target_override {
            Some(names) => self.resolver.resolve_devices(&job.name, &names).await,
            None => self.resolver.resolve_job_targets(job).await,
        }
    }

    pub async fn pause_task(&self, task_id: i64) -> Result<()> {
        pause_task(self.tasks.as_ref(), task_id).await
    }

    /// 恢复计划任务，返回重新计算的下次触发时间
    pub async fn resume_task(&self, task_id: i64) -> Result<DateTime<Utc>> {
        resume_task(self.tasks.as_ref(), task_id, Utc::now()).await
    }

    pub fn get_run_status(&self, run_id: Uuid) -> Result<RunSnapshot> {
        self.registry
            .snapshot(run_id)
            .ok_or_else(|| OrchestratorError::RunNotFound {
                id: run_id.to_string(),
            })
    }

    pub fn list_runs(&self) -> Vec<RunSnapshot> {
        self.registry.list()
    }

    /// 请求取消运行
    ///
    /// 取消是协作式的：正在执行的尝试会完成，之后不再开始新的尝试或节点。
    /// 已经结束的运行保持不变。
    pub fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let snapshot = self.get_run_status(run_id)?;
        if self.registry.cancel(run_id) {
            info!("已请求取消运行 {} ({})", run_id, snapshot.job_name);
        } else {
            warn!("运行 {} 已经结束，忽略取消请求", run_id);
        }
        Ok(())
    }

    pub fn active_runs(&self) -> usize {
        self.tracker.len()
    }

    /// 停止接收新的后台运行并等待已有运行结束，超时返回 `false`
    pub async fn wait_for_runs(&self, timeout: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }

    /// 取消所有未结束的运行
    pub fn cancel_all(&self) -> usize {
        self.registry
            .list()
            .into_iter()
            .filter(|snapshot| self.registry.cancel(snapshot.run_id))
            .count()
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Job> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound { id: job_id })
    }
}

#[async_trait]
impl RunLauncher for RunController {
    async fn launch(&self, job_id: i64) -> Result<Uuid> {
        if self.tracker.is_closed() {
            return Err(OrchestratorError::Scheduling(
                "运行控制器正在关闭，拒绝新的运行".to_string(),
            ));
        }

        let job = self.get_job(job_id).await?;
        let kind = match job.kind {
            JobKind::Service(_) => RunKind::Service,
            JobKind::Workflow(_) => RunKind::Workflow,
        };
        let run_id = Uuid::new_v4();
        let cancel = self
            .registry
            .register(RunSnapshot::started(run_id, job.id, &job.name, kind));

        let controller = self.clone();
        self.tracker.spawn(async move {
            match kind {
                RunKind::Service => {
                    if let Err(e) = controller.execute_service(run_id, &job, None, &cancel).await {
                        warn!("计划运行 {} ({}) 失败: {}", run_id, job.name, e);
                    }
                }
                RunKind::Workflow => {
                    if let Err(e) = controller.execute_workflow(run_id, &job, None, &cancel).await {
                        warn!("计划运行 {} ({}) 失败: {}", run_id, job.name, e);
                    }
                }
            }
        });
        Ok(run_id)
    }
}
