use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use orchestrator_core::{AppConfig, ResourcePool};
use orchestrator_dispatcher::{RunController, RunRegistry, Scheduler, TargetResolver};
use orchestrator_infrastructure::{
    CompositeEventSink, FileCursorStore, FleetDefinition, MetricsCollector, StructuredLogger,
    TracingEventSink,
};
use orchestrator_worker::{default_registry, JobRunner};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{info, warn};

const SESSION_PORT_POOL: &str = "session_ports";

/// 主应用程序
///
/// 由配置和设备清单组装出运行控制器与调度器，所有仓储都在进程内。
pub struct Application {
    config: AppConfig,
    controller: Arc<RunController>,
    scheduler: Arc<Scheduler>,
    resolver: Arc<TargetResolver>,
    pool_ids: Vec<i64>,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub async fn new(config: AppConfig, fleet: FleetDefinition) -> Result<Self> {
        let pool_ids: Vec<i64> = fleet.pools.iter().map(|p| p.id).collect();
        let repos = fleet.into_repositories();
        let inventory = Arc::new(repos.inventory);
        let pools = Arc::new(repos.pools);
        let jobs = Arc::new(repos.jobs);
        let tasks = Arc::new(repos.tasks);

        let metrics = Arc::new(MetricsCollector::new().context("创建指标收集器失败")?);
        let strategies = Arc::new(default_registry().await);
        info!("已注册执行策略: {:?}", strategies.list_service_types().await);

        let runs = Arc::new(RunRegistry::with_history_limit(
            config.scheduler.run_history_limit,
        ));
        let events = CompositeEventSink::new()
            .with_sink(Arc::new(TracingEventSink))
            .with_sink(runs.clone());
        let runner = Arc::new(JobRunner::new(
            strategies,
            inventory.clone(),
            Arc::new(events),
            Arc::clone(&metrics),
        ));
        let resolver = Arc::new(TargetResolver::new(inventory, pools));

        let controller = Arc::new(RunController::new(
            jobs,
            tasks.clone(),
            Arc::clone(&resolver),
            runner,
            runs,
        ));
        let scheduler = Arc::new(Scheduler::new(
            tasks,
            controller.clone(),
            Arc::clone(&metrics),
            Duration::from_millis(config.scheduler.tick_interval_ms),
        ));

        Ok(Self {
            config,
            controller,
            scheduler,
            resolver,
            pool_ids,
            metrics,
        })
    }

    pub fn controller(&self) -> Arc<RunController> {
        Arc::clone(&self.controller)
    }

    /// 重新计算所有动态设备池的成员，单个设备池失败只记录日志
    pub async fn refresh_pools(&self) -> usize {
        let mut refreshed = 0;
        for pool_id in &self.pool_ids {
            match self.resolver.refresh_pool(*pool_id).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!("刷新设备池 {} 失败: {}", pool_id, e),
            }
        }
        refreshed
    }

    /// 运行调度循环直到收到关闭信号，然后等待已启动的运行结束
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.refresh_pools().await;
        let initialized = self.scheduler.initialize().await?;
        StructuredLogger::log_system_event(
            "scheduler_started",
            &format!("{initialized} 个计划任务已初始化"),
        );

        self.scheduler.run(shutdown_rx).await;

        let timeout = Duration::from_secs(self.config.scheduler.shutdown_timeout_seconds);
        info!("等待 {} 个进行中的运行结束", self.controller.active_runs());
        if !self.controller.wait_for_runs(timeout).await {
            let cancelled = self.controller.cancel_all();
            warn!("等待运行结束超时，已取消 {} 个运行", cancelled);
        }
        Ok(())
    }

    /// 立即执行一个作业或工作流，返回JSON格式的结果
    pub async fn run_once(&self, job_id: i64, targets: Option<Vec<String>>) -> Result<Value> {
        self.refresh_pools().await;
        let job = self.controller.get_job(job_id).await?;
        if job.is_workflow() {
            let run = self
                .controller
                .run_workflow(job_id, targets)
                .await
                .with_context(|| format!("运行工作流 {} 失败", job.name))?;
            Ok(serde_json::to_value(run)?)
        } else {
            let run = self
                .controller
                .run_job(job_id, targets)
                .await
                .with_context(|| format!("运行作业 {} 失败", job.name))?;
            Ok(serde_json::to_value(run)?)
        }
    }

    /// 从会话端口池中分配一个端口，游标持久化在配置的文件中
    pub async fn allocate_port(&self) -> Result<u64> {
        let ports = &self.config.session_ports;
        let store = Arc::new(FileCursorStore::new(&ports.cursor_file));
        let pool = ResourcePool::load(SESSION_PORT_POOL, ports.start_port, ports.end_port, store)
            .await
            .context("加载会话端口池失败")?;
        let port = pool.allocate().await.context("分配会话端口失败")?;
        self.metrics.record_port_allocation();
        Ok(port)
    }
}
