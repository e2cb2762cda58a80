//! 作业运行器
//!
//! 对一组目标设备执行一个服务作业：并发度受 `max_processes` 限制，
//! 每台设备在自己的任务里串行重试，结束后回写设备状态并发出结果事件，
//! 最后按汇总策略折叠为一个 [`JobRun`]。

use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use orchestrator_core::models::{
    Device, DeviceOutcomeEvent, DeviceStatusUpdate, Job, JobRun, RunResult,
};
use orchestrator_core::traits::{
    ExecutionContext, InventoryRepository, JobStrategy, RunEventSink,
};
use orchestrator_core::{OrchestratorError, Result, ResultAggregator, StrategyRegistry};
use orchestrator_infrastructure::{MetricsCollector, StructuredLogger};

use crate::device_locks::DeviceLocks;
use crate::retry_delay::{RetryDelay, TokioDelay};

const CANCELLED_BEFORE_START: &str = "运行已取消，设备未执行";

pub struct JobRunner {
    registry: Arc<StrategyRegistry>,
    inventory: Arc<dyn InventoryRepository>,
    events: Arc<dyn RunEventSink>,
    metrics: Arc<MetricsCollector>,
    delay: Arc<dyn RetryDelay>,
    device_locks: DeviceLocks,
}

/// 单台设备任务需要的共享状态
#[derive(Clone)]
struct DeviceTask {
    run_id: Uuid,
    job_id: i64,
    job_name: String,
    max_attempts: u32,
    retry_interval: Duration,
    parameters: Arc<Value>,
    payload: Arc<Value>,
    strategy: Arc<dyn JobStrategy>,
    inventory: Arc<dyn InventoryRepository>,
    events: Arc<dyn RunEventSink>,
    metrics: Arc<MetricsCollector>,
    delay: Arc<dyn RetryDelay>,
    device_locks: DeviceLocks,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        inventory: Arc<dyn InventoryRepository>,
        events: Arc<dyn RunEventSink>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registry,
            inventory,
            events,
            metrics,
            delay: Arc::new(TokioDelay),
            device_locks: DeviceLocks::new(),
        }
    }

    pub fn with_retry_delay(mut self, delay: Arc<dyn RetryDelay>) -> Self {
        self.delay = delay;
        self
    }

    /// 与其他运行器共享设备写锁
    pub fn with_device_locks(mut self, device_locks: DeviceLocks) -> Self {
        self.device_locks = device_locks;
        self
    }

    pub fn inventory(&self) -> Arc<dyn InventoryRepository> {
        Arc::clone(&self.inventory)
    }

    pub fn delay(&self) -> Arc<dyn RetryDelay> {
        Arc::clone(&self.delay)
    }

    pub fn events(&self) -> Arc<dyn RunEventSink> {
        Arc::clone(&self.events)
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// 执行一次服务作业调用
    ///
    /// 配置错误（不是服务作业、服务类型未注册、`max_processes` 为0、参数无效）
    /// 在任何设备执行之前直接返回 `Err`；单台设备的失败只记录在该设备的结果中。
    /// 重复的目标设备只执行一次。
    pub async fn run(
        &self,
        run_id: Uuid,
        job: &Job,
        targets: Vec<Device>,
        payload: Arc<Value>,
        cancel: &CancellationToken,
    ) -> Result<JobRun> {
        let spec = job.service().ok_or_else(|| {
            OrchestratorError::Configuration(format!("作业 {} 不是服务作业", job.name))
        })?;
        job.validate()?;
        let strategy = self.registry.resolve(&spec.service_type).await?;
        strategy.validate_parameters(&spec.parameters)?;

        let mut seen = HashSet::new();
        let targets: Vec<Device> = targets
            .into_iter()
            .filter(|d| seen.insert(d.name.clone()))
            .collect();

        let workers = job.worker_count(targets.len());
        let started_at = Utc::now();
        StructuredLogger::log_job_started(run_id, job.id, &job.name, targets.len(), workers);

        let template = DeviceTask {
            run_id,
            job_id: job.id,
            job_name: job.name.clone(),
            max_attempts: job.number_of_retries.saturating_add(1),
            retry_interval: Duration::from_secs(job.time_between_retries),
            parameters: Arc::new(spec.parameters.clone()),
            payload,
            strategy,
            inventory: Arc::clone(&self.inventory),
            events: Arc::clone(&self.events),
            metrics: Arc::clone(&self.metrics),
            delay: Arc::clone(&self.delay),
            device_locks: self.device_locks.clone(),
            cancel: cancel.clone(),
        };

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join_set = JoinSet::new();
        for device in targets {
            let task = template.clone();
            let semaphore = Arc::clone(&semaphore);
            let span = info_span!("device", device = %device.name, job = %job.name);
            join_set.spawn(
                async move {
                    let name = device.name.clone();
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => task.execute(device).await,
                        Err(_) => RunResult::failure("并发控制已关闭", 0),
                    };
                    task.finish(&name, &result).await;
                    (name, result)
                }
                .instrument(span),
            );
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, result)) => {
                    results.insert(name, result);
                }
                Err(e) => error!("作业 {} 的设备任务异常退出: {}", job.name, e),
            }
        }

        let (success, summary) = ResultAggregator::new(job.aggregation).fold_devices(&results);
        let run = JobRun {
            run_id,
            job_id: job.id,
            job_name: job.name.clone(),
            success,
            results,
            summary,
            started_at,
            finished_at: Utc::now(),
        };

        self.metrics.record_job_run(run.duration_seconds());
        StructuredLogger::log_job_completed(
            run_id,
            job.id,
            &job.name,
            success,
            summary.passed,
            summary.failed,
            run.duration_seconds(),
        );
        Ok(run)
    }
}

impl DeviceTask {
    /// 单台设备的重试循环，每次尝试前检查取消信号
    async fn execute(&self, device: Device) -> RunResult {
        let mut context = ExecutionContext {
            run_id: self.run_id,
            job_id: self.job_id,
            job_name: self.job_name.clone(),
            device,
            parameters: Arc::clone(&self.parameters),
            payload: Arc::clone(&self.payload),
            attempt: 0,
            inventory: Arc::clone(&self.inventory),
        };

        let mut last_error = String::new();
        while context.attempt < self.max_attempts {
            if self.cancel.is_cancelled() {
                if context.attempt == 0 {
                    return RunResult::failure(CANCELLED_BEFORE_START, 0);
                }
                break;
            }

            context.attempt += 1;
            self.metrics.record_device_attempt();

            match AssertUnwindSafe(self.strategy.execute(&context))
                .catch_unwind()
                .await
            {
                Ok(Ok(output)) if output.success => {
                    return RunResult::success(output.output, context.attempt);
                }
                Ok(Ok(output)) => last_error = output.output,
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = "执行策略异常终止".to_string(),
            }

            if context.attempt < self.max_attempts {
                StructuredLogger::log_device_retry(
                    &self.job_name,
                    &context.device.name,
                    context.attempt,
                    self.max_attempts,
                    &last_error,
                );
                self.delay.wait(self.retry_interval).await;
            }
        }

        RunResult::failure(last_error, context.attempt)
    }

    /// 回写设备状态并发出结果事件，状态写入失败只记录日志
    async fn finish(&self, device: &str, result: &RunResult) {
        let finished_at = Utc::now();
        self.metrics.record_device_outcome(result.success);

        // 未开始执行的设备不回写状态
        if result.attempt_count > 0 {
            let update = DeviceStatusUpdate::from_outcome(result.success, finished_at);
            let _guard = self.device_locks.acquire(device).await;
            if let Err(e) = self.inventory.write_device_status(device, &update).await {
                warn!("设备 {} 状态回写失败: {}", device, e);
            }
        }

        self.events.device_outcome(&DeviceOutcomeEvent {
            run_id: self.run_id,
            job_id: self.job_id,
            job_name: self.job_name.clone(),
            device: device.to_string(),
            success: result.success,
            output_or_error: result.output_or_error.clone(),
            attempt_count: result.attempt_count,
            timestamp: finished_at,
        });
    }
}
