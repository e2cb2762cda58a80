//! 编排器指标
//!
//! 使用 `metrics` 门面记录，是否导出由二进制入口决定。

use anyhow::Result;
use metrics::{counter, histogram, Counter, Histogram};

pub struct MetricsCollector {
    device_attempts_total: Counter,
    device_success_total: Counter,
    device_failure_total: Counter,
    job_runs_total: Counter,
    job_duration: Histogram,
    workflow_runs_total: Counter,
    workflow_failures_total: Counter,
    task_dispatches_total: Counter,
    scheduling_errors_total: Counter,
    session_ports_allocated_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            device_attempts_total: counter!("orchestrator_device_attempts_total"),
            device_success_total: counter!("orchestrator_device_outcomes_total", "result" => "success"),
            device_failure_total: counter!("orchestrator_device_outcomes_total", "result" => "failure"),
            job_runs_total: counter!("orchestrator_job_runs_total"),
            job_duration: histogram!("orchestrator_job_duration_seconds"),
            workflow_runs_total: counter!("orchestrator_workflow_runs_total"),
            workflow_failures_total: counter!("orchestrator_workflow_failures_total"),
            task_dispatches_total: counter!("orchestrator_task_dispatches_total"),
            scheduling_errors_total: counter!("orchestrator_scheduling_errors_total"),
            session_ports_allocated_total: counter!("orchestrator_session_ports_allocated_total"),
        })
    }

    pub fn record_device_attempt(&self) {
        self.device_attempts_total.increment(1);
    }

    pub fn record_device_outcome(&self, success: bool) {
        if success {
            self.device_success_total.increment(1);
        } else {
            self.device_failure_total.increment(1);
        }
    }

    pub fn record_job_run(&self, duration_seconds: f64) {
        self.job_runs_total.increment(1);
        self.job_duration.record(duration_seconds);
    }

    pub fn record_workflow_run(&self, success: bool) {
        self.workflow_runs_total.increment(1);
        if !success {
            self.workflow_failures_total.increment(1);
        }
    }

    pub fn record_task_dispatch(&self) {
        self.task_dispatches_total.increment(1);
    }

    pub fn record_scheduling_error(&self) {
        self.scheduling_errors_total.increment(1);
    }

    pub fn record_port_allocation(&self) {
        self.session_ports_allocated_total.increment(1);
    }
}
