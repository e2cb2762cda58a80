//! 结构化日志
//!
//! 编排器的关键事件都通过这里输出，字段名保持稳定，便于日志检索。

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use orchestrator_core::models::{DeviceOutcomeEvent, NodeTransition, WorkflowTransitionEvent};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_job_started(run_id: Uuid, job_id: i64, job_name: &str, target_count: usize, workers: usize) {
        info!(
            event = "job_started",
            run.id = %run_id,
            job.id = job_id,
            job.name = job_name,
            job.targets = target_count,
            job.workers = workers,
            "作业开始执行"
        );
    }

    pub fn log_job_completed(
        run_id: Uuid,
        job_id: i64,
        job_name: &str,
        success: bool,
        passed: usize,
        failed: usize,
        duration_seconds: f64,
    ) {
        if success {
            info!(
                event = "job_completed",
                run.id = %run_id,
                job.id = job_id,
                job.name = job_name,
                job.passed = passed,
                job.failed = failed,
                job.duration_seconds = duration_seconds,
                "作业执行成功"
            );
        } else {
            warn!(
                event = "job_failed",
                run.id = %run_id,
                job.id = job_id,
                job.name = job_name,
                job.passed = passed,
                job.failed = failed,
                job.duration_seconds = duration_seconds,
                "作业执行失败"
            );
        }
    }

    pub fn log_device_outcome(event: &DeviceOutcomeEvent) {
        if event.success {
            info!(
                event = "device_outcome",
                run.id = %event.run_id,
                job.id = event.job_id,
                job.name = %event.job_name,
                device = %event.device,
                success = event.success,
                attempts = event.attempt_count,
                "设备执行成功"
            );
        } else {
            warn!(
                event = "device_outcome",
                run.id = %event.run_id,
                job.id = event.job_id,
                job.name = %event.job_name,
                device = %event.device,
                success = event.success,
                attempts = event.attempt_count,
                error = %event.output_or_error,
                "设备执行失败"
            );
        }
    }

    pub fn log_device_retry(job_name: &str, device: &str, attempt: u32, max_attempts: u32, reason: &str) {
        warn!(
            event = "device_retry",
            job.name = job_name,
            device = device,
            attempt = attempt,
            max_attempts = max_attempts,
            reason = reason,
            "设备执行失败，准备重试"
        );
    }

    pub fn log_workflow_transition(event: &WorkflowTransitionEvent) {
        let transition = match event.transition {
            NodeTransition::Entered => "entered",
            NodeTransition::Exited => "exited",
        };
        info!(
            event = "workflow_transition",
            run.id = %event.run_id,
            workflow.id = event.workflow_id,
            node.id = event.job_id,
            node.name = %event.job_name,
            transition = transition,
            state = ?event.state,
            "工作流节点状态变更"
        );
    }

    pub fn log_workflow_completed(
        run_id: Uuid,
        workflow_id: i64,
        workflow_name: &str,
        success: bool,
        failure_reason: Option<&str>,
    ) {
        if success {
            info!(
                event = "workflow_completed",
                run.id = %run_id,
                workflow.id = workflow_id,
                workflow.name = workflow_name,
                "工作流执行成功"
            );
        } else {
            warn!(
                event = "workflow_failed",
                run.id = %run_id,
                workflow.id = workflow_id,
                workflow.name = workflow_name,
                reason = failure_reason.unwrap_or("存在未处理的失败节点"),
                "工作流执行失败"
            );
        }
    }

    pub fn log_task_dispatched(task_id: i64, task_name: &str, job_id: i64, run_id: Uuid) {
        info!(
            event = "task_dispatched",
            task.id = task_id,
            task.name = task_name,
            job.id = job_id,
            run.id = %run_id,
            "计划任务已触发"
        );
    }

    pub fn log_task_rescheduled(task_id: i64, task_name: &str, next_run_time: Option<DateTime<Utc>>) {
        match next_run_time {
            Some(next) => debug!(
                event = "task_rescheduled",
                task.id = task_id,
                task.name = task_name,
                task.next_run_time = %next,
                "计划任务下次触发时间已更新"
            ),
            None => debug!(
                event = "task_rescheduled",
                task.id = task_id,
                task.name = task_name,
                "计划任务不再触发"
            ),
        }
    }

    pub fn log_task_state_changed(task_id: i64, task_name: &str, is_active: bool) {
        info!(
            event = "task_state_changed",
            task.id = task_id,
            task.name = task_name,
            task.active = is_active,
            "计划任务状态已变更"
        );
    }

    pub fn log_scheduling_error(task_id: i64, task_name: &str, error_message: &str) {
        error!(
            event = "scheduling_error",
            task.id = task_id,
            task.name = task_name,
            error = error_message,
            "计划任务调度失败"
        );
    }

    pub fn log_pool_refreshed(pool_id: i64, pool_name: &str, member_count: usize) {
        info!(
            event = "pool_refreshed",
            pool.id = pool_id,
            pool.name = pool_name,
            pool.members = member_count,
            "设备池成员已刷新"
        );
    }

    pub fn log_system_event(event_type: &str, message: &str) {
        info!(event = "system_event", system.event_type = event_type, "{}", message);
    }
}
