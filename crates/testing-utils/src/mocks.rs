//! 测试替身
//!
//! 执行策略的结果可以按设备、按尝试次数预先编排，事件与延时只记录不生效。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use orchestrator_core::models::{DeviceOutcomeEvent, NodeTransition, WorkflowTransitionEvent};
use orchestrator_core::traits::{ExecutionContext, ExecutionOutput, JobStrategy, RunEventSink};
use orchestrator_core::{OrchestratorError, Result};
use orchestrator_worker::RetryDelay;

/// 单次尝试的预设结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Pass,
    /// 返回 `success = false`
    Fail,
    /// 返回 `Err(Execution)`
    Error,
}

/// 按脚本返回结果的执行策略
///
/// 每台设备可以单独编排每次尝试的结果，超出脚本长度后重复最后一项；
/// 未编排的设备使用默认结果。
#[derive(Clone)]
pub struct ScriptedStrategy {
    name: String,
    default: Attempt,
    plans: Arc<Mutex<HashMap<String, Vec<Attempt>>>>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
    payloads: Arc<Mutex<Vec<serde_json::Value>>>,
    latency: Duration,
}

impl ScriptedStrategy {
    pub fn new(name: &str, default: Attempt) -> Self {
        Self {
            name: name.to_string(),
            default,
            plans: Arc::new(Mutex::new(HashMap::new())),
            attempts: Arc::new(Mutex::new(HashMap::new())),
            payloads: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    pub fn passing(name: &str) -> Self {
        Self::new(name, Attempt::Pass)
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, Attempt::Fail)
    }

    pub fn with_plan(self, device: &str, plan: Vec<Attempt>) -> Self {
        self.plans.lock().unwrap().insert(device.to_string(), plan);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn attempts_for(&self, device: &str) -> u32 {
        self.attempts.lock().unwrap().get(device).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionOutput> {
        let device = context.device.name.clone();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(device.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.payloads
            .lock()
            .unwrap()
            .push(context.payload.as_ref().clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = {
            let plans = self.plans.lock().unwrap();
            match plans.get(&device) {
                Some(plan) if !plan.is_empty() => {
                    let index = (attempt as usize - 1).min(plan.len() - 1);
                    plan[index]
                }
                _ => self.default,
            }
        };

        match outcome {
            Attempt::Pass => Ok(ExecutionOutput::success(format!("{device} ok #{attempt}"))),
            Attempt::Fail => Ok(ExecutionOutput::failure(format!("{device} failed #{attempt}"))),
            Attempt::Error => Err(OrchestratorError::Execution(format!(
                "{device} unreachable #{attempt}"
            ))),
        }
    }
}

/// 统计同时执行中的尝试数量
#[derive(Clone)]
pub struct ConcurrencyProbeStrategy {
    name: String,
    hold: Duration,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ConcurrencyProbeStrategy {
    pub fn new(name: &str, hold: Duration) -> Self {
        Self {
            name: name.to_string(),
            hold,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStrategy for ConcurrencyProbeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _context: &ExecutionContext) -> Result<ExecutionOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(ExecutionOutput::success("probed"))
    }
}

/// 记录全部运行事件
#[derive(Default)]
pub struct RecordingEventSink {
    devices: Mutex<Vec<DeviceOutcomeEvent>>,
    transitions: Mutex<Vec<WorkflowTransitionEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_events(&self) -> Vec<DeviceOutcomeEvent> {
        self.devices.lock().unwrap().clone()
    }

    pub fn transitions(&self) -> Vec<WorkflowTransitionEvent> {
        self.transitions.lock().unwrap().clone()
    }

    /// 按进入顺序返回节点ID
    pub fn entered_nodes(&self) -> Vec<i64> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.transition == NodeTransition::Entered)
            .map(|e| e.job_id)
            .collect()
    }
}

impl RunEventSink for RecordingEventSink {
    fn device_outcome(&self, event: &DeviceOutcomeEvent) {
        self.devices.lock().unwrap().push(event.clone());
    }

    fn workflow_transition(&self, event: &WorkflowTransitionEvent) {
        self.transitions.lock().unwrap().push(event.clone());
    }
}

/// 只记录等待时长，不真正休眠
#[derive(Default)]
pub struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetryDelay for RecordingDelay {
    async fn wait(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}
