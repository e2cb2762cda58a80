use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use orchestrator_core::models::{
    DeviceOutcomeEvent, JobRun, RunResult, RunSnapshot, RunStatus, WorkflowRun,
    WorkflowTransitionEvent,
};
use orchestrator_core::traits::RunEventSink;

struct RunEntry {
    snapshot: RunSnapshot,
    cancel: CancellationToken,
    /// 结束顺序，淘汰时按它从小到大
    finished_seq: Option<u64>,
}

/// 默认保留的已结束运行数量
pub const DEFAULT_RUN_HISTORY_LIMIT: usize = 1000;

/// 运行实例登记表
///
/// 保存每个运行的状态快照与取消令牌，同时作为事件出口随设备结果、
/// 节点状态变化实时更新快照。已结束的运行最多保留 `history_limit` 个，
/// 超出后淘汰最早结束的，进行中的运行不受影响。
pub struct RunRegistry {
    runs: RwLock<HashMap<Uuid, RunEntry>>,
    history_limit: usize,
    finished_counter: AtomicU64,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_RUN_HISTORY_LIMIT)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            history_limit: history_limit.max(1),
            finished_counter: AtomicU64::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, RunEntry>> {
        self.runs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, RunEntry>> {
        self.runs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 登记新的运行，返回其取消令牌
    pub fn register(&self, snapshot: RunSnapshot) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.write().insert(
            snapshot.run_id,
            RunEntry {
                snapshot,
                cancel: cancel.clone(),
                finished_seq: None,
            },
        );
        cancel
    }

    pub fn snapshot(&self, run_id: Uuid) -> Option<RunSnapshot> {
        self.read().get(&run_id).map(|entry| entry.snapshot.clone())
    }

    pub fn list(&self) -> Vec<RunSnapshot> {
        let mut runs: Vec<RunSnapshot> = self.read().values().map(|e| e.snapshot.clone()).collect();
        runs.sort_by_key(|s| s.started_at);
        runs
    }

    /// 触发取消令牌，运行不存在或已结束时返回 `false`
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.read().get(&run_id) {
            Some(entry) if !entry.snapshot.is_finished() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn complete_job(&self, run: &JobRun) {
        let mut runs = self.write();
        if let Some(entry) = runs.get_mut(&run.run_id) {
            entry
                .snapshot
                .devices
                .insert(run.job_id, run.results.clone());
            entry.snapshot.status = if run.success {
                RunStatus::Success
            } else {
                RunStatus::Failure
            };
            entry.snapshot.finished_at = Some(run.finished_at);
            entry.finished_seq = Some(self.next_seq());
        }
        self.evict_finished(&mut runs);
    }

    pub fn complete_workflow(&self, run: &WorkflowRun) {
        let mut runs = self.write();
        if let Some(entry) = runs.get_mut(&run.run_id) {
            entry.snapshot.nodes = run.states.clone();
            entry.snapshot.status = run.outcome.into();
            entry.snapshot.failure_reason = run.failure_reason.clone();
            entry.snapshot.finished_at = Some(run.finished_at);
            entry.finished_seq = Some(self.next_seq());
        }
        self.evict_finished(&mut runs);
    }

    pub fn fail(&self, run_id: Uuid, reason: impl Into<String>) {
        let mut runs = self.write();
        if let Some(entry) = runs.get_mut(&run_id) {
            entry.snapshot.status = RunStatus::Failure;
            entry.snapshot.failure_reason = Some(reason.into());
            entry.snapshot.finished_at = Some(Utc::now());
            entry.finished_seq = Some(self.next_seq());
        }
        self.evict_finished(&mut runs);
    }

    fn next_seq(&self) -> u64 {
        self.finished_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// 淘汰超出保留数量的已结束运行，最早结束的先淘汰
    fn evict_finished(&self, runs: &mut HashMap<Uuid, RunEntry>) {
        let mut finished: Vec<(u64, Uuid)> = runs
            .iter()
            .filter_map(|(id, entry)| entry.finished_seq.map(|seq| (seq, *id)))
            .collect();
        if finished.len() <= self.history_limit {
            return;
        }

        finished.sort_unstable();
        let excess = finished.len() - self.history_limit;
        for (_, run_id) in finished.into_iter().take(excess) {
            runs.remove(&run_id);
        }
        debug!("已淘汰 {} 个已结束的运行快照", excess);
    }
}

impl RunEventSink for RunRegistry {
    fn device_outcome(&self, event: &DeviceOutcomeEvent) {
        if let Some(entry) = self.write().get_mut(&event.run_id) {
            entry.snapshot.devices.entry(event.job_id).or_default().insert(
                event.device.clone(),
                RunResult {
                    success: event.success,
                    output_or_error: event.output_or_error.clone(),
                    attempt_count: event.attempt_count,
                },
            );
        }
    }

    fn workflow_transition(&self, event: &WorkflowTransitionEvent) {
        if let Some(entry) = self.write().get_mut(&event.run_id) {
            entry.snapshot.nodes.insert(event.job_id, event.state);
        }
    }
}
