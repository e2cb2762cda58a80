//! 内存仓储实现
//!
//! 供单进程部署和测试使用。所有状态放在 `tokio::sync::RwLock` 之后，
//! 单次写入在持有写锁期间整体完成，并发读者不会看到写了一半的设备状态。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use orchestrator_core::models::{Device, DeviceStatusUpdate, Job, Pool, Task};
use orchestrator_core::traits::{
    CursorStore, InventoryRepository, JobRepository, PoolRepository, TaskRepository,
};
use orchestrator_core::{OrchestratorError, Result};

/// 设备资产库
///
/// 额外记录每次状态写入，便于检查写入顺序与完整性。
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    devices: Arc<RwLock<HashMap<String, Device>>>,
    status_history: Arc<RwLock<Vec<(String, DeviceStatusUpdate)>>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        let map = devices.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self {
            devices: Arc::new(RwLock::new(map)),
            status_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn insert(&self, device: Device) {
        self.devices.write().await.insert(device.name.clone(), device);
    }

    pub async fn count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// 按写入顺序返回某台设备的全部状态写入
    pub async fn status_history(&self, device: &str) -> Vec<DeviceStatusUpdate> {
        self.status_history
            .read()
            .await
            .iter()
            .filter(|(name, _)| name == device)
            .map(|(_, update)| update.clone())
            .collect()
    }

    pub async fn status_write_count(&self) -> usize {
        self.status_history.read().await.len()
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventory {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let devices = self.devices.read().await;
        let mut list: Vec<Device> = devices.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn get_device(&self, name: &str) -> Result<Option<Device>> {
        Ok(self.devices.read().await.get(name).cloned())
    }

    async fn read_device_attribute(&self, device: &str, property: &str) -> Result<Option<String>> {
        let devices = self.devices.read().await;
        let device = devices
            .get(device)
            .ok_or_else(|| OrchestratorError::DeviceNotFound {
                name: device.to_string(),
            })?;
        Ok(device.attribute(property))
    }

    async fn write_device_status(&self, device: &str, update: &DeviceStatusUpdate) -> Result<()> {
        let mut devices = self.devices.write().await;
        let entry = devices
            .get_mut(device)
            .ok_or_else(|| OrchestratorError::DeviceNotFound {
                name: device.to_string(),
            })?;
        update.apply_to(&mut entry.status);
        self.status_history
            .write()
            .await
            .push((device.to_string(), update.clone()));

        debug!("设备 {} 状态已更新为 {}", device, update.last_status);
        Ok(())
    }

    async fn write_device_attribute(&self, device: &str, property: &str, value: &str) -> Result<()> {
        let mut devices = self.devices.write().await;
        let entry = devices
            .get_mut(device)
            .ok_or_else(|| OrchestratorError::DeviceNotFound {
                name: device.to_string(),
            })?;
        if property == "name" {
            return Err(OrchestratorError::Inventory(format!(
                "设备 {device} 的名称属性不可修改"
            )));
        }
        entry
            .properties
            .insert(property.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPoolRepository {
    pools: Arc<RwLock<HashMap<i64, Pool>>>,
}

impl InMemoryPoolRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pools(pools: Vec<Pool>) -> Self {
        let map = pools.into_iter().map(|p| (p.id, p)).collect();
        Self {
            pools: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, pool: Pool) {
        self.pools.write().await.insert(pool.id, pool);
    }
}

#[async_trait]
impl PoolRepository for InMemoryPoolRepository {
    async fn get_pool(&self, id: i64) -> Result<Option<Pool>> {
        Ok(self.pools.read().await.get(&id).cloned())
    }

    async fn update_members(&self, id: i64, members: Vec<String>) -> Result<()> {
        let mut pools = self.pools.write().await;
        let pool = pools
            .get_mut(&id)
            .ok_or(OrchestratorError::PoolNotFound { id })?;
        pool.members = members;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<i64, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let map = jobs.into_iter().map(|j| (j.id, j)).collect();
        Self {
            jobs: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get_job(&self, id: i64) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<i64, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.id, t)).collect();
        Self {
            tasks: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn update_next_run_time(&self, id: i64, next_run_time: Option<DateTime<Utc>>) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(OrchestratorError::TaskNotFound { id })?;
        task.next_run_time = next_run_time;
        Ok(())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or(OrchestratorError::TaskNotFound { id })?;
        task.is_active = is_active;
        Ok(())
    }
}

/// 进程内游标存储，重启后丢失
#[derive(Debug, Clone, Default)]
pub struct InMemoryCursorStore {
    cursors: Arc<RwLock<HashMap<String, u64>>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn load(&self, name: &str) -> Result<Option<u64>> {
        Ok(self.cursors.read().await.get(name).copied())
    }

    async fn save(&self, name: &str, cursor: u64) -> Result<()> {
        self.cursors.write().await.insert(name.to_string(), cursor);
        Ok(())
    }
}
