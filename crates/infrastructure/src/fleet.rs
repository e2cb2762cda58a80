//! 设备清单文件
//!
//! 单进程部署时，设备、设备池、作业和计划任务都来自一个 TOML 文件，
//! 加载后写入内存仓储。

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use orchestrator_core::models::{Device, Job, Pool, Task};

use crate::memory::{
    InMemoryInventory, InMemoryJobRepository, InMemoryPoolRepository, InMemoryTaskRepository,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetDefinition {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// 由清单文件填充的内存仓储
#[derive(Debug, Clone, Default)]
pub struct FleetRepositories {
    pub inventory: InMemoryInventory,
    pub pools: InMemoryPoolRepository,
    pub jobs: InMemoryJobRepository,
    pub tasks: InMemoryTaskRepository,
}

impl FleetDefinition {
    pub fn from_toml(content: &str) -> Result<Self> {
        let fleet: FleetDefinition = toml::from_str(content).context("解析设备清单失败")?;
        fleet.validate()?;
        Ok(fleet)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取设备清单失败: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// 检查引用完整性与作业配置
    pub fn validate(&self) -> Result<()> {
        let device_names: HashSet<&str> = self.devices.iter().map(|d| d.name.as_str()).collect();
        if device_names.len() != self.devices.len() {
            return Err(anyhow::anyhow!("设备名称重复"));
        }

        let pool_ids: HashSet<i64> = self.pools.iter().map(|p| p.id).collect();
        let job_ids: HashSet<i64> = self.jobs.iter().map(|j| j.id).collect();
        if job_ids.len() != self.jobs.len() {
            return Err(anyhow::anyhow!("作业ID重复"));
        }

        for job in &self.jobs {
            job.validate()?;
            for device in &job.devices {
                if !device_names.contains(device.as_str()) {
                    return Err(anyhow::anyhow!(
                        "作业 {} 引用了不存在的设备: {}",
                        job.name,
                        device
                    ));
                }
            }
            for pool in &job.pools {
                if !pool_ids.contains(pool) {
                    return Err(anyhow::anyhow!(
                        "作业 {} 引用了不存在的设备池: {}",
                        job.name,
                        pool
                    ));
                }
            }
            if let Some(spec) = job.workflow() {
                for member in &spec.jobs {
                    if !job_ids.contains(member) {
                        return Err(anyhow::anyhow!(
                            "工作流 {} 引用了不存在的作业: {}",
                            job.name,
                            member
                        ));
                    }
                }
            }
        }

        for task in &self.tasks {
            if !job_ids.contains(&task.job_id) {
                return Err(anyhow::anyhow!(
                    "计划任务 {} 引用了不存在的作业: {}",
                    task.name,
                    task.job_id
                ));
            }
        }
        Ok(())
    }

    pub fn into_repositories(self) -> FleetRepositories {
        info!(
            "设备清单已加载: {} 台设备, {} 个设备池, {} 个作业, {} 个计划任务",
            self.devices.len(),
            self.pools.len(),
            self.jobs.len(),
            self.tasks.len()
        );
        FleetRepositories {
            inventory: InMemoryInventory::with_devices(self.devices),
            pools: InMemoryPoolRepository::with_pools(self.pools),
            jobs: InMemoryJobRepository::with_jobs(self.jobs),
            tasks: InMemoryTaskRepository::with_tasks(self.tasks),
        }
    }
}
