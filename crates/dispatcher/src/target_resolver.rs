//! 目标设备解析
//!
//! 动态设备池按属性规则求交集：正则规则做非锚定搜索，精确规则要求完全相等，
//! 属性缺失时视为不匹配。静态设备池直接返回持久化的成员列表。

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use orchestrator_core::models::{Device, Job, Pool, PropertyFilter};
use orchestrator_core::traits::{InventoryRepository, PoolRepository};
use orchestrator_core::{OrchestratorError, Result};
use orchestrator_infrastructure::StructuredLogger;

enum Matcher {
    Search(Regex),
    Exact(String),
}

impl Matcher {
    fn compile(pool: &Pool, filter: &PropertyFilter) -> Result<Self> {
        if !filter.regex {
            return Ok(Matcher::Exact(filter.value.clone()));
        }
        Regex::new(&filter.value)
            .map(Matcher::Search)
            .map_err(|e| {
                OrchestratorError::target_resolution(
                    &pool.name,
                    format!("属性 {} 的正则表达式 {} 无效: {e}", filter.property, filter.value),
                )
            })
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Search(re) => re.is_match(value),
            Matcher::Exact(expected) => value == expected,
        }
    }
}

pub struct TargetResolver {
    inventory: Arc<dyn InventoryRepository>,
    pools: Arc<dyn PoolRepository>,
}

impl TargetResolver {
    pub fn new(inventory: Arc<dyn InventoryRepository>, pools: Arc<dyn PoolRepository>) -> Self {
        Self { inventory, pools }
    }

    /// 计算设备池成员，按设备名称排序且不重复
    pub async fn resolve(&self, pool: &Pool) -> Result<Vec<Device>> {
        if pool.is_static() {
            return self.resolve_static(pool).await;
        }

        // 先编译全部规则，任一规则无效时不读取任何设备
        let matchers = pool
            .configured_filters()
            .map(|filter| -> Result<(&str, Matcher)> {
                Ok((filter.property.as_str(), Matcher::compile(pool, filter)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut members = Vec::new();
        'devices: for device in self.inventory.list_devices().await? {
            for (property, matcher) in &matchers {
                let value = self
                    .inventory
                    .read_device_attribute(&device.name, property)
                    .await?;
                match value {
                    Some(value) if matcher.matches(&value) => {}
                    _ => continue 'devices,
                }
            }
            members.push(device);
        }

        members.sort_by(|a, b| a.name.cmp(&b.name));
        members.dedup_by(|a, b| a.name == b.name);
        debug!("设备池 {} 解析出 {} 台设备", pool.name, members.len());
        Ok(members)
    }

    async fn resolve_static(&self, pool: &Pool) -> Result<Vec<Device>> {
        let mut members = BTreeMap::new();
        for name in &pool.members {
            match self.inventory.get_device(name).await? {
                Some(device) => {
                    members.insert(device.name.clone(), device);
                }
                None => warn!("静态设备池 {} 的成员 {} 已不存在，忽略", pool.name, name),
            }
        }
        Ok(members.into_values().collect())
    }

    pub async fn resolve_pool(&self, pool_id: i64) -> Result<Vec<Device>> {
        let pool = self.load_pool(pool_id).await?;
        self.resolve(&pool).await
    }

    /// 按名称查找设备，任一名称不存在时报告目标解析错误
    pub async fn resolve_devices(&self, label: &str, names: &[String]) -> Result<Vec<Device>> {
        let mut devices = BTreeMap::new();
        for name in names {
            let device = self.inventory.get_device(name).await?.ok_or_else(|| {
                OrchestratorError::target_resolution(label, format!("设备 {name} 不存在"))
            })?;
            devices.insert(device.name.clone(), device);
        }
        Ok(devices.into_values().collect())
    }

    /// 作业的目标设备：显式设备与各设备池成员的并集
    pub async fn resolve_job_targets(&self, job: &Job) -> Result<Vec<Device>> {
        let mut targets: BTreeMap<String, Device> = self
            .resolve_devices(&job.name, &job.devices)
            .await?
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();

        for pool_id in &job.pools {
            let pool = self.pools.get_pool(*pool_id).await?.ok_or_else(|| {
                OrchestratorError::target_resolution(
                    &job.name,
                    format!("作业引用的设备池 {pool_id} 不存在"),
                )
            })?;
            for device in self.resolve(&pool).await? {
                targets.insert(device.name.clone(), device);
            }
        }

        Ok(targets.into_values().collect())
    }

    /// 重新计算动态设备池成员并持久化，静态设备池保持不变
    pub async fn refresh_pool(&self, pool_id: i64) -> Result<Vec<String>> {
        let pool = self.load_pool(pool_id).await?;
        if pool.is_static() {
            return Ok(pool.members);
        }

        let members: Vec<String> = self
            .resolve(&pool)
            .await?
            .into_iter()
            .map(|d| d.name)
            .collect();
        self.pools.update_members(pool_id, members.clone()).await?;
        StructuredLogger::log_pool_refreshed(pool.id, &pool.name, members.len());
        Ok(members)
    }

    async fn load_pool(&self, pool_id: i64) -> Result<Pool> {
        self.pools
            .get_pool(pool_id)
            .await?
            .ok_or(OrchestratorError::PoolNotFound { id: pool_id })
    }
}
