//! 外部协作方接口
//!
//! 编排核心不关心持久化细节，资产库、设备池、作业与计划任务的读写
//! 都通过这里的接口完成。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Device, DeviceStatusUpdate, Job, Pool, Task};
use crate::Result;

/// 设备资产库
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>>;

    async fn get_device(&self, name: &str) -> Result<Option<Device>>;

    /// 读取单个设备属性，属性不存在时返回 `None`
    async fn read_device_attribute(&self, device: &str, property: &str)
        -> Result<Option<String>>;

    /// 写入设备状态字段，单次调用必须整体生效
    async fn write_device_status(&self, device: &str, update: &DeviceStatusUpdate) -> Result<()>;

    async fn write_device_attribute(&self, device: &str, property: &str, value: &str)
        -> Result<()>;
}

/// 设备池仓储
#[async_trait]
pub trait PoolRepository: Send + Sync {
    async fn get_pool(&self, id: i64) -> Result<Option<Pool>>;

    /// 持久化刷新后的成员列表
    async fn update_members(&self, id: i64, members: Vec<String>) -> Result<()>;
}

/// 作业仓储，工作流的成员与边随作业定义一同返回
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, id: i64) -> Result<Option<Job>>;
}

/// 计划任务仓储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_task(&self, id: i64) -> Result<Option<Task>>;

    async fn list_tasks(&self) -> Result<Vec<Task>>;

    async fn update_next_run_time(&self, id: i64, next_run_time: Option<DateTime<Utc>>)
        -> Result<()>;

    async fn set_active(&self, id: i64, is_active: bool) -> Result<()>;
}

/// 轮询游标的持久化存储
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<u64>>;

    async fn save(&self, name: &str, cursor: u64) -> Result<()>;
}
