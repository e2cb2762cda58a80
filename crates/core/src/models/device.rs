use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 网络设备
///
/// 设备由资产库维护，编排核心只读取其属性，并在运行结束后回写状态字段。
/// `properties` 保存 vendor、operating_system、ip_address 等可被设备池筛选的属性。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub status: DeviceStatus,
}

impl Device {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            properties: HashMap::new(),
            status: DeviceStatus::default(),
        }
    }

    /// 读取设备属性，`name` 作为内置属性也可以被筛选
    pub fn attribute(&self, property: &str) -> Option<String> {
        match property {
            "name" => Some(self.name.clone()),
            _ => self.properties.get(property).cloned(),
        }
    }
}

/// 设备最近一次运行的状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub last_status: Option<String>,
    pub last_runtime: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

/// 一次运行结束后对设备状态的写入请求
///
/// `last_failure` 为 `None` 时保留设备原有的失败时间。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusUpdate {
    pub last_status: String,
    pub last_runtime: DateTime<Utc>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl DeviceStatusUpdate {
    pub const SUCCESS: &'static str = "Success";
    pub const FAILURE: &'static str = "Failure";

    pub fn from_outcome(success: bool, at: DateTime<Utc>) -> Self {
        Self {
            last_status: if success { Self::SUCCESS } else { Self::FAILURE }.to_string(),
            last_runtime: at,
            last_failure: if success { None } else { Some(at) },
        }
    }

    /// 将写入请求应用到已有状态上
    pub fn apply_to(&self, status: &mut DeviceStatus) {
        status.last_status = Some(self.last_status.clone());
        status.last_runtime = Some(self.last_runtime);
        if let Some(failed_at) = self.last_failure {
            status.last_failure = Some(failed_at);
        }
    }
}
