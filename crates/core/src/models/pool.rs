use serde::{Deserialize, Serialize};

/// 设备池
///
/// `never_update` 为真时是静态设备池，成员列表 `members` 原样返回；
/// 否则按 `filters` 中所有已配置的属性规则求交集得到成员。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub never_update: bool,
    /// 持久化的成员设备名称
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub filters: Vec<PropertyFilter>,
}

impl Pool {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            never_update: false,
            members: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.never_update
    }

    /// 值为空的规则视为未配置
    pub fn configured_filters(&self) -> impl Iterator<Item = &PropertyFilter> {
        self.filters.iter().filter(|f| !f.value.is_empty())
    }
}

/// 单个属性筛选规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub property: String,
    pub value: String,
    /// 为真时 `value` 按正则表达式搜索匹配，否则要求完全相等
    #[serde(default = "default_regex")]
    pub regex: bool,
}

fn default_regex() -> bool {
    true
}

impl PropertyFilter {
    pub fn regex(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: pattern.into(),
            regex: true,
        }
    }

    pub fn exact(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
            regex: false,
        }
    }
}
