//! 内置执行策略
//!
//! 只包含不需要连接设备的两种服务：修改资产库属性，以及校验属性值。
//! 连接器类服务由部署方按 [`JobStrategy`] 自行注册。

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use orchestrator_core::traits::{ExecutionContext, ExecutionOutput, JobStrategy};
use orchestrator_core::{OrchestratorError, Result, StrategyRegistry};

pub const UPDATE_PROPERTY_SERVICE: &str = "update_property_service";
pub const PROPERTY_VALIDATION_SERVICE: &str = "property_validation_service";

/// 把 `update_dictionary` 中的键值写入设备属性
///
/// 参数示例：`{"update_dictionary": {"vendor": "Cisco"}}`，非字符串值按JSON文本写入。
pub struct UpdatePropertyStrategy;

impl UpdatePropertyStrategy {
    fn updates(parameters: &serde_json::Value) -> Result<Vec<(String, String)>> {
        let dictionary = parameters
            .get("update_dictionary")
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                OrchestratorError::Configuration("update_dictionary 必须是JSON对象".to_string())
            })?;

        Ok(dictionary
            .iter()
            .map(|(property, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (property.clone(), value)
            })
            .collect())
    }
}

#[async_trait]
impl JobStrategy for UpdatePropertyStrategy {
    fn name(&self) -> &str {
        UPDATE_PROPERTY_SERVICE
    }

    fn description(&self) -> &str {
        "更新资产库中的设备属性"
    }

    fn validate_parameters(&self, parameters: &serde_json::Value) -> Result<()> {
        Self::updates(parameters).map(|_| ())
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionOutput> {
        let updates = Self::updates(&context.parameters)?;
        for (property, value) in &updates {
            context
                .inventory
                .write_device_attribute(&context.device.name, property, value)
                .await?;
        }

        debug!("设备 {} 已更新 {} 个属性", context.device.name, updates.len());
        Ok(ExecutionOutput::success(format!(
            "已更新 {} 个属性",
            updates.len()
        )))
    }
}

#[derive(Debug, Deserialize)]
struct ValidationParameters {
    property: String,
    pattern: String,
    #[serde(default = "default_regex")]
    regex: bool,
}

fn default_regex() -> bool {
    true
}

/// 校验设备属性是否符合期望值
///
/// 参数：`{"property": "...", "pattern": "...", "regex": true}`。`regex` 为假时要求完全相等。
pub struct PropertyValidationStrategy;

impl PropertyValidationStrategy {
    fn parameters(parameters: &serde_json::Value) -> Result<ValidationParameters> {
        let parsed: ValidationParameters = serde_json::from_value(parameters.clone())
            .map_err(|e| OrchestratorError::Configuration(format!("校验参数无效: {e}")))?;
        if parsed.regex {
            Regex::new(&parsed.pattern).map_err(|e| {
                OrchestratorError::Configuration(format!("无效的正则表达式 {}: {e}", parsed.pattern))
            })?;
        }
        Ok(parsed)
    }
}

#[async_trait]
impl JobStrategy for PropertyValidationStrategy {
    fn name(&self) -> &str {
        PROPERTY_VALIDATION_SERVICE
    }

    fn description(&self) -> &str {
        "校验设备属性"
    }

    fn validate_parameters(&self, parameters: &serde_json::Value) -> Result<()> {
        Self::parameters(parameters).map(|_| ())
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<ExecutionOutput> {
        let params = Self::parameters(&context.parameters)?;
        let value = context
            .inventory
            .read_device_attribute(&context.device.name, &params.property)
            .await?;

        let Some(value) = value else {
            return Ok(ExecutionOutput::failure(format!(
                "设备缺少属性 {}",
                params.property
            )));
        };

        let matched = if params.regex {
            Regex::new(&params.pattern)
                .map_err(|e| OrchestratorError::Execution(e.to_string()))?
                .is_match(&value)
        } else {
            value == params.pattern
        };

        if matched {
            Ok(ExecutionOutput::success(format!("{} = {}", params.property, value)))
        } else {
            Ok(ExecutionOutput::failure(format!(
                "{} = {}，不匹配 {}",
                params.property, value, params.pattern
            )))
        }
    }
}

/// 注册全部内置执行策略
pub async fn default_registry() -> StrategyRegistry {
    let registry = StrategyRegistry::new();
    registry
        .register_batch(vec![
            (
                UPDATE_PROPERTY_SERVICE.to_string(),
                Arc::new(UpdatePropertyStrategy) as Arc<dyn JobStrategy>,
            ),
            (
                PROPERTY_VALIDATION_SERVICE.to_string(),
                Arc::new(PropertyValidationStrategy) as Arc<dyn JobStrategy>,
            ),
        ])
        .await;
    registry
}
