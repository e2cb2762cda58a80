use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::models::{ObservabilityConfig, SchedulerConfig, SessionPortsConfig};

/// 编排器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub session_ports: SessionPortsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置
    ///
    /// 加载顺序：
    /// 1. 默认值
    /// 2. 配置文件（TOML）
    /// 3. 环境变量覆盖（前缀 `ORCHESTRATOR__`，层级分隔符 `__`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("scheduler.tick_interval_ms", defaults.scheduler.tick_interval_ms)?
            .set_default(
                "scheduler.shutdown_timeout_seconds",
                defaults.scheduler.shutdown_timeout_seconds,
            )?
            .set_default(
                "scheduler.run_history_limit",
                defaults.scheduler.run_history_limit as u64,
            )?
            .set_default("session_ports.start_port", defaults.session_ports.start_port)?
            .set_default("session_ports.end_port", defaults.session_ports.end_port)?
            .set_default("session_ports.cursor_file", defaults.session_ports.cursor_file)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.log_format", defaults.observability.log_format)?
            .set_default(
                "observability.metrics_enabled",
                defaults.observability.metrics_enabled,
            )?
            .set_default(
                "observability.metrics_bind_address",
                defaults.observability.metrics_bind_address,
            )?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 从TOML字符串加载，缺省字段取默认值
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let defaults = serde_json::to_value(AppConfig::default())?;
        let config: AppConfig = ConfigBuilder::builder()
            .add_source(File::from_str(
                &defaults.to_string(),
                FileFormat::Json,
            ))
            .add_source(File::from_str(toml_str, FileFormat::Toml))
            .build()
            .context("解析TOML配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.session_ports
            .validate()
            .context("会话端口配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}
