use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 调度器扫描计划任务的间隔（毫秒）
    pub tick_interval_ms: u64,
    /// 关闭时等待运行中作业的最长时间
    pub shutdown_timeout_seconds: u64,
    /// 保留的已结束运行快照数量，超出后淘汰最早结束的
    pub run_history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            shutdown_timeout_seconds: 30,
            run_history_limit: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        if self.shutdown_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("关闭超时时间必须大于0"));
        }
        if self.run_history_limit == 0 {
            return Err(anyhow::anyhow!("运行历史保留数量必须大于0"));
        }
        Ok(())
    }
}

/// Web 终端会话端口池
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPortsConfig {
    pub start_port: u64,
    /// 区间上界，不包含
    pub end_port: u64,
    /// 轮询游标的持久化文件
    pub cursor_file: String,
}

impl Default for SessionPortsConfig {
    fn default() -> Self {
        Self {
            start_port: 8080,
            end_port: 8100,
            cursor_file: "data/cursors.json".to_string(),
        }
    }
}

impl SessionPortsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.end_port <= self.start_port {
            return Err(anyhow::anyhow!(
                "端口区间无效: [{}, {})",
                self.start_port,
                self.end_port
            ));
        }
        if self.end_port > u16::MAX as u64 + 1 {
            return Err(anyhow::anyhow!("端口上界超出范围: {}", self.end_port));
        }
        if self.cursor_file.is_empty() {
            return Err(anyhow::anyhow!("游标文件路径不能为空"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// `pretty` 或 `json`
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，有效值: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，有效值: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        if self.metrics_enabled {
            self.metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .map_err(|_| anyhow::anyhow!("无效的指标监听地址: {}", self.metrics_bind_address))?;
        }
        Ok(())
    }
}
