//! 编排器配置
//!
//! 默认值 -> TOML 配置文件 -> `ORCHESTRATOR__` 环境变量，逐层覆盖。

pub mod app_config;
pub mod models;

pub use app_config::AppConfig;
pub use models::{ObservabilityConfig, SchedulerConfig, SessionPortsConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_ports.start_port, 8080);
        assert_eq!(config.session_ports.end_port, 8100);
    }

    #[test]
    fn test_from_toml_partial_override() {
        let config = AppConfig::from_toml(
            r#"
[scheduler]
tick_interval_ms = 250

[observability]
log_format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert_eq!(config.scheduler.shutdown_timeout_seconds, 30);
        assert_eq!(config.scheduler.run_history_limit, 1000);
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[session_ports]
start_port = 9000
end_port = 9010
cursor_file = "/tmp/cursors.json"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.session_ports.start_port, 9000);
        assert_eq!(config.session_ports.end_port, 9010);
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = AppConfig::load(Some("/nonexistent/orchestrator.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_port_range() {
        let result = AppConfig::from_toml(
            r#"
[session_ports]
start_port = 8100
end_port = 8080
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_history_limit() {
        let config = AppConfig::from_toml(
            r#"
[scheduler]
run_history_limit = 50
"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.run_history_limit, 50);

        let result = AppConfig::from_toml(
            r#"
[scheduler]
run_history_limit = 0
"#,
        );
        assert!(result.is_err());
    }
}
