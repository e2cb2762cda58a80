use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use orchestrator::app::Application;
use orchestrator::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use orchestrator_core::AppConfig;
use orchestrator_infrastructure::FleetDefinition;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("orchestrator")
        .version("1.0.0")
        .about("网络设备自动化编排系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时使用默认配置和环境变量"),
        )
        .arg(
            Arg::new("fleet")
                .short('f')
                .long("fleet")
                .value_name("FILE")
                .help("设备清单文件路径")
                .default_value("config/fleet.toml"),
        )
        .arg(
            Arg::new("run")
                .short('r')
                .long("run")
                .value_name("JOB_ID")
                .help("立即运行指定的作业或工作流后退出")
                .value_parser(clap::value_parser!(i64))
                .conflicts_with("allocate-port"),
        )
        .arg(
            Arg::new("targets")
                .short('t')
                .long("targets")
                .value_name("DEVICES")
                .help("以逗号分隔的目标设备名称，覆盖作业自身的目标选择")
                .value_delimiter(',')
                .requires("run"),
        )
        .arg(
            Arg::new("allocate-port")
                .long("allocate-port")
                .help("从会话端口池中分配一个端口并输出")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("<默认配置>")
        )
    })?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }

    init_logging(&config.observability.log_level, &config.observability.log_format)?;
    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_bind_address)?;
    }

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!("启动网络设备自动化编排系统，主机: {host}");

    let fleet_path = matches
        .get_one::<String>("fleet")
        .context("缺少设备清单路径")?;
    let fleet = FleetDefinition::load(fleet_path).await?;
    info!("设备清单: {fleet_path}");

    let app = Application::new(config, fleet).await?;

    if matches.get_flag("allocate-port") {
        let port = app.allocate_port().await?;
        println!("{port}");
        return Ok(());
    }

    if let Some(job_id) = matches.get_one::<i64>("run") {
        let targets = matches
            .get_many::<String>("targets")
            .map(|values| values.cloned().collect());
        let result = app.run_once(*job_id, targets).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let shutdown_manager = ShutdownManager::new();
    let app = Arc::new(app);
    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    if let Err(e) = app_handle.await {
        error!("应用关闭时发生错误: {e}");
    }

    info!("网络设备自动化编排系统已退出");
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 安装 Prometheus 指标导出
fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus指标导出失败: {e}"))?;
    info!("Prometheus指标导出已启动: {addr}");
    Ok(())
}
