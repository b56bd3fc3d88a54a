// 日志初始化 - 同时输出到控制台和按天轮转的日志文件

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::models::LoggerSettings;

const APP_DIR_NAME: &str = "gesture-analyzer";

/// 平台默认日志目录
pub fn default_log_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join("Library/Logs").join(APP_DIR_NAME)
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join(APP_DIR_NAME).join("logs")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".local/share")
            .join(APP_DIR_NAME)
            .join("logs")
    }
}

/// 解析日志级别，无法识别时回退到 INFO
pub fn parse_level(level: &str) -> tracing::Level {
    tracing::Level::from_str(level.trim()).unwrap_or(tracing::Level::INFO)
}

/// 初始化日志系统
///
/// 返回的 guard 需要在整个程序生命周期内持有，drop 后文件日志停止写入
pub fn init(settings: &LoggerSettings) -> Result<WorkerGuard> {
    let log_dir = settings.log_dir.clone().unwrap_or_else(default_log_dir);

    // 创建日志目录
    std::fs::create_dir_all(&log_dir).ok();

    // 配置日志输出到文件（每天轮转）
    let file_appender = tracing_appender::rolling::daily(log_dir.clone(), "app.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // 同时输出到控制台和文件
    let writer = std::io::stdout.and(non_blocking);

    // 使用本地时区
    let timer = LocalTime::new(
        time::format_description::parse(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]",
        )
        .map_err(|e| anyhow!("日志时间格式无效: {}", e))?,
    );

    tracing_subscriber::fmt()
        .with_max_level(parse_level(&settings.level))
        .with_writer(writer)
        .with_timer(timer)
        .with_ansi(cfg!(debug_assertions)) // release 版本不使用颜色代码
        .try_init()
        .map_err(|e| anyhow!("日志系统初始化失败: {}", e))?;

    eprintln!("日志文件位置: {:?}", log_dir);
    Ok(guard)
}
