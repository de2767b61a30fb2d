//! 统一日志系统初始化模块
//!
//! 控制台输出 + 按天滚动的文件日志。返回的 guard 必须由 main 持有，
//! drop 时才会把非阻塞写入器中缓冲的日志刷到文件。

use crate::common::{AppError, LoggingConfig, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "ticker_collector.log";

/// 按天滚动的文件写入器，只保留最近 `max_log_files` 个文件
fn build_file_appender(config: &LoggingConfig) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_log_files)
        .build(&config.log_dir)
        .map_err(|e| AppError::ConfigError(format!("创建日志文件失败 {}: {}", config.log_dir, e)))
}

/// 初始化日志系统
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)?;

    // RUST_LOG 优先于配置文件
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!("{},tokio_tungstenite=warn,tungstenite=warn", config.log_level)
    });
    EnvFilter::try_new(&filter_str)
        .map_err(|e| AppError::ConfigError(format!("无效的日志过滤器 {}: {}", filter_str, e)))?;

    let file_appender = build_file_appender(config)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if config.json_file_log {
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_filter(EnvFilter::new(&filter_str))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(EnvFilter::new(&filter_str))
            .boxed()
    };

    let console_layer = if config.enable_console_output {
        Some(
            fmt::layer()
                .with_target(true)
                .with_filter(EnvFilter::new(&filter_str)),
        )
    } else {
        None
    };

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| AppError::ConfigError(format!("日志系统初始化失败: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_appender_writes_under_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            log_dir: dir.path().to_string_lossy().into_owned(),
            max_log_files: 2,
            ..LoggingConfig::default()
        };
        let mut appender = build_file_appender(&config).unwrap();
        appender.write_all(b"ticker\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(LOG_FILE_PREFIX));
    }
}
