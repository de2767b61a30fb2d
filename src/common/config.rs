//! Ticker 采集系统配置模块

use crate::common::{AppError, ExchangeId, Result};
use crate::feed::StreamCapabilities;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 系统配置常量
pub mod constants {
    /// 默认配置文件路径
    pub const DEFAULT_CONFIG_PATH: &str = "config/TickerConfig.toml";

    /// 默认聚合周期（秒）
    pub const DEFAULT_INTERVAL_SECS: u64 = 5;

    /// 默认连续错误阈值，超过后升级为致命错误
    pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

    /// 默认无成交告警周期数
    pub const DEFAULT_STALE_WARN_CYCLES: u32 = 60;

    /// 每个数据流保留的最大事件数
    pub const DEFAULT_MAX_EVENTS: usize = 1000;

    /// 保留的日志文件数（含当天）
    pub const DEFAULT_MAX_LOG_FILES: usize = 3;
}

use constants::*;

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_error_threshold() -> u32 {
    DEFAULT_ERROR_THRESHOLD
}

fn default_stale_warn_cycles() -> u32 {
    DEFAULT_STALE_WARN_CYCLES
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

fn default_max_log_files() -> usize {
    DEFAULT_MAX_LOG_FILES
}

fn default_true() -> bool {
    true
}

/// 日期边界所用的日历，所有交易所共用同一个定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    #[default]
    Utc,
    Local,
}

impl DayBoundary {
    /// 取时间戳在该日历下的日期
    pub fn date_of(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        match self {
            DayBoundary::Utc => timestamp.date_naive(),
            DayBoundary::Local => timestamp.with_timezone(&Local).date_naive(),
        }
    }
}

/// Ticker 采集系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// 聚合周期（秒），必须能整除60
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// 连续错误阈值
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// 日期边界
    #[serde(default)]
    pub day_boundary: DayBoundary,

    /// 所有交易所连续无成交多少个周期后告警，0 表示关闭
    #[serde(default = "default_stale_warn_cycles")]
    pub stale_warn_cycles: u32,

    /// 每个数据流保留的最大事件数
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 交易所列表
    pub exchanges: Vec<ExchangeConfig>,
}

/// 单个交易所的订阅配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub id: ExchangeId,

    /// WebSocket URL
    pub url: String,

    /// 连接后原样发送的订阅消息
    #[serde(default)]
    pub subscriptions: Vec<serde_json::Value>,

    /// 该交易所提供的数据流
    #[serde(default)]
    pub capabilities: StreamCapabilities,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 每日文件输出目录
    pub output_dir: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    pub log_level: String,

    /// 日志目录
    pub log_dir: String,

    /// 保留的滚动日志文件数，超出时删除最旧的
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,

    /// 文件日志是否使用JSON格式
    #[serde(default)]
    pub json_file_log: bool,

    /// 是否启用控制台输出
    #[serde(default = "default_true")]
    pub enable_console_output: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: "trading_datas".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "debug".to_string(),
            log_dir: "log".to_string(),
            max_log_files: DEFAULT_MAX_LOG_FILES,
            json_file_log: false,
            enable_console_output: true,
        }
    }
}

impl CollectorConfig {
    /// 从文件加载配置
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析并校验配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("解析配置文件失败: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 || 60 % self.interval_secs != 0 {
            return Err(AppError::ConfigError(format!(
                "聚合周期必须能整除60: {}",
                self.interval_secs
            )));
        }

        if self.error_threshold == 0 {
            return Err(AppError::ConfigError("连续错误阈值必须大于0".to_string()));
        }

        if self.max_events == 0 {
            return Err(AppError::ConfigError("数据流最大事件数必须大于0".to_string()));
        }

        let active: Vec<&ExchangeConfig> = self.active_exchanges().collect();
        if active.is_empty() {
            return Err(AppError::ConfigError("至少需要启用一个交易所".to_string()));
        }

        let mut seen = HashSet::new();
        for exchange in &active {
            if !seen.insert(&exchange.id) {
                return Err(AppError::ConfigError(format!(
                    "交易所重复配置: {}",
                    exchange.id
                )));
            }
            if exchange.url.trim().is_empty() {
                return Err(AppError::ConfigError(format!(
                    "交易所 {} 的URL不能为空",
                    exchange.id
                )));
            }
        }

        if self.logging.max_log_files == 0 {
            return Err(AppError::ConfigError("日志文件保留数必须大于0".to_string()));
        }

        if self.storage.output_dir.trim().is_empty() {
            return Err(AppError::ConfigError("输出目录不能为空".to_string()));
        }

        Ok(())
    }

    /// 启用的交易所
    pub fn active_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }
}
