use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("URL parsing error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// 交易所不提供该数据流（例如没有强平频道）
    #[error("Stream unsupported: {exchange} has no {stream} stream")]
    StreamUnsupported { exchange: String, stream: &'static str },

    /// 数据流读取失败（非"不支持"类错误）
    #[error("Feed error on {exchange}/{stream}: {message}")]
    FeedError {
        exchange: String,
        stream: &'static str,
        message: String,
    },

    /// 订单簿深度不足，说明就绪检查的前提被破坏
    #[error("Insufficient depth on {exchange}: {side} side has {levels} level(s), need {required}")]
    InsufficientDepth {
        exchange: String,
        side: &'static str,
        levels: usize,
        required: usize,
    },

    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Retry budget exhausted after {failures} consecutive failures: {last_error}")]
    RetryBudgetExhausted { failures: u32, last_error: String },

    #[error("Data error: {0}")]
    DataError(String),
}

impl AppError {
    /// 获取错误类型的简洁摘要，用于日志中的错误分类
    pub fn get_error_type_summary(&self) -> &'static str {
        match self {
            AppError::IoError(_) => "ticker_file_operation_failed",
            AppError::JsonError(_) => "market_data_parsing_failed",
            AppError::CsvError(_) => "ticker_export_failed",
            AppError::ConfigError(_) => "collector_configuration_invalid",
            AppError::WebSocketError(_) => "realtime_market_data_failed",
            AppError::UrlParseError(_) => "market_endpoint_invalid",
            AppError::StreamUnsupported { .. } => "market_stream_unsupported",
            AppError::FeedError { .. } => "market_stream_read_failed",
            AppError::InsufficientDepth { .. } => "orderbook_depth_insufficient",
            AppError::SinkError(_) => "ticker_persistence_failed",
            AppError::RetryBudgetExhausted { .. } => "cycle_retry_budget_exhausted",
            AppError::DataError(_) => "ticker_data_invalid",
        }
    }

    /// 是否为致命错误
    ///
    /// 致命错误不计入周期错误计数，直接触发 flush 并终止调度器：
    /// 持久化失败、重试预算耗尽。
    /// 后台聚合任务的任何错误同样是致命的，但那是由任务通道决定的，与错误种类无关。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::SinkError(_) | AppError::RetryBudgetExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
