// 导出共享模块
pub mod config;
pub mod error;
pub mod logging_setup;
pub mod models;
pub mod shutdown;

// 重新导出常用类型，方便使用
pub use config::{CollectorConfig, DayBoundary, ExchangeConfig, LoggingConfig, StorageConfig};
pub use error::{AppError, Result};
pub use logging_setup::init_logging;
pub use shutdown::ShutdownSignal;
pub use models::{
    BookEntry, ContractPrice, ExchangeId, LiquidationEvent, LiquidationQty, Ohlcv, OiRange,
    OpenInterestEvent, OrderBookSides, PriceLevel, Side, Ticker, TradeEvent,
};
