//! Ticker 存储模块
//!
//! - `BufferStore`: 每个交易所一个只追加的内存缓冲，按日切换时整体落盘
//! - `Sink`: 持久化契约，每次调用要么全部写入要么失败
//! - `CsvSink`: 按 `{YYYYMMDD}_{exchange}.csv` 写每日文件

pub mod buffer_store;
pub mod csv_sink;

pub use buffer_store::BufferStore;
pub use csv_sink::CsvSink;

use crate::common::{ExchangeId, Result, Ticker};
use chrono::NaiveDate;

/// 持久化契约
///
/// 失败时返回 `AppError::SinkError`，调度器将其视为致命错误，不做部分重写。
pub trait Sink: Send + Sync {
    fn flush(&self, exchange: &ExchangeId, tickers: &[Ticker], day: NaiveDate) -> Result<()>;
}

impl<T: Sink + ?Sized> Sink for std::sync::Arc<T> {
    fn flush(&self, exchange: &ExchangeId, tickers: &[Ticker], day: NaiveDate) -> Result<()> {
        (**self).flush(exchange, tickers, day)
    }
}
