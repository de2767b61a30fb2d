//! 按日切换的 Ticker 缓冲
//!
//! 所有交易所共享同一个"当前日期"。新 tick 的日期晚于当前日期时，
//! 先把全部交易所的缓冲写入 Sink 并清空，再推进日期、追加新 tick，
//! 保证各交易所的每日文件对应同一个日历边界。

use crate::common::{AppError, DayBoundary, ExchangeId, Result, Ticker};
use crate::storage::Sink;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

pub struct BufferStore {
    calendar: DayBoundary,
    current_day: NaiveDate,
    buffers: BTreeMap<ExchangeId, Vec<Ticker>>,
}

impl BufferStore {
    pub fn new(
        exchanges: impl IntoIterator<Item = ExchangeId>,
        calendar: DayBoundary,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            calendar,
            current_day: calendar.date_of(now),
            buffers: exchanges.into_iter().map(|id| (id, Vec::new())).collect(),
        }
    }

    pub fn current_day(&self) -> NaiveDate {
        self.current_day
    }

    pub fn len(&self, exchange: &ExchangeId) -> usize {
        self.buffers.get(exchange).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(Vec::is_empty)
    }

    pub fn tickers(&self, exchange: &ExchangeId) -> &[Ticker] {
        self.buffers.get(exchange).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 追加一条 tick；若日期已推进，先完成整体切换
    pub fn append(&mut self, exchange: &ExchangeId, ticker: Ticker, sink: &dyn Sink) -> Result<()> {
        self.roll_over_if_needed(ticker.timestamp, sink)?;
        let buffer = self
            .buffers
            .get_mut(exchange)
            .ok_or_else(|| AppError::DataError(format!("未配置的交易所: {}", exchange)))?;
        buffer.push(ticker);
        Ok(())
    }

    /// 日期推进时落盘并清空全部缓冲，返回是否发生了切换
    #[instrument(target = "缓冲存储", skip(self, sink), fields(current_day = %self.current_day), err)]
    pub fn roll_over_if_needed(&mut self, timestamp: DateTime<Utc>, sink: &dyn Sink) -> Result<bool> {
        let day = self.calendar.date_of(timestamp);
        if day <= self.current_day {
            return Ok(false);
        }

        info!(target: "缓冲存储", from = %self.current_day, to = %day, "日期已变更，保存当日数据");
        self.flush_all(sink)?;
        self.current_day = day;
        Ok(true)
    }

    /// 把所有非空缓冲写入 Sink
    ///
    /// 每个交易所写入成功后立即清空，失败时保留未写入的缓冲并返回错误，
    /// 之后的兜底 flush 不会重复写入已成功的部分。
    pub fn flush_all(&mut self, sink: &dyn Sink) -> Result<()> {
        for (exchange, buffer) in self.buffers.iter_mut() {
            if buffer.is_empty() {
                debug!(target: "缓冲存储", %exchange, "缓冲为空，跳过");
                continue;
            }
            sink.flush(exchange, buffer, self.current_day)?;
            info!(target: "缓冲存储", %exchange, rows = buffer.len(), day = %self.current_day, "保存ticker数据");
            buffer.clear();
        }
        Ok(())
    }
}
