//! 行情数据源模块
//!
//! - `FeedHandle`: 每个交易所一个的数据源契约，提供四类数据流的快照读取和"有新数据"挂起点
//! - `MarketDataStore`: 内存中的物化数据流状态，`FeedHandle` 的默认实现
//! - `websocket`: 连接交易所（或归一化中继）并把消息写入 `MarketDataStore`

pub mod store;
pub mod websocket;

pub use store::MarketDataStore;
pub use websocket::connect;

use crate::common::{BookEntry, ExchangeId, LiquidationEvent, OpenInterestEvent, Result, TradeEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// 数据流种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    OrderBook,
    Trade,
    Liquidation,
    OpenInterest,
}

impl StreamKind {
    /// 数据流名称，与归一化消息中的 `stream` 字段一致
    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::OrderBook => "orderbook",
            StreamKind::Trade => "trade",
            StreamKind::Liquidation => "liquidation",
            StreamKind::OpenInterest => "instrument",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "orderbook" => Some(StreamKind::OrderBook),
            "trade" => Some(StreamKind::Trade),
            "liquidation" => Some(StreamKind::Liquidation),
            "instrument" | "open_interest" => Some(StreamKind::OpenInterest),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_true() -> bool {
    true
}

/// 交易所提供的数据流集合，在配置阶段确定。
/// 订单簿是所有交易所的必备流，不在此列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCapabilities {
    #[serde(default = "default_true")]
    pub trade: bool,
    #[serde(default = "default_true")]
    pub liquidation: bool,
    #[serde(default = "default_true")]
    pub open_interest: bool,
}

impl Default for StreamCapabilities {
    fn default() -> Self {
        Self {
            trade: true,
            liquidation: true,
            open_interest: true,
        }
    }
}

impl StreamCapabilities {
    pub fn supports(&self, kind: StreamKind) -> bool {
        match kind {
            StreamKind::OrderBook => true,
            StreamKind::Trade => self.trade,
            StreamKind::Liquidation => self.liquidation,
            StreamKind::OpenInterest => self.open_interest,
        }
    }
}

/// 单个交易所的数据源
///
/// 快照读取是非阻塞的，尚无数据时返回空序列；读取交易所不提供的数据流
/// 返回 `AppError::StreamUnsupported`。
pub trait FeedHandle: Send + Sync + 'static {
    fn exchange(&self) -> &ExchangeId;

    fn capabilities(&self) -> StreamCapabilities;

    fn orderbook(&self) -> Result<Vec<BookEntry>>;

    fn trades(&self) -> Result<Vec<TradeEvent>>;

    fn liquidations(&self) -> Result<Vec<LiquidationEvent>>;

    fn open_interest(&self) -> Result<Vec<OpenInterestEvent>>;

    /// 挂起直到任一数据流收到新数据
    fn wait_update(&self) -> impl Future<Output = ()> + Send;

    /// 订单簿和能力集合内的所有数据流都已收到数据
    fn is_ready(&self) -> Result<bool> {
        let caps = self.capabilities();
        if self.orderbook()?.is_empty() {
            return Ok(false);
        }
        if caps.trade && self.trades()?.is_empty() {
            return Ok(false);
        }
        if caps.liquidation && self.liquidations()?.is_empty() {
            return Ok(false);
        }
        if caps.open_interest && self.open_interest()?.is_empty() {
            return Ok(false);
        }
        Ok(true)
    }
}
