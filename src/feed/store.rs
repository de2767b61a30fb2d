//! 内存行情数据存储
//!
//! 每个交易所一个实例。写入端（WebSocket 读取任务）按数据流更新物化状态，
//! 读取端通过 `FeedHandle` 获取快照，并通过 `wait_update` 等待新数据。

use crate::common::{
    AppError, BookEntry, ExchangeId, LiquidationEvent, OpenInterestEvent, Result, Side, TradeEvent,
};
use crate::feed::{FeedHandle, StreamCapabilities, StreamKind};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Default)]
struct StoreState {
    orderbook: Vec<BookEntry>,
    trades: VecDeque<TradeEvent>,
    liquidations: VecDeque<LiquidationEvent>,
    open_interest: VecDeque<OpenInterestEvent>,
    /// 连接断开等不可恢复故障的原因，设置后所有读取都会失败
    failure: Option<String>,
}

pub struct MarketDataStore {
    exchange: ExchangeId,
    capabilities: StreamCapabilities,
    max_events: usize,
    state: Mutex<StoreState>,
    update_notify: Notify,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, items: impl IntoIterator<Item = T>, max: usize) {
    for item in items {
        if queue.len() == max {
            queue.pop_front();
        }
        queue.push_back(item);
    }
}

fn same_level(a: &BookEntry, side: Side, price: f64) -> bool {
    a.side == side && a.price == price
}

impl MarketDataStore {
    pub fn new(exchange: ExchangeId, capabilities: StreamCapabilities, max_events: usize) -> Self {
        Self {
            exchange,
            capabilities,
            max_events: max_events.max(1),
            state: Mutex::new(StoreState::default()),
            update_notify: Notify::new(),
        }
    }

    pub fn exchange_id(&self) -> &ExchangeId {
        &self.exchange
    }

    fn lock(&self, stream: &'static str) -> Result<MutexGuard<'_, StoreState>> {
        self.state.lock().map_err(|_| AppError::FeedError {
            exchange: self.exchange.to_string(),
            stream,
            message: "数据存储锁已中毒".to_string(),
        })
    }

    /// 读取前检查：数据流是否受支持、存储是否已失效
    fn read_guard(&self, kind: StreamKind) -> Result<MutexGuard<'_, StoreState>> {
        if !self.capabilities.supports(kind) {
            return Err(AppError::StreamUnsupported {
                exchange: self.exchange.to_string(),
                stream: kind.name(),
            });
        }
        let state = self.lock(kind.name())?;
        if let Some(reason) = &state.failure {
            return Err(AppError::FeedError {
                exchange: self.exchange.to_string(),
                stream: kind.name(),
                message: reason.clone(),
            });
        }
        Ok(state)
    }

    fn write_guard(&self, kind: StreamKind) -> Result<MutexGuard<'_, StoreState>> {
        if !self.capabilities.supports(kind) {
            return Err(AppError::StreamUnsupported {
                exchange: self.exchange.to_string(),
                stream: kind.name(),
            });
        }
        self.lock(kind.name())
    }

    /// 唤醒当前所有等待者，并为下一个等待者留一个许可，
    /// 避免"读完快照到开始等待"之间的更新丢失唤醒
    fn publish(&self) {
        self.update_notify.notify_waiters();
        self.update_notify.notify_one();
    }

    /// 用全量快照替换订单簿
    pub fn replace_orderbook(&self, entries: Vec<BookEntry>) -> Result<()> {
        self.write_guard(StreamKind::OrderBook)?.orderbook = entries;
        self.publish();
        Ok(())
    }

    /// 按 (side, price) 插入或更新档位
    pub fn upsert_orderbook(&self, entries: Vec<BookEntry>) -> Result<()> {
        {
            let mut state = self.write_guard(StreamKind::OrderBook)?;
            for entry in entries {
                match state
                    .orderbook
                    .iter_mut()
                    .find(|e| same_level(e, entry.side, entry.price))
                {
                    Some(existing) => *existing = entry,
                    None => state.orderbook.push(entry),
                }
            }
        }
        self.publish();
        Ok(())
    }

    /// 按 (side, price) 删除档位
    pub fn delete_orderbook(&self, entries: &[BookEntry]) -> Result<()> {
        {
            let mut state = self.write_guard(StreamKind::OrderBook)?;
            state
                .orderbook
                .retain(|e| !entries.iter().any(|d| same_level(e, d.side, d.price)));
        }
        self.publish();
        Ok(())
    }

    pub fn push_trades(&self, trades: Vec<TradeEvent>) -> Result<()> {
        {
            let mut state = self.write_guard(StreamKind::Trade)?;
            push_bounded(&mut state.trades, trades, self.max_events);
        }
        self.publish();
        Ok(())
    }

    pub fn push_liquidations(&self, liquidations: Vec<LiquidationEvent>) -> Result<()> {
        {
            let mut state = self.write_guard(StreamKind::Liquidation)?;
            push_bounded(&mut state.liquidations, liquidations, self.max_events);
        }
        self.publish();
        Ok(())
    }

    pub fn push_open_interest(&self, samples: Vec<OpenInterestEvent>) -> Result<()> {
        {
            let mut state = self.write_guard(StreamKind::OpenInterest)?;
            push_bounded(&mut state.open_interest, samples, self.max_events);
        }
        self.publish();
        Ok(())
    }

    /// 标记数据源失效（例如连接关闭），之后的读取全部返回 `FeedError`
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        match self.state.lock() {
            Ok(mut state) => {
                warn!(target: "行情存储", exchange = %self.exchange, %reason, "数据源已失效");
                state.failure = Some(reason);
            }
            Err(poisoned) => {
                poisoned.into_inner().failure = Some(reason);
            }
        }
        self.publish();
    }
}

impl FeedHandle for MarketDataStore {
    fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    fn capabilities(&self) -> StreamCapabilities {
        self.capabilities
    }

    fn orderbook(&self) -> Result<Vec<BookEntry>> {
        Ok(self.read_guard(StreamKind::OrderBook)?.orderbook.clone())
    }

    fn trades(&self) -> Result<Vec<TradeEvent>> {
        Ok(self.read_guard(StreamKind::Trade)?.trades.iter().cloned().collect())
    }

    fn liquidations(&self) -> Result<Vec<LiquidationEvent>> {
        Ok(self
            .read_guard(StreamKind::Liquidation)?
            .liquidations
            .iter()
            .cloned()
            .collect())
    }

    fn open_interest(&self) -> Result<Vec<OpenInterestEvent>> {
        Ok(self
            .read_guard(StreamKind::OpenInterest)?
            .open_interest
            .iter()
            .cloned()
            .collect())
    }

    async fn wait_update(&self) {
        self.update_notify.notified().await;
        debug!(target: "行情存储", exchange = %self.exchange, "收到数据更新通知");
    }
}
