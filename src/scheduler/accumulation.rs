//! 单交易所后台聚合任务
//!
//! 读取成交、强平、未平仓量快照，按去重游标把新事件折叠进当前窗口的累加器，
//! 然后挂起等待数据源的新数据。任务自身不重试：
//! 除"数据流不支持"外的任何读取失败都直接返回，由调度器按致命错误处理。

use crate::aggregate::{DedupCursors, EventAccumulator};
use crate::common::{AppError, Result};
use crate::feed::{FeedHandle, StreamCapabilities, StreamKind};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, trace, warn};

/// 读取结果处理：不支持的数据流从此跳过，其它错误统一为 `FeedError`
fn tolerate_unsupported<T>(
    result: Result<Vec<T>>,
    kind: StreamKind,
    active: &mut StreamCapabilities,
    exchange: &str,
) -> Result<Vec<T>> {
    match result {
        Ok(items) => Ok(items),
        Err(AppError::StreamUnsupported { .. }) => {
            warn!(target: "后台聚合", exchange, stream = kind.name(), "交易所不提供该数据流，此后跳过");
            match kind {
                StreamKind::Trade => active.trade = false,
                StreamKind::Liquidation => active.liquidation = false,
                StreamKind::OpenInterest => active.open_interest = false,
                StreamKind::OrderBook => {}
            }
            Ok(Vec::new())
        }
        Err(e @ AppError::FeedError { .. }) => Err(e),
        Err(e) => Err(AppError::FeedError {
            exchange: exchange.to_string(),
            stream: kind.name(),
            message: e.to_string(),
        }),
    }
}

/// 轮询一次所有数据流，返回本次折叠的事件数
pub async fn poll_once<F: FeedHandle>(
    feed: &F,
    accumulator: &Mutex<EventAccumulator>,
    cursors: &mut DedupCursors,
    active: &mut StreamCapabilities,
) -> Result<usize> {
    let exchange = feed.exchange().as_str();

    let trades = if active.trade {
        tolerate_unsupported(feed.trades(), StreamKind::Trade, active, exchange)?
    } else {
        Vec::new()
    };
    let liquidations = if active.liquidation {
        tolerate_unsupported(feed.liquidations(), StreamKind::Liquidation, active, exchange)?
    } else {
        Vec::new()
    };
    let open_interest = if active.open_interest {
        tolerate_unsupported(feed.open_interest(), StreamKind::OpenInterest, active, exchange)?
    } else {
        Vec::new()
    };

    let new_trades = cursors.new_trades(&trades);
    let new_liquidations = cursors.new_liquidations(&liquidations);
    let new_open_interest = cursors.new_open_interest(&open_interest);

    for (kind, cursor_lost, snapshot_len) in [
        (StreamKind::Trade, new_trades.cursor_lost, trades.len()),
        (StreamKind::Liquidation, new_liquidations.cursor_lost, liquidations.len()),
        (StreamKind::OpenInterest, new_open_interest.cursor_lost, open_interest.len()),
    ] {
        if cursor_lost {
            warn!(
                target: "后台聚合",
                exchange,
                stream = kind.name(),
                snapshot_len,
                gap = true,
                total_gaps = cursors.gaps,
                "上次处理的事件已被环形缓冲淘汰，两次轮询之间有事件丢失"
            );
        }
    }

    let folded = new_trades.len() + new_liquidations.len() + new_open_interest.len();
    if folded == 0 {
        return Ok(0);
    }

    // 与窗口关闭互斥：一次轮询的事件整体落在同一个窗口
    let mut acc = accumulator.lock().await;
    for trade in new_trades.iter() {
        acc.fold_trade(trade);
    }
    for liquidation in new_liquidations.iter() {
        acc.fold_liquidation(liquidation);
    }
    for sample in new_open_interest.iter() {
        acc.fold_open_interest(sample);
    }
    trace!(
        target: "后台聚合",
        exchange,
        trades = new_trades.len(),
        liquidations = new_liquidations.len(),
        open_interest = new_open_interest.len(),
        "折叠新事件"
    );
    Ok(folded)
}

/// 后台聚合任务主循环，直到收到关闭信号或读取失败
#[instrument(target = "后台聚合", skip_all, fields(exchange = %feed.exchange()), err)]
pub async fn run_accumulation_task<F: FeedHandle>(
    feed: Arc<F>,
    accumulator: Arc<Mutex<EventAccumulator>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    info!(target: "后台聚合", "后台聚合任务已启动");
    let mut cursors = DedupCursors::new();
    let mut active = feed.capabilities();

    loop {
        poll_once(&*feed, &accumulator, &mut cursors, &mut active).await?;

        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = feed.wait_update() => {}
        }
    }

    debug!(target: "后台聚合", ?cursors, "后台聚合任务已退出");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{LiquidationEvent, Side, TradeEvent};
    use crate::feed::MarketDataStore;

    fn trade(id: &str, side: Side, price: f64, size: f64) -> TradeEvent {
        TradeEvent {
            id: id.to_string(),
            side,
            price,
            size,
        }
    }

    #[tokio::test]
    async fn test_poll_twice_without_new_data_is_noop() {
        let store = MarketDataStore::new("bybit".into(), StreamCapabilities::default(), 100);
        store.push_trades(vec![trade("1", Side::Buy, 100.0, 2.0)]).unwrap();
        store
            .push_liquidations(vec![LiquidationEvent {
                id: "l1".into(),
                side: Side::Sell,
                qty: 5.0,
            }])
            .unwrap();

        let acc = Mutex::new(EventAccumulator::new());
        let mut cursors = DedupCursors::new();
        let mut active = store.capabilities();

        assert_eq!(poll_once(&store, &acc, &mut cursors, &mut active).await.unwrap(), 2);
        assert_eq!(poll_once(&store, &acc, &mut cursors, &mut active).await.unwrap(), 0);

        let acc = acc.lock().await;
        assert_eq!(acc.buy_volume, 2.0);
        assert_eq!(acc.sell_liq_qty, 5.0);
        assert_eq!(acc.contract_prices.len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_stream_is_skipped_thereafter() {
        let caps = StreamCapabilities {
            trade: true,
            liquidation: false,
            open_interest: false,
        };
        let store = MarketDataStore::new("ftx".into(), caps, 100);
        store.push_trades(vec![trade("1", Side::Sell, 100.0, 1.0)]).unwrap();

        let acc = Mutex::new(EventAccumulator::new());
        let mut cursors = DedupCursors::new();
        // 配置声称支持全部数据流，读取时才发现不支持
        let mut active = StreamCapabilities::default();

        assert_eq!(poll_once(&store, &acc, &mut cursors, &mut active).await.unwrap(), 1);
        assert!(!active.liquidation);
        assert!(!active.open_interest);
        assert!(active.trade);
    }

    #[tokio::test]
    async fn test_failed_feed_is_fatal() {
        let store = MarketDataStore::new("bybit".into(), StreamCapabilities::default(), 100);
        store.mark_failed("连接已关闭");

        let acc = Mutex::new(EventAccumulator::new());
        let mut cursors = DedupCursors::new();
        let mut active = store.capabilities();
        let err = poll_once(&store, &acc, &mut cursors, &mut active)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FeedError { .. }));
    }

    #[tokio::test]
    async fn test_ring_overflow_between_polls_is_reported() {
        let store = MarketDataStore::new("bybit".into(), StreamCapabilities::default(), 3);
        store.push_trades(vec![trade("0", Side::Buy, 100.0, 1.0)]).unwrap();

        let acc = Mutex::new(EventAccumulator::new());
        let mut cursors = DedupCursors::new();
        let mut active = StreamCapabilities {
            trade: true,
            liquidation: false,
            open_interest: false,
        };
        assert_eq!(poll_once(&store, &acc, &mut cursors, &mut active).await.unwrap(), 1);
        acc.lock().await.take();

        // 两次轮询之间到达 5 笔，容量 3 的环形缓冲淘汰了其中 2 笔
        store
            .push_trades((1..=5).map(|i| trade(&i.to_string(), Side::Buy, 100.0, 1.0)).collect())
            .unwrap();
        assert_eq!(poll_once(&store, &acc, &mut cursors, &mut active).await.unwrap(), 3);
        assert_eq!(cursors.gaps, 1);
        assert_eq!(cursors.last_trade_id.as_deref(), Some("5"));
        assert_eq!(acc.lock().await.buy_volume, 3.0);

        // 缓冲内的正常增长不算丢失
        store.push_trades(vec![trade("6", Side::Buy, 100.0, 1.0)]).unwrap();
        assert_eq!(poll_once(&store, &acc, &mut cursors, &mut active).await.unwrap(), 1);
        assert_eq!(cursors.gaps, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_window_swaps_racing_folds_lose_nothing() {
        const TRADES: usize = 1000;
        let store = Arc::new(MarketDataStore::new(
            "bybit".into(),
            StreamCapabilities {
                trade: true,
                liquidation: false,
                open_interest: false,
            },
            256,
        ));
        // 首次轮询只把游标定位到这笔卖单上
        store.push_trades(vec![trade("seed", Side::Sell, 100.0, 1.0)]).unwrap();

        let acc = Arc::new(Mutex::new(EventAccumulator::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_accumulation_task(store.clone(), acc.clone(), shutdown_rx));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let producer_store = store.clone();
        let producer = tokio::spawn(async move {
            for i in 0..TRADES {
                producer_store
                    .push_trades(vec![trade(&format!("b{}", i), Side::Buy, 100.0, 1.0)])
                    .unwrap();
                if i % 10 == 9 {
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut windows = Vec::new();
        while !producer.is_finished() {
            windows.push(acc.lock().await.take());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        producer.await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        windows.push(acc.lock().await.take());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let total: f64 = windows.iter().map(|w| w.buy_volume).sum();
        let prices: usize = windows.iter().map(|w| w.trade_count()).sum();
        assert!(windows.len() > 2);
        assert_eq!(total, TRADES as f64);
        // 种子卖单计入了第一个窗口
        assert_eq!(prices, TRADES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_on_shutdown() {
        let store = Arc::new(MarketDataStore::new(
            "bybit".into(),
            StreamCapabilities::default(),
            100,
        ));
        let acc = Arc::new(Mutex::new(EventAccumulator::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_accumulation_task(store.clone(), acc.clone(), shutdown_rx));
        store.push_trades(vec![trade("1", Side::Buy, 100.0, 1.0)]).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("任务未在关闭信号后退出")
            .unwrap();
        assert!(result.is_ok());
    }
}
