//! 多交易所同步调度器
//!
//! ## 状态流转
//! `AwaitingReady → Aligning → Warming → SteadyState ⇄ Recovering → Terminal`
//!
//! 1.  **AwaitingReady**: 等待所有交易所的订单簿及能力集合内的数据流都收到数据。
//! 2.  **Aligning**: 等到墙钟秒数为周期的整数倍，使所有交易所在同一边界关闭窗口。
//! 3.  **Warming**: 为每个交易所启动后台聚合任务，等待一个完整周期。
//! 4.  **SteadyState**: 每个周期关闭窗口、解析订单簿、生成 Ticker、追加到缓冲，然后等待下一个边界。
//! 5.  **Recovering**: 周期失败后跳过本周期、重新对齐；连续失败超过阈值时升级为致命错误。
//! 6.  **Terminal**: 致命错误或外部关闭信号。停止后台任务，尽力把缓冲全部落盘。

pub mod accumulation;
pub mod clock;
pub mod retry;


pub use accumulation::{poll_once, run_accumulation_task};
pub use retry::ErrorBudget;

use crate::aggregate::{build_ticker, close_window, parse_orderbook, EventAccumulator};
use crate::common::{AppError, CollectorConfig, DayBoundary, ExchangeId, Result, Ticker};
use crate::feed::FeedHandle;
use crate::storage::{BufferStore, Sink};
use chrono::{DateTime, Utc};
use futures_util::future::select_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, error, info, instrument, warn, Instrument};

/// 调度器日志目标
pub const SCHEDULER_TARGET: &str = "同步调度器";

/// 等待就绪期间输出未就绪交易所的间隔
const READY_REPORT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    AwaitingReady,
    Aligning,
    Warming,
    SteadyState,
    Recovering,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub error_threshold: u32,
    pub day_boundary: DayBoundary,
    pub stale_warn_cycles: u32,
}

impl From<&CollectorConfig> for SchedulerSettings {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            interval_secs: config.interval_secs,
            error_threshold: config.error_threshold,
            day_boundary: config.day_boundary,
            stale_warn_cycles: config.stale_warn_cycles,
        }
    }
}

/// 每个交易所的数据源与当前窗口累加器
struct ExchangeSlot<F> {
    feed: Arc<F>,
    accumulator: Arc<Mutex<EventAccumulator>>,
}

pub struct SyncScheduler<F: FeedHandle, S: Sink> {
    settings: SchedulerSettings,
    slots: Vec<ExchangeSlot<F>>,
    buffers: BufferStore,
    sink: S,
    budget: ErrorBudget,
    state: SchedulerState,
    /// 所有交易所连续无成交的周期数
    stale_cycles: u32,
    shutdown_tx: watch::Sender<bool>,
    fatal_tx: mpsc::UnboundedSender<AppError>,
    fatal_rx: mpsc::UnboundedReceiver<AppError>,
    tasks: Vec<JoinHandle<()>>,
}

impl<F: FeedHandle, S: Sink> SyncScheduler<F, S> {
    pub fn new(settings: SchedulerSettings, feeds: Vec<Arc<F>>, sink: S) -> Result<Self> {
        if feeds.is_empty() {
            return Err(AppError::ConfigError("调度器至少需要一个交易所".to_string()));
        }
        let mut seen = HashSet::new();
        for feed in &feeds {
            if !seen.insert(feed.exchange().clone()) {
                return Err(AppError::ConfigError(format!(
                    "交易所重复: {}",
                    feed.exchange()
                )));
            }
        }

        let buffers = BufferStore::new(
            feeds.iter().map(|f| f.exchange().clone()),
            settings.day_boundary,
            Utc::now(),
        );
        let slots = feeds
            .into_iter()
            .map(|feed| ExchangeSlot {
                feed,
                accumulator: Arc::new(Mutex::new(EventAccumulator::new())),
            })
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        Ok(Self {
            budget: ErrorBudget::new(settings.error_threshold),
            settings,
            slots,
            buffers,
            sink,
            state: SchedulerState::AwaitingReady,
            stale_cycles: 0,
            shutdown_tx,
            fatal_tx,
            fatal_rx,
            tasks: Vec::new(),
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn buffers(&self) -> &BufferStore {
        &self.buffers
    }

    /// 运行调度器直到致命错误或 `shutdown` 完成，退出前总是尝试落盘
    #[instrument(target = "同步调度器", skip_all, name = "run_scheduler")]
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let result = tokio::select! {
            result = self.drive() => result,
            _ = shutdown => {
                info!(target: SCHEDULER_TARGET, reason = "shutdown_signal", "接收到关闭信号，开始优雅关闭");
                Ok(())
            }
        };

        if let Err(e) = &result {
            error!(
                target: SCHEDULER_TARGET,
                error = %e,
                error_type = e.get_error_type_summary(),
                "调度器因致命错误终止"
            );
        }

        let flushed = self.terminate();
        match (result, flushed) {
            (Err(e), flush_result) => {
                if let Err(flush_err) = flush_result {
                    error!(target: SCHEDULER_TARGET, error = %flush_err, "终止前的兜底落盘失败");
                }
                Err(e)
            }
            (Ok(()), flush_result) => flush_result,
        }
    }

    async fn drive(&mut self) -> Result<()> {
        let interval = self.settings.interval_secs;

        self.state = SchedulerState::AwaitingReady;
        self.await_ready().await?;

        self.state = SchedulerState::Aligning;
        info!(target: SCHEDULER_TARGET, interval_secs = interval, "所有交易所已就绪，等待时钟对齐");
        clock::wait_until_aligned(interval).await;

        self.state = SchedulerState::Warming;
        self.start_accumulation();
        tokio::select! {
            _ = sleep(Duration::from_secs(interval)) => {}
            Some(e) = self.fatal_rx.recv() => return Err(e),
        }

        self.state = SchedulerState::SteadyState;
        info!(target: SCHEDULER_TARGET, "进入稳定采集阶段");
        loop {
            let timestamp = Utc::now();
            let cycle_result = self.run_cycle(timestamp).await;
            self.on_cycle_result(cycle_result)?;

            tokio::select! {
                _ = clock::sleep_until_next_boundary(interval) => {}
                Some(e) = self.fatal_rx.recv() => return Err(e),
            }
        }
    }

    /// 等待所有交易所就绪，每次任一数据源有更新后重新检查
    ///
    /// 未就绪的交易所按 `READY_REPORT_INTERVAL` 节流输出，没有任何更新时同样会输出。
    async fn await_ready(&mut self) -> Result<()> {
        let mut reports = 0u32;
        let mut last_report: Option<Instant> = None;
        loop {
            let mut pending = Vec::new();
            for slot in &self.slots {
                if !slot.feed.is_ready()? {
                    pending.push(slot.feed.exchange().as_str());
                }
            }
            if pending.is_empty() {
                return Ok(());
            }

            if last_report.map_or(true, |t| t.elapsed() >= READY_REPORT_INTERVAL) {
                if reports == 0 {
                    info!(target: SCHEDULER_TARGET, ?pending, "等待交易所数据就绪");
                } else {
                    warn!(
                        target: SCHEDULER_TARGET,
                        ?pending,
                        waited_secs = u64::from(reports) * READY_REPORT_INTERVAL.as_secs(),
                        "交易所仍未就绪，请检查连接地址是否推送归一化行情消息"
                    );
                }
                reports += 1;
                last_report = Some(Instant::now());
            }

            let waits = self
                .slots
                .iter()
                .map(|slot| Box::pin(slot.feed.wait_update()));
            let _ = timeout(READY_REPORT_INTERVAL, select_all(waits)).await;
        }
    }

    /// 为每个交易所启动后台聚合任务
    ///
    /// 任务失败时错误经通道送回调度器，在下一个挂起点以致命错误终止。
    pub fn start_accumulation(&mut self) {
        if !self.tasks.is_empty() {
            warn!(target: SCHEDULER_TARGET, "后台聚合任务已启动");
            return;
        }
        for slot in &self.slots {
            let feed = slot.feed.clone();
            let accumulator = slot.accumulator.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let fatal_tx = self.fatal_tx.clone();
            let exchange = feed.exchange().clone();
            let span = tracing::info_span!("accumulation_task", %exchange);

            let handle = tokio::spawn(
                async move {
                    if let Err(e) = run_accumulation_task(feed, accumulator, shutdown_rx).await {
                        error!(
                            target: "后台聚合",
                            %exchange,
                            error = %e,
                            error_type = e.get_error_type_summary(),
                            "后台聚合任务失败，整个采集将终止"
                        );
                        let _ = fatal_tx.send(e);
                    }
                }
                .instrument(span),
            );
            self.tasks.push(handle);
        }
        info!(target: SCHEDULER_TARGET, task_count = self.tasks.len(), "后台聚合任务已全部启动");
    }

    /// 执行一个周期：关闭所有窗口、解析订单簿、生成 Ticker 并追加到缓冲
    #[instrument(target = "同步调度器", skip(self), err)]
    pub async fn run_cycle(&mut self, timestamp: DateTime<Utc>) -> Result<()> {
        let mut windows = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let closed = slot.accumulator.lock().await.take();
            windows.push(closed);
        }

        let mut tickers: Vec<(ExchangeId, Ticker)> = Vec::with_capacity(self.slots.len());
        for (slot, window) in self.slots.iter().zip(&windows) {
            let (ohlcv, liquidation, oi) = close_window(window);
            let exchange = slot.feed.exchange();
            let top = parse_orderbook(&slot.feed.orderbook()?).top_of_book(exchange)?;
            tickers.push((
                exchange.clone(),
                build_ticker(timestamp, &ohlcv, &liquidation, &oi, &top),
            ));
        }

        for (exchange, ticker) in tickers {
            self.buffers.append(&exchange, ticker, &self.sink)?;
        }

        self.track_staleness(&windows);
        debug!(target: SCHEDULER_TARGET, %timestamp, "周期完成");
        Ok(())
    }

    /// 所有交易所都关闭了无成交窗口时累计，达到阈值告警一次，不会终止
    fn track_staleness(&mut self, windows: &[EventAccumulator]) {
        if windows.iter().any(|w| w.trade_count() > 0) {
            self.stale_cycles = 0;
            return;
        }
        self.stale_cycles += 1;
        let limit = self.settings.stale_warn_cycles;
        if limit > 0 && self.stale_cycles == limit {
            warn!(
                target: SCHEDULER_TARGET,
                stale_cycles = self.stale_cycles,
                "所有交易所连续多个周期无成交，数据源可能已停滞"
            );
        }
    }

    /// 周期结果处理：成功清零计数；致命错误直接返回；
    /// 其它错误计数并跳过本周期，超过阈值时升级为致命错误
    pub fn on_cycle_result(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                if self.state == SchedulerState::Recovering {
                    info!(
                        target: SCHEDULER_TARGET,
                        previous_failures = self.budget.consecutive_failures(),
                        "周期恢复正常"
                    );
                }
                self.budget.record_success();
                self.state = SchedulerState::SteadyState;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let escalate = self.budget.record_failure();
                error!(
                    target: SCHEDULER_TARGET,
                    error = %e,
                    error_type = e.get_error_type_summary(),
                    consecutive_failures = self.budget.consecutive_failures(),
                    threshold = self.budget.threshold(),
                    "周期执行失败，跳过本周期"
                );
                if escalate {
                    return Err(AppError::RetryBudgetExhausted {
                        failures: self.budget.consecutive_failures(),
                        last_error: e.to_string(),
                    });
                }
                self.state = SchedulerState::Recovering;
                Ok(())
            }
        }
    }

    /// 停止后台任务并把缓冲全部落盘，进行中的窗口丢弃
    fn terminate(&mut self) -> Result<()> {
        self.state = SchedulerState::Terminal;
        let _ = self.shutdown_tx.send(true);
        for handle in self.tasks.drain(..) {
            handle.abort();
        }
        info!(target: SCHEDULER_TARGET, day = %self.buffers.current_day(), "保存剩余缓冲数据");
        self.buffers.flush_all(&self.sink)
    }
}
