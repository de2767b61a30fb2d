//! 启动多交易所 Ticker 采集服务。
//!
//! ## 执行流程
//! - 加载配置并初始化日志（guard 由 main 持有到进程结束）。
//! - 为每个启用的交易所创建 `MarketDataStore` 并建立 WebSocket 连接。
//! - 把所有数据源交给 `SyncScheduler`，运行到致命错误、Ctrl-C 或 SIGTERM。
//! - 退出前调度器把缓冲中的 Ticker 全部写入每日 CSV 文件。

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use ticker_collector::common::config::constants::DEFAULT_CONFIG_PATH;
use ticker_collector::common::{init_logging, CollectorConfig, ShutdownSignal};
use ticker_collector::feed::{self, MarketDataStore};
use ticker_collector::storage::CsvSink;
use ticker_collector::{SchedulerSettings, SyncScheduler};
use tokio::time::Duration;
use tracing::{error, info, instrument, span, trace, Instrument, Level};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Multi-exchange ticker collector.", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = CollectorConfig::from_file(&args.config)?;

    // 1. 日志系统必须最先初始化，guard 的生命周期决定文件日志何时被刷新
    let _guard = init_logging(&config.logging)?;

    // 设置一个 panic hook 来捕获未处理的 panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(target: "应用生命周期", panic_info = %panic_info, "程序发生未捕获的Panic，即将退出");
        original_hook(panic_info);
        std::process::exit(1);
    }));

    // 2. 创建 I/O 运行时
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("io-worker")
        .build()?;

    let main_span = span!(target: "应用生命周期", Level::INFO, "ticker_collector_lifecycle");
    let result = runtime.block_on(run_app(config, args.config).instrument(main_span));

    if let Err(e) = &result {
        error!(target: "应用生命周期", error = ?e, "应用因顶层错误而异常退出");
    } else {
        info!(target: "应用生命周期", "应用程序正常关闭");
    }

    runtime.shutdown_timeout(Duration::from_secs(5));
    info!(target: "应用生命周期", "运行时已关闭");

    result
}

#[instrument(target = "应用生命周期", skip_all, name = "run_app")]
async fn run_app(config: CollectorConfig, config_path: String) -> Result<()> {
    info!(
        target: "应用生命周期",
        path = %config_path,
        interval_secs = config.interval_secs,
        error_threshold = config.error_threshold,
        day_boundary = ?config.day_boundary,
        "配置文件加载成功"
    );
    trace!(target: "应用生命周期", config_details = ?config, "详细配置信息");

    // SIGTERM 处理器在连接交易所之前注册
    let signal = ShutdownSignal::install()?;

    let mut feeds = Vec::new();
    let mut readers = Vec::new();
    for exchange in config.active_exchanges() {
        let store = Arc::new(MarketDataStore::new(
            exchange.id.clone(),
            exchange.capabilities,
            config.max_events,
        ));
        let reader = feed::connect(&exchange.url, &exchange.subscriptions, store.clone()).await?;
        info!(target: "应用生命周期", exchange = %exchange.id, "交易所连接已建立");
        feeds.push(store);
        readers.push(reader);
    }

    let sink = CsvSink::new(&config.storage.output_dir);
    let scheduler = SyncScheduler::new(SchedulerSettings::from(&config), feeds, sink)?;

    let shutdown = async move {
        let name = signal.recv().await;
        info!(target: "应用生命周期", signal = name, "收到关闭信号");
    };
    let result = scheduler.run(shutdown).await;

    for reader in readers {
        reader.abort();
    }

    result.map_err(Into::into)
}
