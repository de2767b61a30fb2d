//! 每日 CSV 文件与按日切换的集成测试

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fs;
use ticker_collector::common::{AppError, DayBoundary, ExchangeId, Ticker};
use ticker_collector::storage::{BufferStore, CsvSink, Sink};

fn ticker_at(ts: DateTime<Utc>, close: Option<f64>) -> Ticker {
    Ticker {
        timestamp: ts,
        open: close,
        high: close,
        low: close,
        close,
        buy_volume: if close.is_some() { 1.5 } else { 0.0 },
        sell_volume: 0.0,
        buy_price_avg: close,
        sell_price_avg: None,
        buy_liq_qty: 0.0,
        sell_liq_qty: 0.0,
        oi_open: None,
        oi_high: None,
        oi_low: None,
        oi_close: None,
        buy_size_1: 10.0,
        buy_size_2: 20.0,
        buy_price_1: 100.0,
        buy_price_2: 99.5,
        sell_size_1: 30.0,
        sell_size_2: 40.0,
        sell_price_1: 100.5,
        sell_price_2: 101.0,
    }
}

fn read_back(path: &std::path::Path) -> Vec<Ticker> {
    csv::Reader::from_path(path)
        .unwrap()
        .deserialize()
        .collect::<Result<Vec<Ticker>, _>>()
        .unwrap()
}

#[test]
fn test_csv_file_naming_and_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path().join("trading_datas"));
    let exchange = ExchangeId::from("bybit");
    let day = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
    let ts = Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 5).unwrap();

    let tickers = vec![ticker_at(ts, Some(100.0)), ticker_at(ts, None)];
    sink.flush(&exchange, &tickers, day).unwrap();

    let path = sink.file_path(&exchange, day);
    assert!(path.ends_with("20210501_bybit.csv"));
    assert_eq!(read_back(&path), tickers);

    let content = fs::read_to_string(&path).unwrap();
    let header = content.lines().next().unwrap();
    assert!(header.starts_with("timestamp,open,high,low,close,buy_volume,sell_volume"));
    assert!(header.ends_with("sell_size_1,sell_size_2,sell_price_1,sell_price_2"));
    // 无成交窗口的 OHLC 为空单元格，而不是 0
    let quiet_row = content.lines().nth(2).unwrap();
    assert!(quiet_row.contains(",,,,"));
}

#[test]
fn test_csv_appends_to_existing_day_file() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path());
    let exchange = ExchangeId::from("bitmex");
    let day = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
    let ts = Utc.with_ymd_and_hms(2021, 5, 1, 12, 0, 5).unwrap();

    sink.flush(&exchange, &[ticker_at(ts, Some(1.0))], day).unwrap();
    sink.flush(&exchange, &[ticker_at(ts, Some(2.0)), ticker_at(ts, Some(3.0))], day)
        .unwrap();

    let closes: Vec<_> = read_back(&sink.file_path(&exchange, day))
        .into_iter()
        .map(|t| t.close)
        .collect();
    assert_eq!(closes, vec![Some(1.0), Some(2.0), Some(3.0)]);
    assert!(!sink.file_path(&exchange, day).with_extension("csv.tmp").exists());
}

#[test]
fn test_unwritable_directory_is_sink_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not_a_dir");
    fs::write(&blocker, "x").unwrap();
    let sink = CsvSink::new(&blocker);
    let day = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
    let ts = Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap();

    let err = sink
        .flush(&ExchangeId::from("bybit"), &[ticker_at(ts, None)], day)
        .unwrap_err();
    assert!(matches!(err, AppError::SinkError(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_rollover_writes_one_file_per_exchange_for_previous_day() {
    let dir = tempfile::tempdir().unwrap();
    let sink = CsvSink::new(dir.path());
    let exchanges = vec![ExchangeId::from("bitmex"), ExchangeId::from("bybit")];
    let before = Utc.with_ymd_and_hms(2021, 5, 1, 23, 59, 55).unwrap();
    let after = Utc.with_ymd_and_hms(2021, 5, 2, 0, 0, 0).unwrap();

    let mut store = BufferStore::new(exchanges.clone(), DayBoundary::Utc, before);
    for exchange in &exchanges {
        store.append(exchange, ticker_at(before, Some(1.0)), &sink).unwrap();
    }
    for exchange in &exchanges {
        store.append(exchange, ticker_at(after, Some(2.0)), &sink).unwrap();
    }

    let day_d = NaiveDate::from_ymd_opt(2021, 5, 1).unwrap();
    for exchange in &exchanges {
        let rows = read_back(&sink.file_path(exchange, day_d));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, before);
        assert_eq!(store.len(exchange), 1);
    }
    assert_eq!(store.current_day(), NaiveDate::from_ymd_opt(2021, 5, 2).unwrap());

    store.flush_all(&sink).unwrap();
    assert!(store.is_empty());
    let day_d1 = NaiveDate::from_ymd_opt(2021, 5, 2).unwrap();
    assert_eq!(read_back(&sink.file_path(&exchanges[0], day_d1)).len(), 1);
}
