//! 公共数据模型
//!
//! 包含交易所标识、归一化后的行情事件、窗口汇总结果以及最终落盘的 `Ticker` 记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// 交易所标识，来自配置中的固定集合
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 买卖方向
///
/// 交易所推送的方向字段大小写不一（`buy` / `Buy` / `BUY`），解析时统一处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }
}

impl TryFrom<String> for Side {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "buy" | "bid" => Ok(Side::Buy),
            "sell" | "ask" => Ok(Side::Sell),
            other => Err(format!("未知的买卖方向: {}", other)),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件标识既可能是字符串也可能是数字，统一转成字符串比较
fn de_event_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "事件标识必须是字符串或数字: {}",
            other
        ))),
    }
}

//=============================================================================
// 归一化行情事件
//=============================================================================

/// 订单簿原始档位，额外字段原样保留，解析时丢弃
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEntry {
    pub side: Side,
    pub price: f64,
    pub size: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BookEntry {
    pub fn new(side: Side, price: f64, size: f64) -> Self {
        Self {
            side,
            price,
            size,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(deserialize_with = "de_event_id")]
    pub id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    #[serde(deserialize_with = "de_event_id")]
    pub id: String,
    pub side: Side,
    pub qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestEvent {
    #[serde(deserialize_with = "de_event_id")]
    pub id: String,
    pub open_interest: f64,
}

/// 一笔成交价格，窗口关闭时消费后丢弃
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractPrice {
    pub side: Side,
    pub price: f64,
}

//=============================================================================
// 窗口汇总
//=============================================================================

/// 窗口内的成交汇总。无成交时价格字段为 `None`，与数值 0 区分。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ohlcv {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub buy_price_avg: Option<f64>,
    pub sell_price_avg: Option<f64>,
}

/// 窗口内强平量合计，无强平时为 0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LiquidationQty {
    pub buy_liq_qty: f64,
    pub sell_liq_qty: f64,
}

/// 窗口内未平仓量区间
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OiRange {
    pub oi_open: Option<f64>,
    pub oi_high: Option<f64>,
    pub oi_low: Option<f64>,
    pub oi_close: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// 排序后的订单簿：`buy` 按价格降序，`sell` 按价格升序
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderBookSides {
    pub buy: Vec<PriceLevel>,
    pub sell: Vec<PriceLevel>,
}

/// 每个交易所每个窗口一条的落盘记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub buy_price_avg: Option<f64>,
    pub sell_price_avg: Option<f64>,
    pub buy_liq_qty: f64,
    pub sell_liq_qty: f64,
    pub oi_open: Option<f64>,
    pub oi_high: Option<f64>,
    pub oi_low: Option<f64>,
    pub oi_close: Option<f64>,
    pub buy_size_1: f64,
    pub buy_size_2: f64,
    pub buy_price_1: f64,
    pub buy_price_2: f64,
    pub sell_size_1: f64,
    pub sell_size_2: f64,
    pub sell_price_1: f64,
    pub sell_price_2: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parsing_is_case_insensitive() {
        let sides: Vec<Side> = serde_json::from_str(r#"["buy","Sell","BUY","sell"]"#).unwrap();
        assert_eq!(sides, vec![Side::Buy, Side::Sell, Side::Buy, Side::Sell]);
        assert!(serde_json::from_str::<Side>(r#""hold""#).is_err());
    }

    #[test]
    fn test_event_id_accepts_numbers() {
        let trade: TradeEvent =
            serde_json::from_str(r#"{"id":12345,"side":"Buy","price":100.5,"size":2}"#).unwrap();
        assert_eq!(trade.id, "12345");

        let oi: OpenInterestEvent =
            serde_json::from_str(r#"{"id":"2021-05-01T00:00:00Z","open_interest":1.5e9}"#).unwrap();
        assert_eq!(oi.id, "2021-05-01T00:00:00Z");
    }

    #[test]
    fn test_book_entry_keeps_extra_fields() {
        let entry: BookEntry = serde_json::from_str(
            r#"{"side":"Sell","price":105.0,"size":1.0,"id":8799895000,"symbol":"XBTUSD"}"#,
        )
        .unwrap();
        assert_eq!(entry.side, Side::Sell);
        assert_eq!(entry.extra.len(), 2);
    }
}
