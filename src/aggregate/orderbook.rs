//! 订单簿快照解析
//!
//! 把无序的原始档位拆成买卖两侧，丢弃额外字段，买盘按价格降序、卖盘按价格升序。

use crate::common::{AppError, BookEntry, ExchangeId, OrderBookSides, PriceLevel, Result, Side};

/// 下游需要的每侧档位数
pub const REQUIRED_DEPTH: usize = 2;

/// 买卖各取最优两档
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopOfBook {
    pub buy: [PriceLevel; REQUIRED_DEPTH],
    pub sell: [PriceLevel; REQUIRED_DEPTH],
}

pub fn parse_orderbook(entries: &[BookEntry]) -> OrderBookSides {
    let mut sides = OrderBookSides::default();
    for entry in entries {
        let level = PriceLevel {
            price: entry.price,
            size: entry.size,
        };
        match entry.side {
            Side::Buy => sides.buy.push(level),
            Side::Sell => sides.sell.push(level),
        }
    }
    sides.sell.sort_by(|a, b| a.price.total_cmp(&b.price));
    sides.buy.sort_by(|a, b| b.price.total_cmp(&a.price));
    sides
}

impl OrderBookSides {
    /// 取最优两档，深度不足时返回 `InsufficientDepth`
    pub fn top_of_book(&self, exchange: &ExchangeId) -> Result<TopOfBook> {
        Ok(TopOfBook {
            buy: best_levels(&self.buy, exchange, Side::Buy)?,
            sell: best_levels(&self.sell, exchange, Side::Sell)?,
        })
    }
}

fn best_levels(
    levels: &[PriceLevel],
    exchange: &ExchangeId,
    side: Side,
) -> Result<[PriceLevel; REQUIRED_DEPTH]> {
    match levels {
        [first, second, ..] => Ok([*first, *second]),
        _ => Err(AppError::InsufficientDepth {
            exchange: exchange.to_string(),
            side: side.as_str(),
            levels: levels.len(),
            required: REQUIRED_DEPTH,
        }),
    }
}
