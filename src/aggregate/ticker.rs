//! Ticker 记录构建

use crate::aggregate::TopOfBook;
use crate::common::{LiquidationQty, Ohlcv, OiRange, Ticker};
use chrono::{DateTime, Utc};

pub fn build_ticker(
    timestamp: DateTime<Utc>,
    ohlcv: &Ohlcv,
    liquidation: &LiquidationQty,
    oi: &OiRange,
    book: &TopOfBook,
) -> Ticker {
    Ticker {
        timestamp,
        open: ohlcv.open,
        high: ohlcv.high,
        low: ohlcv.low,
        close: ohlcv.close,
        buy_volume: ohlcv.buy_volume,
        sell_volume: ohlcv.sell_volume,
        buy_price_avg: ohlcv.buy_price_avg,
        sell_price_avg: ohlcv.sell_price_avg,
        buy_liq_qty: liquidation.buy_liq_qty,
        sell_liq_qty: liquidation.sell_liq_qty,
        oi_open: oi.oi_open,
        oi_high: oi.oi_high,
        oi_low: oi.oi_low,
        oi_close: oi.oi_close,
        buy_size_1: book.buy[0].size,
        buy_size_2: book.buy[1].size,
        buy_price_1: book.buy[0].price,
        buy_price_2: book.buy[1].price,
        sell_size_1: book.sell[0].size,
        sell_size_2: book.sell[1].size,
        sell_price_1: book.sell[0].price,
        sell_price_2: book.sell[1].price,
    }
}
