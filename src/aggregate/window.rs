//! 窗口汇总：把一个窗口的累加状态转换成不可变的 OHLCV / 强平量 / 未平仓量区间

use crate::aggregate::EventAccumulator;
use crate::common::{LiquidationQty, Ohlcv, OiRange, Side};

/// 关闭窗口，生成三项汇总结果
pub fn close_window(acc: &EventAccumulator) -> (Ohlcv, LiquidationQty, OiRange) {
    (
        summarize_trades(acc),
        LiquidationQty {
            buy_liq_qty: acc.buy_liq_qty,
            sell_liq_qty: acc.sell_liq_qty,
        },
        summarize_open_interest(&acc.oi_samples),
    )
}

fn summarize_trades(acc: &EventAccumulator) -> Ohlcv {
    let prices = &acc.contract_prices;

    let (Some(first), Some(last)) = (prices.first(), prices.last()) else {
        return Ohlcv {
            buy_volume: acc.buy_volume,
            sell_volume: acc.sell_volume,
            ..Default::default()
        };
    };

    let high = prices.iter().map(|p| p.price).fold(f64::MIN, f64::max);
    let low = prices.iter().map(|p| p.price).fold(f64::MAX, f64::min);

    let side_sum = |side: Side| -> f64 {
        prices
            .iter()
            .filter(|p| p.side == side)
            .map(|p| p.price)
            .sum()
    };
    // 同方向价格之和除以该方向成交量，成交量为0时为空
    let average = |sum: f64, volume: f64| (volume > 0.0).then(|| sum / volume);

    Ohlcv {
        open: Some(first.price),
        high: Some(high),
        low: Some(low),
        close: Some(last.price),
        buy_volume: acc.buy_volume,
        sell_volume: acc.sell_volume,
        buy_price_avg: average(side_sum(Side::Buy), acc.buy_volume),
        sell_price_avg: average(side_sum(Side::Sell), acc.sell_volume),
    }
}

fn summarize_open_interest(samples: &[f64]) -> OiRange {
    let (Some(&first), Some(&last)) = (samples.first(), samples.last()) else {
        return OiRange::default();
    };
    OiRange {
        oi_open: Some(first),
        oi_high: Some(samples.iter().copied().fold(f64::MIN, f64::max)),
        oi_low: Some(samples.iter().copied().fold(f64::MAX, f64::min)),
        oi_close: Some(last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{LiquidationEvent, OpenInterestEvent, TradeEvent};

    fn trade(id: &str, side: Side, price: f64, size: f64) -> TradeEvent {
        TradeEvent {
            id: id.to_string(),
            side,
            price,
            size,
        }
    }

    #[test]
    fn test_three_trade_window() {
        let mut acc = EventAccumulator::new();
        acc.fold_trade(&trade("1", Side::Buy, 100.0, 1.0));
        acc.fold_trade(&trade("2", Side::Sell, 101.0, 2.0));
        acc.fold_trade(&trade("3", Side::Buy, 102.0, 3.0));

        let (ohlcv, liq, oi) = close_window(&acc);
        assert_eq!(
            ohlcv,
            Ohlcv {
                open: Some(100.0),
                high: Some(102.0),
                low: Some(100.0),
                close: Some(102.0),
                buy_volume: 4.0,
                sell_volume: 2.0,
                buy_price_avg: Some(50.5),
                sell_price_avg: Some(50.5),
            }
        );
        assert_eq!(liq, LiquidationQty::default());
        assert_eq!(oi, OiRange::default());
    }

    #[test]
    fn test_open_close_follow_arrival_order() {
        let mut acc = EventAccumulator::new();
        for (i, price) in [105.0, 99.0, 110.0, 101.0].into_iter().enumerate() {
            let side = if i % 2 == 0 { Side::Sell } else { Side::Buy };
            acc.fold_trade(&trade(&i.to_string(), side, price, 1.0));
        }
        let (ohlcv, _, _) = close_window(&acc);
        assert_eq!(ohlcv.open, Some(105.0));
        assert_eq!(ohlcv.close, Some(101.0));
        assert_eq!(ohlcv.high, Some(110.0));
        assert_eq!(ohlcv.low, Some(99.0));
    }

    #[test]
    fn test_empty_window_has_absent_prices() {
        let (ohlcv, liq, oi) = close_window(&EventAccumulator::new());
        assert_eq!(ohlcv.open, None);
        assert_eq!(ohlcv.high, None);
        assert_eq!(ohlcv.low, None);
        assert_eq!(ohlcv.close, None);
        assert_eq!(ohlcv.buy_price_avg, None);
        assert_eq!(ohlcv.buy_volume, 0.0);
        assert_eq!(ohlcv.sell_volume, 0.0);
        assert_eq!(liq.buy_liq_qty, 0.0);
        assert_eq!(oi.oi_open, None);
    }

    #[test]
    fn test_one_sided_window_guards_division() {
        let mut acc = EventAccumulator::new();
        acc.fold_trade(&trade("1", Side::Sell, 200.0, 4.0));
        let (ohlcv, _, _) = close_window(&acc);
        assert_eq!(ohlcv.buy_price_avg, None);
        assert_eq!(ohlcv.sell_price_avg, Some(50.0));
    }

    #[test]
    fn test_liquidation_and_open_interest_range() {
        let mut acc = EventAccumulator::new();
        acc.fold_liquidation(&LiquidationEvent {
            id: "a".into(),
            side: Side::Sell,
            qty: 3.0,
        });
        acc.fold_liquidation(&LiquidationEvent {
            id: "b".into(),
            side: Side::Sell,
            qty: 2.0,
        });
        for (i, v) in [500.0, 520.0, 480.0, 510.0].into_iter().enumerate() {
            acc.fold_open_interest(&OpenInterestEvent {
                id: i.to_string(),
                open_interest: v,
            });
        }

        let (_, liq, oi) = close_window(&acc);
        assert_eq!(liq.sell_liq_qty, 5.0);
        assert_eq!(liq.buy_liq_qty, 0.0);
        assert_eq!(
            oi,
            OiRange {
                oi_open: Some(500.0),
                oi_high: Some(520.0),
                oi_low: Some(480.0),
                oi_close: Some(510.0),
            }
        );
    }
}
