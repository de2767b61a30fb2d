//! 窗口累加器与去重游标
//!
//! `EventAccumulator` 保存当前窗口内的成交、强平、未平仓量样本，每个窗口关闭时被换出。
//! `DedupCursors` 记录每个数据流最后一次处理过的事件标识，生命周期与后台任务相同，
//! 不随窗口重置，否则未变化的快照会在下一个窗口被重复计入。

use crate::common::{ContractPrice, LiquidationEvent, OpenInterestEvent, Side, TradeEvent};

/// 单个交易所当前窗口的累加状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventAccumulator {
    pub contract_prices: Vec<ContractPrice>,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub buy_liq_qty: f64,
    pub sell_liq_qty: f64,
    pub oi_samples: Vec<f64>,
}

impl EventAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold_trade(&mut self, trade: &TradeEvent) {
        self.contract_prices.push(ContractPrice {
            side: trade.side,
            price: trade.price,
        });
        match trade.side {
            Side::Buy => self.buy_volume += trade.size,
            Side::Sell => self.sell_volume += trade.size,
        }
    }

    pub fn fold_liquidation(&mut self, liquidation: &LiquidationEvent) {
        match liquidation.side {
            Side::Buy => self.buy_liq_qty += liquidation.qty,
            Side::Sell => self.sell_liq_qty += liquidation.qty,
        }
    }

    pub fn fold_open_interest(&mut self, sample: &OpenInterestEvent) {
        self.oi_samples.push(sample.open_interest);
    }

    /// 换出当前窗口的状态，留下一个空累加器
    pub fn take(&mut self) -> EventAccumulator {
        std::mem::take(self)
    }

    pub fn trade_count(&self) -> usize {
        self.contract_prices.len()
    }
}

/// 每个数据流最后一次处理过的事件标识
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupCursors {
    pub last_trade_id: Option<String>,
    pub last_liquidation_id: Option<String>,
    pub last_oi_id: Option<String>,
    /// 游标在快照中丢失的累计次数，每次都意味着有事件在两次轮询之间被环形缓冲淘汰
    pub gaps: u64,
}

/// 一次去重的结果
#[derive(Debug)]
pub struct Unseen<'a, T> {
    pub items: &'a [T],
    /// 游标不在快照中：快照之前还有未处理的事件已被淘汰
    pub cursor_lost: bool,
}

impl<'a, T> Unseen<'a, T> {
    fn empty() -> Self {
        Self {
            items: &[],
            cursor_lost: false,
        }
    }
}

impl<'a, T> std::ops::Deref for Unseen<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.items
    }
}

impl<'a, T> IntoIterator for Unseen<'a, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl DedupCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_trades<'a>(&mut self, snapshot: &'a [TradeEvent]) -> Unseen<'a, TradeEvent> {
        let unseen = unseen_since(snapshot, &mut self.last_trade_id, |t| &t.id);
        self.count_gap(unseen)
    }

    pub fn new_liquidations<'a>(
        &mut self,
        snapshot: &'a [LiquidationEvent],
    ) -> Unseen<'a, LiquidationEvent> {
        let unseen = unseen_since(snapshot, &mut self.last_liquidation_id, |l| &l.id);
        self.count_gap(unseen)
    }

    pub fn new_open_interest<'a>(
        &mut self,
        snapshot: &'a [OpenInterestEvent],
    ) -> Unseen<'a, OpenInterestEvent> {
        let unseen = unseen_since(snapshot, &mut self.last_oi_id, |o| &o.id);
        self.count_gap(unseen)
    }

    fn count_gap<'a, T>(&mut self, unseen: Unseen<'a, T>) -> Unseen<'a, T> {
        if unseen.cursor_lost {
            self.gaps += 1;
        }
        unseen
    }
}

/// 返回快照中游标之后尚未处理的事件，并把游标推进到最新事件。
///
/// - 最新事件的标识与游标相同：快照未变化，返回空
/// - 游标为空（首次观察）：只处理最新一条，不回补历史
/// - 游标在快照中找不到（环形缓冲已覆盖）：整个快照都是新的，并标记 `cursor_lost`
fn unseen_since<'a, T>(
    snapshot: &'a [T],
    cursor: &mut Option<String>,
    id_of: impl Fn(&T) -> &str,
) -> Unseen<'a, T> {
    let Some(latest) = snapshot.last() else {
        return Unseen::empty();
    };
    let latest_id = id_of(latest);

    let unseen = match cursor.as_deref() {
        Some(last) if last == latest_id => return Unseen::empty(),
        None => Unseen {
            items: &snapshot[snapshot.len() - 1..],
            cursor_lost: false,
        },
        Some(last) => match snapshot.iter().rposition(|item| id_of(item) == last) {
            Some(pos) => Unseen {
                items: &snapshot[pos + 1..],
                cursor_lost: false,
            },
            None => Unseen {
                items: snapshot,
                cursor_lost: true,
            },
        },
    };

    *cursor = Some(latest_id.to_string());
    unseen
}
