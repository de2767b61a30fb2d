//! 窗口聚合模块
//!
//! - `EventAccumulator` / `DedupCursors`: 单交易所单窗口的累加状态与去重游标
//! - `close_window`: 窗口关闭，生成 OHLCV、强平量、未平仓量区间
//! - `parse_orderbook`: 订单簿快照解析与最优档位提取
//! - `build_ticker`: 组装最终的 `Ticker` 记录

pub mod accumulator;
pub mod orderbook;
pub mod ticker;
pub mod window;

pub use accumulator::{DedupCursors, EventAccumulator, Unseen};
pub use orderbook::{parse_orderbook, TopOfBook, REQUIRED_DEPTH};
pub use ticker::build_ticker;
pub use window::close_window;
