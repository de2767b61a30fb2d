//! 时钟对齐
//!
//! 所有交易所的窗口在同一个墙钟边界关闭：边界是 `秒数 % interval == 0` 的时刻。

use chrono::{DateTime, Utc};
use tokio::time::{sleep, Duration};
use tracing::trace;

/// 剩余时间小于该值时改为让出调度而不是 sleep
const RESIDUAL_SPIN_THRESHOLD: Duration = Duration::from_millis(20);

/// 当前时刻是否位于边界秒内
pub fn is_aligned(now: DateTime<Utc>, interval_secs: u64) -> bool {
    now.timestamp().rem_euclid(interval_secs as i64) == 0
}

/// 距下一个边界的时间：`interval - (now mod interval)`，精确到小数秒
pub fn delay_until_next_boundary(now: DateTime<Utc>, interval_secs: u64) -> Duration {
    let interval = interval_secs as f64;
    let into_window = now.timestamp().rem_euclid(interval_secs as i64) as f64
        + f64::from(now.timestamp_subsec_nanos()) / 1e9;
    Duration::from_secs_f64((interval - into_window).max(0.0))
}

/// 吸收 sleep 的误差：直到进入边界秒为止，
/// 离边界较远时 sleep，很近时让出调度
async fn settle_on_boundary(interval_secs: u64) {
    loop {
        let now = Utc::now();
        if is_aligned(now, interval_secs) {
            return;
        }
        let remaining = delay_until_next_boundary(now, interval_secs);
        if remaining > RESIDUAL_SPIN_THRESHOLD {
            sleep(remaining - RESIDUAL_SPIN_THRESHOLD).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
}

/// 已处于边界秒内则立即返回，否则等到下一个边界
pub async fn wait_until_aligned(interval_secs: u64) {
    settle_on_boundary(interval_secs).await;
}

/// 等到下一个边界（即使当前已处于边界秒内）
pub async fn sleep_until_next_boundary(interval_secs: u64) {
    let delay = delay_until_next_boundary(Utc::now(), interval_secs);
    trace!(target: "时钟对齐", delay_ms = delay.as_millis() as u64, "等待下一个边界");
    sleep(delay).await;
    settle_on_boundary(interval_secs).await;
}
