/// 连续错误计数
///
/// 每个成功周期清零；连续失败次数超过阈值时升级为致命错误。
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    threshold: u32,
    consecutive_failures: u32,
}

impl ErrorBudget {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// 记录一次失败，返回是否应升级为致命错误
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures > self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
