//! 单端点内的重试与退避策略

use std::time::Duration;

/// 同一端点两次尝试之间的退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 不等待
    None,
    /// 线性退避：第n次重试前等待 n * base
    Linear {
        /// 基础间隔
        base: Duration,
    },
    /// 指数退避：第n次重试前等待 base * 2^(n-1)，不超过max
    Exponential {
        /// 基础间隔
        base: Duration,
        /// 上限
        max: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            base: Duration::from_millis(crate::config::DEFAULT_BACKOFF_MS),
        }
    }
}

impl Backoff {
    /// 第 `retry` 次重试（从1开始）前的等待时间
    pub fn delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear { base } => base.saturating_mul(retry),
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 每个端点的尝试次数，至少为1
    pub attempts: u32,
    /// 退避方式
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: crate::config::DEFAULT_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// 创建重试策略
    pub fn new(attempts: u32, backoff: Backoff) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// 第 `attempt` 次尝试（从1开始）前的等待时间
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt.saturating_sub(1))
    }
}
