use log::{debug, warn};
use std::time::Duration;

use crate::core::error::{ConnectError, StressError, StressResult};
use crate::core::net::{Connector, Target, Transport};

/// 重试策略：固定间隔
///
/// `max_retries` 是连接尝试的总次数，不是首次之后的额外次数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    pub max_retries: usize,
    pub delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryStrategy {
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn should_retry(&self, error: &ConnectError, attempts: usize) -> bool {
        attempts < self.max_retries && error.is_retryable()
    }

    pub fn get_delay(&self) -> Duration {
        self.delay
    }
}

/// 重试上下文
#[derive(Debug)]
pub struct RetryContext {
    pub strategy: RetryStrategy,
    pub attempts: usize,
    pub retry_history: Vec<(String, Duration)>,
    pub total_retry_time: Duration,
}

impl RetryContext {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            attempts: 0,
            retry_history: Vec::new(),
            total_retry_time: Duration::from_secs(0),
        }
    }

    pub fn record_attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    pub fn should_retry(&self, error: &ConnectError) -> bool {
        self.strategy.should_retry(error, self.attempts)
    }

    /// 记录一次失败并返回下次尝试前的等待时间
    pub fn record_failure(&mut self, error: &ConnectError) -> Duration {
        let delay = self.strategy.get_delay();
        self.retry_history.push((error.to_string(), delay));
        self.total_retry_time += delay;
        delay
    }

    pub fn get_retry_stats(&self) -> RetryStats {
        RetryStats {
            total_attempts: self.attempts,
            total_retry_time: self.total_retry_time,
            retry_history: self.retry_history.clone(),
        }
    }
}

/// 重试统计信息
#[derive(Debug, Clone)]
pub struct RetryStats {
    pub total_attempts: usize,
    pub total_retry_time: Duration,
    pub retry_history: Vec<(String, Duration)>,
}

/// 在重试上限内建立连接
///
/// 没有套接字资源或不支持的传输立即失败；其余错误等待固定间隔后重试，
/// 最多尝试 `max_retries` 次。
pub async fn connect_with_retry(
    connector: &dyn Connector,
    target: &Target,
    strategy: &RetryStrategy,
) -> StressResult<Box<dyn Transport>> {
    let mut context = RetryContext::new(strategy.clone());
    loop {
        let attempt = context.record_attempt();
        match connector.connect(target).await {
            Ok(transport) => {
                debug!("第 {} 次尝试连接 {} 成功", attempt, target);
                return Ok(transport);
            }
            Err(error) if !error.is_retryable() => {
                warn!("连接 {} 失败且不可重试: {}", target, error);
                return Err(StressError::Connect(error));
            }
            Err(error) if !context.should_retry(&error) => {
                let stats = context.get_retry_stats();
                warn!(
                    "连接 {} 失败 {} 次，放弃 (累计等待 {:?})",
                    target, stats.total_attempts, stats.total_retry_time
                );
                return Err(StressError::MaxRetriesExceeded {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = context.record_failure(&error);
                warn!(
                    "连接 {} 失败 (第 {}/{} 次): {}，{:?} 后重试",
                    target, attempt, strategy.max_retries, error, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
