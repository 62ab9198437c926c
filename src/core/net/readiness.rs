use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// 就绪信号
///
/// 传输层在数据可能到达时调用 `fire()`，下载引擎用 `wait()` 消费信号。
/// 未被消费的信号最多保留一个。每个下载持有自己的实例，没有并发上限。
#[derive(Clone, Default)]
pub struct ReadinessLatch {
    inner: Arc<LatchInner>,
}

#[derive(Default)]
struct LatchInner {
    fired: Notify,
    drained: Notify,
    fire_count: AtomicU64,
}

impl ReadinessLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.inner.fire_count.fetch_add(1, Ordering::Relaxed);
        self.inner.fired.notify_one();
    }

    /// 挂起直到有信号，并清除它
    pub async fn wait(&self) {
        self.inner.fired.notified().await;
    }

    /// 消费方已把套接字读空
    pub fn drained(&self) {
        self.inner.drained.notify_one();
    }

    /// 监视方在重新监视套接字前等待消费方读空
    pub async fn wait_drained(&self) {
        self.inner.drained.notified().await;
    }

    pub fn fire_count(&self) -> u64 {
        self.inner.fire_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ReadinessLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessLatch")
            .field("fire_count", &self.fire_count())
            .finish()
    }
}
