use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

use super::bridge::EventQueue;
use super::handshake::{DtlsSession, HandshakeDriver};
use crate::core::error::ConnectError;
use crate::core::net::{rng_lock, Connector, ReadinessLatch, Target, Transport};

/// 创建 DTLS 会话（UDP 套接字与安全上下文），由外部协议栈提供
#[async_trait]
pub trait DtlsSessionFactory: Send + Sync {
    async fn open(&self, target: &Target) -> Result<Box<dyn DtlsSession>, ConnectError>;
}

/// 建立 DTLS 连接：创建会话、挂上定时器、驱动握手
pub struct DtlsConnector {
    factory: Arc<dyn DtlsSessionFactory>,
    queue: Arc<EventQueue>,
    handshake_timeout: Duration,
    max_resets: usize,
}

impl DtlsConnector {
    pub fn new(
        factory: Arc<dyn DtlsSessionFactory>,
        queue: Arc<EventQueue>,
        handshake_timeout: Duration,
        max_resets: usize,
    ) -> Self {
        Self {
            factory,
            queue,
            handshake_timeout,
            max_resets,
        }
    }
}

#[async_trait]
impl Connector for DtlsConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, ConnectError> {
        let mut session = {
            let _guard = rng_lock().lock().await;
            self.factory.open(target).await?
        };
        debug!("DTLS 会话已创建: {}", target);

        let latch = ReadinessLatch::new();
        let timer = self.queue.timer();
        session.sigio(latch.clone());
        session.set_timer(timer.clone());

        let mut driver = HandshakeDriver::new(latch, timer, self.max_resets);
        match tokio::time::timeout(self.handshake_timeout, driver.drive(session.as_mut())).await {
            Err(_) => Err(ConnectError::TimedOut),
            Ok(Err(e)) => Err(ConnectError::Handshake(e.to_string())),
            Ok(Ok(())) => {
                info!("已建立 DTLS 连接 {}", target);
                Ok(session.into_transport())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtls::mock::{MockStep, ScriptedFactory, ScriptedSession};
    use crate::core::net::mock::ScriptedTransport;
    use crate::core::net::{NetConnector, Security};
    use crate::core::task::{DownloadSettings, RangeDownloader, RetryStrategy};
    use tokio::runtime::Handle;

    fn connector(sessions: Vec<ScriptedSession>, timeout: Duration) -> (DtlsConnector, Arc<ScriptedFactory>) {
        let factory = Arc::new(ScriptedFactory::new(sessions));
        let queue = Arc::new(EventQueue::on(Handle::current()));
        (DtlsConnector::new(factory.clone(), queue, timeout, 3), factory)
    }

    fn target() -> Target {
        Target::new("example.com", 4430, Security::Dtls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_completes_handshake() {
        let session = ScriptedSession::new(vec![
            MockStep::WantReadThenData,
            MockStep::ArmTimer(100, 200),
            MockStep::Progress,
        ]);
        let (dtls, factory) = connector(vec![session], Duration::from_secs(60));
        assert!(dtls.connect(&target()).await.is_ok());
        assert_eq!(factory.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handshake_times_out() {
        let session = ScriptedSession::new(vec![MockStep::WantRead]);
        let (dtls, _) = connector(vec![session], Duration::from_secs(60));
        match dtls.connect(&target()).await {
            Err(ConnectError::TimedOut) => {}
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("stalled handshake completed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_handshake_is_retryable_connect_error() {
        let session = ScriptedSession::new(vec![MockStep::Fatal(-0x7200)]);
        let (dtls, _) = connector(vec![session], Duration::from_secs(60));
        match dtls.connect(&target()).await {
            Err(e @ ConnectError::Handshake(_)) => assert!(e.is_retryable()),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("fatal handshake completed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_over_dtls() {
        let body = b"HTTP/1.1 206 Partial Content\r\n\r\nsecret";
        let session = ScriptedSession::new(vec![MockStep::WantReadThenData, MockStep::Progress])
            .with_transport(ScriptedTransport::bursts(&[body]));
        let (dtls, _) = connector(vec![session], Duration::from_secs(60));
        let net = NetConnector::new(Duration::from_secs(5)).with_dtls(dtls);

        let mut settings = DownloadSettings::default();
        settings.retry = RetryStrategy::fixed(1, Duration::from_millis(1));
        let downloader = RangeDownloader::new(Arc::new(net), settings);

        let mut buf = [0u8; 6];
        let received = downloader.download("alice", 0, &mut buf, Security::Dtls).await.unwrap();
        assert_eq!(received, 6);
        assert_eq!(&buf, b"secret");
    }
}
