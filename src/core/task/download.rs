use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::core::error::{StressError, StressResult};
use crate::core::net::{Connector, ReadinessLatch, Security, Target, Transport};
use super::receive::ReceiveBuffer;
use super::request::RangeRequest;
use super::retry::{connect_with_retry, RetryStrategy};

/// 下载引擎的参数
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub host: String,
    pub http_port: u16,
    pub https_port: u16,
    pub dtls_port: u16,
    pub request_buffer_size: usize,
    pub header_buffer_size: usize,
    pub recv_timeout: Duration,
    pub retry: RetryStrategy,
}

impl DownloadSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            http_port: config.http_port,
            https_port: config.https_port,
            dtls_port: config.dtls_port,
            request_buffer_size: config.request_buffer_size,
            header_buffer_size: config.header_buffer_size,
            recv_timeout: Duration::from_secs(config.recv_timeout_secs),
            retry: RetryStrategy::fixed(config.max_retries, Duration::from_millis(config.retry_delay_ms)),
        }
    }

    pub fn port(&self, security: Security) -> u16 {
        match security {
            Security::Plain => self.http_port,
            Security::Tls => self.https_port,
            Security::Dtls => self.dtls_port,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 分段下载引擎
///
/// 每次 `download` 建立一条新连接，发出一个 Range 请求，把响应正文收进调用方的缓冲区。
#[derive(Clone)]
pub struct RangeDownloader {
    connector: Arc<dyn Connector>,
    settings: DownloadSettings,
}

impl RangeDownloader {
    pub fn new(connector: Arc<dyn Connector>, settings: DownloadSettings) -> Self {
        Self { connector, settings }
    }

    pub fn settings(&self) -> &DownloadSettings {
        &self.settings
    }

    pub fn target(&self, security: Security) -> Target {
        Target::new(self.settings.host.clone(), self.settings.port(security), security)
    }

    /// 下载 `resource` 从 `offset` 开始的 `buf.len()` 个字节
    ///
    /// 成功时返回值总是等于 `buf.len()`。
    pub async fn download(
        &self,
        resource: &str,
        offset: u64,
        buf: &mut [u8],
        security: Security,
    ) -> StressResult<usize> {
        let request = RangeRequest::new(resource, self.settings.host.clone(), offset, buf.len())?;
        let wire = request.render(self.settings.request_buffer_size)?;
        let target = self.target(security);

        let started = Instant::now();
        let mut transport = connect_with_retry(self.connector.as_ref(), &target, &self.settings.retry).await?;
        let result = self.exchange(transport.as_mut(), &wire, buf).await;
        if let Err(e) = transport.close().await {
            debug!("关闭连接 {} 失败: {}", target, e);
        }

        match &result {
            Ok(received) => info!(
                "{} {} 字节 [{}-{}] 完成，用时 {:?}",
                target,
                received,
                request.offset,
                request.end(),
                started.elapsed()
            ),
            Err(e) => warn!("{} [{}-{}] 下载失败: {}", target, request.offset, request.end(), e),
        }
        result
    }

    async fn exchange(&self, transport: &mut dyn Transport, wire: &[u8], buf: &mut [u8]) -> StressResult<usize> {
        transport.set_blocking(false).map_err(StressError::Transport)?;
        let latch = ReadinessLatch::new();
        transport.sigio(latch.clone());

        debug!("请求:\n{}[end]", String::from_utf8_lossy(wire));
        let sent = match transport.send(wire).await {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(StressError::Transport(e)),
        };
        if sent != wire.len() {
            return Err(StressError::ShortSend {
                expected: wire.len(),
                actual: sent,
            });
        }

        let mut rx = ReceiveBuffer::new(buf, self.settings.header_buffer_size);
        while !rx.is_complete() {
            tokio::time::timeout(self.settings.recv_timeout, latch.wait())
                .await
                .map_err(|_| StressError::Timeout(self.settings.recv_timeout))?;
            Self::drain(transport, &mut rx).await?;
            latch.drained();
        }

        if rx.received() != rx.expected() {
            return Err(StressError::SizeMismatch {
                expected: rx.expected(),
                actual: rx.received(),
            });
        }
        Ok(rx.received())
    }

    /// 读到套接字暂无数据为止
    async fn drain(transport: &mut dyn Transport, rx: &mut ReceiveBuffer<'_>) -> StressResult<()> {
        while !rx.is_complete() {
            match transport.recv(rx.read_slot()).await {
                Ok(0) => {
                    return Err(StressError::PeerClosed {
                        received: rx.received(),
                        expected: rx.expected(),
                    })
                }
                Ok(n) => {
                    let stripped = rx.header_stripped();
                    rx.commit(n)?;
                    if !stripped {
                        debug!("剥离响应头 {} 字节", rx.header_len());
                    }
                    debug!("收到 {} 字节，累计 {}/{}", n, rx.received(), rx.expected());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StressError::Transport(e)),
            }
        }
        Ok(())
    }
}
