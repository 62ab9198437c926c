//! Net: 传输层抽象
//!
//! 下载引擎只通过这里的 trait 访问网络：
//! - `Transport`: 一个已建立的字节流端点（TCP、TLS 或 DTLS）
//! - `Connector`: 按 `Target` 建立 `Transport`
//! - `ReadinessLatch`: 套接字“可能可读”信号
//!
//! 真实实现见 `tcp`、`tls` 与 `connector`，`loopback` 提供本地 HTTP 分段服务器。

pub mod connector;
pub mod loopback;
pub mod readiness;
pub mod tcp;
pub mod tls;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::sync::Mutex;

use crate::core::error::ConnectError;

pub use connector::NetConnector;
pub use readiness::ReadinessLatch;

/// 传输安全类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Security {
    Plain,
    Tls,
    Dtls,
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Security::Plain => write!(f, "tcp"),
            Security::Tls => write!(f, "tls"),
            Security::Dtls => write!(f, "dtls"),
        }
    }
}

/// 连接目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub security: Security,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, security: Security) -> Self {
        Self { host: host.into(), port, security }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.security, self.host, self.port)
    }
}

/// 已建立的字节流端点
///
/// 非阻塞模式下 `send`/`recv` 不挂起，数据未就绪时返回 `ErrorKind::WouldBlock`。
/// `recv` 返回 `Ok(0)` 表示对端已关闭。
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, data: &[u8]) -> io::Result<usize>;

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()>;

    /// 注册就绪信号，替换之前注册的信号
    fn sigio(&mut self, latch: ReadinessLatch);

    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, ConnectError>;
}

/// TLS/DTLS 随机数子系统的全局锁，会话创建必须持有它
static RNG_LOCK: Mutex<()> = Mutex::const_new(());

pub fn rng_lock() -> &'static Mutex<()> {
    &RNG_LOCK
}
