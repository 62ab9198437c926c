use thiserror::Error;
use std::io;
use std::time::Duration;

use crate::core::dtls::{HandshakeError, TimerError};

/// 建立传输连接时的错误分类
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("没有可用的套接字")]
    NoSocket,

    #[error("连接被拒绝: {0}")]
    Refused(String),

    #[error("连接超时")]
    TimedOut,

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("TLS错误: {0}")]
    Tls(String),

    #[error("握手失败: {0}")]
    Handshake(String),

    #[error("不支持的传输类型: {0}")]
    Unsupported(String),
}

impl ConnectError {
    /// 套接字资源耗尽和不支持的传输重试也无济于事
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnectError::NoSocket | ConnectError::Unsupported(_))
    }
}

#[derive(Error, Debug)]
pub enum StressError {
    #[error("无效的下载范围: 偏移 {offset}, 长度 {length}")]
    InvalidRange {
        offset: u64,
        length: usize,
    },

    #[error("连接失败: {0}")]
    Connect(ConnectError),

    #[error("重试次数超过限制: {attempts} 次, 最后一次错误: {last}")]
    MaxRetriesExceeded {
        attempts: usize,
        last: ConnectError,
    },

    #[error("请求缓冲区溢出: 请求 {size} 字节, 容量 {capacity} 字节")]
    RequestOverflow {
        size: usize,
        capacity: usize,
    },

    #[error("请求发送不完整: 预期 {expected} 字节, 实际 {actual} 字节")]
    ShortSend {
        expected: usize,
        actual: usize,
    },

    #[error("读取套接字失败: {0}")]
    Transport(io::Error),

    #[error("首次读取的 {read} 字节中未找到响应头结束标记")]
    MissingHeaderSeparator {
        read: usize,
    },

    #[error("响应正文超出请求长度: 预期 {expected} 字节, 收到 {actual} 字节")]
    BodyOverflow {
        expected: usize,
        actual: usize,
    },

    #[error("对端提前关闭连接: 已收到 {received} 字节, 预期 {expected} 字节")]
    PeerClosed {
        received: usize,
        expected: usize,
    },

    #[error("等待超时: {0:?}")]
    Timeout(Duration),

    #[error("大小不匹配: 预期 {expected} 字节, 实际 {actual} 字节")]
    SizeMismatch {
        expected: usize,
        actual: usize,
    },

    #[error("内容不匹配: 偏移 {offset}")]
    ContentMismatch {
        offset: usize,
    },

    #[error("DTLS握手错误: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("定时器错误: {0}")]
    Timer(#[from] TimerError),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("未知错误: {0}")]
    Unknown(String),
}

impl StressError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StressError::Connect(e) => e.is_retryable(),
            StressError::Timeout(_) => true,
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        StressError::Storage(msg.into())
    }
}

impl From<ConnectError> for StressError {
    fn from(error: ConnectError) -> Self {
        StressError::Connect(error)
    }
}

impl From<String> for StressError {
    fn from(error: String) -> Self {
        StressError::Unknown(error)
    }
}

impl From<&str> for StressError {
    fn from(error: &str) -> Self {
        StressError::Unknown(error.to_string())
    }
}

pub type StressResult<T> = Result<T, StressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_retryable() {
        assert!(ConnectError::Refused("busy".to_string()).is_retryable());
        assert!(ConnectError::TimedOut.is_retryable());
        assert!(ConnectError::Tls("bad record".to_string()).is_retryable());
        assert!(!ConnectError::NoSocket.is_retryable());
        assert!(!ConnectError::Unsupported("dtls".to_string()).is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        let missing = StressError::MissingHeaderSeparator { read: 12 };
        assert!(missing.is_fatal());

        let closed = StressError::PeerClosed { received: 1, expected: 2 };
        assert!(closed.is_fatal());

        let no_socket = StressError::Connect(ConnectError::NoSocket);
        assert!(no_socket.is_fatal());

        let refused = StressError::Connect(ConnectError::Refused("reset".to_string()));
        assert!(refused.is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let error: StressError = "测试错误".into();
        assert!(matches!(error, StressError::Unknown(_)));

        let error: StressError = ConnectError::TimedOut.into();
        assert!(matches!(error, StressError::Connect(ConnectError::TimedOut)));

        let error: StressError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(matches!(error, StressError::Io(_)));
    }

    #[test]
    fn test_error_display() {
        let error = StressError::SizeMismatch { expected: 1024, actual: 1000 };
        assert_eq!(error.to_string(), "大小不匹配: 预期 1024 字节, 实际 1000 字节");
    }
}
