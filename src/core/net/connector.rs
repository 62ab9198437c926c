use async_trait::async_trait;
use log::{debug, info};
use rustls::ClientConfig;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use super::tcp::TcpTransport;
use super::tls::TlsTransport;
use super::{rng_lock, Connector, Security, Target, Transport};
use crate::core::dtls::DtlsConnector;
use crate::core::error::ConnectError;

/// 真实网络连接器：明文 TCP、TLS，以及可选的 DTLS 委托
pub struct NetConnector {
    tls_config: Option<Arc<ClientConfig>>,
    dtls: Option<DtlsConnector>,
    connect_timeout: Duration,
}

impl NetConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            tls_config: None,
            dtls: None,
            connect_timeout,
        }
    }

    pub fn with_tls(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn with_dtls(mut self, dtls: DtlsConnector) -> Self {
        self.dtls = Some(dtls);
        self
    }

    async fn open_tcp(&self, target: &Target) -> Result<TcpTransport, ConnectError> {
        match tokio::time::timeout(self.connect_timeout, TcpTransport::connect(&target.host, target.port)).await {
            Err(_) => Err(ConnectError::TimedOut),
            Ok(Ok(tcp)) => Ok(tcp),
            Ok(Err(e)) => Err(classify_io(e)),
        }
    }
}

/// 把套接字错误映射到可重试/不可重试两类
pub fn classify_io(error: io::Error) -> ConnectError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            ConnectError::Refused(error.to_string())
        }
        io::ErrorKind::TimedOut => ConnectError::TimedOut,
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::OutOfMemory => ConnectError::NoSocket,
        _ => ConnectError::Io(error),
    }
}

#[async_trait]
impl Connector for NetConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, ConnectError> {
        debug!("连接 {}", target);
        match target.security {
            Security::Plain => {
                let tcp = self.open_tcp(target).await?;
                info!("已连接 {}", target);
                Ok(Box::new(tcp))
            }
            Security::Tls => {
                let config = self
                    .tls_config
                    .clone()
                    .ok_or_else(|| ConnectError::Unsupported("未配置 TLS".to_string()))?;
                let tcp = self.open_tcp(target).await?;
                let session = {
                    let _guard = rng_lock().lock().await;
                    TlsTransport::new_session(config, &target.host)?
                };
                let handshake = TlsTransport::handshake(tcp, session);
                let tls = match tokio::time::timeout(self.connect_timeout, handshake).await {
                    Err(_) => return Err(ConnectError::TimedOut),
                    Ok(result) => result?,
                };
                info!("已建立 TLS 连接 {}", target);
                Ok(Box::new(tls))
            }
            Security::Dtls => match &self.dtls {
                Some(dtls) => dtls.connect(target).await,
                None => Err(ConnectError::Unsupported("未配置 DTLS 会话".to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(classify_io(refused), ConnectError::Refused(_)));

        let timeout = io::Error::new(io::ErrorKind::TimedOut, "timeout");
        assert!(matches!(classify_io(timeout), ConnectError::TimedOut));

        let exhausted = io::Error::new(io::ErrorKind::AddrNotAvailable, "no ports");
        assert!(matches!(classify_io(exhausted), ConnectError::NoSocket));
    }

    #[tokio::test]
    async fn test_tls_without_config_is_unsupported() {
        let connector = NetConnector::new(Duration::from_secs(1));
        let target = Target::new("127.0.0.1", 443, Security::Tls);
        let result = connector.connect(&target).await;
        assert!(matches!(result, Err(ConnectError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_dtls_without_session_is_unsupported() {
        let connector = NetConnector::new(Duration::from_secs(1));
        let target = Target::new("127.0.0.1", 4430, Security::Dtls);
        let result = connector.connect(&target).await;
        assert!(matches!(result, Err(ConnectError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = NetConnector::new(Duration::from_secs(5));
        let target = Target::new("127.0.0.1", port, Security::Plain);
        match connector.connect(&target).await {
            Err(e) => assert!(e.is_retryable()),
            Ok(_) => panic!("connection to a closed port succeeded"),
        }
    }
}
