//! TLS-over-TCP 传输
//!
//! 使用 rustls 的 `ClientConnection` 以 sans-I/O 方式驱动非阻塞套接字：
//! 读路径先尝试取出已解密的明文，不足时再从套接字读取 TLS 记录；
//! 写路径把明文交给会话后把待发记录写出；非阻塞模式下写不完即报告 `WouldBlock`。

use async_trait::async_trait;
use log::{debug, info};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::tcp::{spawn_watcher, SocketIo, TcpTransport};
use super::{ReadinessLatch, Transport};
use crate::core::error::ConnectError;

/// 构建根证书库：指定 PEM 文件时只信任其中的证书，否则使用内置的 webpki 根证书
pub fn load_root_store(root_ca: Option<&Path>) -> Result<RootCertStore, ConnectError> {
    let mut roots = RootCertStore::empty();
    match root_ca {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            let certs = parse_pem_certs(&mut BufReader::new(file))?;
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| ConnectError::Tls(format!("无法添加根证书: {}", e)))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

fn parse_pem_certs(reader: &mut dyn io::BufRead) -> Result<Vec<CertificateDer<'static>>, ConnectError> {
    let certs = rustls_pemfile::certs(reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::Tls(format!("无法解析根证书: {}", e)))?;
    if certs.is_empty() {
        return Err(ConnectError::Tls("根证书文件中没有证书".to_string()));
    }
    Ok(certs)
}

pub fn client_config(roots: RootCertStore) -> Result<Arc<ClientConfig>, ConnectError> {
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| ConnectError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

pub struct TlsTransport {
    tcp: TcpTransport,
    conn: ClientConnection,
    blocking: bool,
    watcher: Option<JoinHandle<()>>,
}

impl TlsTransport {
    /// 在已连接的 TCP 之上完成 TLS 握手
    pub async fn handshake(tcp: TcpTransport, conn: ClientConnection) -> Result<Self, ConnectError> {
        let mut transport = Self {
            tcp,
            conn,
            blocking: true,
            watcher: None,
        };

        while transport.conn.is_handshaking() {
            match transport.flush_records() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    transport.tcp.stream().writable().await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            if !transport.conn.wants_read() {
                continue;
            }
            match transport.read_records() {
                Ok(0) => return Err(ConnectError::Tls("握手期间连接被关闭".to_string())),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    transport.tcp.stream().readable().await?;
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Err(ConnectError::Tls(e.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "TLS 握手完成: {:?}",
            transport.conn.protocol_version()
        );
        Ok(transport)
    }

    pub fn new_session(config: Arc<ClientConfig>, host: &str) -> Result<ClientConnection, ConnectError> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|e| ConnectError::Tls(format!("无效的主机名 {}: {}", host, e)))?;
        ClientConnection::new(config, name).map_err(|e| ConnectError::Tls(e.to_string()))
    }

    /// 写出所有待发的 TLS 记录
    fn flush_records(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            self.conn.write_tls(&mut SocketIo(self.tcp.stream()))?;
        }
        Ok(())
    }

    /// 从套接字读取并处理一批 TLS 记录
    fn read_records(&mut self) -> io::Result<usize> {
        let n = self.conn.read_tls(&mut SocketIo(self.tcp.stream()))?;
        if n > 0 {
            self.conn
                .process_new_packets()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        }
        Ok(n)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.flush_records() {
            Err(e) if e.kind() != io::ErrorKind::WouldBlock => return Err(e),
            _ => {}
        }
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(e) => return Err(e),
            }
            if self.read_records()? == 0 {
                return Ok(0);
            }
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

#[async_trait]
impl Transport for TlsTransport {
    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let accepted = self.conn.writer().write(data)?;
        loop {
            match self.flush_records() {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && self.blocking => {
                    self.tcp.stream().writable().await?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    debug!("TLS 记录未能全部写出");
                    return Err(e);
                }
                Err(e) => return Err(e),
                Ok(()) => return Ok(accepted),
            }
        }
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.try_recv(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && self.blocking => {
                    self.tcp.stream().readable().await?;
                }
                other => return other,
            }
        }
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.blocking = blocking;
        Ok(())
    }

    fn sigio(&mut self, latch: ReadinessLatch) {
        self.stop_watcher();
        self.watcher = Some(spawn_watcher(self.tcp.stream().clone(), latch));
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stop_watcher();
        self.conn.send_close_notify();
        let _ = self.flush_records();
        self.tcp.close().await
    }
}

impl Drop for TlsTransport {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}
