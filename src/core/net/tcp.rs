use async_trait::async_trait;
use log::debug;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use super::{ReadinessLatch, Transport};

/// 把 tokio 套接字的 `try_read`/`try_write` 适配成同步 `Read`/`Write`，
/// 未就绪时得到 `WouldBlock`
pub struct SocketIo<'a>(pub &'a TcpStream);

impl Read for SocketIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.try_read(buf)
    }
}

impl Write for SocketIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 监视套接字可读性并触发就绪信号，等消费方读空后再继续监视
pub(crate) fn spawn_watcher(stream: Arc<TcpStream>, latch: ReadinessLatch) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = stream.readable().await {
                debug!("套接字监视结束: {}", e);
                latch.fire();
                break;
            }
            latch.fire();
            latch.wait_drained().await;
        }
    })
}

/// 明文 TCP 传输
pub struct TcpTransport {
    stream: Arc<TcpStream>,
    blocking: bool,
    watcher: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream: Arc::new(stream),
            blocking: true,
            watcher: None,
        }
    }

    pub(crate) fn stream(&self) -> &Arc<TcpStream> {
        &self.stream
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.try_write(data) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && self.blocking => {
                    self.stream.writable().await?;
                }
                other => return other,
            }
        }
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.try_read(buf) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && self.blocking => {
                    self.stream.readable().await?;
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
        self.watcher = Some(spawn_watcher(self.stream.clone(), latch));
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stop_watcher();
        Ok(())
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}
