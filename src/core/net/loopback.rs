//! 本地 HTTP 分段服务器
//!
//! 只理解下载引擎发出的那一种请求：`GET /firmware/<name>.txt` 加 `Range: bytes=a-b`。
//! 响应正文被切成随机大小的片段分多次写出，用来覆盖任意分块边界。

use bytes::Bytes;
use log::{debug, info, warn};
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const MAX_REQUEST: usize = 8192;

pub struct LoopbackServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl LoopbackServer {
    /// 在 127.0.0.1 的随机端口上启动，提供名为 `resource` 的内容
    pub async fn start(resource: &str, content: Bytes) -> io::Result<Self> {
        let mut resources = HashMap::new();
        resources.insert(resource.to_string(), content);
        Self::start_with(resources).await
    }

    pub async fn start_with(resources: HashMap<String, Bytes>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let resources = Arc::new(resources);
        info!("回环服务器监听于 {}", addr);

        let handle = tokio::spawn(async move {
            loop {
                let (socket, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("回环服务器 accept 失败: {}", e);
                        continue;
                    }
                };
                let resources = resources.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(socket, &resources).await {
                        debug!("回环连接 {} 结束: {}", peer, e);
                    }
                });
            }
        });

        Ok(Self { addr, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut socket: TcpStream, resources: &HashMap<String, Bytes>) -> io::Result<()> {
    let request = read_request(&mut socket).await?;
    let response = match parse_request(&request) {
        Some((name, start, end)) => match resources.get(&name) {
            Some(content) => partial_content(content, start, end),
            None => Response::status("404 Not Found"),
        },
        None => Response::status("400 Bad Request"),
    };

    socket.write_all(response.head.as_bytes()).await?;
    write_in_segments(&mut socket, &response.body).await?;
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> io::Result<String> {
    let mut request = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if find(&request, b"\n\n").is_some() || find(&request, b"\r\n\r\n").is_some() {
            break;
        }
        if request.len() > MAX_REQUEST {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "请求过长"));
        }
    }
    Ok(String::from_utf8_lossy(&request).into_owned())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// 解析出资源名与闭区间 `[start, end]`
pub(super) fn parse_request(request: &str) -> Option<(String, u64, u64)> {
    let mut lines = request.lines();
    let mut parts = lines.next()?.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let name = parts
        .next()?
        .strip_prefix("/firmware/")?
        .strip_suffix(".txt")?
        .to_string();

    let range = lines.find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("range") {
            Some(value.trim().to_string())
        } else {
            None
        }
    })?;
    let (start, end) = range.strip_prefix("bytes=")?.split_once('-')?;
    let start = start.parse().ok()?;
    let end = end.parse().ok()?;
    if end < start {
        return None;
    }
    Some((name, start, end))
}

pub(super) struct Response {
    pub(super) head: String,
    pub(super) body: Bytes,
}

impl Response {
    fn status(status: &str) -> Self {
        Self {
            head: format!("HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status),
            body: Bytes::new(),
        }
    }
}

pub(super) fn partial_content(content: &Bytes, start: u64, end: u64) -> Response {
    let total = content.len() as u64;
    if start >= total {
        return Response {
            head: format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nConnection: close\r\n\r\n",
                total
            ),
            body: Bytes::new(),
        };
    }
    let end = end.min(total - 1);
    let body = content.slice(start as usize..=end as usize);
    Response {
        head: format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            start,
            end,
            total,
            body.len()
        ),
        body,
    }
}

async fn write_in_segments(socket: &mut TcpStream, body: &Bytes) -> io::Result<()> {
    let mut offset = 0;
    while offset < body.len() {
        let segment = rand::thread_rng().gen_range(1..=1500).min(body.len() - offset);
        socket.write_all(&body[offset..offset + segment]).await?;
        socket.flush().await?;
        offset += segment;
        tokio::task::yield_now().await;
    }
    Ok(())
}
