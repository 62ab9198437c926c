use crate::core::error::{StressError, StressResult};

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// 调用方提供的接收缓冲区
///
/// 第一次有效读取先落在临时的响应头缓冲区里，找到 CRLFCRLF 后只把其后的正文
/// 拷入目标缓冲区；之后的读取直接写入目标缓冲区剩余部分。
pub struct ReceiveBuffer<'a> {
    buf: &'a mut [u8],
    received: usize,
    header_stripped: bool,
    staging: Vec<u8>,
    header_len: usize,
}

impl<'a> ReceiveBuffer<'a> {
    pub fn new(buf: &'a mut [u8], header_capacity: usize) -> Self {
        Self {
            buf,
            received: 0,
            header_stripped: false,
            staging: vec![0u8; header_capacity],
            header_len: 0,
        }
    }

    pub fn expected(&self) -> usize {
        self.buf.len()
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.buf.len()
    }

    pub fn header_stripped(&self) -> bool {
        self.header_stripped
    }

    /// 响应头（含分隔符）的长度，剥离之前为 0
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// 下一次读取应写入的区域
    pub fn read_slot(&mut self) -> &mut [u8] {
        if self.header_stripped {
            &mut self.buf[self.received..]
        } else {
            &mut self.staging[..]
        }
    }

    /// 记录写入 `read_slot()` 的 `n` 字节
    pub fn commit(&mut self, n: usize) -> StressResult<()> {
        if n == 0 {
            return Ok(());
        }
        if self.header_stripped {
            self.received += n.min(self.remaining());
            return Ok(());
        }

        let first = &self.staging[..n];
        let separator = first
            .windows(HEADER_SEPARATOR.len())
            .position(|w| w == HEADER_SEPARATOR)
            .ok_or(StressError::MissingHeaderSeparator { read: n })?;
        let body = &first[separator + HEADER_SEPARATOR.len()..];
        if body.len() > self.buf.len() {
            return Err(StressError::BodyOverflow {
                expected: self.buf.len(),
                actual: body.len(),
            });
        }

        self.buf[..body.len()].copy_from_slice(body);
        self.received = body.len();
        self.header_len = separator + HEADER_SEPARATOR.len();
        self.header_stripped = true;
        self.staging = Vec::new();
        Ok(())
    }
}
