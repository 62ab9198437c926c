use std::fmt;

use crate::core::error::{StressError, StressResult};

/// 一次带 Range 头的 HTTP GET 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub resource: String,
    pub host: String,
    pub offset: u64,
    pub length: usize,
}

impl RangeRequest {
    pub fn new(resource: impl Into<String>, host: impl Into<String>, offset: u64, length: usize) -> StressResult<Self> {
        if length == 0 || offset.checked_add(length as u64).is_none() {
            return Err(StressError::InvalidRange { offset, length });
        }
        Ok(Self {
            resource: resource.into(),
            host: host.into(),
            offset,
            length,
        })
    }

    /// 闭区间的最后一个字节
    pub fn end(&self) -> u64 {
        self.offset + self.length as u64 - 1
    }

    pub fn path(&self) -> String {
        format!("/firmware/{}.txt", self.resource)
    }

    /// 渲染请求；结果必须严格小于 `capacity`
    pub fn render(&self, capacity: usize) -> StressResult<Vec<u8>> {
        let text = self.to_string();
        if text.len() >= capacity {
            return Err(StressError::RequestOverflow {
                size: text.len(),
                capacity,
            });
        }
        Ok(text.into_bytes())
    }
}

impl fmt::Display for RangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GET {} HTTP/1.1\nHost: {}\nRange: bytes={}-{}\n\n",
            self.path(),
            self.host,
            self.offset,
            self.end()
        )
    }
}
