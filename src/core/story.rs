use bytes::Bytes;
use std::path::Path;

use crate::core::error::{StressError, StressResult};

static BUILTIN_STORY: &[u8] = include_bytes!("../../fixtures/story.txt");

/// 参考载荷，所有往返测试都以它为准逐字节比较
#[derive(Debug, Clone)]
pub struct Story {
    data: Bytes,
}

impl Story {
    pub fn builtin() -> Self {
        Self {
            data: Bytes::from_static(BUILTIN_STORY),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> StressResult<Self> {
        let data = std::fs::read(path.as_ref())?;
        if data.is_empty() {
            return Err(StressError::Config(format!("故事文件为空: {}", path.as_ref().display())));
        }
        Ok(Self { data: data.into() })
    }

    /// 空路径表示使用内置故事
    pub fn load(path: &str) -> StressResult<Self> {
        if path.is_empty() {
            Ok(Self::builtin())
        } else {
            Self::from_file(path)
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn slice(&self, offset: usize, length: usize) -> &[u8] {
        &self.data[offset..offset + length]
    }

    /// 检查 `data` 是否与故事在 `offset` 处的内容完全一致
    pub fn verify(&self, offset: usize, data: &[u8]) -> StressResult<()> {
        let end = offset.checked_add(data.len()).filter(|end| *end <= self.len());
        let end = end.ok_or(StressError::InvalidRange {
            offset: offset as u64,
            length: data.len(),
        })?;

        match self.data[offset..end].iter().zip(data).position(|(a, b)| a != b) {
            Some(index) => Err(StressError::ContentMismatch { offset: offset + index }),
            None => Ok(()),
        }
    }
}

impl Default for Story {
    fn default() -> Self {
        Self::builtin()
    }
}
