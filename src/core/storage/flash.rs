use log::{debug, info};
use thiserror::Error;

use crate::core::error::{StressError, StressResult};

/// NOR 闪存擦除后的字节值
pub const ERASED: u8 = 0xFF;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("地址越界: 0x{addr:X} + {len}")]
    OutOfBounds { addr: usize, len: usize },

    #[error("地址未对齐: 0x{addr:X} + {len}, 对齐 {align}")]
    Misaligned { addr: usize, len: usize, align: usize },
}

impl From<FlashError> for StressError {
    fn from(error: FlashError) -> Self {
        StressError::Storage(error.to_string())
    }
}

/// 片内闪存接口
///
/// 擦除按扇区对齐，编程按页对齐，读取不限对齐。
pub trait FlashDevice: Send {
    fn size(&self) -> usize;
    fn page_size(&self) -> usize;
    fn sector_size(&self) -> usize;
    fn erase(&mut self, addr: usize, len: usize) -> Result<(), FlashError>;
    fn program(&mut self, addr: usize, data: &[u8]) -> Result<(), FlashError>;
    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), FlashError>;
}

/// 内存中的 NOR 闪存：擦除置 0xFF，编程只能把位清零
#[derive(Debug, Clone)]
pub struct RamFlash {
    memory: Vec<u8>,
    page_size: usize,
    sector_size: usize,
    erase_count: usize,
    program_count: usize,
}

impl RamFlash {
    pub fn new(size: usize, page_size: usize, sector_size: usize) -> Self {
        Self {
            memory: vec![ERASED; size],
            page_size,
            sector_size,
            erase_count: 0,
            program_count: 0,
        }
    }

    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    pub fn program_count(&self) -> usize {
        self.program_count
    }

    fn check(&self, addr: usize, len: usize, align: usize) -> Result<(), FlashError> {
        match addr.checked_add(len) {
            Some(end) if end <= self.memory.len() => {}
            _ => return Err(FlashError::OutOfBounds { addr, len }),
        }
        if addr % align != 0 || len % align != 0 {
            return Err(FlashError::Misaligned { addr, len, align });
        }
        Ok(())
    }
}

impl FlashDevice for RamFlash {
    fn size(&self) -> usize {
        self.memory.len()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn erase(&mut self, addr: usize, len: usize) -> Result<(), FlashError> {
        self.check(addr, len, self.sector_size)?;
        self.memory[addr..addr + len].fill(ERASED);
        self.erase_count += len / self.sector_size;
        Ok(())
    }

    fn program(&mut self, addr: usize, data: &[u8]) -> Result<(), FlashError> {
        self.check(addr, data.len(), self.page_size)?;
        for (cell, byte) in self.memory[addr..addr + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        self.program_count += data.len() / self.page_size;
        Ok(())
    }

    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), FlashError> {
        self.check(addr, buf.len(), 1)?;
        buf.copy_from_slice(&self.memory[addr..addr + buf.len()]);
        Ok(())
    }
}

/// 擦除保留区之后的全部闪存
pub fn erase_after_reserved(flash: &mut dyn FlashDevice, reserved: usize) -> StressResult<()> {
    let size = flash.size();
    if reserved >= size {
        return Err(StressError::storage(format!("保留区 {} 不小于闪存大小 {}", reserved, size)));
    }
    info!("擦除闪存: 0x{:X} {} 字节", reserved, size - reserved);
    flash.erase(reserved, size - reserved)?;
    Ok(())
}

/// 从 `offset` 开始逐页编程，最后一页不足部分用 0xFF 补齐
pub fn program_pages(flash: &mut dyn FlashDevice, offset: usize, data: &[u8]) -> StressResult<usize> {
    let page_size = flash.page_size();
    let mut page = vec![ERASED; page_size];
    let mut pages = 0;

    debug!("编程: 0x{:X} {} 字节", offset, data.len());
    for (index, chunk) in data.chunks(page_size).enumerate() {
        page[..chunk.len()].copy_from_slice(chunk);
        page[chunk.len()..].fill(ERASED);
        flash.program(offset + index * page_size, &page)?;
        pages += 1;
    }
    Ok(pages)
}

/// 从 `offset` 开始逐页读回并与 `data` 比较
pub fn compare_pages(flash: &dyn FlashDevice, offset: usize, data: &[u8]) -> StressResult<()> {
    let page_size = flash.page_size();
    let mut buffer = vec![0u8; page_size];

    for (index, chunk) in data.chunks(page_size).enumerate() {
        let start = index * page_size;
        let window = &mut buffer[..chunk.len()];
        flash.read(offset + start, window)?;
        if let Some(i) = window.iter().zip(chunk).position(|(a, b)| a != b) {
            return Err(StressError::ContentMismatch { offset: start + i });
        }
    }
    Ok(())
}

/// 从保留区之后开始重复写入故事直到闪存写满，每份按页向下取整
pub fn fill_with_story(flash: &mut dyn FlashDevice, reserved: usize, story: &[u8]) -> StressResult<usize> {
    let mut copies = 0;
    for (offset, len) in story_windows(flash, reserved, story.len()) {
        program_pages(flash, offset, &story[..len])?;
        copies += 1;
    }
    info!("已写入 {} 份故事", copies);
    Ok(copies)
}

/// 逐份读回 `fill_with_story` 写入的内容
pub fn compare_filled(flash: &dyn FlashDevice, reserved: usize, story: &[u8]) -> StressResult<usize> {
    let mut copies = 0;
    for (offset, len) in story_windows(flash, reserved, story.len()) {
        compare_pages(flash, offset, &story[..len]).map_err(|e| match e {
            StressError::ContentMismatch { offset: i } => StressError::ContentMismatch {
                offset: offset - reserved + i,
            },
            other => other,
        })?;
        copies += 1;
    }
    Ok(copies)
}

fn story_windows(flash: &dyn FlashDevice, reserved: usize, story_len: usize) -> Vec<(usize, usize)> {
    let page_size = flash.page_size();
    let mut windows = Vec::new();
    let mut offset = reserved;
    while offset < flash.size() {
        let len = story_len.min(flash.size() - offset) / page_size * page_size;
        if len == 0 {
            break;
        }
        windows.push((offset, len));
        offset += len;
    }
    windows
}
