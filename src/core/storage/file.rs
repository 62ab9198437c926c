use log::{debug, info};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::core::error::{StressError, StressResult};

/// 按块写文件的缓冲区，写满一块才落盘
pub struct BlockWriter {
    buffer: Vec<u8>,
    block_size: usize,
    current_pos: usize,
    file_handle: File,
    total_written: u64,
    flush_count: u64,
}

impl BlockWriter {
    pub fn new(file_handle: File, block_size: usize) -> Self {
        Self {
            buffer: vec![0; block_size],
            block_size,
            current_pos: 0,
            file_handle,
            total_written: 0,
            flush_count: 0,
        }
    }

    /// 向缓冲区写入数据
    pub async fn write(&mut self, data: &[u8]) -> StressResult<()> {
        let mut bytes_written = 0;
        while bytes_written < data.len() {
            let space_left = self.block_size - self.current_pos;
            let to_copy = std::cmp::min(space_left, data.len() - bytes_written);

            self.buffer[self.current_pos..self.current_pos + to_copy]
                .copy_from_slice(&data[bytes_written..bytes_written + to_copy]);
            self.current_pos += to_copy;
            bytes_written += to_copy;

            if self.current_pos == self.block_size {
                self.flush().await?;
            }
        }
        Ok(())
    }

    /// 将缓冲区内容刷入文件
    pub async fn flush(&mut self) -> StressResult<()> {
        if self.current_pos > 0 {
            self.file_handle.write_all(&self.buffer[..self.current_pos]).await?;
            self.total_written += self.current_pos as u64;
            self.current_pos = 0;
            self.flush_count += 1;
        }
        Ok(())
    }

    /// 刷出剩余数据并同步到磁盘，返回 (总字节数, 块数)
    pub async fn finish(mut self) -> StressResult<(u64, u64)> {
        self.flush().await?;
        self.file_handle.sync_all().await?;
        Ok((self.total_written, self.flush_count))
    }
}

/// 存储目录下由本工具独占的子目录名
pub const FS_DIR: &str = "stressdl-fs";

/// 文件系统往返测试使用的目录
///
/// 所有文件都放在 `<base>/stressdl-fs` 下，`format` 只清空这个子目录。
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    block_size: usize,
}

impl FileStore {
    pub fn new(base: impl Into<PathBuf>, block_size: usize) -> Self {
        Self {
            root: base.into().join(FS_DIR),
            block_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// 清空并重建独占子目录，存储目录中的其它内容不受影响
    pub async fn format(&self) -> StressResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.root).await?;
        info!("已格式化存储目录 {}", self.root.display());
        Ok(())
    }

    /// 从 `offset` 开始按块写入 `data`
    pub async fn write(&self, name: &str, offset: u64, data: &[u8]) -> StressResult<u64> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path(name))
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut writer = BlockWriter::new(file, self.block_size);
        for block in data.chunks(self.block_size) {
            writer.write(block).await?;
        }
        let (written, blocks) = writer.finish().await?;
        if written != data.len() as u64 {
            return Err(StressError::SizeMismatch {
                expected: data.len(),
                actual: written as usize,
            });
        }
        debug!("写入 {}: 偏移 {}, {} 字节, {} 块", name, offset, written, blocks);
        Ok(written)
    }

    /// 从 `offset` 开始按块读回并与 `data` 比较
    pub async fn compare(&self, name: &str, offset: u64, data: &[u8]) -> StressResult<()> {
        let mut file = File::open(self.path(name)).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buffer = vec![0u8; self.block_size];
        let mut index = 0;
        while index < data.len() {
            let read_length = std::cmp::min(self.block_size, data.len() - index);
            let read = read_full(&mut file, &mut buffer[..read_length]).await?;
            if read != read_length {
                return Err(StressError::SizeMismatch {
                    expected: data.len(),
                    actual: index + read,
                });
            }
            if let Some(i) = buffer[..read].iter().zip(&data[index..]).position(|(a, b)| a != b) {
                return Err(StressError::ContentMismatch { offset: index + i });
            }
            index += read_length;
        }
        Ok(())
    }

    /// 从 `offset` 开始读满 `buf` 或读到文件结尾
    pub async fn read(&self, name: &str, offset: u64, buf: &mut [u8]) -> StressResult<usize> {
        let mut file = File::open(self.path(name)).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        read_full(&mut file, buf).await
    }
}

async fn read_full(file: &mut File, buf: &mut [u8]) -> StressResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::story::Story;

    fn store(dir: &tempfile::TempDir, block_size: usize) -> FileStore {
        FileStore::new(dir.path().join("fs"), block_size)
    }

    #[tokio::test]
    async fn test_format_clears_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1024);
        store.format().await.unwrap();
        store.write("old.txt", 0, b"stale").await.unwrap();

        store.format().await.unwrap();
        assert!(store.root().exists());
        assert!(!store.path("old.txt").exists());
    }

    #[tokio::test]
    async fn test_format_keeps_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"keep me").unwrap();
        std::fs::create_dir(dir.path().join("photos")).unwrap();

        let store = FileStore::new(dir.path(), 1024);
        assert_eq!(store.root(), dir.path().join(FS_DIR));
        store.format().await.unwrap();
        store.write(crate::core::harness::STORY_FILE, 0, b"story").await.unwrap();
        store.format().await.unwrap();

        assert_eq!(std::fs::read(&notes).unwrap(), b"keep me");
        assert!(dir.path().join("photos").is_dir());
        assert!(!store.path(crate::core::harness::STORY_FILE).exists());
    }

    #[tokio::test]
    async fn test_write_compare_story() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1024);
        let story = Story::builtin();
        store.format().await.unwrap();

        let written = store.write("story.txt", 0, story.as_bytes()).await.unwrap();
        assert_eq!(written as usize, story.len());
        store.compare("story.txt", 0, story.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 100);
        store.format().await.unwrap();

        store.write("story.txt", 4096, b"offset data").await.unwrap();
        let len = std::fs::metadata(store.path("story.txt")).unwrap().len();
        assert_eq!(len, 4096 + 11);
        store.compare("story.txt", 4096, b"offset data").await.unwrap();
    }

    #[tokio::test]
    async fn test_compare_reports_mismatch_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 4);
        store.format().await.unwrap();
        store.write("a.txt", 0, b"0123456789").await.unwrap();

        match store.compare("a.txt", 0, b"0123456X89").await {
            Err(StressError::ContentMismatch { offset }) => assert_eq!(offset, 7),
            other => panic!("unexpected result: {:?}", other),
        }
        match store.compare("a.txt", 0, b"0123456789AB").await {
            Err(StressError::SizeMismatch { expected, actual }) => assert_eq!((expected, actual), (12, 10)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir, 1024);
        let story = Story::builtin();
        store.format().await.unwrap();
        store.write("story.txt", 0, story.as_bytes()).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let read = store.read("story.txt", 1000, &mut buf).await.unwrap();
        assert_eq!(read, 2048);
        story.verify(1000, &buf).unwrap();

        let tail = story.len() as u64 - 10;
        let read = store.read("story.txt", tail, &mut buf).await.unwrap();
        assert_eq!(read, 10);
    }

    #[tokio::test]
    async fn test_block_writer_counts_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.bin");
        let file = File::create(&path).await.unwrap();

        let mut writer = BlockWriter::new(file, 4);
        writer.write(b"abcdefghij").await.unwrap();
        let (written, blocks) = writer.finish().await.unwrap();
        assert_eq!((written, blocks), (10, 3));
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefghij");
    }
}
