//! 基于下载引擎的压力场景：分段扫描、重复下载、并行下载

use futures::future::join_all;
use indicatif::ProgressBar;
use log::{debug, error, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::error::{StressError, StressResult};
use crate::core::net::Security;
use crate::core::story::Story;
use crate::core::task::RangeDownloader;

/// 一次分段扫描的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub chunk_size: usize,
    pub ranges: usize,
    pub bytes: usize,
    pub elapsed: Duration,
}

/// 以 `chunk_size` 为分段依次下载整个故事，每段都校验长度和内容
pub async fn range_sweep(
    downloader: &RangeDownloader,
    story: &Story,
    resource: &str,
    chunk_size: usize,
    security: Security,
    progress: &ProgressBar,
) -> StressResult<SweepReport> {
    if chunk_size == 0 {
        return Err(StressError::InvalidRange { offset: 0, length: 0 });
    }

    let started = Instant::now();
    let mut buf = vec![0u8; chunk_size];
    let mut offset = 0;
    let mut ranges = 0;

    progress.set_length(story.len() as u64);
    progress.set_position(0);
    while offset < story.len() {
        let length = chunk_size.min(story.len() - offset);
        let window = &mut buf[..length];
        let received = downloader.download(resource, offset as u64, window, security).await?;
        if received != length {
            return Err(StressError::SizeMismatch {
                expected: length,
                actual: received,
            });
        }
        story.verify(offset, window)?;

        offset += length;
        ranges += 1;
        progress.set_position(offset as u64);
    }

    let report = SweepReport {
        chunk_size,
        ranges,
        bytes: offset,
        elapsed: started.elapsed(),
    };
    info!(
        "分段 {} 字节: {} 段, {} 字节, 用时 {:?}",
        chunk_size, report.ranges, report.bytes, report.elapsed
    );
    Ok(report)
}

/// 同一范围下载两次，两次结果必须一致且与故事一致
pub async fn repeat_download(
    downloader: &RangeDownloader,
    story: &Story,
    resource: &str,
    offset: usize,
    length: usize,
    security: Security,
) -> StressResult<()> {
    let mut first = vec![0u8; length];
    let mut second = vec![0u8; length];

    downloader.download(resource, offset as u64, &mut first, security).await?;
    downloader.download(resource, offset as u64, &mut second, security).await?;

    if let Some(i) = first.iter().zip(&second).position(|(a, b)| a != b) {
        return Err(StressError::ContentMismatch { offset: offset + i });
    }
    story.verify(offset, &first)
}

/// 并行下载的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelReport {
    pub workers: usize,
    pub bytes: usize,
    pub elapsed: Duration,
}

/// `workers` 个工作者同时下载整个故事
///
/// 工作者编号按先到先得分配，只用于日志。
pub async fn parallel_downloads(
    downloader: &RangeDownloader,
    story: &Story,
    resource: &str,
    workers: usize,
    security: Security,
) -> StressResult<ParallelReport> {
    let started = Instant::now();
    let counter = Arc::new(AtomicUsize::new(0));

    let handles = (0..workers).map(|_| {
        let downloader = downloader.clone();
        let story = story.clone();
        let resource = resource.to_string();
        let counter = counter.clone();
        tokio::spawn(async move {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            debug!("{}: 开始下载", id);
            let mut buf = vec![0u8; story.len()];
            let result = match downloader.download(&resource, 0, &mut buf, security).await {
                Ok(_) => story.verify(0, &buf).map(|_| buf.len()),
                Err(e) => Err(e),
            };
            match &result {
                Ok(bytes) => debug!("{}: 完成 {} 字节", id, bytes),
                Err(e) => error!("{}: 失败: {}", id, e),
            }
            result
        })
    });

    let mut bytes = 0;
    let mut first_error = None;
    for joined in join_all(handles).await {
        let result = joined.map_err(|e| StressError::Unknown(format!("工作者异常退出: {}", e)))?;
        match result {
            Ok(n) => bytes += n,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    let report = ParallelReport {
        workers,
        bytes,
        elapsed: started.elapsed(),
    };
    info!("{} 个工作者共下载 {} 字节, 用时 {:?}", workers, bytes, report.elapsed);
    Ok(report)
}
