use log::{debug, info};
use tokio::sync::mpsc;

use super::file::FileStore;
use super::flash::{compare_pages, erase_after_reserved, program_pages, FlashDevice};
use crate::core::error::{StressError, StressResult};
use crate::core::story::Story;

/// 缓冲池中的缓冲区数量
pub const POOL_SIZE: usize = 2;

/// 在生产者和消费者之间传递的缓冲区
struct Filled {
    data: Vec<u8>,
    len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub bytes: usize,
    pub buffers: usize,
}

/// 文件到闪存：生产者从文件读出故事并校验，消费者把每个缓冲区编程到闪存
///
/// 两个缓冲区在生产者和消费者之间轮转；最后整体比较闪存区域。
pub async fn file_to_flash(
    store: FileStore,
    name: &str,
    story: Story,
    flash: &mut dyn FlashDevice,
    reserved: usize,
    buffer_size: usize,
) -> StressResult<PipelineStats> {
    if buffer_size == 0 || buffer_size % flash.page_size() != 0 {
        return Err(StressError::storage(format!(
            "缓冲区大小 {} 必须是页大小 {} 的整数倍",
            buffer_size,
            flash.page_size()
        )));
    }

    let (pool_tx, mut pool_rx) = mpsc::channel::<Vec<u8>>(POOL_SIZE);
    let (queue_tx, mut queue_rx) = mpsc::channel::<Filled>(POOL_SIZE);
    for _ in 0..POOL_SIZE {
        pool_tx
            .send(vec![0u8; buffer_size])
            .await
            .map_err(|_| StressError::storage("缓冲池已关闭"))?;
    }

    let name = name.to_string();
    let expected = story.len();
    let reference = story.clone();
    let producer = tokio::spawn(async move {
        let mut index = 0;
        while index < story.len() {
            let mut data = pool_rx.recv().await.ok_or_else(|| StressError::storage("缓冲池已关闭"))?;
            let len = store.read(&name, index as u64, &mut data).await?;
            if len == 0 {
                return Err(StressError::SizeMismatch {
                    expected: story.len(),
                    actual: index,
                });
            }
            story.verify(index, &data[..len])?;
            index += len;
            debug!("读取: {}", index);
            if queue_tx.send(Filled { data, len }).await.is_err() {
                break;
            }
        }
        Ok::<usize, StressError>(index)
    });

    erase_after_reserved(flash, reserved)?;

    let mut stats = PipelineStats { bytes: 0, buffers: 0 };
    while let Some(filled) = queue_rx.recv().await {
        program_pages(flash, reserved + stats.bytes, &filled.data[..filled.len])?;
        stats.bytes += filled.len;
        stats.buffers += 1;
        // 生产者可能已经结束，归还失败不影响结果
        let _ = pool_tx.send(filled.data).await;
    }

    let produced = producer
        .await
        .map_err(|e| StressError::storage(format!("读取任务异常退出: {}", e)))??;
    if produced != expected || stats.bytes != expected {
        return Err(StressError::SizeMismatch {
            expected,
            actual: stats.bytes,
        });
    }

    info!("写入完成，读回比较");
    compare_pages(flash, reserved, reference.as_bytes())?;
    Ok(stats)
}
