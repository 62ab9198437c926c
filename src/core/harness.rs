//! 测试用例的注册与执行
//!
//! 用例按注册顺序依次运行，共享一个整体超时。某个用例失败只记录结果，
//! 继续运行下一个；超时后尚未运行的用例记为跳过。

use futures::future::BoxFuture;
use indicatif::ProgressBar;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::core::error::{StressError, StressResult};
use crate::core::net::Security;
use crate::core::storage::{self, FileStore, RamFlash};
use crate::core::story::Story;
use crate::core::stress;
use crate::core::task::RangeDownloader;

/// 文件测试使用的文件名
pub const STORY_FILE: &str = "stress-test.txt";

/// 一个已注册的用例
pub struct Case {
    name: String,
    run: BoxFuture<'static, StressResult<String>>,
}

impl Case {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Future<Output = StressResult<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::pin(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    TimedOut,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub status: CaseStatus,
    pub detail: String,
    pub elapsed_ms: u64,
}

/// 一次运行的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub cases: Vec<CaseReport>,
    pub passed: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl Summary {
    /// 所有用例都通过才返回 0
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }

    pub fn write_json(&self, path: &Path) -> StressResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StressError::Unknown(format!("无法序列化报告: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

pub struct Harness {
    cases: Vec<Case>,
    timeout: Duration,
}

impl Harness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cases: Vec::new(),
            timeout,
        }
    }

    pub fn register(&mut self, case: Case) -> &mut Self {
        self.cases.push(case);
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(Case::name).collect()
    }

    /// 依次运行所有用例；`on_case` 在每个用例结束后被调用
    pub async fn run(self, mut on_case: impl FnMut(&CaseReport)) -> Summary {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut cases = Vec::with_capacity(self.cases.len());

        for case in self.cases {
            let case_started = Instant::now();
            let (status, detail) = if case_started >= deadline {
                (CaseStatus::Skipped, "整体超时，未运行".to_string())
            } else {
                info!(">>> {}", case.name);
                match tokio::time::timeout_at(deadline, case.run).await {
                    Ok(Ok(detail)) => (CaseStatus::Passed, detail),
                    Ok(Err(e)) => (CaseStatus::Failed, e.to_string()),
                    Err(_) => (CaseStatus::TimedOut, format!("超过整体时限 {:?}", self.timeout)),
                }
            };

            let report = CaseReport {
                name: case.name,
                status,
                detail,
                elapsed_ms: case_started.elapsed().as_millis() as u64,
            };
            match report.status {
                CaseStatus::Passed => info!("<<< {} 通过: {}", report.name, report.detail),
                CaseStatus::Skipped => warn!("<<< {} 跳过", report.name),
                _ => error!("<<< {} 失败: {}", report.name, report.detail),
            }
            on_case(&report);
            cases.push(report);
        }

        let passed = cases.iter().filter(|c| c.status == CaseStatus::Passed).count();
        Summary {
            failed: cases.len() - passed,
            passed,
            cases,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// 可以注册的用例种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseKind {
    RangeSweep { chunk_size: usize, security: Security },
    Repeat { offset: usize, length: usize, security: Security },
    Parallel { workers: usize, security: Security },
    File,
    Flash,
    FileToFlash { buffer_size: usize },
}

impl CaseKind {
    pub fn name(&self) -> String {
        match self {
            CaseKind::RangeSweep { chunk_size, security } => {
                format!("{} 分段 {}", security, format_chunk(*chunk_size))
            }
            CaseKind::Repeat { offset, length, security } => {
                format!("{} 重复下载 [{}+{}]", security, offset, length)
            }
            CaseKind::Parallel { workers, security } => format!("{} 并行 {} 个工作者", security, workers),
            CaseKind::File => "文件往返".to_string(),
            CaseKind::Flash => "闪存往返".to_string(),
            CaseKind::FileToFlash { buffer_size } => format!("文件到闪存 缓冲区 {}", format_chunk(*buffer_size)),
        }
    }
}

fn format_chunk(size: usize) -> String {
    if size >= 1024 && size % 1024 == 0 {
        format!("{}k", size / 1024)
    } else {
        format!("{}B", size)
    }
}

/// 用例运行时共享的资源
#[derive(Clone)]
pub struct StressContext {
    pub downloader: RangeDownloader,
    pub story: Story,
    pub config: Arc<Config>,
    pub progress: ProgressBar,
}

impl StressContext {
    pub fn new(downloader: RangeDownloader, story: Story, config: Arc<Config>) -> Self {
        Self {
            downloader,
            story,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    fn store(&self) -> FileStore {
        FileStore::new(&self.config.storage_dir, self.config.file_block_size)
    }

    fn flash(&self) -> RamFlash {
        RamFlash::new(
            self.config.flash_size,
            self.config.flash_page_size,
            self.config.flash_sector_size,
        )
    }

    /// 把用例种类变成可运行的用例
    pub fn case(&self, kind: CaseKind) -> Case {
        let ctx = self.clone();
        let name = kind.name();
        Case::new(name, async move { ctx.run(kind).await })
    }

    async fn run(self, kind: CaseKind) -> StressResult<String> {
        let resource = self.config.resource.clone();
        match kind {
            CaseKind::RangeSweep { chunk_size, security } => {
                let report = stress::range_sweep(
                    &self.downloader,
                    &self.story,
                    &resource,
                    chunk_size,
                    security,
                    &self.progress,
                )
                .await?;
                Ok(format!("{} 段, {} 字节, 用时 {:?}", report.ranges, report.bytes, report.elapsed))
            }
            CaseKind::Repeat { offset, length, security } => {
                stress::repeat_download(&self.downloader, &self.story, &resource, offset, length, security).await?;
                Ok(format!("两次下载 {} 字节一致", length))
            }
            CaseKind::Parallel { workers, security } => {
                let report =
                    stress::parallel_downloads(&self.downloader, &self.story, &resource, workers, security).await?;
                Ok(format!("{} 字节, 用时 {:?}", report.bytes, report.elapsed))
            }
            CaseKind::File => {
                let store = self.store();
                store.format().await?;
                store.write(STORY_FILE, 0, self.story.as_bytes()).await?;
                store.compare(STORY_FILE, 0, self.story.as_bytes()).await?;

                let window = self.story.len().min(store.block_size() * 2);
                let offset = (self.story.len() - window) / 2;
                let mut buf = vec![0u8; window];
                let read = store.read(STORY_FILE, offset as u64, &mut buf).await?;
                if read != window {
                    return Err(StressError::SizeMismatch {
                        expected: window,
                        actual: read,
                    });
                }
                self.story.verify(offset, &buf)?;
                Ok(format!("{} 字节写入并读回", self.story.len()))
            }
            CaseKind::Flash => {
                let mut flash = self.flash();
                let reserved = self.config.app_reserved_size;
                storage::erase_after_reserved(&mut flash, reserved)?;
                let copies = storage::fill_with_story(&mut flash, reserved, self.story.as_bytes())?;
                storage::compare_filled(&flash, reserved, self.story.as_bytes())?;
                Ok(format!("{} 份故事写入并读回", copies))
            }
            CaseKind::FileToFlash { buffer_size } => {
                let store = self.store();
                store.format().await?;
                store.write(STORY_FILE, 0, self.story.as_bytes()).await?;

                let mut flash = self.flash();
                let stats = storage::file_to_flash(
                    store,
                    STORY_FILE,
                    self.story.clone(),
                    &mut flash,
                    self.config.app_reserved_size,
                    buffer_size,
                )
                .await?;
                Ok(format!("{} 个缓冲区, {} 字节", stats.buffers, stats.bytes))
            }
        }
    }
}
