use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use tokio::sync::Mutex;

const BAR_TEMPLATE: &str = "{msg:24} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {elapsed_precise}";

// 结构体：ProgressManager
// 管理各用例的进度条
pub struct ProgressManager {
    multi: MultiProgress,
    progress_bars: Arc<Mutex<Vec<ProgressBar>>>,
}

impl ProgressManager {
    pub fn new() -> Self {
        ProgressManager {
            multi: MultiProgress::new(),
            progress_bars: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 不绘制任何内容，用于日志写到终端或测试
    pub fn hidden() -> Self {
        ProgressManager {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            progress_bars: Arc::new(Mutex::new(Vec::new())),
        }
    }

    // 添加进度条，返回进度条本身，调用方直接更新
    pub async fn add_progress_bar(&self, total: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(total));
        if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(msg.to_string());
        self.progress_bars.lock().await.push(pb.clone());
        pb
    }

    pub async fn len(&self) -> usize {
        self.progress_bars.lock().await.len()
    }

    // 结束所有仍在进行的进度条（整体超时时会出现）
    pub async fn finish_all(&self) {
        for pb in self.progress_bars.lock().await.iter() {
            if !pb.is_finished() {
                pb.abandon();
            }
        }
    }

    pub fn println(&self, line: &str) {
        if self.multi.println(line).is_err() {
            println!("{}", line);
        }
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}
