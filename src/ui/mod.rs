mod progress;

use std::fmt;
use std::time::Duration;

pub use progress::ProgressManager;

use crate::core::harness::{CaseStatus, Summary};

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    println!("✗ {}", message);
}

/// 运行摘要
pub struct RunSummary<'a>(pub &'a Summary);

impl fmt::Display for RunSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.0;
        writeln!(f, "\n运行摘要:")?;
        for case in &summary.cases {
            let mark = match case.status {
                CaseStatus::Passed => "✓",
                CaseStatus::Skipped => "-",
                _ => "✗",
            };
            writeln!(f, "{} {} ({:.2}秒) {}", mark, case.name, case.elapsed_ms as f64 / 1000.0, case.detail)?;
        }
        writeln!(f, "总用例数: {}", summary.cases.len())?;
        writeln!(f, "耗时: {:.2}秒", Duration::from_millis(summary.elapsed_ms).as_secs_f64())?;
        writeln!(f, "成功: {}", summary.passed)?;
        writeln!(f, "失败: {}", summary.failed)?;
        Ok(())
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
