use chrono::Local; // 用于获取本地时间
use env_logger::{Builder, Env, Target};
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

/// 格式化一行日志：`<本地时间> [<级别>] <模块> - <消息>`
fn format_line(timestamp: &str, level: log::Level, target: &str, message: &std::fmt::Arguments<'_>) -> String {
    format!("{} [{}] {} - {}", timestamp, level, target, message)
}

fn open_log_file(file_path: &str) -> io::Result<File> {
    // 确保日志目录存在
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(file_path)
}

/// 安装全局日志
///
/// `log_file` 为空时写到标准错误。`RUST_LOG` 优先于配置的级别。
/// 重复调用不会报错，只有第一次生效。
pub fn init(level: &str, log_file: &str) -> io::Result<()> {
    let filter = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    let mut builder = Builder::from_env(Env::default().default_filter_or(filter.to_string()));
    builder.format(|buf, record| {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        writeln!(
            buf,
            "{}",
            format_line(&timestamp, record.level(), record.target(), record.args())
        )
    });

    if !log_file.is_empty() {
        let file = open_log_file(log_file)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    if builder.try_init().is_err() {
        log::debug!("日志已经初始化");
    }
    Ok(())
}
