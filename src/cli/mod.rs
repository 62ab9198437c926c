//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 分段扫描：`stressdl range [--tls] [--chunk N]...`
//! - 重复下载：`stressdl repeat [--tls] [--offset N] [--length N]`
//! - 并行下载：`stressdl parallel [--tls] [--workers N]`
//! - 存储测试：`stressdl file`、`stressdl flash`、`stressdl file-to-flash`
//! - 全部测试：`stressdl all`
//!
//! `--loopback` 在本地启动分段服务器，明文下载都指向它。

use clap::{Parser, Subcommand};
use std::env;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::core::error::{StressError, StressResult};
use crate::core::harness::CaseKind;
use crate::core::net::Security;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ngit: ",
    env!("VERGEN_GIT_SHA"),
    "\nbuilt: ",
    env!("VERGEN_BUILD_TIMESTAMP")
);

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/stressdl/stressdl.toml", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/stressdl/stressdl.toml", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/stressdl/stressdl.toml", home)
    }
}

/// stressdl 命令行参数
///
/// 示例用法：
///   stressdl all
///   stressdl --loopback range --chunk 1024
///   stressdl -c ./stressdl.toml parallel --tls --workers 5
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stressdl",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    about = "非阻塞 HTTP(S)/DTLS 分段下载与存储往返压力测试",
    long_about = "对分段下载引擎、文件系统与闪存做逐字节往返校验的压力测试。\n\n示例：\n  stressdl all\n  stressdl --loopback range --chunk 1024\n  stressdl parallel --tls --workers 5\n"
)]
pub struct Args {
    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path())]
    pub config: String,

    /// 在本地启动分段服务器并把明文下载指向它
    #[arg(long)]
    pub loopback: bool,

    /// 把运行结果写成 JSON 报告
    #[arg(long, value_name = "REPORT")]
    pub json: Option<PathBuf>,

    /// 日志级别（error、warn、info、debug、trace）
    #[arg(long)]
    pub log_level: Option<String>,

    /// 日志文件
    #[arg(long)]
    pub log_file: Option<String>,

    /// 覆盖下载源主机
    #[arg(long)]
    pub host: Option<String>,

    /// 覆盖资源名
    #[arg(long)]
    pub resource: Option<String>,

    /// 覆盖连接尝试次数
    #[arg(long)]
    pub max_retries: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 按分段大小依次下载整个故事
    Range {
        #[arg(long)]
        tls: bool,
        /// 分段大小（字节），可重复指定
        #[arg(long = "chunk")]
        chunks: Vec<usize>,
    },
    /// 同一范围下载两次，比较结果
    Repeat {
        #[arg(long)]
        tls: bool,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 4096)]
        length: usize,
    },
    /// 多个工作者并行下载整个故事
    Parallel {
        #[arg(long)]
        tls: bool,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// 文件写入、比较与读取
    File,
    /// 闪存擦除、编程与比较
    Flash,
    /// 从文件读出并编程到闪存
    FileToFlash,
    /// 运行全部测试
    All,
}

fn security(tls: bool) -> Security {
    if tls {
        Security::Tls
    } else {
        Security::Plain
    }
}

impl Command {
    /// 子命令对应的用例列表，参数已经合并进 `config`
    ///
    /// 回环模式下 `all` 只包含明文下载。
    pub fn plan(&self, config: &Config, loopback: bool) -> Vec<CaseKind> {
        let sweeps = move |security: Security| {
            config
                .chunk_sizes
                .iter()
                .map(move |&chunk_size| CaseKind::RangeSweep { chunk_size, security })
        };
        let pipelines = move || {
            config
                .chunk_sizes
                .iter()
                .map(|&buffer_size| CaseKind::FileToFlash { buffer_size })
        };

        match self {
            Command::Range { tls, .. } => sweeps(security(*tls)).collect(),
            Command::Repeat { tls, offset, length } => vec![CaseKind::Repeat {
                offset: *offset as usize,
                length: *length,
                security: security(*tls),
            }],
            Command::Parallel { tls, .. } => vec![CaseKind::Parallel {
                workers: config.workers,
                security: security(*tls),
            }],
            Command::File => vec![CaseKind::File],
            Command::Flash => vec![CaseKind::Flash],
            Command::FileToFlash => pipelines().collect(),
            Command::All => {
                let mut cases: Vec<CaseKind> = sweeps(Security::Plain).collect();
                cases.push(CaseKind::Repeat {
                    offset: 0,
                    length: 4096,
                    security: Security::Plain,
                });
                cases.push(CaseKind::Parallel {
                    workers: config.workers,
                    security: Security::Plain,
                });
                if !loopback {
                    cases.extend(sweeps(Security::Tls));
                    cases.push(CaseKind::Parallel {
                        workers: config.workers,
                        security: Security::Tls,
                    });
                }
                cases.push(CaseKind::File);
                cases.push(CaseKind::Flash);
                cases.extend(pipelines());
                cases
            }
        }
    }
}

impl Args {
    /// 解析命令行参数并加载配置
    pub fn parse_args() -> StressResult<(Self, Config)> {
        let args = Args::parse();
        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 加载或创建配置文件，合并命令行参数并校验
    pub fn load_config(&self) -> StressResult<Config> {
        if let Some(parent) = Path::new(&self.config).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StressError::Config(format!("无法创建配置目录: {}", e)))?;
            }
        }
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config
            .validate()
            .map_err(|e| StressError::Config(format!("配置无效: {}", e)))?;
        Ok(config)
    }
}
