use anyhow::{Context, Result};
use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stressdl::cli::Args;
use stressdl::core::harness::{CaseKind, CaseStatus, Harness, StressContext};
use stressdl::core::net::loopback::LoopbackServer;
use stressdl::core::net::tls::{client_config, load_root_store};
use stressdl::core::net::NetConnector;
use stressdl::core::story::Story;
use stressdl::core::task::{DownloadSettings, RangeDownloader};
use stressdl::ui::{self, ProgressManager, RunSummary};
use stressdl::utils::logger;

#[tokio::main]
async fn main() -> Result<()> {
    // 解析参数和配置
    let (args, mut config) = match Args::parse_args() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("参数解析失败: {}", e);
            std::process::exit(2);
        }
    };

    logger::init(&config.log_level, &config.log_file).context("无法初始化日志")?;
    info!("stressdl {} 启动", env!("CARGO_PKG_VERSION"));
    info!("配置文件路径: {}", args.config);
    println!("{}", config.get_summary());

    let story = Story::load(&config.story_file).context("无法加载故事")?;
    info!("故事 {} 字节", story.len());

    // 回环模式：明文下载改为指向本地服务器
    let _server = if args.loopback {
        let server = LoopbackServer::start(&config.resource, story.bytes())
            .await
            .context("无法启动本地服务器")?;
        info!("本地分段服务器监听 {}", server.addr());
        config.host = "127.0.0.1".to_string();
        config.http_port = server.port();
        Some(server)
    } else {
        None
    };

    let root_ca = (!config.root_ca.is_empty()).then(|| Path::new(config.root_ca.as_str()));
    let tls = client_config(load_root_store(root_ca)?)?;
    let connector = NetConnector::new(Duration::from_secs(config.recv_timeout_secs)).with_tls(tls);
    let downloader = RangeDownloader::new(Arc::new(connector), DownloadSettings::from_config(&config));

    let config = Arc::new(config);
    let ctx = StressContext::new(downloader, story.clone(), config.clone());

    // 日志写到终端时不画进度条
    let progress = if config.log_file.is_empty() {
        ProgressManager::hidden()
    } else {
        ProgressManager::new()
    };

    let mut harness = Harness::new(Duration::from_secs(config.case_timeout_secs));
    for kind in args.command.plan(&config, args.loopback) {
        let case = match kind {
            CaseKind::RangeSweep { .. } => {
                let pb = progress.add_progress_bar(story.len() as u64, &kind.name()).await;
                ctx.clone().with_progress(pb).case(kind)
            }
            _ => ctx.case(kind),
        };
        harness.register(case);
    }
    info!("共 {} 个用例: {:?}", harness.len(), harness.names());

    let summary = harness
        .run(|report| {
            let line = format!("{}: {}", report.name, report.detail);
            if report.status == CaseStatus::Passed {
                ui::print_success(&line);
            } else {
                ui::print_error(&line);
            }
        })
        .await;
    progress.finish_all().await;
    println!("{}", RunSummary(&summary));

    if let Some(path) = &args.json {
        match summary.write_json(path) {
            Ok(()) => info!("报告已写入 {}", path.display()),
            Err(e) => error!("写入报告失败: {}", e),
        }
    }

    std::process::exit(summary.exit_code());
}
