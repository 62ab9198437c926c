use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::cli::{Args, Command};
use crate::core::error::{StressError, StressResult};
use crate::utils::validator;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 下载源主机
    pub host: String,
    /// 明文 HTTP 端口
    pub http_port: u16,
    /// HTTPS 端口
    pub https_port: u16,
    /// DTLS 端口
    pub dtls_port: u16,
    /// 资源名，请求路径为 /firmware/<resource>.txt
    pub resource: String,
    /// 根证书 PEM 文件，空表示使用内置根证书
    pub root_ca: String,
    /// 参考故事文件，空表示使用内置故事
    pub story_file: String,
    /// 连接尝试次数
    pub max_retries: usize,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 请求缓冲区大小（字节）
    pub request_buffer_size: usize,
    /// 响应头缓冲区大小（字节）
    pub header_buffer_size: usize,
    /// 等待数据的超时（秒）
    pub recv_timeout_secs: u64,
    /// 整轮测试的超时（秒）
    pub case_timeout_secs: u64,
    /// 分段扫描使用的分段大小（字节）
    pub chunk_sizes: Vec<usize>,
    /// 并行下载的工作者数量
    pub workers: usize,
    /// DTLS 握手超时（秒）
    pub handshake_timeout_secs: u64,
    /// DTLS 握手最多重置次数
    pub max_handshake_resets: usize,
    /// 文件测试使用的目录
    pub storage_dir: String,
    /// 文件读写块大小（字节）
    pub file_block_size: usize,
    /// 闪存大小（字节）
    pub flash_size: usize,
    /// 闪存编程页大小（字节）
    pub flash_page_size: usize,
    /// 闪存擦除扇区大小（字节）
    pub flash_sector_size: usize,
    /// 为应用保留的闪存大小（字节）
    pub app_reserved_size: usize,
    /// 日志级别
    pub log_level: String,
    /// 日志文件，空表示输出到标准错误
    pub log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "lootbox.s3.dualstack.us-west-2.amazonaws.com".to_string(),
            http_port: 80,
            https_port: 443,
            dtls_port: 4430,
            resource: "alice".to_string(),
            root_ca: String::new(),
            story_file: String::new(),
            max_retries: 3,
            retry_delay_ms: 1000,
            request_buffer_size: 1024,
            header_buffer_size: 2048,
            recv_timeout_secs: 30,
            case_timeout_secs: 600,
            chunk_sizes: vec![1024, 2048, 4096, 8192, 16384, 32768],
            workers: 2,
            handshake_timeout_secs: 60,
            max_handshake_resets: 3,
            storage_dir: "./stress-fs".to_string(),
            file_block_size: 1024,
            flash_size: 1024 * 1024,
            flash_page_size: 256,
            flash_sector_size: 4096,
            app_reserved_size: 64 * 1024,
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl Config {
    /// 加载配置文件；文件不存在时写入默认配置，格式错误时报错且不改动原文件
    pub fn load(path: &str) -> StressResult<Self> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| StressError::Config(format!("配置文件 {} 格式错误: {}", path, e)))
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带说明的配置文件
    pub fn save_with_tutorial(&self, path: &str) -> StressResult<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let config_content =
            toml::to_string_pretty(self).map_err(|e| StressError::Config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n{}", Self::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    fn generate_tutorial_content() -> String {
        r#"# stressdl 配置文件
# ====================
#
# TOML 格式。命令行参数会覆盖这里的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   stressdl all                          # 运行全部测试
#   stressdl --loopback range             # 使用本地回环服务器做分段扫描
#   stressdl range --tls --chunk 4096     # 通过 TLS 以 4KB 分段扫描
#   stressdl parallel --workers 5         # 5 个并行下载
#
# ==================== 网络 ====================
# host / http_port / https_port / dtls_port   下载源
# resource          请求 /firmware/<resource>.txt
# root_ca           根证书 PEM 文件，空表示使用内置根证书
# max_retries       连接尝试次数（不是额外重试次数）
# retry_delay_ms    两次连接尝试之间的固定间隔
# recv_timeout_secs 等待下一批数据的最长时间
#
# ==================== 缓冲区 ====================
# request_buffer_size  请求必须严格小于该值
# header_buffer_size   首次读取的暂存区，必须能容纳完整的响应头
#
# ==================== 存储 ====================
# storage_dir       文件测试目录，每次测试前只清空其中的 stressdl-fs 子目录
# flash_*           内存闪存的几何参数，页大小必须整除扇区大小
# app_reserved_size 闪存起始处为应用保留、测试不会擦写的区域
#
# ==================== 故障排除 ====================
#
# 问题：经常连接失败
# 解决：增加 max_retries 或 retry_delay_ms
#
# 问题：报告“未找到响应头结束标记”
# 解决：增大 header_buffer_size
#
# ==================== 配置项 ===================="#
            .to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> StressResult<()> {
        let fail = |msg: &str| Err(StressError::Config(msg.to_string()));

        if !validator::is_valid_host(&self.host) {
            return Err(StressError::Config(format!("无效的主机: {:?}", self.host)));
        }
        if self.http_port == 0 || self.https_port == 0 || self.dtls_port == 0 {
            return fail("端口必须大于0");
        }
        if !validator::is_valid_resource(&self.resource) {
            return Err(StressError::Config(format!("无效的资源名: {:?}", self.resource)));
        }
        if self.max_retries == 0 {
            return fail("连接尝试次数必须大于0");
        }
        if self.request_buffer_size == 0 || self.header_buffer_size == 0 {
            return fail("缓冲区大小必须大于0");
        }
        if self.recv_timeout_secs == 0 || self.case_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            return fail("超时时间必须大于0");
        }
        if self.chunk_sizes.is_empty() || self.chunk_sizes.contains(&0) {
            return fail("分段大小列表不能为空且不能包含0");
        }
        if self.workers == 0 {
            return fail("工作者数量必须大于0");
        }
        if self.file_block_size == 0 {
            return fail("文件块大小必须大于0");
        }
        if self.flash_page_size == 0 || self.flash_sector_size == 0 {
            return fail("闪存页和扇区大小必须大于0");
        }
        if self.flash_sector_size % self.flash_page_size != 0 {
            return fail("闪存页大小必须整除扇区大小");
        }
        if self.flash_size % self.flash_sector_size != 0 || self.app_reserved_size % self.flash_sector_size != 0 {
            return fail("闪存大小和保留区必须按扇区对齐");
        }
        if self.app_reserved_size >= self.flash_size {
            return fail("保留区必须小于闪存大小");
        }
        if self.storage_dir.is_empty() {
            return fail("存储目录不能为空");
        }
        if !validator::is_valid_log_level(&self.log_level) {
            return Err(StressError::Config(format!("无效的日志级别: {}", self.log_level)));
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(resource) = &args.resource {
            self.resource = resource.clone();
        }
        if let Some(max_retries) = args.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if let Some(file) = &args.log_file {
            self.log_file = file.clone();
        }
        match &args.command {
            Command::Range { chunks, .. } if !chunks.is_empty() => self.chunk_sizes = chunks.clone(),
            Command::Parallel { workers: Some(workers), .. } => self.workers = *workers,
            _ => {}
        }
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载源: {} (http {}, https {}, dtls {})\n\
            - 资源: /firmware/{}.txt\n\
            - 根证书: {}\n\
            - 故事: {}\n\
            - 连接尝试: {} 次, 间隔 {} ms\n\
            - 分段大小: {:?}\n\
            - 并行工作者: {}\n\
            - 存储目录: {}",
            self.host,
            self.http_port,
            self.https_port,
            self.dtls_port,
            self.resource,
            if self.root_ca.is_empty() { "内置" } else { &self.root_ca },
            if self.story_file.is_empty() { "内置" } else { &self.story_file },
            self.max_retries,
            self.retry_delay_ms,
            self.chunk_sizes,
            self.workers,
            self.storage_dir
        )
    }
}
