//! `task` 模块包含了单次分段下载的全部逻辑
//!
//! 主要包括：
//! - `request`: Range 请求 `RangeRequest`
//! - `receive`: 接收缓冲区 `ReceiveBuffer`，负责剥离响应头
//! - `retry`: 连接重试 `RetryStrategy` / `connect_with_retry`
//! - `download`: 下载引擎 `RangeDownloader`

pub mod download;
pub mod receive;
pub mod request;
pub mod retry;

pub use self::download::{DownloadSettings, RangeDownloader};
pub use self::receive::ReceiveBuffer;
pub use self::request::RangeRequest;
pub use self::retry::{connect_with_retry, RetryContext, RetryStats, RetryStrategy};
