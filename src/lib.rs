//! stressdl: 非阻塞 HTTP(S)/DTLS 分段下载与存储往返压力测试

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;
