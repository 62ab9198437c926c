//! Core: 下载引擎、DTLS 定时器桥接、压力场景与测试执行

pub mod dtls;
pub mod error;
pub mod harness;
pub mod net;
pub mod storage;
pub mod story;
pub mod stress;
pub mod task;

pub use error::{ConnectError, StressError, StressResult};
pub use harness::{Case, CaseKind, CaseStatus, Harness, StressContext, Summary};
pub use story::Story;
