//! DTLS: 重传定时器桥接与握手驱动
//!
//! - `timer`: 纯状态机 `RetransmitTimer`
//! - `bridge`: `EventQueue` 工作线程与 `TimerHandle`
//! - `handshake`: `DtlsSession` 接口、单次握手继续与 `HandshakeDriver`
//! - `connector`: 把以上组合成 `Connector`

pub mod bridge;
pub mod connector;
pub mod handshake;
pub mod timer;

#[cfg(test)]
pub mod mock;

pub use bridge::{EventQueue, TimerHandle};
pub use connector::{DtlsConnector, DtlsSessionFactory};
pub use handshake::{continue_handshake, Continuation, DtlsSession, HandshakeDriver, HandshakeError, StepOutcome};
pub use timer::{DelayStatus, RetransmitTimer, TimerError, TimerState};
