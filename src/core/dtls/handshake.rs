use log::{debug, info, warn};
use thiserror::Error;

use super::bridge::TimerHandle;
use super::timer::TimerError;
use crate::core::net::{ReadinessLatch, Transport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("握手致命错误: {}", status_code(.0))]
    Fatal(i32),

    #[error("握手超时")]
    TimedOut,

    #[error("握手重置次数超过限制: {0}")]
    TooManyResets(usize),

    #[error("会话重置失败: {0}")]
    Reset(String),

    #[error("定时器错误: {0}")]
    Timer(#[from] TimerError),
}

fn status_code(code: &i32) -> String {
    if *code < 0 {
        format!("-0x{:04X}", code.unsigned_abs())
    } else {
        format!("0x{:04X}", code)
    }
}

/// 单步握手的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 本步完成，可以继续下一步
    Progress,
    /// 需要更多网络输入
    WantRead,
    HelloVerifyRequired,
    /// 重传定时器最终到期
    TimedOut,
    Fatal(i32),
}

/// 一次握手继续的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Complete,
    Pending,
    Restarted,
    TimedOut,
}

/// DTLS 会话
///
/// 由外部协议栈实现。`handshake_step` 不挂起，需要网络输入时返回 `WantRead`；
/// 会话通过 `set_timer` 拿到的句柄设置和查询重传延时。
pub trait DtlsSession: Send {
    fn handshake_step(&mut self) -> StepOutcome;

    fn is_handshake_over(&self) -> bool;

    fn session_reset(&mut self) -> Result<(), HandshakeError>;

    fn set_timer(&mut self, timer: TimerHandle);

    fn sigio(&mut self, latch: ReadinessLatch);

    /// 握手完成后把会话交给下载引擎
    fn into_transport(self: Box<Self>) -> Box<dyn Transport>;
}

/// 推进握手直到需要等待或出现终态
pub fn continue_handshake(session: &mut dyn DtlsSession) -> Result<Continuation, HandshakeError> {
    loop {
        if session.is_handshake_over() {
            return Ok(Continuation::Complete);
        }
        match session.handshake_step() {
            StepOutcome::Progress => {}
            StepOutcome::WantRead => return Ok(Continuation::Pending),
            StepOutcome::HelloVerifyRequired => {
                debug!("收到 HelloVerifyRequest，重置会话");
                session.session_reset()?;
                return Ok(Continuation::Restarted);
            }
            StepOutcome::TimedOut => return Ok(Continuation::TimedOut),
            StepOutcome::Fatal(code) => return Err(HandshakeError::Fatal(code)),
        }
    }
}

/// 在就绪信号和定时器状态变化之间驱动握手
pub struct HandshakeDriver {
    latch: ReadinessLatch,
    timer: TimerHandle,
    max_resets: usize,
    resets: usize,
}

impl HandshakeDriver {
    pub fn new(latch: ReadinessLatch, timer: TimerHandle, max_resets: usize) -> Self {
        Self {
            latch,
            timer,
            max_resets,
            resets: 0,
        }
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub async fn drive(&mut self, session: &mut dyn DtlsSession) -> Result<(), HandshakeError> {
        loop {
            match continue_handshake(session)? {
                Continuation::Complete => {
                    self.timer.cancel()?;
                    info!("DTLS 握手完成 (重置 {} 次)", self.resets);
                    return Ok(());
                }
                Continuation::Pending => {
                    self.latch.drained();
                    self.wait().await?;
                }
                Continuation::Restarted => self.count_reset()?,
                Continuation::TimedOut => {
                    warn!("DTLS 重传超时，重置会话");
                    self.count_reset()?;
                    session.session_reset()?;
                }
            }
        }
    }

    fn count_reset(&mut self) -> Result<(), HandshakeError> {
        self.resets += 1;
        if self.resets > self.max_resets {
            return Err(HandshakeError::TooManyResets(self.resets));
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), HandshakeError> {
        tokio::select! {
            _ = self.latch.wait() => Ok(()),
            state = self.timer.changed() => {
                debug!("定时器状态: {:?}", state?);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtls::mock::{MockStep, ScriptedSession};
    use crate::core::dtls::EventQueue;
    use tokio::runtime::Handle;

    #[test]
    fn test_steps_until_complete() {
        let mut session = ScriptedSession::new(vec![MockStep::Progress, MockStep::Progress]);
        assert_eq!(continue_handshake(&mut session), Ok(Continuation::Complete));
        assert_eq!(session.steps_taken(), 2);
    }

    #[test]
    fn test_would_block_is_pending() {
        let mut session = ScriptedSession::new(vec![MockStep::Progress, MockStep::WantRead]);
        assert_eq!(continue_handshake(&mut session), Ok(Continuation::Pending));
        assert!(!session.is_handshake_over());
    }

    #[test]
    fn test_hello_verify_resets_session() {
        let mut session = ScriptedSession::new(vec![MockStep::HelloVerifyRequired]);
        let resets = session.reset_counter();
        assert_eq!(continue_handshake(&mut session), Ok(Continuation::Restarted));
        assert_eq!(resets.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fatal_code() {
        let mut session = ScriptedSession::new(vec![MockStep::Fatal(-0x7780)]);
        assert_eq!(continue_handshake(&mut session), Err(HandshakeError::Fatal(-0x7780)));
        assert_eq!(HandshakeError::Fatal(-0x7780).to_string(), "握手致命错误: -0x7780");
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_resumes_on_data_and_timer() {
        let queue = EventQueue::on(Handle::current());
        let latch = ReadinessLatch::new();
        let timer = queue.timer();

        let mut session = ScriptedSession::new(vec![
            MockStep::WantReadThenData,
            MockStep::HelloVerifyRequired,
            MockStep::ArmTimer(100, 300),
            MockStep::WaitFinalExpiry,
            MockStep::Progress,
        ]);
        session.sigio(latch.clone());
        session.set_timer(timer.clone());

        let mut driver = HandshakeDriver::new(latch, timer.clone(), 3);
        driver.drive(&mut session).await.unwrap();
        assert!(session.is_handshake_over());
        assert_eq!(driver.resets(), 1);
        assert_eq!(timer.get_delay().code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_gives_up_after_max_resets() {
        let queue = EventQueue::on(Handle::current());
        let mut session = ScriptedSession::new(vec![
            MockStep::HelloVerifyRequired,
            MockStep::TimedOut,
            MockStep::HelloVerifyRequired,
            MockStep::HelloVerifyRequired,
        ]);
        let resets = session.reset_counter();

        let mut driver = HandshakeDriver::new(ReadinessLatch::new(), queue.timer(), 3);
        let result = driver.drive(&mut session).await;
        assert_eq!(result, Err(HandshakeError::TooManyResets(4)));
        assert_eq!(resets.load(std::sync::atomic::Ordering::SeqCst), 4);
    }
}
