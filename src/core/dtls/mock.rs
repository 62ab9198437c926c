//! 测试用的脚本化 DTLS 会话

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::bridge::TimerHandle;
use super::connector::DtlsSessionFactory;
use super::handshake::{DtlsSession, HandshakeError, StepOutcome};
use super::timer::DelayStatus;
use crate::core::error::ConnectError;
use crate::core::net::mock::ScriptedTransport;
use crate::core::net::{ReadinessLatch, Target, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStep {
    Progress,
    WantRead,
    /// 返回 WantRead 并立即触发就绪信号
    WantReadThenData,
    /// 设置重传延时后返回 WantRead
    ArmTimer(u32, u32),
    /// 最终延时到期前一直返回 WantRead
    WaitFinalExpiry,
    HelloVerifyRequired,
    TimedOut,
    Fatal(i32),
}

pub struct ScriptedSession {
    steps: VecDeque<MockStep>,
    steps_taken: usize,
    last: Option<StepOutcome>,
    resets: Arc<AtomicUsize>,
    latch: Option<ReadinessLatch>,
    timer: Option<TimerHandle>,
    transport: Option<ScriptedTransport>,
}

impl ScriptedSession {
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: steps.into(),
            steps_taken: 0,
            last: None,
            resets: Arc::new(AtomicUsize::new(0)),
            latch: None,
            timer: None,
            transport: None,
        }
    }

    pub fn with_transport(mut self, transport: ScriptedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn reset_counter(&self) -> Arc<AtomicUsize> {
        self.resets.clone()
    }
}

impl ScriptedSession {
    fn next_outcome(&mut self) -> StepOutcome {
        let step = match self.steps.front() {
            Some(step) => *step,
            None => return StepOutcome::Progress,
        };
        if step == MockStep::WaitFinalExpiry {
            let expired = self
                .timer
                .as_ref()
                .map_or(false, |timer| timer.get_delay() == DelayStatus::FinalExpired);
            if !expired {
                return StepOutcome::WantRead;
            }
            self.steps.pop_front();
            return StepOutcome::Progress;
        }

        self.steps.pop_front();
        match step {
            MockStep::Progress | MockStep::WaitFinalExpiry => StepOutcome::Progress,
            MockStep::WantRead => StepOutcome::WantRead,
            MockStep::WantReadThenData => {
                if let Some(latch) = &self.latch {
                    latch.fire();
                }
                StepOutcome::WantRead
            }
            MockStep::ArmTimer(intermediate_ms, final_ms) => {
                if let Some(timer) = &self.timer {
                    if let Err(e) = timer.set_delay(intermediate_ms, final_ms) {
                        panic!("set_delay failed: {e}");
                    }
                }
                StepOutcome::WantRead
            }
            MockStep::HelloVerifyRequired => StepOutcome::HelloVerifyRequired,
            MockStep::TimedOut => StepOutcome::TimedOut,
            MockStep::Fatal(code) => StepOutcome::Fatal(code),
        }
    }
}

impl DtlsSession for ScriptedSession {
    fn handshake_step(&mut self) -> StepOutcome {
        self.steps_taken += 1;
        let outcome = self.next_outcome();
        self.last = Some(outcome);
        outcome
    }

    fn is_handshake_over(&self) -> bool {
        self.steps.is_empty() && self.last == Some(StepOutcome::Progress)
    }

    fn session_reset(&mut self) -> Result<(), HandshakeError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_timer(&mut self, timer: TimerHandle) {
        self.timer = Some(timer);
    }

    fn sigio(&mut self, latch: ReadinessLatch) {
        self.latch = Some(latch);
    }

    fn into_transport(self: Box<Self>) -> Box<dyn Transport> {
        Box::new(self.transport.unwrap_or_else(|| ScriptedTransport::new(vec![])))
    }
}

/// 按顺序交出预先准备的会话
#[derive(Default)]
pub struct ScriptedFactory {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    opened: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DtlsSessionFactory for ScriptedFactory {
    async fn open(&self, _target: &Target) -> Result<Box<dyn DtlsSession>, ConnectError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let session = self.sessions.lock().unwrap().pop_front();
        match session {
            Some(session) => Ok(Box::new(session)),
            None => Err(ConnectError::NoSocket),
        }
    }
}
