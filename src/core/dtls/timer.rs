use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("不支持的延时组合: 中间 {intermediate_ms} ms, 最终 {final_ms} ms")]
    UnsupportedDelay { intermediate_ms: u32, final_ms: u32 },

    #[error("事件队列已关闭")]
    QueueClosed,
}

/// 重传定时器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed { intermediate_ms: u32, final_ms: u32 },
    IntermediateExpired { remaining_ms: u32 },
    FinalExpired,
    Cancelled,
}

impl TimerState {
    pub fn is_pending(&self) -> bool {
        matches!(self, TimerState::Armed { .. } | TimerState::IntermediateExpired { .. })
    }

    pub fn status(&self) -> DelayStatus {
        match self {
            TimerState::FinalExpired => DelayStatus::FinalExpired,
            TimerState::Idle | TimerState::Cancelled => DelayStatus::Cancelled,
            TimerState::IntermediateExpired { .. } => DelayStatus::IntermediateExpired,
            TimerState::Armed { .. } => DelayStatus::NotExpired,
        }
    }
}

/// 握手状态机查询到的延时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStatus {
    Cancelled,
    NotExpired,
    IntermediateExpired,
    FinalExpired,
}

impl DelayStatus {
    pub fn code(&self) -> i32 {
        match self {
            DelayStatus::Cancelled => -1,
            DelayStatus::NotExpired => 0,
            DelayStatus::IntermediateExpired => 1,
            DelayStatus::FinalExpired => 2,
        }
    }
}

/// DTLS 重传定时器
///
/// 纯状态机，不持有时钟。`set_delay` 与 `expire` 返回下一阶段需要等待的时长，
/// 由事件队列负责真正的计时。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitTimer {
    state: TimerState,
}

impl Default for RetransmitTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl RetransmitTimer {
    pub fn new() -> Self {
        Self { state: TimerState::Idle }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn status(&self) -> DelayStatus {
        self.state.status()
    }

    /// `(0, 0)` 表示取消；其余组合要求 `0 < intermediate <= final`
    pub fn validate(intermediate_ms: u32, final_ms: u32) -> Result<(), TimerError> {
        let disarm = intermediate_ms == 0 && final_ms == 0;
        let arm = intermediate_ms > 0 && final_ms >= intermediate_ms;
        if disarm || arm {
            Ok(())
        } else {
            Err(TimerError::UnsupportedDelay {
                intermediate_ms,
                final_ms,
            })
        }
    }

    pub fn set_delay(&mut self, intermediate_ms: u32, final_ms: u32) -> Result<Option<Duration>, TimerError> {
        Self::validate(intermediate_ms, final_ms)?;
        if final_ms == 0 {
            if self.state.is_pending() {
                self.state = TimerState::Cancelled;
            }
            return Ok(None);
        }
        self.state = TimerState::Armed {
            intermediate_ms,
            final_ms,
        };
        Ok(Some(Duration::from_millis(intermediate_ms as u64)))
    }

    /// 当前阶段到期；若还有剩余的最终延时则返回它
    pub fn expire(&mut self) -> Option<Duration> {
        match self.state {
            TimerState::Armed {
                intermediate_ms,
                final_ms,
            } if final_ms > intermediate_ms => {
                let remaining_ms = final_ms - intermediate_ms;
                self.state = TimerState::IntermediateExpired { remaining_ms };
                Some(Duration::from_millis(remaining_ms as u64))
            }
            TimerState::Armed { .. } | TimerState::IntermediateExpired { .. } => {
                self.state = TimerState::FinalExpired;
                None
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        if !matches!(self.state, TimerState::FinalExpired) {
            self.state = TimerState::Cancelled;
        }
    }
}
