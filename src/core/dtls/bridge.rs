//! 定时器与事件队列之间的桥接
//!
//! `RetransmitTimer` 以所有权转移的方式交给事件队列上的工作任务，握手一侧只持有
//! `TimerHandle`：命令经 mpsc 发出，状态变化经 watch 通道观察，两边不共享可变字段。

use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::timer::{DelayStatus, RetransmitTimer, TimerError, TimerState};

enum Command {
    Set {
        intermediate_ms: u32,
        final_ms: u32,
        generation: u64,
    },
    Cancel {
        generation: u64,
    },
}

/// 工作任务最近一次发布的状态，`generation` 是它已处理的最后一条命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    state: TimerState,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Arm,
    Disarm,
    Cancel,
}

/// 单线程协作式事件队列
pub struct EventQueue {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    timers: AtomicU64,
}

impl EventQueue {
    /// 在独立线程上运行一个 current_thread 运行时
    pub fn dedicated(name: &str) -> io::Result<Self> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new().name(name.to_string()).spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = handle_tx.send(Err(e));
                    return;
                }
            };
            let _ = handle_tx.send(Ok(rt.handle().clone()));
            rt.block_on(async {
                let _ = shutdown_rx.await;
            });
            debug!("事件队列线程退出");
        })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "事件队列线程启动失败"))??;
        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
            timers: AtomicU64::new(0),
        })
    }

    /// 在已有运行时上调度
    pub fn on(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: None,
            thread: None,
            timers: AtomicU64::new(0),
        }
    }

    /// 创建一个新定时器并把它移入事件队列
    pub fn timer(&self) -> TimerHandle {
        let id = self.timers.fetch_add(1, Ordering::Relaxed);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Snapshot {
            state: TimerState::Idle,
            generation: 0,
        });
        self.handle
            .spawn(run_timer(id, RetransmitTimer::new(), command_rx, state_tx));

        TimerHandle {
            commands: command_tx,
            states: state_rx,
            last_request: Arc::new(Mutex::new((0, None))),
        }
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("事件队列线程异常退出");
            }
        }
    }
}

async fn run_timer(
    id: u64,
    mut timer: RetransmitTimer,
    mut commands: mpsc::UnboundedReceiver<Command>,
    states: watch::Sender<Snapshot>,
) {
    let mut deadline: Option<Instant> = None;
    let mut generation = 0;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                None => break,
                Some(Command::Set { intermediate_ms, final_ms, generation: g }) => {
                    generation = g;
                    match timer.set_delay(intermediate_ms, final_ms) {
                        Ok(Some(wait)) => deadline = Some(Instant::now() + wait),
                        Ok(None) if !timer.state().is_pending() => deadline = None,
                        Ok(None) => {}
                        Err(e) => warn!("定时器 {}: {}", id, e),
                    }
                }
                Some(Command::Cancel { generation: g }) => {
                    generation = g;
                    timer.cancel();
                    deadline = None;
                }
            },
            _ = sleep_until(deadline) => {
                deadline = timer.expire().map(|wait| Instant::now() + wait);
                debug!("定时器 {} 到期: {:?}", id, timer.state());
            }
        }

        states.send_replace(Snapshot {
            state: timer.state(),
            generation,
        });
    }
    debug!("定时器 {} 结束", id);
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// 握手一侧的定时器句柄，克隆后共享同一个定时器
#[derive(Clone)]
pub struct TimerHandle {
    commands: mpsc::UnboundedSender<Command>,
    states: watch::Receiver<Snapshot>,
    last_request: Arc<Mutex<(u64, Option<Request>)>>,
}

impl TimerHandle {
    fn submit(&self, request: Request, build: impl FnOnce(u64) -> Command) -> Result<(), TimerError> {
        let mut last = self.last_request.lock().map_err(|_| TimerError::QueueClosed)?;
        let generation = last.0 + 1;
        self.commands
            .send(build(generation))
            .map_err(|_| TimerError::QueueClosed)?;
        *last = (generation, Some(request));
        Ok(())
    }

    pub fn set_delay(&self, intermediate_ms: u32, final_ms: u32) -> Result<(), TimerError> {
        RetransmitTimer::validate(intermediate_ms, final_ms)?;
        let request = if final_ms == 0 { Request::Disarm } else { Request::Arm };
        self.submit(request, |generation| Command::Set {
            intermediate_ms,
            final_ms,
            generation,
        })
    }

    pub fn cancel(&self) -> Result<(), TimerError> {
        self.submit(Request::Cancel, |generation| Command::Cancel { generation })
    }

    /// 查询延时状态
    ///
    /// 工作任务尚未处理最近一条命令时，按该命令的效果作答。
    pub fn get_delay(&self) -> DelayStatus {
        let snapshot = *self.states.borrow();
        let (generation, request) = match self.last_request.lock() {
            Ok(last) => *last,
            Err(_) => return snapshot.state.status(),
        };
        if snapshot.generation >= generation {
            return snapshot.state.status();
        }
        match request {
            Some(Request::Arm) => DelayStatus::NotExpired,
            Some(Request::Cancel) => match snapshot.state {
                TimerState::FinalExpired => DelayStatus::FinalExpired,
                _ => DelayStatus::Cancelled,
            },
            Some(Request::Disarm) if snapshot.state.is_pending() => DelayStatus::Cancelled,
            _ => snapshot.state.status(),
        }
    }

    pub fn state(&self) -> TimerState {
        self.states.borrow().state
    }

    /// 等待工作任务发布下一次状态
    pub async fn changed(&mut self) -> Result<TimerState, TimerError> {
        self.states.changed().await.map_err(|_| TimerError::QueueClosed)?;
        Ok(self.states.borrow_and_update().state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_arm_runs_to_final_expiry() {
        let queue = EventQueue::on(Handle::current());
        let mut timer = queue.timer();
        assert_eq!(timer.get_delay().code(), -1);

        let started = Instant::now();
        timer.set_delay(200, 500).unwrap();
        assert_eq!(timer.get_delay().code(), 0);

        assert_eq!(
            timer.changed().await.unwrap(),
            TimerState::Armed {
                intermediate_ms: 200,
                final_ms: 500
            }
        );
        assert_eq!(
            timer.changed().await.unwrap(),
            TimerState::IntermediateExpired { remaining_ms: 300 }
        );
        assert_eq!(timer.get_delay().code(), 1);
        assert!(started.elapsed() >= Duration::from_millis(200));

        assert_eq!(timer.changed().await.unwrap(), TimerState::FinalExpired);
        assert_eq!(timer.get_delay().code(), 2);
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_armed() {
        let queue = EventQueue::on(Handle::current());
        let mut timer = queue.timer();
        timer.set_delay(200, 500).unwrap();
        assert!(matches!(timer.changed().await.unwrap(), TimerState::Armed { .. }));

        timer.cancel().unwrap();
        assert_eq!(timer.get_delay().code(), -1);
        assert_eq!(timer.changed().await.unwrap(), TimerState::Cancelled);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(timer.get_delay().code(), -1);
        assert_eq!(timer.state(), TimerState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_observe_latest_request() {
        let queue = EventQueue::on(Handle::current());
        let timer = queue.timer();
        let session_side = timer.clone();

        session_side.set_delay(100, 300).unwrap();
        assert_eq!(timer.get_delay(), DelayStatus::NotExpired);
        timer.set_delay(0, 0).unwrap();
        assert_eq!(session_side.get_delay(), DelayStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_delay_not_sent() {
        let queue = EventQueue::on(Handle::current());
        let timer = queue.timer();
        assert_eq!(
            timer.set_delay(100, 0),
            Err(TimerError::UnsupportedDelay {
                intermediate_ms: 100,
                final_ms: 0
            })
        );
        assert_eq!(timer.get_delay(), DelayStatus::Cancelled);
        assert_eq!(timer.state(), TimerState::Idle);
    }

    #[tokio::test]
    async fn test_dedicated_queue_thread() {
        let queue = EventQueue::dedicated("dtls-timer").unwrap();
        let mut timer = queue.timer();
        timer.set_delay(10, 30).unwrap();

        let mut state = timer.state();
        while state != TimerState::FinalExpired {
            state = tokio::time::timeout(Duration::from_secs(5), timer.changed())
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(timer.get_delay().code(), 2);
        drop(queue);
    }
}
