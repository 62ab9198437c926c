//! 测试用的脚本化传输与连接器

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Connector, ReadinessLatch, Target, Transport};
use crate::core::error::ConnectError;

#[derive(Debug, Clone)]
pub enum Delivery {
    Data(Bytes),
    WouldBlock,
    Fail(io::ErrorKind),
    Eof,
}

/// 传输的可观察状态，测试在传输被移交给引擎后仍可检查
#[derive(Clone, Default)]
pub struct TransportProbe {
    pub sent: Arc<Mutex<Vec<u8>>>,
    pub closed: Arc<AtomicBool>,
    pub recv_calls: Arc<AtomicUsize>,
    pub nonblocking: Arc<AtomicBool>,
}

impl TransportProbe {
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent.lock().unwrap()).into_owned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedTransport {
    deliveries: VecDeque<Delivery>,
    latch: Option<ReadinessLatch>,
    send_limit: Option<usize>,
    probe: TransportProbe,
}

impl ScriptedTransport {
    pub fn new(deliveries: Vec<Delivery>) -> Self {
        Self {
            deliveries: deliveries.into(),
            latch: None,
            send_limit: None,
            probe: TransportProbe::default(),
        }
    }

    /// 每段数据之间插入一次 WouldBlock，模拟分多次到达
    pub fn bursts(parts: &[&[u8]]) -> Self {
        let mut deliveries = Vec::new();
        for part in parts {
            deliveries.push(Delivery::Data(Bytes::copy_from_slice(part)));
            deliveries.push(Delivery::WouldBlock);
        }
        Self::new(deliveries)
    }

    /// `send` 最多接受 `limit` 字节
    pub fn with_send_limit(mut self, limit: usize) -> Self {
        self.send_limit = Some(limit);
        self
    }

    pub fn probe(&self) -> TransportProbe {
        self.probe.clone()
    }

    fn signal(&self) {
        if let Some(latch) = &self.latch {
            if !self.deliveries.is_empty() {
                latch.fire();
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        let accepted = self.send_limit.map_or(data.len(), |limit| limit.min(data.len()));
        self.probe.sent.lock().unwrap().extend_from_slice(&data[..accepted]);
        self.signal();
        Ok(accepted)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.probe.recv_calls.fetch_add(1, Ordering::SeqCst);
        match self.deliveries.pop_front() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(Delivery::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.deliveries.push_front(Delivery::Data(data.slice(n..)));
                }
                Ok(n)
            }
            Some(Delivery::WouldBlock) => {
                self.signal();
                Err(io::ErrorKind::WouldBlock.into())
            }
            Some(Delivery::Fail(kind)) => Err(kind.into()),
            Some(Delivery::Eof) => {
                self.deliveries.push_front(Delivery::Eof);
                Ok(0)
            }
        }
    }

    fn set_blocking(&mut self, blocking: bool) -> io::Result<()> {
        self.probe.nonblocking.store(!blocking, Ordering::SeqCst);
        Ok(())
    }

    fn sigio(&mut self, latch: ReadinessLatch) {
        self.latch = Some(latch);
    }

    async fn close(&mut self) -> io::Result<()> {
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 按顺序返回预先安排的连接结果
#[derive(Default)]
pub struct ScriptedConnector {
    outcomes: Mutex<VecDeque<Result<ScriptedTransport, ConnectError>>>,
    attempts: AtomicUsize,
    targets: Mutex<Vec<Target>>,
}

impl ScriptedConnector {
    pub fn new(outcomes: Vec<Result<ScriptedTransport, ConnectError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<Target> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn Transport>, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.clone());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(e)) => Err(e),
            None => Err(ConnectError::Refused("脚本已用完".to_string())),
        }
    }
}
