//! Scripted IRC wire for handler and supervisor tests.
//!
//! A [`MockConnector`] hands out pre-scripted [`MockWire`]s; the paired
//! [`MockWireHandle`] plays the server side: push inbound lines, inspect
//! what the handler wrote, or drop the connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::irc::{Connector, Message, TransportError, Wire, WireRx, WireTx};

/// Server side of one scripted connection.
#[derive(Clone)]
pub struct MockWireHandle {
    incoming: mpsc::UnboundedSender<Result<Message, TransportError>>,
    sent: Arc<StdMutex<Vec<Message>>>,
}

impl MockWireHandle {
    /// Inject one raw server line.
    pub fn push_line(&self, line: &str) {
        let message = line.parse().expect("test line must parse");
        let _ = self.incoming.send(Ok(message));
    }

    /// Simulate a transport failure.
    pub fn disconnect(&self) {
        let _ = self.incoming.send(Err(TransportError::Closed));
    }

    /// Everything the client sent so far, as formatted lines.
    pub fn sent_lines(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to_string())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Poll until the client has sent a line matching `predicate`.
    pub async fn wait_for_sent<F>(&self, predicate: F, timeout: Duration) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(line) = self.sent_lines().into_iter().find(|l| predicate(l)) {
                return Some(line);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Client side handed to the handler by [`MockConnector`].
pub struct MockWire {
    incoming: mpsc::UnboundedReceiver<Result<Message, TransportError>>,
    sent: Arc<StdMutex<Vec<Message>>>,
}

impl MockWire {
    pub fn pair() -> (Self, MockWireHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        (
            Self {
                incoming: rx,
                sent: sent.clone(),
            },
            MockWireHandle { incoming: tx, sent },
        )
    }
}

struct MockTx {
    sent: Arc<StdMutex<Vec<Message>>>,
}

struct MockRx {
    incoming: mpsc::UnboundedReceiver<Result<Message, TransportError>>,
}

impl Wire for MockWire {
    fn split(self: Box<Self>) -> (Box<dyn WireTx>, Box<dyn WireRx>) {
        (
            Box::new(MockTx { sent: self.sent }),
            Box::new(MockRx {
                incoming: self.incoming,
            }),
        )
    }
}

#[async_trait]
impl WireTx for MockTx {
    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl WireRx for MockRx {
    async fn recv(&mut self) -> Option<Result<Message, TransportError>> {
        self.incoming.recv().await
    }
}

/// Connector handing out scripted sessions in order.
#[derive(Default)]
pub struct MockConnector {
    sessions: StdMutex<VecDeque<MockWire>>,
    connects: AtomicUsize,
    last_target: StdMutex<Option<(String, u16, bool)>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one scripted session and return its server-side handle.
    pub fn script_session(&self) -> MockWireHandle {
        let (wire, handle) = MockWire::pair();
        self.sessions.lock().unwrap().push_back(wire);
        handle
    }

    /// How many times the handler connected.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// (server, port, tls) of the most recent connect.
    pub fn last_target(&self) -> Option<(String, u16, bool)> {
        self.last_target.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        server: &str,
        port: u16,
        tls: bool,
    ) -> Result<Box<dyn Wire>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_target.lock().unwrap() = Some((server.to_string(), port, tls));

        match self.sessions.lock().unwrap().pop_front() {
            Some(wire) => Ok(Box::new(wire)),
            None => Err(TransportError::ConnectionFailed(
                "no scripted session".to_string(),
            )),
        }
    }
}
