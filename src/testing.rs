//! In-memory backends for unit tests.
//!
//! A [`MockBackend`] stands in for one database server: every transport
//! it hands out records the frames it is sent and answers from a shared
//! script, falling back to a plain success. [`MockConnector`] maps
//! addresses to mock backends and counts connects.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::backend::transport::{Connector, Transport};
use crate::protocol::frame::tag;
use crate::protocol::Frame;

/// Scripted answer to the next request, whichever connection sends it.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `C` + `Z`.
    Ok,
    /// One `D` per row, then `C` + `Z`.
    Rows(Vec<String>),
    /// `E` + `Z`.
    Error,
    /// The stream ends before any response frame.
    Disconnect,
    /// Never answer.
    Hang,
    /// Answer with `C` + `Z` after the delay.
    Delay(Duration),
}

#[derive(Debug, Clone)]
enum Outgoing {
    Frame(Frame),
    Eof,
    Hang,
    Until(Instant),
}

#[derive(Debug, Default)]
struct BackendState {
    script: VecDeque<Reply>,
    /// (connection number, frame) in arrival order.
    received: Vec<(usize, Frame)>,
    opened: usize,
    closed: usize,
}

/// One simulated database server.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to this server.
    pub fn transport(&self) -> Box<dyn Transport> {
        let mut state = self.state.lock();
        let conn = state.opened;
        state.opened += 1;
        Box::new(MockTransport {
            conn,
            backend: self.clone(),
            outbox: VecDeque::new(),
            closed: false,
        })
    }

    /// Queue a reply for the next request this server receives.
    pub fn script(&self, reply: Reply) {
        self.state.lock().script.push_back(reply);
    }

    /// Every frame received, across all connections.
    pub fn received(&self) -> Vec<Frame> {
        self.state.lock().received.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Frames received on the `conn`-th connection opened.
    pub fn received_on(&self, conn: usize) -> Vec<Frame> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Query texts received, in order, excluding probes.
    pub fn queries(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|f| f.tag == tag::QUERY)
            .map(|f| String::from_utf8_lossy(&f.payload).into_owned())
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    fn answer(&self, conn: usize, frame: &Frame) -> Vec<Outgoing> {
        let mut state = self.state.lock();
        state.received.push((conn, frame.clone()));

        let reply = match state.script.pop_front() {
            Some(reply) => reply,
            None if frame.tag == tag::SYNC => return vec![Outgoing::Frame(Frame::ready())],
            None => Reply::Ok,
        };
        let complete = || Outgoing::Frame(Frame::new(tag::COMMAND_COMPLETE, "OK"));
        let ready = || Outgoing::Frame(Frame::ready());

        match reply {
            Reply::Ok => vec![complete(), ready()],
            Reply::Rows(rows) => {
                let mut out: Vec<Outgoing> = rows
                    .into_iter()
                    .map(|row| Outgoing::Frame(Frame::new(tag::DATA_ROW, row)))
                    .collect();
                out.push(complete());
                out.push(ready());
                out
            }
            Reply::Error => vec![
                Outgoing::Frame(Frame::error("42000", "scripted failure")),
                ready(),
            ],
            Reply::Disconnect => vec![Outgoing::Eof],
            Reply::Hang => vec![Outgoing::Hang],
            Reply::Delay(delay) => vec![Outgoing::Until(Instant::now() + delay), complete(), ready()],
        }
    }
}

#[derive(Debug)]
struct MockTransport {
    conn: usize,
    backend: MockBackend,
    outbox: VecDeque<Outgoing>,
    closed: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &Frame) -> std::io::Result<()> {
        if self.closed || matches!(self.outbox.back(), Some(Outgoing::Eof)) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock connection closed",
            ));
        }
        let replies = self.backend.answer(self.conn, frame);
        self.outbox.extend(replies);
        Ok(())
    }

    async fn recv(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            match self.outbox.front().cloned() {
                Some(Outgoing::Frame(frame)) => {
                    self.outbox.pop_front();
                    return Ok(Some(frame));
                }
                Some(Outgoing::Until(deadline)) => {
                    // The marker stays queued until the deadline passes so a
                    // cancelled read does not skip the delay.
                    tokio::time::sleep_until(deadline).await;
                    self.outbox.pop_front();
                }
                Some(Outgoing::Eof) => return Ok(None),
                Some(Outgoing::Hang) | None => std::future::pending::<()>().await,
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.backend.state.lock().closed += 1;
        }
    }
}

/// Connector over a set of mock backends keyed by address.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    backends: Arc<Mutex<HashMap<String, MockBackend>>>,
    refused: Arc<Mutex<Vec<String>>>,
    connects: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend behind `address`, created on first use.
    pub fn backend(&self, address: &str) -> MockBackend {
        self.backends
            .lock()
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    /// Make connects to `address` fail until called again with `false`.
    pub fn refuse(&self, address: &str, refuse: bool) {
        let mut refused = self.refused.lock();
        refused.retain(|a| a != address);
        if refuse {
            refused.push(address.to_string());
        }
    }

    /// Successful connects to `address`.
    pub fn connects_to(&self, address: &str) -> usize {
        self.connects.lock().iter().filter(|a| *a == address).count()
    }

    pub fn arc(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> std::io::Result<Box<dyn Transport>> {
        if self.refused.lock().iter().any(|a| a == address) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", address),
            ));
        }
        self.connects.lock().push(address.to_string());
        Ok(self.backend(address).transport())
    }
}
