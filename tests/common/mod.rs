//! Shared utilities for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use tidepool::backend::TcpConnector;
use tidepool::config::{ListenerConfig, PoolerConfig, TargetConfig};
use tidepool::coordinator::Coordinator;
use tidepool::lifecycle::Shutdown;
use tidepool::net::{Listener, ListenerError};
use tidepool::protocol::codec::{read_frame, write_frames};
use tidepool::protocol::{tag, Frame};
use tidepool::proxy::ProxyServer;

pub const MAX_FRAME: usize = 1 << 20;

/// A TCP backend that records every query with the connection it arrived on.
///
/// Queries starting with `FAIL` get an error; `SELECT` queries get one data
/// row; everything else completes with no rows.
#[derive(Clone)]
pub struct TestBackend {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<(usize, String)>>>,
    accepted: Arc<Mutex<usize>>,
}

impl TestBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = Self {
            addr: listener.local_addr().unwrap(),
            received: Arc::default(),
            accepted: Arc::default(),
        };

        let handle = backend.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let conn = {
                    let mut accepted = handle.accepted.lock();
                    *accepted += 1;
                    *accepted - 1
                };
                tokio::spawn(handle.clone().serve(conn, socket));
            }
        });
        backend
    }

    async fn serve(self, conn: usize, socket: TcpStream) {
        let mut stream = BufStream::new(socket);
        while let Ok(Some(frame)) = read_frame(&mut stream, MAX_FRAME).await {
            let reply = match frame.tag {
                tag::SYNC => vec![Frame::ready()],
                tag::QUERY => {
                    let sql = String::from_utf8_lossy(&frame.payload).into_owned();
                    self.received.lock().push((conn, sql.clone()));
                    if sql.starts_with("FAIL") {
                        vec![Frame::error("42000", "requested failure"), Frame::ready()]
                    } else if sql.starts_with("SELECT") {
                        vec![
                            Frame::new(tag::DATA_ROW, format!("row from {}", conn)),
                            Frame::new(tag::COMMAND_COMPLETE, "SELECT 1"),
                            Frame::ready(),
                        ]
                    } else {
                        let word = sql.split_whitespace().next().unwrap_or("OK").to_string();
                        vec![Frame::new(tag::COMMAND_COMPLETE, word), Frame::ready()]
                    }
                }
                _ => vec![Frame::error("08P01", "unexpected frame"), Frame::ready()],
            };
            if write_frames(&mut stream, &reply).await.is_err() {
                break;
            }
        }
    }

    /// (connection number, query) in arrival order.
    pub fn received(&self) -> Vec<(usize, String)> {
        self.received.lock().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.received().into_iter().map(|(_, q)| q).collect()
    }

    /// Connection number each matching query arrived on.
    pub fn connections_for(&self, query: &str) -> Vec<usize> {
        self.received()
            .into_iter()
            .filter(|(_, q)| q == query)
            .map(|(c, _)| c)
            .collect()
    }

    pub fn accepted(&self) -> usize {
        *self.accepted.lock()
    }

    /// Poll until `query` has been received.
    pub async fn wait_for(&self, query: &str) -> bool {
        for _ in 0..100 {
            if self.queries().iter().any(|q| q == query) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

pub fn target(name: &str, backend: &TestBackend, max_size: usize) -> TargetConfig {
    let mut target = TargetConfig::new(name, backend.addr.to_string());
    target.min_size = 0;
    target.max_size = max_size;
    target.acquire_timeout_ms = 2_000;
    target
}

/// A pooler running on an ephemeral port.
pub struct TestPooler {
    pub addr: SocketAddr,
    pub coordinator: Arc<Coordinator>,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), ListenerError>>,
}

impl TestPooler {
    pub async fn start(targets: Vec<TargetConfig>) -> Self {
        let mut config = PoolerConfig {
            targets,
            listener: ListenerConfig {
                bind_address: "127.0.0.1:0".to_string(),
                ..ListenerConfig::default()
            },
            ..PoolerConfig::default()
        };
        config.health_check.enabled = false;

        let connector = Arc::new(TcpConnector::new(MAX_FRAME));
        let coordinator = Coordinator::new(&config, connector);
        let shutdown = Shutdown::new();
        let listener = Listener::bind(&config.listener).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = ProxyServer::new(Arc::clone(&coordinator), shutdown.clone(), MAX_FRAME);
        let task = tokio::spawn(async move { server.run(listener).await });

        Self {
            addr,
            coordinator,
            shutdown,
            task,
        }
    }

    /// Connect and complete startup for `database`.
    pub async fn connect(&self, database: &str) -> TestClient {
        let mut client = TestClient {
            stream: BufStream::new(TcpStream::connect(self.addr).await.unwrap()),
        };
        let reply = client.request(Frame::startup([("database", database)])).await;
        assert_eq!(reply, vec![Frame::ready()], "startup for {database} failed");
        client
    }
}

pub struct TestClient {
    pub stream: BufStream<TcpStream>,
}

impl TestClient {
    pub async fn raw(addr: SocketAddr) -> Self {
        Self {
            stream: BufStream::new(TcpStream::connect(addr).await.unwrap()),
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        write_frames(&mut self.stream, &[frame]).await.unwrap();
    }

    /// Frames up to and including the next ready frame.
    pub async fn response(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut self.stream, MAX_FRAME).await.unwrap() {
            let done = frame.is_ready();
            frames.push(frame);
            if done {
                break;
            }
        }
        frames
    }

    pub async fn request(&mut self, frame: Frame) -> Vec<Frame> {
        self.send(frame).await;
        self.response().await
    }

    pub async fn query(&mut self, sql: &str) -> Vec<Frame> {
        self.request(Frame::query(sql)).await
    }

    pub async fn next_frame(&mut self) -> Option<Frame> {
        read_frame(&mut self.stream, MAX_FRAME).await.unwrap()
    }

    pub async fn close(mut self) {
        let _ = write_frames(&mut self.stream, &[Frame::terminate()]).await;
        let _ = self.stream.shutdown().await;
    }
}
