//! Serving one client connection.
//!
//! # Responsibilities
//! - Require a startup frame and open the session it names
//! - Read requests ahead into a bounded queue on a separate task, so a
//!   disconnect is noticed while a request waits for a connection
//! - Answer each request, turning pooler errors into `E` + `Z`
//! - Close idle sessions at shutdown; let open transactions finish

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;
use crate::error::{PoolerError, PoolerResult};
use crate::lifecycle::Shutdown;
use crate::protocol::codec::{read_frame, write_frames};
use crate::protocol::frame::{parse_startup, tag};
use crate::protocol::Frame;

/// Requests read ahead of the one being served.
const QUEUED_REQUESTS: usize = 32;

/// Serve a client until it terminates, disconnects, or shutdown reaches
/// it at a transaction boundary.
pub async fn serve_client<S>(
    stream: S,
    peer: Option<SocketAddr>,
    coordinator: Arc<Coordinator>,
    shutdown: Shutdown,
    max_frame_bytes: usize,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut writer = BufWriter::new(write_half);
    let gone = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(QUEUED_REQUESTS);
    let reader = tokio::spawn(read_requests(
        BufReader::new(read_half),
        tx,
        gone.clone(),
        max_frame_bytes,
    ));

    let Some(first) = rx.recv().await else {
        reader.abort();
        return;
    };
    let opened = parse_startup(&first).and_then(|params| coordinator.open_session(&params, peer));
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => {
            tracing::info!(peer = ?peer, error = %e, "Startup rejected");
            let _ = write_frames(&mut writer, &error_reply(&e)).await;
            reader.abort();
            return;
        }
    };
    if write_frames(&mut writer, &[Frame::ready()]).await.is_err() {
        coordinator.close_session(session).await;
        reader.abort();
        return;
    }

    let mut shutdown_rx = shutdown.subscribe();
    let mut closing = shutdown.is_triggered();

    loop {
        if closing && session.is_idle() {
            let notice = PoolerError::Draining(session.target().to_string());
            let _ = write_frames(&mut writer, &[Frame::from_error(&notice)]).await;
            break;
        }

        let frame = tokio::select! {
            biased;
            _ = shutdown_rx.recv(), if !closing => {
                closing = true;
                continue;
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let reply: PoolerResult<Vec<Frame>> = match frame.tag {
            tag::TERMINATE => break,
            tag::STARTUP => Err(PoolerError::Protocol("session already started".to_string())),
            tag::PAIRING => {
                let requested = String::from_utf8_lossy(&frame.payload).into_owned();
                requested
                    .parse()
                    .and_then(|policy| coordinator.set_policy(&mut session, policy))
                    .map(|()| vec![Frame::new(tag::COMMAND_COMPLETE, "SET"), Frame::ready()])
            }
            _ => coordinator.handle_request(&mut session, &frame, &gone).await,
        };

        let frames = reply.unwrap_or_else(|e| {
            tracing::debug!(session_id = %session.id(), error = %e, "Request failed");
            error_reply(&e)
        });
        if let Err(e) = write_frames(&mut writer, &frames).await {
            tracing::debug!(session_id = %session.id(), error = %e, "Client write failed");
            break;
        }
    }

    coordinator.close_session(session).await;
    reader.abort();
}

fn error_reply(err: &PoolerError) -> Vec<Frame> {
    vec![Frame::from_error(err), Frame::ready()]
}

async fn read_requests<R>(
    mut reader: R,
    tx: mpsc::Sender<Frame>,
    gone: CancellationToken,
    max_frame_bytes: usize,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Client read failed");
                break;
            }
        }
    }
    gone.cancel();
}
