//! Connection handling: framing, the per-session worker and the timeout policy.
//!
//! Each connection gets its own [`Dispatcher`] running on a blocking worker
//! thread. The connection task frames requests, hands them to the worker one
//! at a time and waits for the reply with a deadline. A request that misses
//! its deadline is answered with a failure; the session then reports itself
//! busy until the stuck handler returns.

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::engine::SimulationEngine;
use crate::session::SequenceCounter;
use qdap_core::{
    frame_encode, DapError, DapResult, FrameDecoder, ProtocolMessage, RequestHeader, Response,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// One request handed to the session worker.
struct Job {
    payload: Vec<u8>,
    reply: oneshot::Sender<Vec<ProtocolMessage>>,
}

/// Per-connection context threaded through the request loop.
struct Connection {
    session_id: String,
    seq: SequenceCounter,
    requests: mpsc::Sender<Job>,
    /// Reply slot of a request that missed its deadline.
    stalled: Option<oneshot::Receiver<Vec<ProtocolMessage>>>,
}

/// The debug adapter server.
pub struct DapServer<E> {
    config: ServerConfig,
    engine: E,
    active: AtomicUsize,
    /// Broadcast sender for server shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

impl<E> DapServer<E>
where
    E: SimulationEngine + Clone + Sync,
{
    pub fn new(config: ServerConfig, engine: E) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            engine,
            active: AtomicUsize::new(0),
            shutdown_tx,
        }
    }

    /// Bind the configured address and accept connections until shutdown.
    pub async fn run_tcp(self: Arc<Self>) -> DapResult<()> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DapError::Transport(format!("cannot bind {addr}: {e}")))?;
        info!(
            addr = %addr,
            max_connections = self.config.max_connections,
            timeout_ms = self.config.handler_timeout.as_millis() as u64,
            "qdap-server ready"
        );
        self.serve_listener(listener).await;
        Ok(())
    }

    /// Accept loop over a bound listener.
    ///
    /// A failed accept is logged and the loop keeps going; only a shutdown
    /// broadcast ends it.
    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let accepted = tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("shutdown signal received, no longer accepting");
                    return;
                }
                accepted = listener.accept() => accepted,
            };
            let (stream, remote) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                    // Out of descriptors is usually transient; don't spin on it.
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                warn!(remote = %remote, "connection limit reached, refusing connection");
                drop(stream);
                continue;
            }

            self.active.fetch_add(1, Ordering::SeqCst);
            debug!(remote = %remote, active = self.active_connections(), "accepted connection");
            let server = self.clone();
            tokio::spawn(async move {
                let (reader, writer) = stream.into_split();
                if let Err(e) = server.serve_connection(reader, writer, &remote.to_string()).await {
                    warn!(remote = %remote, error = %e, "connection error");
                }
                server.active.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Serve a single session on stdin/stdout.
    pub async fn run_stdio(&self) -> DapResult<()> {
        info!("serving one session on stdio");
        self.serve_connection(tokio::io::stdin(), tokio::io::stdout(), "stdio")
            .await
    }

    /// Ask every open connection to close.
    pub fn shutdown(&self) {
        info!("broadcasting shutdown to connected clients");
        let _ = self.shutdown_tx.send(());
    }

    /// Number of connections currently being served.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run one session over a byte stream until the peer goes away.
    pub async fn serve_connection<R, W>(&self, mut reader: R, mut writer: W, remote: &str) -> DapResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let seq = SequenceCounter::new();
        let mut dispatcher = Dispatcher::new(self.engine.clone(), seq.clone());
        let session_id = dispatcher.session().id().to_string();
        info!(remote = %remote, session_id = %session_id, "client connected");

        let (requests, mut queue) = mpsc::channel::<Job>(1);
        let worker = tokio::task::spawn_blocking(move || {
            while let Some(job) = queue.blocking_recv() {
                let messages = dispatcher.dispatch_raw(&job.payload);
                let _ = job.reply.send(messages);
            }
            dispatcher.teardown();
        });

        let mut conn = Connection {
            session_id,
            seq,
            requests,
            stalled: None,
        };
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 16 * 1024];
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(session_id = %conn.session_id, "shutdown signal received, closing session");
                    break Ok(());
                }

                read = reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => {
                            debug!(session_id = %conn.session_id, "client closed the connection");
                            break Ok(());
                        }
                        Ok(n) => n,
                        Err(e) => {
                            debug!(session_id = %conn.session_id, error = %e, "read failed");
                            break Ok(());
                        }
                    };
                    let frames = match decoder.feed_raw(&buf[..n]) {
                        Ok(frames) => frames,
                        Err(e) => {
                            warn!(session_id = %conn.session_id, error = %e, "bad framing, closing connection");
                            break Ok(());
                        }
                    };
                    let mut outcome = Ok(());
                    for payload in frames {
                        outcome = self.exchange(&mut conn, payload, &mut writer).await;
                        if outcome.is_err() {
                            break;
                        }
                    }
                    if outcome.is_err() {
                        break outcome;
                    }
                }
            }
        };

        // Closing the queue lets the worker release the engine handle.
        let stalled = conn.stalled.is_some();
        drop(conn);
        if stalled {
            warn!(remote = %remote, "handler still running at disconnect, leaving worker to finish");
        } else if let Err(e) = worker.await {
            warn!(remote = %remote, error = %e, "session worker failed");
        }
        info!(remote = %remote, "client disconnected");
        result
    }

    /// Send one request to the worker and write whatever comes back.
    async fn exchange<W>(&self, conn: &mut Connection, payload: Vec<u8>, writer: &mut W) -> DapResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        if let Some(pending) = conn.stalled.as_mut() {
            match pending.try_recv() {
                Ok(_) | Err(TryRecvError::Closed) => {
                    info!(session_id = %conn.session_id, "stalled request finished, discarding its late reply");
                    conn.stalled = None;
                }
                Err(TryRecvError::Empty) => {
                    let header = peek_header(&payload);
                    let busy = Response::failure(
                        header.seq,
                        &header.command,
                        "session busy: a previous request is still running",
                    )
                    .with_seq(conn.seq.next());
                    return write_message(writer, &busy.into()).await;
                }
            }
        }

        let header = peek_header(&payload);
        let (reply_tx, mut reply_rx) = oneshot::channel();
        conn.requests
            .send(Job {
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DapError::Transport("session worker has stopped".into()))?;

        let timeout = self.config.handler_timeout;
        match tokio::time::timeout(timeout, &mut reply_rx).await {
            Ok(Ok(messages)) => {
                for message in &messages {
                    write_message(writer, message).await?;
                }
                Ok(())
            }
            Ok(Err(_)) => Err(DapError::Transport("session worker dropped the request".into())),
            Err(_) => {
                let error = DapError::Timeout(timeout.as_millis() as u64);
                warn!(
                    session_id = %conn.session_id,
                    seq = header.seq,
                    command = %header.command,
                    error = %error,
                    "handler timed out"
                );
                conn.stalled = Some(reply_rx);
                let failure = Response::failure(header.seq, &header.command, error.to_string())
                    .with_seq(conn.seq.next());
                write_message(writer, &failure.into()).await
            }
        }
    }
}

fn peek_header(payload: &[u8]) -> RequestHeader {
    serde_json::from_slice::<Value>(payload)
        .map(|value| RequestHeader::peek(&value))
        .unwrap_or_default()
}

async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &ProtocolMessage) -> DapResult<()> {
    let frame = frame_encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
