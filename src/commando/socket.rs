//! Commando session over BOLT 8
//!
//! One encrypted session per connector. Requests are multiplexed by id: the
//! caller registers a reply slot, writes the request, and awaits the slot. A
//! reader task owns the receive side, reassembles reply chunks, answers
//! pings, and fails every outstanding request when the session ends.

use super::noise::{handshake_initiator, read_message, write_message, CipherState, NoiseKey};
use super::wire::{encode_request, parse_reply, pong_for, WireMessage};
use super::CommandoRpc;
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type ReplySender = oneshot::Sender<Result<Vec<u8>, TransportError>>;

struct Writer {
    io: BoxedWriter,
    cipher: CipherState,
}

impl Writer {
    async fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        write_message(&mut self.io, &mut self.cipher, message).await
    }
}

struct PendingReply {
    buffer: Vec<u8>,
    tx: ReplySender,
}

#[derive(Default)]
struct PendingState {
    replies: HashMap<u64, PendingReply>,
    closed: bool,
}

impl PendingState {
    fn fail_all(&mut self, error: impl Fn() -> TransportError) {
        self.closed = true;
        for (_, reply) in self.replies.drain() {
            let _ = reply.tx.send(Err(error()));
        }
    }
}

struct Connection {
    writer: Arc<Mutex<Writer>>,
    pending: Arc<Mutex<PendingState>>,
    reader: JoinHandle<()>,
}

/// BOLT 8 session to a Core Lightning node
pub struct CommandoSession {
    host: String,
    port: u16,
    remote_pubkey: [u8; 33],
    timeout: Option<Duration>,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl CommandoSession {
    pub fn new(host: impl Into<String>, port: u16, remote_pubkey: [u8; 33], timeout: Option<Duration>) -> Self {
        Self {
            host: host.into(),
            port,
            remote_pubkey,
            timeout,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run the handshake and `init` exchange over an established stream
    pub async fn attach<S>(&self, mut stream: S) -> Result<(), TransportError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut send, mut recv) =
            handshake_initiator(&mut stream, NoiseKey::generate(), &self.remote_pubkey).await?;

        write_message(&mut stream, &mut send, &WireMessage::Init { features: vec![] }.encode()).await?;
        let first = read_message(&mut stream, &mut recv).await?;
        match WireMessage::decode(&first)? {
            WireMessage::Init { .. } => {}
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected init, got {:?}",
                    other
                )))
            }
        }

        let (read_half, write_half) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(Writer {
            io: Box::new(write_half),
            cipher: send,
        }));
        let pending = Arc::new(Mutex::new(PendingState::default()));
        let reader = tokio::spawn(read_loop(
            Box::new(read_half),
            recv,
            writer.clone(),
            pending.clone(),
        ));

        let previous = self.connection.lock().await.replace(Connection {
            writer,
            pending,
            reader,
        });
        if let Some(previous) = previous {
            previous.reader.abort();
            previous.pending.lock().await.fail_all(|| TransportError::Closed);
        }
        Ok(())
    }

    async fn close(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };
        connection.reader.abort();
        connection.pending.lock().await.fail_all(|| TransportError::Closed);
        connection.writer.lock().await.io.shutdown().await.ok();
        tracing::info!(host = %self.host, port = self.port, "commando session closed");
    }
}

impl Drop for CommandoSession {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.reader.abort();
        }
    }
}

#[async_trait]
impl CommandoRpc for CommandoSession {
    async fn connect(&self) -> Result<(), TransportError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        self.attach(stream).await?;
        tracing::info!(host = %self.host, port = self.port, "commando session established");
        Ok(())
    }

    async fn call(&self, method: &str, params: Value, rune: &str) -> Result<Value, TransportError> {
        let (writer, pending) = {
            let guard = self.connection.lock().await;
            let connection = guard.as_ref().ok_or(TransportError::NotConnected)?;
            (connection.writer.clone(), connection.pending.clone())
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = encode_request(id, method, &params, rune)?;

        let (tx, rx) = oneshot::channel();
        {
            let mut state = pending.lock().await;
            if state.closed {
                return Err(TransportError::Closed);
            }
            state.replies.insert(
                id,
                PendingReply {
                    buffer: Vec::new(),
                    tx,
                },
            );
        }

        tracing::debug!(id, method, "commando request");
        if let Err(e) = writer.lock().await.send(&request).await {
            pending.lock().await.replies.remove(&id);
            return Err(e);
        }

        let reply = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    pending.lock().await.replies.remove(&id);
                    return Err(TransportError::Timeout);
                }
            },
            None => rx.await,
        };
        let bytes = reply.map_err(|_| TransportError::Closed)??;
        tracing::debug!(id, method, bytes = bytes.len(), "commando reply");
        parse_reply(&bytes)
    }

    async fn disconnect(&self) {
        self.close().await;
    }
}

async fn read_loop(
    mut reader: BoxedReader,
    mut cipher: CipherState,
    writer: Arc<Mutex<Writer>>,
    pending: Arc<Mutex<PendingState>>,
) {
    loop {
        let bytes = match read_message(&mut reader, &mut cipher).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, "commando reader stopped");
                pending.lock().await.fail_all(|| TransportError::Closed);
                return;
            }
        };

        match WireMessage::decode(&bytes) {
            Ok(WireMessage::CommandoReply { id, chunk, terminal }) => {
                let mut state = pending.lock().await;
                if terminal {
                    match state.replies.remove(&id) {
                        Some(mut reply) => {
                            reply.buffer.extend_from_slice(&chunk);
                            let _ = reply.tx.send(Ok(reply.buffer));
                        }
                        None => tracing::debug!(id, "reply for unknown request"),
                    }
                } else if let Some(reply) = state.replies.get_mut(&id) {
                    reply.buffer.extend_from_slice(&chunk);
                }
            }
            Ok(WireMessage::Ping { num_pong_bytes }) => {
                if let Some(pong) = pong_for(num_pong_bytes) {
                    if let Err(e) = writer.lock().await.send(&pong).await {
                        tracing::warn!(error = %e, "failed to answer ping");
                    }
                }
            }
            Ok(WireMessage::Error { data, .. }) => {
                let message = String::from_utf8_lossy(&data).to_string();
                tracing::warn!(%message, "node sent error, closing session");
                pending.lock().await.fail_all(|| TransportError::Remote {
                    code: "error".to_string(),
                    message: message.clone(),
                });
                return;
            }
            Ok(WireMessage::Warning { data, .. }) => {
                tracing::warn!(message = %String::from_utf8_lossy(&data), "node sent warning");
            }
            Ok(WireMessage::Unknown { msg_type }) if msg_type % 2 == 0 => {
                tracing::warn!(msg_type, "unknown even message, closing session");
                pending.lock().await.fail_all(|| {
                    TransportError::Protocol(format!("unknown even message type {}", msg_type))
                });
                return;
            }
            Ok(other) => tracing::debug!(?other, "ignored message"),
            Err(e) => tracing::warn!(error = %e, "undecodable message"),
        }
    }
}
