//! `BusRelay`: the fan-out broker between producer peers and scheduler
//! peers.
//!
//! Line-delimited JSON frames over a WebSocket, no buffering, no
//! persistence, no acknowledgement -- delivery is best-effort fan-out
//! (SPEC_FULL.md §6). A `job_request` from any producer is re-broadcast as
//! its bare `payload` object to every *other* registered scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use dispatch_common::wire::{Envelope, JobPayload, RegisterKind};
use dispatch_common::DispatchError;

type PeerId = u64;
/// Bounded so one slow scheduler can't make the relay (or a producer's
/// send) block; a full channel just drops the newest frame for that one
/// peer (SPEC_FULL.md §9 Open Questions).
const PEER_CHANNEL_CAPACITY: usize = 32;

#[derive(Default)]
struct Peers {
    producers: HashMap<PeerId, mpsc::Sender<Message>>,
    schedulers: HashMap<PeerId, mpsc::Sender<Message>>,
}

/// The bus relay server. One instance serves any number of connections.
pub struct BusRelay {
    peers: Mutex<Peers>,
    next_id: AtomicU64,
}

impl Default for BusRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl BusRelay {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(Peers::default()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Binds `0.0.0.0:port` and serves connections until the process is
    /// killed or the listener errors.
    pub async fn serve(self: Arc<Self>, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        tracing::info!(port, "bus relay listening");
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let relay = Arc::clone(&self);
            tokio::spawn(async move {
                relay.handle_connection(stream).await;
                tracing::debug!(%peer_addr, "connection closed");
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "websocket handshake failed");
                return;
            }
        };
        let (mut sink, mut source) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Message>(PEER_CHANNEL_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut role: Option<RegisterKind> = None;

        let pump = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = source.next().await {
            let frame = match frame {
                Ok(f) => f,
                Err(err) => {
                    tracing::warn!(id, error = %err, "websocket read error");
                    break;
                }
            };
            let Ok(text) = frame.to_text() else {
                continue; // binary/ping/pong frames carry no job traffic
            };
            match serde_json::from_str::<Envelope>(text) {
                Ok(Envelope::Register { kind }) => {
                    self.register(id, kind, tx.clone());
                    role = Some(kind);
                }
                Ok(Envelope::JobRequest { payload }) => {
                    self.broadcast_job(id, payload);
                }
                Err(err) => {
                    let error = DispatchError::MalformedMessage(err.to_string());
                    tracing::warn!(id, %error, "dropping malformed frame");
                }
            }
        }

        self.unregister(id, role);
        pump.abort();
    }

    fn register(&self, id: PeerId, kind: RegisterKind, tx: mpsc::Sender<Message>) {
        let mut peers = self.peers.lock().unwrap();
        match kind {
            RegisterKind::Producer => {
                peers.producers.insert(id, tx);
                tracing::info!(id, count = peers.producers.len(), "producer registered");
            }
            RegisterKind::Scheduler => {
                peers.schedulers.insert(id, tx);
                tracing::info!(id, count = peers.schedulers.len(), "scheduler registered");
            }
        }
    }

    fn unregister(&self, id: PeerId, role: Option<RegisterKind>) {
        let mut peers = self.peers.lock().unwrap();
        match role {
            Some(RegisterKind::Producer) => {
                peers.producers.remove(&id);
                tracing::info!(id, count = peers.producers.len(), "producer disconnected");
            }
            Some(RegisterKind::Scheduler) => {
                peers.schedulers.remove(&id);
                tracing::info!(id, count = peers.schedulers.len(), "scheduler disconnected");
            }
            None => {}
        }
    }

    fn broadcast_job(&self, sender_id: PeerId, payload: JobPayload) {
        let frame = serde_json::to_string(&payload).expect("JobPayload serialization is infallible");
        let message = Message::Text(frame.into());
        let peers = self.peers.lock().unwrap();
        for (&id, tx) in peers.schedulers.iter() {
            if id == sender_id {
                continue;
            }
            if let Err(err) = tx.try_send(message.clone()) {
                tracing::debug!(id, error = %err, "dropping frame for slow or gone scheduler");
            }
        }
    }

    #[cfg(test)]
    fn producer_count(&self) -> usize {
        self.peers.lock().unwrap().producers.len()
    }

    #[cfg(test)]
    fn scheduler_count(&self) -> usize {
        self.peers.lock().unwrap().schedulers.len()
    }
}
