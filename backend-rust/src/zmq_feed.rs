//! ZeroMQ pub/sub feeds.
//!
//! Two independent SUB sockets — telemetry and status — each on its own
//! task, subscribed to everything. Frames arrive as raw JSON and are
//! converted to the canonical CoT XML shape before re-entering the wire
//! decoder, so both ingestion paths converge on one schema.
//!
//! Reconnection uses a fixed interval with no backoff growth and no retry
//! ceiling while the running flag is set. Each loop owns its socket; no
//! other task touches it, so teardown is a plain drop.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use zeromq::{Socket, SocketRecv, SubSocket};

use crate::bridge;
use crate::engine::EngineEvent;
use crate::multicast::pause;

/// Which feed this subscriber drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Telemetry,
    Status,
}

impl FeedKind {
    fn transport(self) -> &'static str {
        match self {
            FeedKind::Telemetry => "zmq-telemetry",
            FeedKind::Status => "zmq-status",
        }
    }

    /// Bridge one raw JSON frame to CoT XML.
    fn to_xml(self, raw: &str) -> Option<String> {
        match self {
            FeedKind::Telemetry => bridge::telemetry_to_xml(raw),
            FeedKind::Status => bridge::status_to_xml(raw),
        }
    }
}

async fn connect(endpoint: &str) -> Result<SubSocket, zeromq::ZmqError> {
    let mut socket = SubSocket::new();
    socket.connect(endpoint).await?;
    socket.subscribe("").await?;
    Ok(socket)
}

/// Run one subscriber loop until shutdown.
pub async fn run_subscriber(
    kind: FeedKind,
    endpoint: String,
    recv_timeout: Duration,
    retry: Duration,
    frames: mpsc::Sender<Vec<u8>>,
    mut running: watch::Receiver<bool>,
    events: broadcast::Sender<EngineEvent>,
) {
    let transport = kind.transport();

    while *running.borrow() {
        let mut socket = match connect(&endpoint).await {
            Ok(s) => s,
            Err(e) => {
                warn!("{transport}: connect to {endpoint} failed: {e}");
                let _ = events.send(EngineEvent::Connectivity {
                    transport,
                    connected: false,
                });
                if pause(&mut running, retry).await {
                    continue;
                }
                break;
            }
        };
        info!("📨 {transport}: subscribed to {endpoint}");
        let _ = events.send(EngineEvent::Connectivity {
            transport,
            connected: true,
        });

        let mut reconnect = false;
        while *running.borrow() && !reconnect {
            match timeout(recv_timeout, socket.recv()).await {
                // timeout: re-check the shutdown flag
                Err(_) => {}
                Ok(Ok(message)) => {
                    let Some(payload) = message.get(0) else {
                        continue;
                    };
                    let raw = String::from_utf8_lossy(payload);
                    match kind.to_xml(&raw) {
                        Some(xml) => {
                            if frames.send(xml.into_bytes()).await.is_err() {
                                return;
                            }
                        }
                        None => debug!("{transport}: unusable frame ({} bytes)", payload.len()),
                    }
                }
                Ok(Err(e)) => {
                    warn!("{transport}: recv error: {e}");
                    let _ = events.send(EngineEvent::Connectivity {
                        transport,
                        connected: false,
                    });
                    reconnect = true;
                }
            }
        }
        drop(socket);
        if reconnect && !pause(&mut running, retry).await {
            break;
        }
    }
    info!("{transport}: subscriber stopped");
}
