//! UDP multicast listener.
//!
//! Joins the CoT multicast group and forwards each datagram, untouched, to
//! the serialized update path. Receives block with a short timeout so the
//! cooperative shutdown flag is observed promptly; socket errors never
//! crash the process — the listener logs, publishes a connectivity
//! transition, and rebinds after the fixed retry interval.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::EngineEvent;
use crate::error::TransportError;

const TRANSPORT: &str = "multicast";

/// Sleep for the retry interval, waking early on a shutdown edge.
/// Returns whether the transport should keep running.
pub(crate) async fn pause(running: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = running.changed() => {}
    }
    *running.borrow()
}

async fn bind(cfg: &EngineConfig) -> Result<UdpSocket, TransportError> {
    let addr = cfg.multicast_addr();
    let socket = UdpSocket::bind(&addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let group: Ipv4Addr =
        cfg.multicast_group
            .parse()
            .map_err(|_| TransportError::MulticastJoin {
                group: cfg.multicast_group.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not an IPv4 multicast group",
                ),
            })?;
    socket
        .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
        .map_err(|source| TransportError::MulticastJoin {
            group: cfg.multicast_group.clone(),
            source,
        })?;
    Ok(socket)
}

/// Run the multicast receive loop until shutdown.
pub async fn run_multicast(
    cfg: EngineConfig,
    frames: mpsc::Sender<Vec<u8>>,
    mut running: watch::Receiver<bool>,
    events: broadcast::Sender<EngineEvent>,
) {
    let retry = Duration::from_secs(cfg.reconnect_interval_secs);
    let recv_timeout = Duration::from_millis(cfg.recv_timeout_ms);

    while *running.borrow() {
        let socket = match bind(&cfg).await {
            Ok(s) => s,
            Err(e) => {
                warn!("multicast: {e}");
                let _ = events.send(EngineEvent::Connectivity {
                    transport: TRANSPORT,
                    connected: false,
                });
                if pause(&mut running, retry).await {
                    continue;
                }
                break;
            }
        };
        info!(
            "📡 multicast: listening on {} (group {})",
            cfg.multicast_addr(),
            cfg.multicast_group
        );
        let _ = events.send(EngineEvent::Connectivity {
            transport: TRANSPORT,
            connected: true,
        });

        let mut buf = vec![0u8; 65536];
        let mut rebind = false;
        while *running.borrow() && !rebind {
            match timeout(recv_timeout, socket.recv_from(&mut buf)).await {
                // timeout: loop around and re-check the shutdown flag
                Err(_) => {}
                Ok(Ok((len, src))) => {
                    debug!("multicast: {len} bytes from {src}");
                    if frames.send(buf[..len].to_vec()).await.is_err() {
                        // engine is gone; nothing left to feed
                        return;
                    }
                }
                Ok(Err(e)) => {
                    warn!("multicast: recv error: {e}");
                    let _ = events.send(EngineEvent::Connectivity {
                        transport: TRANSPORT,
                        connected: false,
                    });
                    rebind = true;
                }
            }
        }
        // socket drops here; closing is safe even with a receive in flight
        if rebind && !pause(&mut running, retry).await {
            break;
        }
    }
    info!("multicast: listener stopped");
}
