//! udp_tx.rs — UDP transmitter for synthetic Remote-ID frames
//!
//! Sends generated payloads to the engine via:
//!   - Unicast: 127.0.0.1:6969 (local backend, always enabled)
//!   - Multicast: 224.0.0.1:6969 (when --multicast, mirrors the fielded
//!     sensor network)
//!
//! Send errors are logged but never crash the simulator.

use std::net::UdpSocket;

use tracing::{debug, warn};

pub struct UdpTransmitter {
    socket: UdpSocket,
    unicast_addr: String,
    multicast_addr: Option<String>,
}

impl UdpTransmitter {
    pub fn new(unicast_addr: &str, multicast_addr: Option<&str>) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            unicast_addr: unicast_addr.to_string(),
            multicast_addr: multicast_addr.map(|s| s.to_string()),
        })
    }

    /// Send one frame to the configured targets.
    pub fn send_frame(&self, frame: &str) {
        let bytes = frame.as_bytes();

        if let Err(e) = self.socket.send_to(bytes, &self.unicast_addr) {
            warn!("UDP: unicast send failed: {e}");
        } else {
            debug!("UDP → {} ({} bytes)", self.unicast_addr, bytes.len());
        }

        if let Some(mc) = &self.multicast_addr {
            if let Err(e) = self.socket.send_to(bytes, mc) {
                warn!("UDP: multicast send failed: {e}");
            }
        }
    }
}
