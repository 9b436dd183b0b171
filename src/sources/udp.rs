//! Live UDP source bound to the server's plugin port

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::protocol::{ControlPacket, Packet};
use crate::source::EventSource;
use crate::types::CarId;
use crate::{Result, TimingError};

/// Largest datagram the server sends is far below this.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Sends control packets to the server over the source's socket.
///
/// Every request is a silent no-op (logged at debug) until the server
/// endpoint is known, either from configuration or from the first datagram.
#[derive(Debug, Clone)]
pub struct ServerControl {
    socket: Arc<UdpSocket>,
    remote: Arc<RwLock<Option<SocketAddr>>>,
    max_car_slots: u8,
}

impl ServerControl {
    pub fn remote(&self) -> Option<SocketAddr> {
        *self.remote.read()
    }

    pub async fn set_telemetry_interval(&self, interval_ms: u16) -> Result<()> {
        self.send(ControlPacket::SetTelemetryInterval { interval_ms }).await
    }

    pub async fn request_car_info(&self, car_id: CarId) -> Result<()> {
        self.send(ControlPacket::RequestCarInfo { car_id }).await
    }

    pub async fn request_session_info(&self) -> Result<()> {
        self.send(ControlPacket::RequestSessionInfo).await
    }

    /// Ask for car info on every configured slot.
    pub async fn request_all_car_info(&self) -> Result<()> {
        if self.remote().is_none() {
            debug!("Server endpoint unknown, skipping car info sweep");
            return Ok(());
        }
        for car_id in 0..self.max_car_slots {
            self.request_car_info(car_id).await?;
        }
        info!(slots = self.max_car_slots, "Requested car info for all slots");
        Ok(())
    }

    async fn send(&self, packet: ControlPacket) -> Result<()> {
        let Some(remote) = self.remote() else {
            debug!(?packet, "Server endpoint unknown, control packet not sent");
            return Ok(());
        };
        self.socket
            .send_to(&packet.encode(), remote)
            .await
            .map_err(|e| TimingError::io(format!("sending {:?} to {}", packet, remote), e))?;
        trace!(?packet, %remote, "Control packet sent");
        Ok(())
    }
}

/// Event source reading the server's plugin datagrams.
#[derive(Debug)]
pub struct UdpEventSource {
    socket: Arc<UdpSocket>,
    control: ServerControl,
    telemetry_interval_ms: u16,
    buf: Vec<u8>,
    received: u64,
    malformed: u64,
}

impl UdpEventSource {
    /// Bind the listen port and resolve the configured server endpoint.
    ///
    /// A port that cannot be bound is fatal ([`TimingError::Bind`]).
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.listen_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TimingError::Bind { addr, source })?;
        let local = socket.local_addr().unwrap_or(addr);
        info!(%local, "UDP event source listening");

        let remote = config.server_endpoint()?;
        if let Some(remote) = remote {
            info!(%remote, "Server endpoint configured");
        }

        let socket = Arc::new(socket);
        let control = ServerControl {
            socket: Arc::clone(&socket),
            remote: Arc::new(RwLock::new(remote)),
            max_car_slots: config.max_car_slots,
        };
        Ok(Self {
            socket,
            control,
            telemetry_interval_ms: config.telemetry_interval_ms,
            buf: vec![0; RECV_BUFFER_SIZE],
            received: 0,
            malformed: 0,
        })
    }

    /// Handle for sending requests to the server.
    pub fn control(&self) -> ServerControl {
        self.control.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| TimingError::io("reading local address", e))
    }

    fn detect_remote(&self, from: SocketAddr) {
        let mut remote = self.control.remote.write();
        if remote.is_none() {
            info!(remote = %from, "Server endpoint auto-detected");
            *remote = Some(from);
        }
    }

    /// Subscribe to position updates and sweep the car slots.
    async fn on_session_info(&self) {
        if let Err(e) = self.control.set_telemetry_interval(self.telemetry_interval_ms).await {
            warn!(error = %e, "Failed to set telemetry interval");
        }
        if let Err(e) = self.control.request_all_car_info().await {
            warn!(error = %e, "Failed to request car info");
        }
    }
}

#[async_trait::async_trait]
impl EventSource for UdpEventSource {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut self.buf)
                .await
                .map_err(|e| TimingError::io("receiving datagram", e))?;
            self.received += 1;
            self.detect_remote(from);

            match Packet::decode(&self.buf[..len]) {
                Ok(packet) => {
                    trace!(packet_type = packet.packet_type(), len, "Datagram decoded");
                    if matches!(packet, Packet::SessionInfo(_)) {
                        self.on_session_info().await;
                    }
                    return Ok(Some(packet));
                }
                Err(e) => {
                    self.malformed += 1;
                    warn!(
                        error = %e,
                        len,
                        malformed = self.malformed,
                        received = self.received,
                        "Dropping malformed datagram"
                    );
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}
