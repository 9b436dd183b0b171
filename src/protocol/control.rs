//! Outbound control packets sent to the server

use serde::{Deserialize, Serialize};

use super::packet_type;
use super::reader::PacketReader;
use super::writer::PacketWriter;
use crate::types::CarId;
use crate::{Result, TimingError};

/// Session index meaning "the current session" in a session info request.
pub const CURRENT_SESSION: u16 = 0xFFFF;

/// Requests the plugin can send back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPacket {
    /// Ask for a `CarUpdate` per car every `interval_ms`
    SetTelemetryInterval { interval_ms: u16 },
    RequestCarInfo { car_id: CarId },
    /// Always asks for the current session
    RequestSessionInfo,
}

impl ControlPacket {
    pub fn packet_type(&self) -> u8 {
        match self {
            ControlPacket::SetTelemetryInterval { .. } => packet_type::REALTIME_POS_INTERVAL,
            ControlPacket::RequestCarInfo { .. } => packet_type::GET_CAR_INFO,
            ControlPacket::RequestSessionInfo => packet_type::GET_SESSION_INFO,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new(self.packet_type());
        match self {
            ControlPacket::SetTelemetryInterval { interval_ms } => w.u16(*interval_ms),
            ControlPacket::RequestCarInfo { car_id } => w.u8(*car_id),
            ControlPacket::RequestSessionInfo => w.u16(CURRENT_SESSION),
        };
        w.finish()
    }

    /// Decode a control packet, mainly for recording and tests.
    pub fn decode(data: &[u8]) -> Result<Self> {
        match data.first().copied() {
            Some(packet_type::REALTIME_POS_INTERVAL) => {
                let mut r = PacketReader::after_type(data, "SetTelemetryInterval")?;
                Ok(ControlPacket::SetTelemetryInterval { interval_ms: r.read_u16()? })
            }
            Some(packet_type::GET_CAR_INFO) => {
                let mut r = PacketReader::after_type(data, "RequestCarInfo")?;
                Ok(ControlPacket::RequestCarInfo { car_id: r.read_u8()? })
            }
            Some(packet_type::GET_SESSION_INFO) => {
                let mut r = PacketReader::after_type(data, "RequestSessionInfo")?;
                r.read_u16()?;
                Ok(ControlPacket::RequestSessionInfo)
            }
            Some(other) => Err(TimingError::decode(
                "control",
                format!("packet type {} is not a control packet", other),
            )),
            None => Err(TimingError::decode("control", "datagram has no packet type byte")),
        }
    }
}
