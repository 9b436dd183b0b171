//! Inbound packet records and their wire layouts

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::reader::PacketReader;
use super::writer::PacketWriter;
use super::{client_event, packet_type};
use crate::types::{CarId, CollisionKind, LeaderboardRow};
use crate::{Result, TimingError};

/// Session announcement (`NewSession` or `SessionInfo`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfoPacket {
    /// `true` for NewSession (50), `false` for SessionInfo (59)
    pub new_session: bool,
    pub protocol_version: u8,
    pub session_index: u8,
    pub current_session_index: u8,
    pub session_count: u8,
    pub server_name: String,
    pub track: String,
    pub track_config: String,
    pub name: String,
    pub session_type: u8,
    pub time_min: u16,
    pub laps: u16,
    pub wait_time: u16,
    pub ambient_temp: u8,
    pub road_temp: u8,
    pub weather_graphics: String,
    pub elapsed_ms: i32,
}

/// Driver joining or leaving (`NewConnection`, `ConnectionClosed`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPacket {
    pub driver_name: String,
    pub driver_guid: String,
    pub car_id: CarId,
    pub car_model: String,
    pub car_skin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Realtime position update for one car.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarUpdatePacket {
    pub car_id: CarId,
    pub position: Vector3,
    /// Metres per second
    pub velocity: Vector3,
    pub gear: u8,
    pub engine_rpm: u16,
    pub spline_position: f32,
}

/// Answer to a car info request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarInfoPacket {
    pub car_id: CarId,
    pub is_connected: bool,
    pub car_model: String,
    pub car_skin: String,
    pub driver_name: String,
    pub driver_team: String,
    pub driver_guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LapCompletedPacket {
    pub car_id: CarId,
    pub lap_time_ms: u32,
    pub cuts: u8,
    pub leaderboard: Vec<LeaderboardRow>,
    pub grip_level: u8,
}

/// Collision report (`ClientEvent` with a collision sub-type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEventPacket {
    pub kind: CollisionKind,
    pub car_id: CarId,
    /// Present only for car-to-car collisions
    pub other_car_id: Option<CarId>,
    pub impact_speed: f32,
}

/// A decoded server datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    SessionInfo(SessionInfoPacket),
    NewConnection(ConnectionPacket),
    ConnectionClosed(ConnectionPacket),
    CarUpdate(CarUpdatePacket),
    CarInfo(CarInfoPacket),
    EndSession,
    Version { protocol: u8 },
    LapCompleted(LapCompletedPacket),
    ClientEvent(ClientEventPacket),
    /// A packet type this crate does not model yet
    Unhandled { packet_type: u8 },
}

impl Packet {
    /// Decode one datagram.
    ///
    /// Truncated buffers fail with [`TimingError::Decode`]; unknown packet
    /// types decode to [`Packet::Unhandled`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        let Some(&kind) = data.first() else {
            return Err(TimingError::decode("empty", "datagram has no packet type byte"));
        };
        trace!(packet_type = kind, len = data.len(), "Decoding packet");

        match kind {
            packet_type::NEW_SESSION | packet_type::SESSION_INFO => {
                decode_session_info(data, kind == packet_type::NEW_SESSION).map(Packet::SessionInfo)
            }
            packet_type::NEW_CONNECTION => {
                decode_connection(data, "NewConnection").map(Packet::NewConnection)
            }
            packet_type::CONNECTION_CLOSED => {
                decode_connection(data, "ConnectionClosed").map(Packet::ConnectionClosed)
            }
            packet_type::CAR_UPDATE => decode_car_update(data).map(Packet::CarUpdate),
            packet_type::CAR_INFO => decode_car_info(data).map(Packet::CarInfo),
            packet_type::END_SESSION => Ok(Packet::EndSession),
            packet_type::VERSION => {
                let mut r = PacketReader::after_type(data, "Version")?;
                Ok(Packet::Version { protocol: r.read_u8()? })
            }
            packet_type::LAP_COMPLETED => decode_lap_completed(data).map(Packet::LapCompleted),
            packet_type::CLIENT_EVENT => decode_client_event(data),
            other => Ok(Packet::Unhandled { packet_type: other }),
        }
    }

    /// Wire type byte of this packet.
    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::SessionInfo(p) if p.new_session => packet_type::NEW_SESSION,
            Packet::SessionInfo(_) => packet_type::SESSION_INFO,
            Packet::NewConnection(_) => packet_type::NEW_CONNECTION,
            Packet::ConnectionClosed(_) => packet_type::CONNECTION_CLOSED,
            Packet::CarUpdate(_) => packet_type::CAR_UPDATE,
            Packet::CarInfo(_) => packet_type::CAR_INFO,
            Packet::EndSession => packet_type::END_SESSION,
            Packet::Version { .. } => packet_type::VERSION,
            Packet::LapCompleted(_) => packet_type::LAP_COMPLETED,
            Packet::ClientEvent(_) => packet_type::CLIENT_EVENT,
            Packet::Unhandled { packet_type } => *packet_type,
        }
    }

    /// Encode into the server's wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = PacketWriter::new(self.packet_type());
        match self {
            Packet::SessionInfo(p) => {
                w.u8(p.protocol_version)
                    .u8(p.session_index)
                    .u8(p.current_session_index)
                    .u8(p.session_count)
                    .wide_string(&p.server_name)
                    .string(&p.track)
                    .string(&p.track_config)
                    .string(&p.name)
                    .u8(p.session_type)
                    .u16(p.time_min)
                    .u16(p.laps)
                    .u16(p.wait_time)
                    .u8(p.ambient_temp)
                    .u8(p.road_temp)
                    .string(&p.weather_graphics)
                    .i32(p.elapsed_ms);
            }
            Packet::NewConnection(p) | Packet::ConnectionClosed(p) => {
                w.wide_string(&p.driver_name)
                    .wide_string(&p.driver_guid)
                    .u8(p.car_id)
                    .string(&p.car_model)
                    .string(&p.car_skin);
            }
            Packet::CarUpdate(p) => {
                w.u8(p.car_id);
                for v in [p.position, p.velocity] {
                    w.f32(v.x).f32(v.y).f32(v.z);
                }
                w.u8(p.gear).u16(p.engine_rpm).f32(p.spline_position);
            }
            Packet::CarInfo(p) => {
                w.u8(p.car_id)
                    .bool(p.is_connected)
                    .wide_string(&p.car_model)
                    .wide_string(&p.car_skin)
                    .wide_string(&p.driver_name)
                    .wide_string(&p.driver_team)
                    .wide_string(&p.driver_guid);
            }
            Packet::EndSession | Packet::Unhandled { .. } => {}
            Packet::Version { protocol } => {
                w.u8(*protocol);
            }
            Packet::LapCompleted(p) => {
                // The count is one byte; rows past it are not sent
                let rows = p.leaderboard.len().min(u8::MAX as usize);
                w.u8(p.car_id).u32(p.lap_time_ms).u8(p.cuts).u8(rows as u8);
                for row in &p.leaderboard[..rows] {
                    w.u8(row.car_id).u32(row.best_lap_time_ms).u16(row.total_laps);
                }
                w.u8(p.grip_level);
            }
            Packet::ClientEvent(p) => {
                let sub_type = match p.kind {
                    CollisionKind::Car => client_event::COLLISION_WITH_CAR,
                    CollisionKind::Environment => client_event::COLLISION_WITH_ENV,
                };
                w.u8(sub_type).u8(p.car_id);
                if p.kind == CollisionKind::Car {
                    w.u8(p.other_car_id.unwrap_or_default());
                }
                w.f32(p.impact_speed);
            }
        }
        w.finish()
    }
}

fn decode_session_info(data: &[u8], new_session: bool) -> Result<SessionInfoPacket> {
    let mut r = PacketReader::after_type(data, "SessionInfo")?;
    Ok(SessionInfoPacket {
        new_session,
        protocol_version: r.read_u8()?,
        session_index: r.read_u8()?,
        current_session_index: r.read_u8()?,
        session_count: r.read_u8()?,
        server_name: r.read_wide_string()?,
        track: r.read_string()?,
        track_config: r.read_string()?,
        name: r.read_string()?,
        session_type: r.read_u8()?,
        time_min: r.read_u16()?,
        laps: r.read_u16()?,
        wait_time: r.read_u16()?,
        ambient_temp: r.read_u8()?,
        road_temp: r.read_u8()?,
        weather_graphics: r.read_string()?,
        elapsed_ms: r.read_i32()?,
    })
}

fn decode_connection(data: &[u8], packet: &'static str) -> Result<ConnectionPacket> {
    let mut r = PacketReader::after_type(data, packet)?;
    Ok(ConnectionPacket {
        driver_name: r.read_wide_string()?,
        driver_guid: r.read_wide_string()?,
        car_id: r.read_u8()?,
        car_model: r.read_string()?,
        car_skin: r.read_string()?,
    })
}

fn read_vector3(r: &mut PacketReader<'_>) -> Result<Vector3> {
    Ok(Vector3 { x: r.read_f32()?, y: r.read_f32()?, z: r.read_f32()? })
}

fn decode_car_update(data: &[u8]) -> Result<CarUpdatePacket> {
    let mut r = PacketReader::after_type(data, "CarUpdate")?;
    Ok(CarUpdatePacket {
        car_id: r.read_u8()?,
        position: read_vector3(&mut r)?,
        velocity: read_vector3(&mut r)?,
        gear: r.read_u8()?,
        engine_rpm: r.read_u16()?,
        spline_position: r.read_f32()?,
    })
}

fn decode_car_info(data: &[u8]) -> Result<CarInfoPacket> {
    let mut r = PacketReader::after_type(data, "CarInfo")?;
    Ok(CarInfoPacket {
        car_id: r.read_u8()?,
        is_connected: r.read_bool()?,
        car_model: r.read_wide_string()?,
        car_skin: r.read_wide_string()?,
        driver_name: r.read_wide_string()?,
        driver_team: r.read_wide_string()?,
        driver_guid: r.read_wide_string()?,
    })
}

fn decode_lap_completed(data: &[u8]) -> Result<LapCompletedPacket> {
    let mut r = PacketReader::after_type(data, "LapCompleted")?;
    let car_id = r.read_u8()?;
    let lap_time_ms = r.read_u32()?;
    let cuts = r.read_u8()?;
    let cars = r.read_u8()? as usize;

    // 7 bytes per row plus the trailing grip byte
    if r.remaining() < cars * 7 + 1 {
        return Err(TimingError::decode(
            "LapCompleted",
            format!("leaderboard of {} cars needs {} bytes, have {}", cars, cars * 7 + 1, r.remaining()),
        ));
    }

    let mut leaderboard = Vec::with_capacity(cars);
    for _ in 0..cars {
        leaderboard.push(LeaderboardRow {
            car_id: r.read_u8()?,
            best_lap_time_ms: r.read_u32()?,
            total_laps: r.read_u16()?,
        });
    }

    Ok(LapCompletedPacket { car_id, lap_time_ms, cuts, leaderboard, grip_level: r.read_u8()? })
}

fn decode_client_event(data: &[u8]) -> Result<Packet> {
    let mut r = PacketReader::after_type(data, "ClientEvent")?;
    let sub_type = r.read_u8()?;
    let kind = match sub_type {
        client_event::COLLISION_WITH_CAR => CollisionKind::Car,
        client_event::COLLISION_WITH_ENV => CollisionKind::Environment,
        _ => return Ok(Packet::Unhandled { packet_type: packet_type::CLIENT_EVENT }),
    };
    let car_id = r.read_u8()?;
    let other_car_id = match kind {
        CollisionKind::Car => Some(r.read_u8()?),
        CollisionKind::Environment => None,
    };
    // World and relative impact positions may follow; they are not used
    let impact_speed = r.read_f32()?;
    Ok(Packet::ClientEvent(ClientEventPacket { kind, car_id, other_car_id, impact_speed }))
}
