//! Binary codec for the dedicated server's UDP plugin protocol.
//!
//! Every datagram starts with a packet type byte. Numbers are little-endian.
//! Strings come in two encodings: a byte-count prefixed UTF-8 form and a
//! character-count prefixed UTF-32LE form used for names and GUIDs.
//!
//! ```rust
//! use paddock::protocol::{ControlPacket, Packet};
//!
//! let request = ControlPacket::RequestCarInfo { car_id: 3 }.encode();
//! assert_eq!(request, vec![201, 3]);
//!
//! // Packet types this crate does not model decode without error
//! assert_eq!(Packet::decode(&[57]).unwrap(), Packet::Unhandled { packet_type: 57 });
//! ```

mod control;
mod packets;
mod reader;
mod writer;

pub use control::{CURRENT_SESSION, ControlPacket};
pub use packets::{
    CarInfoPacket, CarUpdatePacket, ClientEventPacket, ConnectionPacket, LapCompletedPacket,
    Packet, SessionInfoPacket, Vector3,
};
pub use reader::PacketReader;
pub use writer::PacketWriter;

/// Packet type discriminators.
pub mod packet_type {
    pub const NEW_SESSION: u8 = 50;
    pub const NEW_CONNECTION: u8 = 51;
    pub const CONNECTION_CLOSED: u8 = 52;
    pub const CAR_UPDATE: u8 = 53;
    pub const CAR_INFO: u8 = 54;
    pub const END_SESSION: u8 = 55;
    pub const VERSION: u8 = 56;
    pub const SESSION_INFO: u8 = 59;
    pub const LAP_COMPLETED: u8 = 73;
    pub const CLIENT_EVENT: u8 = 130;

    pub const REALTIME_POS_INTERVAL: u8 = 200;
    pub const GET_CAR_INFO: u8 = 201;
    pub const GET_SESSION_INFO: u8 = 204;
}

/// `ClientEvent` sub-types.
pub mod client_event {
    pub const COLLISION_WITH_CAR: u8 = 10;
    pub const COLLISION_WITH_ENV: u8 = 11;
}
