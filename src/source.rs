//! Event source trait and packet translation

use chrono::Utc;

use crate::Result;
use crate::protocol::Packet;
use crate::types::{
    CollisionDetected, DriverIdentity, LapCompleted, SessionEnded, SessionInfoReceived,
    SessionType, SimEvent, TelemetryUpdated, sanitize_track_name,
};

/// Conversion factor from the server's m/s velocity to km/h.
pub const MS_TO_KMH: f32 = 3.6;

/// Trait for server packet sources
///
/// Sources abstract over where datagrams come from (live UDP socket,
/// recorded capture) and handle their own pacing and server requests. The
/// router owns the source and pulls from it until it ends.
#[async_trait::async_trait]
pub trait EventSource: Send + 'static {
    /// Wait for the next decoded packet
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - A datagram was decoded
    /// - `Ok(None)` - The source is exhausted (normal termination)
    /// - `Err(e)` - Receiving failed; the source is finished
    ///
    /// Datagrams that fail to decode are logged and skipped inside the
    /// source, they never surface here.
    async fn next_packet(&mut self) -> Result<Option<Packet>>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Translate one decoded packet into its domain event.
///
/// Handshake packets, unknown packet types and car info for empty slots
/// have no domain meaning and yield `None`.
pub fn translate(packet: Packet) -> Option<SimEvent> {
    let event = match packet {
        Packet::SessionInfo(info) => SimEvent::SessionInfoReceived(SessionInfoReceived {
            server_name: info.server_name,
            track_name: sanitize_track_name(&info.track).to_string(),
            track_config: Some(info.track_config).filter(|c| !c.is_empty()),
            session_type: SessionType::from(info.session_type),
            time_limit_min: info.time_min,
            lap_limit: info.laps,
            elapsed_ms: info.elapsed_ms,
            ambient_temp: info.ambient_temp,
            road_temp: info.road_temp,
        }),
        Packet::EndSession => SimEvent::SessionEnded(SessionEnded),
        Packet::NewConnection(conn) => SimEvent::DriverConnected(DriverIdentity {
            car_id: conn.car_id,
            car_model: conn.car_model,
            car_skin: conn.car_skin,
            driver_name: conn.driver_name,
            driver_guid: conn.driver_guid,
        }),
        Packet::ConnectionClosed(conn) => SimEvent::DriverDisconnected(DriverIdentity {
            car_id: conn.car_id,
            car_model: conn.car_model,
            car_skin: conn.car_skin,
            driver_name: conn.driver_name,
            driver_guid: conn.driver_guid,
        }),
        Packet::CarInfo(info) if info.is_connected => SimEvent::CarInfoReceived(DriverIdentity {
            car_id: info.car_id,
            car_model: info.car_model,
            car_skin: info.car_skin,
            driver_name: info.driver_name,
            driver_guid: info.driver_guid,
        }),
        Packet::CarInfo(_) => return None,
        Packet::CarUpdate(update) => SimEvent::TelemetryUpdated(TelemetryUpdated {
            car_id: update.car_id,
            spline_position: update.spline_position,
            world_x: update.position.x,
            world_z: update.position.z,
            speed_kmh: update.velocity.length() * MS_TO_KMH,
            gear: update.gear,
            engine_rpm: update.engine_rpm,
        }),
        Packet::LapCompleted(lap) => SimEvent::LapCompleted(LapCompleted {
            car_id: lap.car_id,
            lap_time_ms: lap.lap_time_ms,
            cuts: lap.cuts,
            leaderboard: lap.leaderboard,
        }),
        Packet::ClientEvent(event) => SimEvent::CollisionDetected(CollisionDetected {
            car_id: event.car_id,
            kind: event.kind,
            other_car_id: event.other_car_id,
            impact_speed_kmh: event.impact_speed,
            occurred_at: Utc::now(),
        }),
        Packet::Version { .. } | Packet::Unhandled { .. } => return None,
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CarInfoPacket, CarUpdatePacket, SessionInfoPacket, Vector3};
    use crate::types::EventKind;

    fn session_packet(track: &str, layout: &str) -> Packet {
        Packet::SessionInfo(SessionInfoPacket {
            new_session: true,
            protocol_version: 4,
            session_index: 0,
            current_session_index: 0,
            session_count: 3,
            server_name: "Club Night".to_string(),
            track: track.to_string(),
            track_config: layout.to_string(),
            name: "Race".to_string(),
            session_type: 3,
            time_min: 0,
            laps: 12,
            wait_time: 60,
            ambient_temp: 21,
            road_temp: 28,
            weather_graphics: "3_clear".to_string(),
            elapsed_ms: -5000,
        })
    }

    #[test]
    fn session_info_sanitizes_track_and_drops_empty_layout() {
        let Some(SimEvent::SessionInfoReceived(info)) = translate(session_packet("csp/7/00/:/ks_spa", "")) else {
            panic!("expected session info");
        };
        assert_eq!(info.track_name, "ks_spa");
        assert_eq!(info.track_config, None);
        assert_eq!(info.session_type, SessionType::Race);
        assert_eq!(info.lap_limit, 12);

        let Some(SimEvent::SessionInfoReceived(info)) = translate(session_packet("ks_nordschleife", "endurance")) else {
            panic!("expected session info");
        };
        assert_eq!(info.track_config.as_deref(), Some("endurance"));
    }

    #[test]
    fn car_update_speed_is_velocity_magnitude_in_kmh() {
        let packet = Packet::CarUpdate(CarUpdatePacket {
            car_id: 2,
            position: Vector3 { x: 10.0, y: 1.0, z: -4.0 },
            velocity: Vector3 { x: 30.0, y: 0.0, z: 40.0 },
            gear: 5,
            engine_rpm: 7200,
            spline_position: 0.42,
        });
        let Some(SimEvent::TelemetryUpdated(t)) = translate(packet) else {
            panic!("expected telemetry");
        };
        assert!((t.speed_kmh - 180.0).abs() < 1e-3);
        assert_eq!((t.world_x, t.world_z), (10.0, -4.0));
        assert_eq!(t.spline_position, 0.42);
    }

    #[test]
    fn empty_slots_and_handshakes_produce_nothing() {
        let empty_slot = Packet::CarInfo(CarInfoPacket {
            car_id: 7,
            is_connected: false,
            car_model: "ks_mazda_mx5_cup".to_string(),
            car_skin: String::new(),
            driver_name: String::new(),
            driver_team: String::new(),
            driver_guid: String::new(),
        });
        assert!(translate(empty_slot).is_none());
        assert!(translate(Packet::Version { protocol: 4 }).is_none());
        assert!(translate(Packet::Unhandled { packet_type: 57 }).is_none());
        assert_eq!(translate(Packet::EndSession).map(|e| e.kind()), Some(EventKind::SessionEnded));
    }
}
