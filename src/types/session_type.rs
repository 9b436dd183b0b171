//! Session type as reported by the server

use serde::{Deserialize, Serialize};

/// Kind of server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Booking,
    Practice,
    Qualifying,
    Race,
    Unknown(u8),
}

impl From<u8> for SessionType {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionType::Booking,
            1 => SessionType::Practice,
            2 => SessionType::Qualifying,
            3 => SessionType::Race,
            other => SessionType::Unknown(other),
        }
    }
}

impl From<SessionType> for u8 {
    fn from(value: SessionType) -> Self {
        match value {
            SessionType::Booking => 0,
            SessionType::Practice => 1,
            SessionType::Qualifying => 2,
            SessionType::Race => 3,
            SessionType::Unknown(other) => other,
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionType::Booking => f.write_str("Booking"),
            SessionType::Practice => f.write_str("Practice"),
            SessionType::Qualifying => f.write_str("Qualifying"),
            SessionType::Race => f.write_str("Race"),
            SessionType::Unknown(code) => write!(f, "Unknown({})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn wire_code_round_trips(code in any::<u8>()) {
            prop_assert_eq!(u8::from(SessionType::from(code)), code);
        }
    }

    #[test]
    fn known_codes_map_to_named_sessions() {
        assert_eq!(SessionType::from(1), SessionType::Practice);
        assert_eq!(SessionType::from(3), SessionType::Race);
        assert_eq!(SessionType::from(9), SessionType::Unknown(9));
    }
}
