//! Event source implementations

mod replay;
mod udp;

pub use replay::ReplaySource;
pub use udp::{ServerControl, UdpEventSource};
