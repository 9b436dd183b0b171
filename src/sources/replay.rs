//! Replay source for recorded datagrams

use std::collections::VecDeque;

use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::Result;
use crate::protocol::Packet;
use crate::source::EventSource;

/// Replays captured datagrams through the same decode path as the live source.
#[derive(Debug)]
pub struct ReplaySource {
    datagrams: VecDeque<Vec<u8>>,

    /// Optional pacing between datagrams
    interval: Option<Interval>,

    total: usize,
    malformed: u64,
}

impl ReplaySource {
    /// Replay raw datagrams as fast as the pipeline takes them.
    pub fn new(datagrams: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let datagrams: VecDeque<_> = datagrams.into_iter().collect();
        let total = datagrams.len();
        info!(datagrams = total, "Opened replay");
        Self { datagrams, interval: None, total, malformed: 0 }
    }

    /// Replay already decoded packets.
    pub fn from_packets(packets: impl IntoIterator<Item = Packet>) -> Self {
        Self::new(packets.into_iter().map(|p| p.encode()))
    }

    /// Emit one datagram per `period` instead of all at once.
    pub fn with_pacing(mut self, period: Duration) -> Self {
        let mut pacing = interval(period);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(pacing);
        debug!(?period, "Replay pacing enabled");
        self
    }

    /// Datagrams not yet replayed.
    pub fn remaining(&self) -> usize {
        self.datagrams.len()
    }
}

#[async_trait::async_trait]
impl EventSource for ReplaySource {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        while let Some(datagram) = self.datagrams.pop_front() {
            if let Some(pacing) = self.interval.as_mut() {
                pacing.tick().await;
            }
            match Packet::decode(&datagram) {
                Ok(packet) => {
                    trace!(
                        position = self.total - self.datagrams.len(),
                        total = self.total,
                        packet_type = packet.packet_type(),
                        "Replayed datagram"
                    );
                    return Ok(Some(packet));
                }
                Err(e) => {
                    self.malformed += 1;
                    warn!(error = %e, malformed = self.malformed, "Dropping malformed datagram");
                }
            }
        }
        debug!(total = self.total, malformed = self.malformed, "Reached end of replay");
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
