//! Peer table entries.

use serde::Serialize;

use crate::discovery::DiscoveredDevice;

/// A neighbour the controller manages a face for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peer {
    /// Device as last reported by discovery, if it was matched by address
    pub device: Option<DiscoveredDevice>,

    /// IP address of the peer on the group network
    pub ip_address: String,

    /// Forwarder face towards the peer; `None` while it is being recreated
    pub face_id: Option<u64>,

    /// Consecutive probes that went unanswered
    pub probe_timeouts: u32,
}

impl Peer {
    pub fn new(ip_address: impl Into<String>, face_id: u64) -> Self {
        Self {
            device: None,
            ip_address: ip_address.into(),
            face_id: Some(face_id),
            probe_timeouts: 0,
        }
    }

    /// Count one more unanswered probe; true once `max` is reached
    pub fn record_timeout(&mut self, max: u32) -> bool {
        if self.probe_timeouts + 1 >= max {
            return true;
        }
        self.probe_timeouts += 1;
        false
    }

    pub fn record_answer(&mut self) {
        self.probe_timeouts = 0;
    }
}
