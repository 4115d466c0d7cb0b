//! The reduced view of a captured TCP packet.

use serde::{Deserialize, Serialize};

/// One observed TCP packet reduced to the fields needed for RTT reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Sequence number as captured (relative to the connection start for ns-3 captures).
    pub seq: u32,
    /// Acknowledgment number as captured.
    pub ack: u32,
    /// Capture time in seconds.
    pub timestamp: f64,
    /// Number of TCP payload bytes, 0 for pure control segments.
    pub payload_len: usize,
}

impl Segment {
    pub fn new(seq: u32, ack: u32, timestamp: f64, payload_len: usize) -> Self {
        Self {
            seq,
            ack,
            timestamp,
            payload_len,
        }
    }
}
