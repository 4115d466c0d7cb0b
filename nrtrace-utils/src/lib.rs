//! Utility library for reading TCP segments out of simulator packet captures

pub mod pcap_utils;
pub mod segment;

pub use segment::Segment;
