//! Common types and utilities for ndn-mesh.
//!
//! This crate holds everything that is shared between the management client
//! and the ad-hoc mesh controller: the NDN TLV codec, names and packets, the
//! management control/status records and the status dataset decoder.

pub mod control;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod ndn;
pub mod status;
pub mod tlv;

/// Reexport of common types
pub use control::{ControlParameters, ControlResponse, ForwardingFlags, LocalControlHeader};
pub use error::Error;
pub use ndn::{ChildSelector, Data, Interest, Name, NameComponent};
pub use status::{
    FacePersistency, FaceScope, FaceStatus, FibEntry, ForwarderStatus, LinkType, NextHopRecord,
    RibEntry, Route,
};

pub type Result<T> = std::result::Result<T, Error>;
