//! Self-configuring NDN mesh over WiFi-Direct groups.
//!
//! [`MeshController`] keeps a forwarder's faces and routes in line with
//! the peers a [`PeerDiscovery`] implementation reports. Neighbours probe
//! each other under [`PROBE_PREFIX`] and answer with the prefixes they can
//! reach, so routes propagate hop by hop and disappear again when a peer
//! stops answering.

pub mod config;
pub mod controller;
pub mod discovery;
pub mod peer;
pub mod probe;

pub use config::MeshConfig;
pub use controller::MeshController;
pub use discovery::{ConnectionInfo, DeviceStatus, DiscoveredDevice, PeerDiscovery};
pub use peer::Peer;

pub use ndn_mesh_common::Result;

/// Prefix under which nodes probe each other
pub const PROBE_PREFIX: &str = "/localhop/wifidirect";

/// Scheme of the faces created towards peers
pub const FACE_URI_SCHEME: &str = "udp://";
