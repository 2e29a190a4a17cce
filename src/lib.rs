//! NDN forwarder management and a self-configuring WiFi-Direct mesh.
//!
//! This crate re-exports the workspace members:
//!
//! * [`common`]: TLV codec, packets, control and status types
//! * [`mgmt`]: the management client, segmented datasets and the Face API
//! * [`adhoc`]: the mesh controller driven by peer discovery

pub use ndn_mesh_adhoc as adhoc;
pub use ndn_mesh_common as common;
pub use ndn_mesh_mgmt as mgmt;

pub use ndn_mesh_adhoc::{MeshConfig, MeshController, PeerDiscovery};
pub use ndn_mesh_common::{Error, Name, Result};
pub use ndn_mesh_mgmt::{Connector, Face, NfdClient};
