//! NDN forwarder management client for ndn-mesh.
//!
//! This crate speaks the NFD management protocol over an abstract
//! [`Transport`]: signed control commands under `/localhost/nfd`, segmented
//! status dataset retrieval, and the face/route helpers built on top of
//! them in [`NfdClient`]. With the `memory` feature it also provides an
//! in-process forwarder for tests and simulations.

mod config;

pub mod command;
pub mod face;
pub mod nfd;
pub mod segmented;
pub mod transport;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use config::ClientOptions;
pub use face::{spawn_event_pump, Face};
pub use nfd::NfdClient;
pub use transport::{Connector, Packet, Transport};

pub use ndn_mesh_common::Result;

/// Prefix of every management command and dataset
pub const LOCALHOST_NFD: &str = "/localhost/nfd";

/// Lifetime of command and dataset Interests in milliseconds
pub const DEFAULT_COMMAND_LIFETIME_MS: u64 = 2000;

/// Content bytes per dataset segment served by the in-memory forwarder
pub const DEFAULT_SEGMENT_SIZE: usize = 4096;
