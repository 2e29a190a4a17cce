//! The packet transport seam.
//!
//! The management client never talks to the network itself. Sending and
//! receiving packets, command signing and prefix registration with the local
//! forwarder are provided by an implementation of [`Transport`]; a
//! [`Connector`] produces fresh transports so that a [`Face`](crate::Face)
//! can be torn down and recreated.

use std::sync::Arc;

use async_trait::async_trait;
use ndn_mesh_common::{
    ndn::{Data, Interest, Name},
    Result,
};

/// A packet delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// An Interest for a prefix this application registered
    Interest(Interest),

    /// A Data packet, possibly answering one of our Interests
    Data(Data),
}

impl Packet {
    /// Name carried by the packet
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(interest) => &interest.name,
            Packet::Data(data) => &data.name,
        }
    }
}

/// Connection from an application to its local forwarder.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Turn an unsigned command name into a signed one.
    ///
    /// Fails with `Error::Security` when no signing identity is configured.
    fn sign_command(&self, name: &Name) -> Result<Name>;

    /// Send an Interest towards the forwarder.
    async fn send_interest(&self, interest: &Interest) -> Result<()>;

    /// Send a Data packet answering a received Interest.
    async fn put_data(&self, data: &Data) -> Result<()>;

    /// Ask the forwarder to route Interests under `prefix` to this application.
    async fn register_prefix(&self, prefix: &Name) -> Result<()>;

    /// Withdraw a registration made with [`Transport::register_prefix`].
    async fn unregister_prefix(&self, prefix: &Name) -> Result<()>;

    /// Packets received since the previous call. Never blocks.
    async fn receive(&self) -> Result<Vec<Packet>>;

    /// Release the connection. Further calls fail with `Error::Transport`.
    async fn close(&self);
}

/// Factory of transports.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn Transport>>;
}
