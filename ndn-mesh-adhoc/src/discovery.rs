//! The peer discovery seam.
//!
//! The platform's WiFi-Direct stack is an external collaborator. The
//! controller only needs the list of nearby devices, our own address on the
//! group network once a group is formed, and the ability to join or leave
//! a group.

use async_trait::async_trait;
use ndn_mesh_common::Result;
use serde::Serialize;

/// Connection state of a discovered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceStatus {
    Connected,
    Invited,
    Failed,
    Available,
    Unavailable,
}

/// A device reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Hardware address of the device
    pub device_address: String,

    pub name: String,

    pub status: DeviceStatus,

    /// Address on the group network, when known
    pub ip_address: Option<String>,
}

impl DiscoveredDevice {
    pub fn new(device_address: impl Into<String>, name: impl Into<String>, status: DeviceStatus) -> Self {
        Self {
            device_address: device_address.into(),
            name: name.into(),
            status,
            ip_address: None,
        }
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status == DeviceStatus::Connected
    }
}

/// Group state reported once a connection completes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionInfo {
    pub group_formed: bool,
    pub is_group_owner: bool,
    pub group_owner_address: Option<String>,
}

/// Source of nearby devices and group membership.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Current set of nearby devices
    async fn discover_peers(&self) -> Result<Vec<DiscoveredDevice>>;

    /// Our address on the group network, if we are in a group
    fn local_address(&self) -> Option<String>;

    /// Details of the current group
    async fn connection_info(&self) -> Result<ConnectionInfo>;

    /// Ask to join the group of `device_address`
    async fn connect(&self, device_address: &str) -> Result<()>;

    /// Leave the current group
    async fn disconnect(&self) -> Result<()>;
}

#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryDiscovery;

#[cfg(any(test, feature = "memory"))]
mod memory {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, MutexGuard,
    };

    use async_trait::async_trait;
    use log::debug;
    use ndn_mesh_common::{Error, Result};

    use super::{ConnectionInfo, DeviceStatus, DiscoveredDevice, PeerDiscovery};

    #[derive(Default)]
    struct State {
        devices: Vec<DiscoveredDevice>,
        local_address: Option<String>,
        connection: ConnectionInfo,
        failing: bool,
    }

    /// Scripted discovery for tests and simulations.
    #[derive(Default)]
    pub struct MemoryDiscovery {
        state: Mutex<State>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl MemoryDiscovery {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Put this node in a formed group at `local_address`
        pub fn join_group(&self, local_address: &str, group_owner_address: &str) {
            let mut state = self.state();
            state.local_address = Some(local_address.to_string());
            state.connection = ConnectionInfo {
                group_formed: true,
                is_group_owner: local_address == group_owner_address,
                group_owner_address: Some(group_owner_address.to_string()),
            };
        }

        pub fn set_devices(&self, devices: Vec<DiscoveredDevice>) {
            self.state().devices = devices;
        }

        /// Change the status of one device, if known
        pub fn set_status(&self, device_address: &str, status: DeviceStatus) {
            if let Some(device) = self
                .state()
                .devices
                .iter_mut()
                .find(|device| device.device_address == device_address)
            {
                device.status = status;
            }
        }

        pub fn set_local_address(&self, local_address: Option<&str>) {
            self.state().local_address = local_address.map(str::to_string);
        }

        /// Make `discover_peers` fail until cleared
        pub fn set_failing(&self, failing: bool) {
            self.state().failing = failing;
        }

        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::Relaxed)
        }

        pub fn disconnect_count(&self) -> usize {
            self.disconnects.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl PeerDiscovery for MemoryDiscovery {
        async fn discover_peers(&self) -> Result<Vec<DiscoveredDevice>> {
            let state = self.state();
            if state.failing {
                return Err(Error::Transport("Peer discovery unavailable".to_string()));
            }
            Ok(state.devices.clone())
        }

        fn local_address(&self) -> Option<String> {
            self.state().local_address.clone()
        }

        async fn connection_info(&self) -> Result<ConnectionInfo> {
            Ok(self.state().connection.clone())
        }

        async fn connect(&self, device_address: &str) -> Result<()> {
            self.connects.fetch_add(1, Ordering::Relaxed);
            debug!("[Discovery] Connect to {}", device_address);
            let mut state = self.state();
            match state
                .devices
                .iter_mut()
                .find(|device| device.device_address == device_address)
            {
                Some(device) => {
                    device.status = DeviceStatus::Invited;
                    Ok(())
                }
                None => Err(Error::NotFound(format!("No device {}", device_address))),
            }
        }

        async fn disconnect(&self) -> Result<()> {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
            debug!("[Discovery] Leaving group");
            let mut state = self.state();
            state.local_address = None;
            state.connection = ConnectionInfo::default();
            for device in state.devices.iter_mut().filter(|device| device.is_connected()) {
                device.status = DeviceStatus::Available;
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_disconnect_leaves_group() {
            let discovery = MemoryDiscovery::new();
            discovery.join_group("192.168.49.20", "192.168.49.1");
            discovery.set_devices(vec![DiscoveredDevice::new(
                "aa:bb",
                "owner",
                DeviceStatus::Connected,
            )
            .with_ip_address("192.168.49.1")]);

            let info = discovery.connection_info().await.unwrap();
            assert!(info.group_formed && !info.is_group_owner);

            discovery.disconnect().await.unwrap();
            assert_eq!(discovery.local_address(), None);
            assert!(!discovery.connection_info().await.unwrap().group_formed);
            let devices = discovery.discover_peers().await.unwrap();
            assert_eq!(devices[0].status, DeviceStatus::Available);
            assert_eq!(discovery.disconnect_count(), 1);
        }

        #[tokio::test]
        async fn test_connect_unknown_device() {
            let discovery = MemoryDiscovery::new();
            assert!(discovery.connect("00:11").await.is_err());
            assert_eq!(discovery.connect_count(), 1);
        }
    }
}
