//! Mesh controller configuration.

use std::{path::Path, time::Duration};

use log::debug;
use ndn_mesh_common::{Error, Name, Result};
use serde::{Deserialize, Serialize};

use crate::{FACE_URI_SCHEME, PROBE_PREFIX};

/// Environment variables starting with this prefix override file values
pub const ENV_PREFIX: &str = "NDNMESH";

/// Tunables of the mesh controller loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Period of the peer discovery loop (in milliseconds)
    pub discovery_period_ms: u64,
    /// Delay before the first discovery cycle (in milliseconds)
    pub discovery_initial_delay_ms: u64,

    /// Period of the probe loop (in milliseconds)
    pub probe_period_ms: u64,
    /// Delay before the first probe round (in milliseconds)
    pub probe_initial_delay_ms: u64,
    /// Lifetime of probe Interests (in milliseconds)
    pub probe_lifetime_ms: u64,
    /// Freshness period of probe Data (in milliseconds)
    pub probe_freshness_ms: u64,

    /// Period of the face/route consistency loop (in milliseconds)
    pub face_route_period_ms: u64,
    /// Delay before the first face/route check (in milliseconds)
    pub face_route_initial_delay_ms: u64,

    /// Period of the group consistency loop (in milliseconds)
    pub group_period_ms: u64,
    /// Delay before the first group check (in milliseconds)
    pub group_initial_delay_ms: u64,

    /// Period of the face event pump (in milliseconds)
    pub event_pump_period_ms: u64,

    /// Consecutive probe timeouts after which a peer is removed
    pub max_probe_timeouts: u32,

    /// Consecutive empty group checks after which the group is left
    pub max_group_timeouts: u32,

    /// Scheme of faces created towards peers
    pub face_uri_scheme: String,

    /// Prefix under which nodes probe each other
    pub probe_prefix: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            discovery_period_ms: 5000,
            discovery_initial_delay_ms: 100,
            probe_period_ms: 1000,
            probe_initial_delay_ms: 200,
            probe_lifetime_ms: 1000,
            probe_freshness_ms: 500,
            face_route_period_ms: 5000,
            face_route_initial_delay_ms: 300,
            group_period_ms: 10000,
            group_initial_delay_ms: 300,
            event_pump_period_ms: 5,
            max_probe_timeouts: 60,
            max_group_timeouts: 6,
            face_uri_scheme: FACE_URI_SCHEME.to_string(),
            probe_prefix: PROBE_PREFIX.to_string(),
        }
    }
}

impl MeshConfig {
    /// Defaults, then `path` (TOML, JSON, ... by extension) if given, then
    /// `NDNMESH_*` environment variables such as `NDNMESH_PROBE_PERIOD_MS`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("[Config] Loading mesh configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mesh: MeshConfig = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| Error::Other(format!("Invalid mesh configuration: {}", e)))?;
        mesh.validate()?;
        Ok(mesh)
    }

    /// Reject values the loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_probe_timeouts == 0 || self.max_group_timeouts == 0 {
            return Err(Error::Other(
                "Timeout thresholds must be at least 1".to_string(),
            ));
        }
        if self.event_pump_period_ms == 0 {
            return Err(Error::Other("Event pump period must be positive".to_string()));
        }
        self.probe_prefix_name()?;
        Ok(())
    }

    pub fn probe_prefix_name(&self) -> Result<Name> {
        Name::from_uri(&self.probe_prefix)
    }

    /// Face URI for a peer address
    pub fn face_uri(&self, address: &str) -> String {
        format!("{}{}", self.face_uri_scheme, address)
    }

    pub fn discovery_period(&self) -> Duration {
        Duration::from_millis(self.discovery_period_ms)
    }

    pub fn probe_period(&self) -> Duration {
        Duration::from_millis(self.probe_period_ms)
    }

    pub fn face_route_period(&self) -> Duration {
        Duration::from_millis(self.face_route_period_ms)
    }

    pub fn group_period(&self) -> Duration {
        Duration::from_millis(self.group_period_ms)
    }

    pub fn event_pump_period(&self) -> Duration {
        Duration::from_millis(self.event_pump_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.max_probe_timeouts, 60);
        assert_eq!(config.max_group_timeouts, 6);
        assert_eq!(config.probe_lifetime_ms, 1000);
        assert_eq!(config.face_uri("192.168.49.1"), "udp://192.168.49.1");
        assert_eq!(config.probe_prefix_name().unwrap().len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "probe_period_ms = 250\nmax_probe_timeouts = 3").unwrap();

        let config = MeshConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.probe_period_ms, 250);
        assert_eq!(config.max_probe_timeouts, 3);
        assert_eq!(config.discovery_period_ms, 5000);
    }

    #[test]
    fn test_environment_overrides_defaults() {
        // only this test touches group_period_ms through the environment
        std::env::set_var("NDNMESH_GROUP_PERIOD_MS", "1234");
        let config = MeshConfig::load(None);
        std::env::remove_var("NDNMESH_GROUP_PERIOD_MS");

        let config = config.unwrap();
        assert_eq!(config.group_period_ms, 1234);
        assert_eq!(config.probe_period_ms, 1000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = MeshConfig::load(Some(Path::new("/nonexistent/ndnmesh.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = MeshConfig {
            max_probe_timeouts: 0,
            ..MeshConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_defaults() {
        let config: MeshConfig = serde_json::from_str(r#"{"group_period_ms": 1}"#).unwrap();
        assert_eq!(config.group_period_ms, 1);
        assert_eq!(config.probe_prefix, PROBE_PREFIX);
    }
}
