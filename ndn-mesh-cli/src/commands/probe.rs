//! Probe Interest names

use anyhow::{Context, Result};
use ndn_mesh_adhoc::probe::{peer_prefix, probe_name};
use ndn_mesh_common::Name;

/// Print the probe `my_ip` sends to `peer_ip`, and the prefix the peer listens on
pub fn print_probe_name(prefix: &str, peer_ip: &str, my_ip: &str) -> Result<()> {
    let prefix = Name::from_uri(prefix).with_context(|| format!("Invalid probe prefix: {}", prefix))?;

    println!("{}", probe_name(&prefix, peer_ip, my_ip));
    println!("Listener: {}", peer_prefix(&prefix, peer_ip));
    Ok(())
}
