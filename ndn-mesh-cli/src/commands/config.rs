//! Effective mesh configuration

use anyhow::{Context, Result};
use ndn_mesh_adhoc::MeshConfig;
use std::path::PathBuf;

/// Load the configuration the way the controller would and print it
pub fn print_config(file: Option<PathBuf>) -> Result<()> {
    let config = MeshConfig::load(file.as_deref()).context("Failed to load mesh configuration")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
