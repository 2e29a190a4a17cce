//! In-memory mesh simulation
//!
//! Every node runs its own forwarder and controller. Node 0 owns the group
//! and sees every member as connected; members only see the owner, so
//! member-to-member routes have to be learned through the owner's probe
//! answers.

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::join_all;
use log::{info, warn};
use ndn_mesh_adhoc::{
    discovery::MemoryDiscovery, probe::is_scoped, DeviceStatus, DiscoveredDevice, MeshConfig,
    MeshController, Peer, PeerDiscovery,
};
use ndn_mesh_common::{metrics::MetricsSnapshot, Data, Interest, Name};
use ndn_mesh_mgmt::{
    memory::{MemoryForwarder, MemoryRadio},
    spawn_event_pump, Face,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::utils::{format_duration, print_header};

const FETCH_LIFETIME_MS: u64 = 1000;
const APP_PUMP_PERIOD: Duration = Duration::from_millis(1);

struct Node {
    address: String,
    prefix: Name,
    forwarder: MemoryForwarder,
    controller: MeshController,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Serialize)]
struct NodeReport {
    address: String,
    prefix: String,
    group_owner: bool,
    peers: Vec<Peer>,
    learned_routes: Vec<String>,
    reachable: Vec<String>,
    unreachable: Vec<String>,
    metrics: MetricsSnapshot,
}

fn address(index: usize) -> String {
    if index == 0 {
        "192.168.49.1".to_string()
    } else {
        format!("192.168.49.{}", 10 + index)
    }
}

fn device(index: usize) -> DiscoveredDevice {
    DiscoveredDevice::new(
        format!("02:00:00:00:00:{:02x}", index),
        format!("node{}", index),
        DeviceStatus::Connected,
    )
    .with_ip_address(address(index))
}

/// Start an application that answers everything under `prefix`
async fn serve(forwarder: &MemoryForwarder, prefix: &Name, index: usize) -> Result<Vec<JoinHandle<()>>> {
    let app = Arc::new(Face::new(Arc::new(forwarder.connect())));
    let pump = spawn_event_pump(app.clone(), APP_PUMP_PERIOD);
    let mut interests = app
        .register_prefix(prefix)
        .await
        .with_context(|| format!("Failed to register {}", prefix))?;

    let content = Bytes::from(format!("node{}", index));
    let server = tokio::spawn(async move {
        while let Some(interest) = interests.recv().await {
            let data = Data::new(interest.name.clone(), content.clone());
            if let Err(e) = app.put_data(data).await {
                warn!("node{} failed to answer {}: {}", index, interest.name, e);
            }
        }
    });
    Ok(vec![pump, server])
}

async fn build_node(radio: &MemoryRadio, config: &MeshConfig, index: usize, nodes: usize) -> Result<Node> {
    let address = address(index);
    let forwarder = MemoryForwarder::new();
    forwarder.attach(radio, &address);

    let discovery = Arc::new(MemoryDiscovery::new());
    discovery.join_group(&address, &self::address(0));
    if index == 0 {
        discovery.set_devices((1..nodes).map(device).collect());
    } else {
        discovery.set_devices(vec![device(0)]);
    }

    let controller =
        MeshController::new(config.clone(), Arc::new(forwarder.clone()), discovery.clone())
            .with_context(|| format!("Failed to create controller for {}", address))?;

    // what the platform reports once the group is up
    let info = discovery.connection_info().await?;
    controller.on_connection_info(info).await;
    controller.flush().await;

    let prefix = Name::from_uri(&format!("/mesh/node{}", index))?;
    let tasks = serve(&forwarder, &prefix, index).await?;

    Ok(Node {
        address,
        prefix,
        forwarder,
        controller,
        tasks,
    })
}

async fn report(node: &Node, all: &[Name]) -> NodeReport {
    let peers = node.controller.peers().await;
    let peer_faces: HashSet<u64> = peers.iter().filter_map(|peer| peer.face_id).collect();

    let learned_routes = node
        .forwarder
        .fib()
        .into_iter()
        .filter(|entry| !is_scoped(&entry.prefix))
        .filter_map(|entry| {
            let hops: Vec<String> = entry
                .next_hops
                .iter()
                .filter(|hop| peer_faces.contains(&hop.face_id))
                .map(|hop| hop.face_id.to_string())
                .collect();
            (!hops.is_empty()).then(|| format!("{} via {}", entry.prefix, hops.join(",")))
        })
        .collect();

    let nfd = node.controller.nfd().await;
    let targets: Vec<&Name> = all.iter().filter(|prefix| **prefix != node.prefix).collect();
    let fetches = targets.iter().map(|prefix| {
        let interest = Interest::new(prefix.append_str("ping")).with_lifetime(FETCH_LIFETIME_MS);
        nfd.face().express_interest(interest)
    });
    let results = join_all(fetches).await;

    let mut reachable = Vec::new();
    let mut unreachable = Vec::new();
    for (prefix, result) in targets.into_iter().zip(results) {
        match result {
            Ok(_) => reachable.push(prefix.to_string()),
            Err(_) => unreachable.push(prefix.to_string()),
        }
    }

    NodeReport {
        address: node.address.clone(),
        prefix: node.prefix.to_string(),
        group_owner: node.controller.is_group_owner().await,
        peers,
        learned_routes,
        reachable,
        unreachable,
        metrics: node.controller.metrics().snapshot(),
    }
}

fn print_report(report: &NodeReport) {
    print_header(&format!(
        "{} {}{}",
        report.address,
        report.prefix,
        if report.group_owner { " (group owner)" } else { "" }
    ));
    println!("Peers:");
    for peer in &report.peers {
        let face = peer
            .face_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} face={} timeouts={}", peer.ip_address, face, peer.probe_timeouts);
    }
    println!("Learned routes:");
    for route in &report.learned_routes {
        println!("  {}", route);
    }
    println!(
        "Reachable: {}/{}",
        report.reachable.len(),
        report.reachable.len() + report.unreachable.len()
    );
    for prefix in &report.unreachable {
        println!("  unreachable {}", prefix);
    }
    println!(
        "Probes: sent={} answered={} timed out={} served={}",
        report.metrics.probes_sent,
        report.metrics.probes_answered,
        report.metrics.probes_timed_out,
        report.metrics.probes_served
    );
}

/// Run `nodes` controllers for `seconds` and report what each one learned
pub async fn run(nodes: usize, seconds: u64, config: Option<PathBuf>, json: bool) -> Result<()> {
    if nodes < 2 {
        anyhow::bail!("A mesh needs at least 2 nodes, got {}", nodes);
    }
    let config = MeshConfig::load(config.as_deref()).context("Failed to load mesh configuration")?;

    let radio = MemoryRadio::new();
    let mut mesh = Vec::with_capacity(nodes);
    for index in 0..nodes {
        mesh.push(build_node(&radio, &config, index, nodes).await?);
    }
    let prefixes: Vec<Name> = mesh.iter().map(|node| node.prefix.clone()).collect();

    info!("Starting {} nodes for {}s", nodes, seconds);
    let started = Instant::now();
    for node in &mesh {
        node.controller.start();
    }
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let mut reports = Vec::with_capacity(nodes);
    for node in &mesh {
        reports.push(report(node, &prefixes).await);
    }

    for node in &mesh {
        node.controller.stop().await;
        for task in &node.tasks {
            task.abort();
        }
    }
    info!("Simulation finished after {}", format_duration(started.elapsed()));

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        assert_eq!(address(0), "192.168.49.1");
        assert_eq!(address(3), "192.168.49.13");
        assert_eq!(device(2).ip_address.as_deref(), Some("192.168.49.12"));
    }
}
