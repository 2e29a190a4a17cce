//! Decoding of captured management payloads

use anyhow::{Context, Result};
use log::debug;
use ndn_mesh_common::{dataset, ControlParameters, ControlResponse};
use serde::Serialize;
use std::path::PathBuf;

use crate::utils::{print_header, read_payload};
use crate::DecodeKind;

pub fn run(kind: DecodeKind, hex: Option<String>, file: Option<PathBuf>, json: bool) -> Result<()> {
    let payload = read_payload(hex.as_deref(), file.as_deref())?;
    debug!("Decoding {} bytes as {:?}", payload.len(), kind);

    match kind {
        DecodeKind::Faces => {
            let faces = dataset::decode_face_list(&payload).context("Failed to decode face list")?;
            if json {
                return print_json(&faces);
            }
            print_header("Faces");
            for face in &faces {
                println!(
                    "faceid={} remote={} local={} scope={:?} persistency={:?} in={}i/{}d out={}i/{}d",
                    face.face_id,
                    face.uri,
                    face.local_uri,
                    face.face_scope,
                    face.face_persistency,
                    face.in_interests,
                    face.in_datas,
                    face.out_interests,
                    face.out_datas,
                );
            }
        }
        DecodeKind::Fib => {
            let entries = dataset::decode_fib(&payload).context("Failed to decode FIB")?;
            if json {
                return print_json(&entries);
            }
            print_header("FIB");
            for entry in &entries {
                let hops: Vec<String> = entry
                    .next_hops
                    .iter()
                    .map(|hop| format!("faceid={} (cost={})", hop.face_id, hop.cost))
                    .collect();
                println!("{} nexthops={{{}}}", entry.prefix, hops.join(", "));
            }
        }
        DecodeKind::Rib => {
            let entries = dataset::decode_rib(&payload).context("Failed to decode RIB")?;
            if json {
                return print_json(&entries);
            }
            print_header("RIB");
            for entry in &entries {
                println!("{}", entry.name);
                for route in &entry.routes {
                    let expires = route
                        .expiration_period
                        .map(|ms| format!("{}ms", ms))
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "  faceid={} origin={} cost={} flags={} expires={}",
                        route.face_id,
                        route.origin,
                        route.cost,
                        route.flags.bits(),
                        expires
                    );
                }
            }
        }
        DecodeKind::Status => {
            let status = dataset::decode_forwarder_status(&payload)
                .context("Failed to decode forwarder status")?;
            if json {
                return print_json(&status);
            }
            print_header("Forwarder status");
            println!("version:       {}", status.nfd_version);
            println!("started:       {}", status.start_timestamp);
            println!("now:           {}", status.current_timestamp);
            println!("FIB entries:   {}", status.n_fib_entries);
            println!("PIT entries:   {}", status.n_pit_entries);
            println!("CS entries:    {}", status.n_cs_entries);
            println!("in  i/d/n:     {}/{}/{}", status.n_in_interests, status.n_in_datas, status.n_in_nacks);
            println!("out i/d/n:     {}/{}/{}", status.n_out_interests, status.n_out_datas, status.n_out_nacks);
        }
        DecodeKind::Response => {
            let response = ControlResponse::wire_decode(&payload)
                .context("Failed to decode control response")?;
            if json {
                return print_json(&response);
            }
            println!("{}", response);
            for parameters in &response.body {
                print_parameters(parameters);
            }
        }
        DecodeKind::Parameters => {
            let parameters = ControlParameters::wire_decode(&payload)
                .context("Failed to decode control parameters")?;
            if json {
                return print_json(&parameters);
            }
            print_parameters(&parameters);
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_parameters(parameters: &ControlParameters) {
    if let Some(name) = &parameters.name {
        println!("Name: {}", name);
    }
    if let Some(face_id) = parameters.face_id {
        println!("FaceId: {}", face_id);
    }
    if let Some(uri) = &parameters.uri {
        println!("Uri: {}", uri);
    }
    if let Some(feature) = parameters.local_control_feature {
        println!("LocalControlFeature: {}", feature);
    }
    if let Some(origin) = parameters.origin {
        println!("Origin: {}", origin);
    }
    if let Some(cost) = parameters.cost {
        println!("Cost: {}", cost);
    }
    if let Some(flags) = parameters.flags {
        println!(
            "Flags: {} (child-inherit={}, capture={})",
            flags.bits(),
            flags.child_inherit,
            flags.capture
        );
    }
    if let Some(strategy) = &parameters.strategy {
        println!("Strategy: {}", strategy);
    }
    if let Some(expiration) = parameters.expiration_period {
        println!("ExpirationPeriod: {}ms", expiration);
    }
}
