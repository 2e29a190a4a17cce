//! Management command names
//!
//! Builds the command Interest name without signing it, which is handy
//! when comparing against a packet capture.

use anyhow::{Context, Result};
use ndn_mesh_common::{ControlParameters, ForwardingFlags, LocalControlHeader, Name};
use ndn_mesh_mgmt::command::command_name;

use crate::commands::decode::print_parameters;
use crate::{CommandCommands, LocalControlFeature};

/// Handle a command subcommand
pub fn handle_command(cmd: CommandCommands) -> Result<()> {
    let (verb, parameters) = build(cmd)?;
    let name = command_name(verb, &parameters)
        .with_context(|| format!("Failed to build {} command", verb))?;

    println!("{}", name);
    println!("Parameters: {}", hex::encode(parameters.wire_encode()));
    print_parameters(&parameters);
    Ok(())
}

fn parse_name(uri: &str) -> Result<Name> {
    Name::from_uri(uri).with_context(|| format!("Invalid name: {}", uri))
}

fn header(feature: LocalControlFeature) -> LocalControlHeader {
    match feature {
        LocalControlFeature::IncomingFaceId => LocalControlHeader::IncomingFaceId,
        LocalControlFeature::NextHopFaceId => LocalControlHeader::NextHopFaceId,
        LocalControlFeature::CachingPolicy => LocalControlHeader::CachingPolicy,
    }
}

fn build(cmd: CommandCommands) -> Result<(&'static str, ControlParameters)> {
    let built = match cmd {
        CommandCommands::CreateFace { uri } => ("faces/create", ControlParameters::new().with_uri(uri)),
        CommandCommands::DestroyFace { face_id } => {
            ("faces/destroy", ControlParameters::new().with_face_id(face_id))
        }
        CommandCommands::Register { prefix, face_id, cost, capture } => (
            "rib/register",
            ControlParameters::new()
                .with_name(parse_name(&prefix)?)
                .with_face_id(face_id)
                .with_cost(cost)
                .with_flags(ForwardingFlags {
                    child_inherit: true,
                    capture,
                }),
        ),
        CommandCommands::Unregister { prefix, face_id } => {
            let mut parameters = ControlParameters::new().with_name(parse_name(&prefix)?);
            if let Some(face_id) = face_id {
                parameters = parameters.with_face_id(face_id);
            }
            ("rib/unregister", parameters)
        }
        CommandCommands::Strategy { prefix, strategy } => (
            "strategy-choice/set",
            ControlParameters::new()
                .with_name(parse_name(&prefix)?)
                .with_strategy(parse_name(&strategy)?),
        ),
        CommandCommands::AddNexthop { prefix, face_id, cost } => (
            "fib/add-nexthop",
            ControlParameters::new()
                .with_name(parse_name(&prefix)?)
                .with_face_id(face_id)
                .with_cost(cost),
        ),
        CommandCommands::EnableLocalControl { feature } => (
            "faces/enable-local-control",
            ControlParameters::new().with_local_control_feature(header(feature)),
        ),
        CommandCommands::DisableLocalControl { feature } => (
            "faces/disable-local-control",
            ControlParameters::new().with_local_control_feature(header(feature)),
        ),
    };
    Ok(built)
}
