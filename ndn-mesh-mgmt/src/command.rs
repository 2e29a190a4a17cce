//! Signed management commands and single-packet requests.
//!
//! A command is the Interest `/localhost/nfd/<module>/<verb>/<parameters>`
//! where the last component is the TLV encoding of a
//! [`ControlParameters`]; the transport signs it and the forwarder answers
//! with a [`ControlResponse`]. No retries happen here.

use log::{debug, trace, warn};
use ndn_mesh_common::{
    control::{ControlParameters, ControlResponse},
    dataset,
    ndn::{ChildSelector, Interest, Name, NameComponent},
    Error, ForwarderStatus, Result,
};

use crate::{face::Face, LOCALHOST_NFD};

/// Unsigned name of the management command `module/verb`.
pub fn command_name(command: &str, parameters: &ControlParameters) -> Result<Name> {
    let mut name = Name::from_uri(LOCALHOST_NFD)?;
    for part in command.split('/').filter(|part| !part.is_empty()) {
        name = name.append_str(part);
    }
    if name.len() != 4 {
        return Err(Error::Encoding(format!(
            "Management command must look like <module>/<verb>, got '{}'",
            command
        )));
    }
    Ok(name.append(NameComponent::new(parameters.wire_encode())))
}

/// Send a signed command and return the successful response.
///
/// Fails with `Error::Management` when the forwarder answers with a status
/// other than 200, and with `Error::Timeout` when nothing arrives within
/// `lifetime_ms`.
pub async fn send_command(
    face: &Face,
    command: &str,
    parameters: &ControlParameters,
    lifetime_ms: u64,
) -> Result<ControlResponse> {
    let name = command_name(command, parameters)?;
    let signed = face.sign_command(&name)?;
    let interest = Interest::new(signed)
        .with_lifetime(lifetime_ms)
        .with_must_be_fresh(true);

    debug!("[Nfd] Sending command {} {:?}", command, parameters);
    let data = face.express_interest(interest).await?;
    let response = ControlResponse::wire_decode(&data.content)?;

    if !response.is_ok() {
        warn!("[Nfd] Command {} rejected: {}", command, response);
    } else {
        trace!("[Nfd] Command {} answered: {}", command, response);
    }
    response.into_result()
}

/// Whether anything answers an Interest for `name`. Never fails.
pub async fn ping(face: &Face, name: &Name, lifetime_ms: u64) -> bool {
    let interest = Interest::new(name.clone())
        .with_lifetime(lifetime_ms)
        .with_must_be_fresh(true);

    match face.express_interest(interest).await {
        Ok(data) => {
            debug!("[Nfd] Ping {} answered by {}", name, data.name);
            true
        }
        Err(e) => {
            debug!("[Nfd] Ping {} failed: {}", name, e);
            false
        }
    }
}

/// Fetch the general status dataset, which always fits one packet.
pub async fn forwarder_status(face: &Face, lifetime_ms: u64) -> Result<ForwarderStatus> {
    let name = Name::from_uri(LOCALHOST_NFD)?.append_str("status");
    let interest = Interest::new(name)
        .with_lifetime(lifetime_ms)
        .with_must_be_fresh(true)
        .with_child_selector(ChildSelector::Rightmost);

    let data = face.express_interest(interest).await?;
    dataset::reject_control_response(&data.content)?;
    dataset::decode_forwarder_status(&data.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::spawn_event_pump;
    use crate::memory::MemoryForwarder;
    use std::{sync::Arc, time::Duration};

    fn pumped_face(forwarder: &MemoryForwarder) -> Arc<Face> {
        let face = Arc::new(Face::new(Arc::new(forwarder.connect())));
        spawn_event_pump(face.clone(), Duration::from_millis(1));
        face
    }

    #[test]
    fn test_command_name_layout() {
        let parameters = ControlParameters::new().with_face_id(300);
        let name = command_name("faces/destroy", &parameters).unwrap();

        assert_eq!(name.len(), 5);
        assert!(name.to_uri().starts_with("/localhost/nfd/faces/destroy/"));
        let encoded = name.get(4).unwrap().as_bytes();
        assert_eq!(ControlParameters::wire_decode(encoded).unwrap(), parameters);

        assert!(command_name("faces", &parameters).is_err());
        assert!(command_name("faces/create/extra", &parameters).is_err());
    }

    #[tokio::test]
    async fn test_successful_command() {
        let forwarder = MemoryForwarder::new();
        let face = pumped_face(&forwarder);

        let parameters = ControlParameters::new().with_uri("udp://192.168.49.7");
        let response = send_command(&face, "faces/create", &parameters, 2000)
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.body[0].face_id.is_some());
    }

    #[tokio::test]
    async fn test_rejected_command_keeps_text() {
        let forwarder = MemoryForwarder::new();
        let face = pumped_face(&forwarder);
        forwarder.fail_next_command("rib/register", 410, "Face not found, really");

        let parameters = ControlParameters::new()
            .with_name(Name::from_uri("/a").unwrap())
            .with_face_id(1);
        match send_command(&face, "rib/register", &parameters, 2000).await {
            Err(Error::Management { code, text }) => {
                assert_eq!(code, 410);
                assert_eq!(text, "Face not found, really");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsigned_command_is_a_security_error() {
        let forwarder = MemoryForwarder::new();
        let face = Face::new(Arc::new(forwarder.connect_without_identity()));

        let result = send_command(&face, "faces/list", &ControlParameters::new(), 2000).await;
        assert!(matches!(result, Err(Error::Security(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_forwarder_times_out() {
        let forwarder = MemoryForwarder::new();
        forwarder.set_management_enabled(false);
        let face = pumped_face(&forwarder);

        let parameters = ControlParameters::new().with_face_id(300);
        let err = send_command(&face, "faces/destroy", &parameters, 2000)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(!ping(&face, &Name::from_uri("/localhost/nfd").unwrap(), 500).await);
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let forwarder = MemoryForwarder::new();
        let face = pumped_face(&forwarder);

        assert!(ping(&face, &Name::from_uri("/localhost/nfd").unwrap(), 2000).await);

        let status = forwarder_status(&face, 2000).await.unwrap();
        assert!(!status.nfd_version.is_empty());
        assert!(status.n_in_interests >= 1);
    }
}
