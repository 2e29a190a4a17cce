//! Face and route management API.
//!
//! [`NfdClient`] is a thin typed layer over the command client and the
//! segmented dataset retrieval: every method maps to one management
//! command or one status dataset of the local forwarder.

use std::sync::Arc;

use log::{debug, info};
use ndn_mesh_common::{
    control::{ControlParameters, ControlResponse, ForwardingFlags, LocalControlHeader},
    dataset,
    ndn::{ChildSelector, Interest, Name},
    Error, FaceStatus, FibEntry, ForwarderStatus, Result, RibEntry,
};

use crate::{command, config::ClientOptions, face::Face, segmented, LOCALHOST_NFD};

/// Management client bound to one face
#[derive(Debug, Clone)]
pub struct NfdClient {
    face: Arc<Face>,
    options: ClientOptions,
}

impl NfdClient {
    pub fn new(face: Arc<Face>, options: ClientOptions) -> Self {
        Self { face, options }
    }

    /// The face commands are sent on
    pub fn face(&self) -> &Arc<Face> {
        &self.face
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send a management command such as `faces/create`.
    pub async fn send_command(
        &self,
        command: &str,
        parameters: &ControlParameters,
    ) -> Result<ControlResponse> {
        command::send_command(&self.face, command, parameters, self.options.command_lifetime_ms).await
    }

    /// Retrieve all segments of a status dataset and reject management errors.
    pub async fn retrieve_dataset(&self, name: &Name) -> Result<bytes::Bytes> {
        let interest = Interest::new(name.clone())
            .with_must_be_fresh(true)
            .with_child_selector(ChildSelector::Rightmost)
            .with_lifetime(self.options.dataset_lifetime_ms);

        let data = segmented::fetch_segmented(
            &self.face,
            interest,
            self.options.warn_unsegmented_dataset,
        )
        .await?;
        dataset::reject_control_response(&data.content)?;
        Ok(data.content)
    }

    /* ---------------------------------------------------------------- *
     * Reachability and status
     * ---------------------------------------------------------------- */

    /// Whether anything answers an Interest for `name`
    pub async fn ping(&self, name: &Name) -> bool {
        command::ping(&self.face, name, self.options.ping_lifetime_ms).await
    }

    /// Whether the local forwarder answers at all
    pub async fn ping_local(&self) -> bool {
        match Name::from_uri(LOCALHOST_NFD) {
            Ok(name) => self.ping(&name).await,
            Err(_) => false,
        }
    }

    pub async fn forwarder_status(&self) -> Result<ForwarderStatus> {
        command::forwarder_status(&self.face, self.options.dataset_lifetime_ms).await
    }

    /* ---------------------------------------------------------------- *
     * Datasets
     * ---------------------------------------------------------------- */

    pub async fn list_faces(&self) -> Result<Vec<FaceStatus>> {
        let content = self.retrieve_dataset(&dataset_name("faces")?).await?;
        dataset::decode_face_list(&content)
    }

    pub async fn list_fib(&self) -> Result<Vec<FibEntry>> {
        let content = self.retrieve_dataset(&dataset_name("fib")?).await?;
        dataset::decode_fib(&content)
    }

    pub async fn list_rib(&self) -> Result<Vec<RibEntry>> {
        let content = self.retrieve_dataset(&dataset_name("rib")?).await?;
        dataset::decode_rib(&content)
    }

    /// FaceId of the only face whose remote URI is exactly `uri`
    pub async fn face_id_for_uri(&self, uri: &str) -> Result<u64> {
        let matches: Vec<u64> = self
            .list_faces()
            .await?
            .into_iter()
            .filter(|face| face.uri == uri)
            .map(|face| face.face_id)
            .collect();

        match matches.as_slice() {
            [face_id] => Ok(*face_id),
            [] => Err(Error::NotFound(format!("Face not found: {}", uri))),
            _ => Err(Error::NotFound(format!(
                "{} faces match {}",
                matches.len(),
                uri
            ))),
        }
    }

    /* ---------------------------------------------------------------- *
     * Faces
     * ---------------------------------------------------------------- */

    /// Create a face towards `uri` and return its FaceId
    pub async fn create_face(&self, uri: &str) -> Result<u64> {
        let parameters = ControlParameters::new().with_uri(uri);
        let response = self.send_command("faces/create", &parameters).await?;

        let face_id = response
            .body
            .first()
            .and_then(|parameters| parameters.face_id)
            .ok_or_else(|| {
                Error::Encoding(format!("faces/create response for {} carries no FaceId", uri))
            })?;
        info!("[Nfd] Created face {} for {}", face_id, uri);
        Ok(face_id)
    }

    pub async fn destroy_face(&self, face_id: u64) -> Result<()> {
        let parameters = ControlParameters::new().with_face_id(face_id);
        self.send_command("faces/destroy", &parameters).await?;
        info!("[Nfd] Destroyed face {}", face_id);
        Ok(())
    }

    /// Enable a local control header on the requesting face
    pub async fn enable_local_control(&self, header: LocalControlHeader) -> Result<()> {
        let parameters = ControlParameters::new().with_local_control_feature(header);
        self.send_command("faces/enable-local-control", &parameters).await?;
        Ok(())
    }

    /// Disable a local control header on the requesting face
    pub async fn disable_local_control(&self, header: LocalControlHeader) -> Result<()> {
        let parameters = ControlParameters::new().with_local_control_feature(header);
        self.send_command("faces/disable-local-control", &parameters).await?;
        Ok(())
    }

    /* ---------------------------------------------------------------- *
     * Routes
     * ---------------------------------------------------------------- */

    /// Add a next hop straight into the FIB
    pub async fn add_next_hop(&self, face_id: u64, prefix: &Name) -> Result<()> {
        let parameters = ControlParameters::new()
            .with_name(prefix.clone())
            .with_face_id(face_id);
        self.send_command("fib/add-nexthop", &parameters).await?;
        Ok(())
    }

    /// `rib/register` with caller supplied parameters
    pub async fn register(&self, parameters: &ControlParameters) -> Result<ControlResponse> {
        self.send_command("rib/register", parameters).await
    }

    /// Register `prefix` on `face_id` with child-inherit and capture set
    pub async fn register_route(&self, prefix: &Name, face_id: u64, cost: u64) -> Result<()> {
        let flags = ForwardingFlags {
            child_inherit: true,
            capture: true,
        };
        self.register_route_with_flags(prefix, face_id, cost, flags).await
    }

    pub async fn register_route_with_flags(
        &self,
        prefix: &Name,
        face_id: u64,
        cost: u64,
        flags: ForwardingFlags,
    ) -> Result<()> {
        let parameters = ControlParameters::new()
            .with_name(prefix.clone())
            .with_face_id(face_id)
            .with_cost(cost)
            .with_flags(flags);
        self.register(&parameters).await?;
        debug!("[Nfd] Registered {} on face {} (cost {})", prefix, face_id, cost);
        Ok(())
    }

    /// Create a face towards `uri` and register `prefix` on it.
    ///
    /// Returns the new FaceId.
    pub async fn register_with_uri(&self, uri: &str, prefix: &Name, cost: u64) -> Result<u64> {
        let face_id = self.create_face(uri).await?;
        self.register_route(prefix, face_id, cost).await?;
        Ok(face_id)
    }

    /// `rib/unregister` with caller supplied parameters
    pub async fn unregister(&self, parameters: &ControlParameters) -> Result<ControlResponse> {
        self.send_command("rib/unregister", parameters).await
    }

    /// Unregister `prefix` from the face the command arrives on
    pub async fn unregister_route(&self, prefix: &Name) -> Result<()> {
        let parameters = ControlParameters::new().with_name(prefix.clone());
        self.unregister(&parameters).await?;
        Ok(())
    }

    pub async fn unregister_route_on_face(&self, prefix: &Name, face_id: u64) -> Result<()> {
        let parameters = ControlParameters::new()
            .with_name(prefix.clone())
            .with_face_id(face_id);
        self.unregister(&parameters).await?;
        debug!("[Nfd] Unregistered {} from face {}", prefix, face_id);
        Ok(())
    }

    /// Unregister `prefix` from the face whose URI is exactly `uri`
    pub async fn unregister_route_by_uri(&self, prefix: &Name, uri: &str) -> Result<()> {
        let face_id = self.face_id_for_uri(uri).await?;
        self.unregister_route_on_face(prefix, face_id).await
    }

    /* ---------------------------------------------------------------- *
     * Strategies
     * ---------------------------------------------------------------- */

    pub async fn set_strategy(&self, prefix: &Name, strategy: &Name) -> Result<()> {
        let parameters = ControlParameters::new()
            .with_name(prefix.clone())
            .with_strategy(strategy.clone());
        self.send_command("strategy-choice/set", &parameters).await?;
        Ok(())
    }
}

/// `/localhost/nfd/<module>/list`
fn dataset_name(module: &str) -> Result<Name> {
    Ok(Name::from_uri(LOCALHOST_NFD)?.append_str(module).append_str("list"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::spawn_event_pump;
    use crate::memory::MemoryForwarder;
    use ndn_mesh_common::FaceScope;
    use std::time::Duration;

    fn client(forwarder: &MemoryForwarder) -> NfdClient {
        let face = Arc::new(Face::new(Arc::new(forwarder.connect())));
        spawn_event_pump(face.clone(), Duration::from_millis(1));
        NfdClient::new(face, ClientOptions::default())
    }

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[tokio::test]
    async fn test_face_lifecycle() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);

        let face_id = nfd.create_face("udp://192.168.49.5").await.unwrap();
        let faces = nfd.list_faces().await.unwrap();
        let created = faces.iter().find(|face| face.face_id == face_id).unwrap();
        assert_eq!(created.uri, "udp://192.168.49.5");
        assert_eq!(created.face_scope, FaceScope::NonLocal);

        // creating the same remote again hands back the same face
        assert_eq!(nfd.create_face("udp://192.168.49.5").await.unwrap(), face_id);

        nfd.destroy_face(face_id).await.unwrap();
        let faces = nfd.list_faces().await.unwrap();
        assert!(faces.iter().all(|face| face.face_id != face_id));
    }

    #[tokio::test]
    async fn test_register_and_unregister_routes() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);

        let face_id = nfd
            .register_with_uri("udp://192.168.49.9", &name("/ndn/edu"), 10)
            .await
            .unwrap();
        let rib = nfd.list_rib().await.unwrap();
        let entry = rib.iter().find(|entry| entry.name == name("/ndn/edu")).unwrap();
        assert_eq!(entry.routes[0].face_id, face_id);
        assert_eq!(entry.routes[0].cost, 10);
        assert!(entry.routes[0].flags.capture);

        let fib = nfd.list_fib().await.unwrap();
        assert!(fib
            .iter()
            .any(|entry| entry.prefix == name("/ndn/edu") && entry.has_next_hop(face_id)));

        nfd.unregister_route_by_uri(&name("/ndn/edu"), "udp://192.168.49.9")
            .await
            .unwrap();
        let rib = nfd.list_rib().await.unwrap();
        assert!(rib.iter().all(|entry| entry.name != name("/ndn/edu")));
    }

    #[tokio::test]
    async fn test_mesh_style_route_flags() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);
        let face_id = nfd.create_face("udp://192.168.49.3").await.unwrap();

        nfd.register_route_with_flags(&name("/mesh"), face_id, 0, ForwardingFlags::default())
            .await
            .unwrap();
        let rib = nfd.list_rib().await.unwrap();
        let route = &rib.iter().find(|entry| entry.name == name("/mesh")).unwrap().routes[0];
        assert!(route.flags.child_inherit);
        assert!(!route.flags.capture);

        nfd.unregister_route_on_face(&name("/mesh"), face_id).await.unwrap();
        assert!(forwarder.rib().iter().all(|entry| entry.name != name("/mesh")));
    }

    #[tokio::test]
    async fn test_unknown_uri_is_not_found() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);

        let err = nfd
            .unregister_route_by_uri(&name("/x"), "udp://10.9.9.9")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_register_on_missing_face_is_rejected() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);

        let err = nfd.register_route(&name("/x"), 9999, 0).await.unwrap_err();
        assert_eq!(err.status_code(), Some(410));
    }

    #[tokio::test]
    async fn test_strategy_next_hop_and_local_control() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);

        let strategy = name("/localhost/nfd/strategy/multicast");
        nfd.set_strategy(&name("/video"), &strategy).await.unwrap();
        assert_eq!(forwarder.strategy(&name("/video")), Some(strategy));

        let face_id = nfd.create_face("udp://192.168.49.4").await.unwrap();
        nfd.add_next_hop(face_id, &name("/direct")).await.unwrap();
        assert!(nfd
            .list_fib()
            .await
            .unwrap()
            .iter()
            .any(|entry| entry.prefix == name("/direct") && entry.has_next_hop(face_id)));

        nfd.enable_local_control(LocalControlHeader::IncomingFaceId)
            .await
            .unwrap();
        nfd.disable_local_control(LocalControlHeader::IncomingFaceId)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dataset_spanning_segments() {
        let forwarder = MemoryForwarder::new();
        forwarder.set_segment_size(64);
        let nfd = client(&forwarder);

        let mut created = Vec::new();
        for host in 10..30 {
            created.push(nfd.create_face(&format!("udp://192.168.49.{}", host)).await.unwrap());
        }

        let faces = nfd.list_faces().await.unwrap();
        for face_id in created {
            assert!(faces.iter().any(|face| face.face_id == face_id));
        }
    }

    #[tokio::test]
    async fn test_dataset_error_response() {
        let forwarder = MemoryForwarder::new();
        forwarder.fail_next_dataset("faces/list", 403, "not allowed");
        let nfd = client(&forwarder);

        let err = nfd.list_faces().await.unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn test_ping_local_and_status() {
        let forwarder = MemoryForwarder::new();
        let nfd = client(&forwarder);

        assert!(nfd.ping_local().await);
        let status = nfd.forwarder_status().await.unwrap();
        assert!(status.current_timestamp >= status.start_timestamp);
    }
}
