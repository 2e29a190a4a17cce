//! In-memory forwarder.
//!
//! [`MemoryForwarder`] is a small NFD stand-in living in the same process:
//! it keeps a face table, a RIB from which the FIB is derived, a PIT and a
//! dead-nonce list, answers the management commands and status datasets
//! the client issues, and forwards Interests and Data between application
//! faces. Forwarders attached to a shared [`MemoryRadio`] reach each other
//! through `udp://<address>` faces, which is enough to run several mesh
//! controllers against each other.
//!
//! Locks are never held while another forwarder or an application inbox is
//! touched; every operation first computes its deliveries under the state
//! lock and performs them afterwards.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace, warn};
use ndn_mesh_common::{
    control::{ControlParameters, ControlResponse, ForwardingFlags, LocalControlHeader},
    ndn::{Data, Interest, Name, NameComponent},
    tlv::TlvEncoder,
    Error, FacePersistency, FaceScope, FaceStatus, FibEntry, ForwarderStatus, NextHopRecord,
    Result, RibEntry, Route,
};
use tokio::time::Instant;

use crate::{
    transport::{Connector, Packet, Transport},
    DEFAULT_SEGMENT_SIZE, LOCALHOST_NFD,
};

/// Version string reported in the status dataset
pub const NFD_VERSION: &str = "0.4.1-memory";

/// Components appended to a command name when it is signed
pub const SIGNATURE_COMPONENTS: usize = 4;

const INTERNAL_FACE_ID: u64 = 1;
const FIRST_FACE_ID: u64 = 256;
const ORIGIN_APP: u64 = 0;
const DEAD_NONCE_CAPACITY: usize = 1024;
const DATASET_FRESHNESS_MS: u64 = 1000;

type Inbox = Arc<Mutex<VecDeque<Packet>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/* ---------------------------------------------------------------- *
 * Forwarder state
 * ---------------------------------------------------------------- */

enum FaceKind {
    Internal,
    App {
        inbox: Inbox,
        local_control: HashSet<u64>,
    },
    Remote {
        address: String,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct FaceCounters {
    in_interests: u64,
    in_datas: u64,
    out_interests: u64,
    out_datas: u64,
    in_bytes: u64,
    out_bytes: u64,
}

struct FaceEntry {
    kind: FaceKind,
    uri: String,
    local_uri: String,
    persistency: FacePersistency,
    counters: FaceCounters,
}

impl FaceEntry {
    fn status(&self, face_id: u64) -> FaceStatus {
        let mut status = FaceStatus::new(face_id, self.uri.clone(), self.local_uri.clone());
        status.face_scope = match self.kind {
            FaceKind::Remote { .. } => FaceScope::NonLocal,
            _ => FaceScope::Local,
        };
        status.face_persistency = self.persistency;
        status.in_interests = self.counters.in_interests;
        status.in_datas = self.counters.in_datas;
        status.out_interests = self.counters.out_interests;
        status.out_datas = self.counters.out_datas;
        status.in_bytes = self.counters.in_bytes;
        status.out_bytes = self.counters.out_bytes;
        status
    }

    fn is_app(&self) -> bool {
        matches!(self.kind, FaceKind::App { .. })
    }
}

struct PitEntry {
    interest: Interest,
    in_face: u64,
    expires_at: Instant,
}

/// Where a packet goes once the state lock is released
enum Delivery {
    Local(Inbox, Packet),
    Remote { to: String, packet: Packet },
}

struct ForwarderState {
    next_face_id: u64,
    next_app_fd: u64,
    faces: BTreeMap<u64, FaceEntry>,
    rib: BTreeMap<Name, Vec<Route>>,
    next_hops: BTreeMap<Name, Vec<NextHopRecord>>,
    strategies: BTreeMap<Name, Name>,
    pit: Vec<PitEntry>,
    dead_nonces: VecDeque<(Name, u32)>,
    segment_size: usize,
    management_enabled: bool,
    command_failures: HashMap<String, ControlResponse>,
    dataset_failures: HashMap<String, ControlResponse>,
    address: Option<String>,
    start_timestamp: u64,
    n_in_interests: u64,
    n_in_datas: u64,
    n_out_interests: u64,
    n_out_datas: u64,
}

impl ForwarderState {
    fn new() -> Self {
        let mut faces = BTreeMap::new();
        faces.insert(
            INTERNAL_FACE_ID,
            FaceEntry {
                kind: FaceKind::Internal,
                uri: "internal://".to_string(),
                local_uri: "internal://".to_string(),
                persistency: FacePersistency::Permanent,
                counters: FaceCounters::default(),
            },
        );

        Self {
            next_face_id: FIRST_FACE_ID,
            next_app_fd: 3,
            faces,
            rib: BTreeMap::new(),
            next_hops: BTreeMap::new(),
            strategies: BTreeMap::new(),
            pit: Vec::new(),
            dead_nonces: VecDeque::new(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            management_enabled: true,
            command_failures: HashMap::new(),
            dataset_failures: HashMap::new(),
            address: None,
            start_timestamp: unix_millis(),
            n_in_interests: 0,
            n_in_datas: 0,
            n_out_interests: 0,
            n_out_datas: 0,
        }
    }

    fn add_face(&mut self, kind: FaceKind, uri: String, persistency: FacePersistency) -> u64 {
        let face_id = self.next_face_id;
        self.next_face_id += 1;

        let local_uri = match &kind {
            FaceKind::Remote { .. } => format!(
                "udp://{}",
                self.address.as_deref().unwrap_or("0.0.0.0")
            ),
            _ => "unix:///run/nfd.sock".to_string(),
        };
        self.faces.insert(
            face_id,
            FaceEntry {
                kind,
                uri,
                local_uri,
                persistency,
                counters: FaceCounters::default(),
            },
        );
        face_id
    }

    fn add_app_face(&mut self, inbox: Inbox) -> u64 {
        let fd = self.next_app_fd;
        self.next_app_fd += 1;
        self.add_face(
            FaceKind::App {
                inbox,
                local_control: HashSet::new(),
            },
            format!("fd://{}", fd),
            FacePersistency::OnDemand,
        )
    }

    fn remote_face(&self, address: &str) -> Option<u64> {
        self.faces.iter().find_map(|(face_id, face)| match &face.kind {
            FaceKind::Remote { address: a } if a == address => Some(*face_id),
            _ => None,
        })
    }

    fn remove_face(&mut self, face_id: u64) -> bool {
        if self.faces.remove(&face_id).is_none() {
            return false;
        }
        for routes in self.rib.values_mut() {
            routes.retain(|route| route.face_id != face_id);
        }
        self.rib.retain(|_, routes| !routes.is_empty());
        for hops in self.next_hops.values_mut() {
            hops.retain(|hop| hop.face_id != face_id);
        }
        self.next_hops.retain(|_, hops| !hops.is_empty());
        self.pit.retain(|entry| entry.in_face != face_id);
        true
    }

    fn register_route(&mut self, prefix: Name, route: Route) {
        let routes = self.rib.entry(prefix).or_default();
        routes.retain(|r| !(r.face_id == route.face_id && r.origin == route.origin));
        routes.push(route);
    }

    fn unregister_route(&mut self, prefix: &Name, face_id: u64, origin: u64) {
        if let Some(routes) = self.rib.get_mut(prefix) {
            routes.retain(|r| !(r.face_id == face_id && r.origin == origin));
            if routes.is_empty() {
                self.rib.remove(prefix);
            }
        }
    }

    fn fib(&self) -> Vec<FibEntry> {
        fn push_hop(hops: &mut Vec<NextHopRecord>, face_id: u64, cost: u64) {
            match hops.iter_mut().find(|hop| hop.face_id == face_id) {
                Some(hop) => hop.cost = hop.cost.min(cost),
                None => hops.push(NextHopRecord { face_id, cost }),
            }
        }

        let mut table: BTreeMap<Name, Vec<NextHopRecord>> = BTreeMap::new();
        for (prefix, routes) in &self.rib {
            for route in routes.iter().filter(|r| self.faces.contains_key(&r.face_id)) {
                push_hop(table.entry(prefix.clone()).or_default(), route.face_id, route.cost);
            }
        }
        for (prefix, hops) in &self.next_hops {
            for hop in hops.iter().filter(|h| self.faces.contains_key(&h.face_id)) {
                push_hop(table.entry(prefix.clone()).or_default(), hop.face_id, hop.cost);
            }
        }

        table
            .into_iter()
            .filter(|(_, hops)| !hops.is_empty())
            .map(|(prefix, mut next_hops)| {
                next_hops.sort_by_key(|hop| (hop.cost, hop.face_id));
                FibEntry { prefix, next_hops }
            })
            .collect()
    }

    fn rib_entries(&self) -> Vec<RibEntry> {
        self.rib
            .iter()
            .map(|(name, routes)| RibEntry {
                name: name.clone(),
                routes: routes.clone(),
            })
            .collect()
    }

    fn status(&self) -> ForwarderStatus {
        ForwarderStatus {
            nfd_version: NFD_VERSION.to_string(),
            start_timestamp: self.start_timestamp,
            current_timestamp: unix_millis(),
            n_name_tree_entries: (self.rib.len() + self.pit.len()) as u64,
            n_fib_entries: self.fib().len() as u64,
            n_pit_entries: self.pit.len() as u64,
            n_measurement_entries: 0,
            n_cs_entries: 0,
            n_in_interests: self.n_in_interests,
            n_in_datas: self.n_in_datas,
            n_in_nacks: 0,
            n_out_interests: self.n_out_interests,
            n_out_datas: self.n_out_datas,
            n_out_nacks: 0,
        }
    }

    fn expire_pit(&mut self) {
        let now = Instant::now();
        self.pit.retain(|entry| entry.expires_at > now);
    }

    /// Records the nonce; false when it was seen before
    fn remember_nonce(&mut self, interest: &Interest) -> bool {
        let key = (interest.name.clone(), interest.nonce);
        if self.dead_nonces.contains(&key) {
            return false;
        }
        if self.dead_nonces.len() >= DEAD_NONCE_CAPACITY {
            self.dead_nonces.pop_front();
        }
        self.dead_nonces.push_back(key);
        true
    }

    fn deliver(&mut self, face_id: u64, packet: Packet) -> Option<Delivery> {
        let face = self.faces.get_mut(&face_id)?;
        match &packet {
            Packet::Interest(_) => {
                face.counters.out_interests += 1;
                self.n_out_interests += 1;
            }
            Packet::Data(data) => {
                face.counters.out_datas += 1;
                face.counters.out_bytes += data.content.len() as u64;
                self.n_out_datas += 1;
            }
        }
        match &face.kind {
            FaceKind::Internal => None,
            FaceKind::App { inbox, .. } => Some(Delivery::Local(inbox.clone(), packet)),
            FaceKind::Remote { address } => Some(Delivery::Remote {
                to: address.clone(),
                packet,
            }),
        }
    }

    /* ------------------------------------------------------------ *
     * Interest and Data pipelines
     * ------------------------------------------------------------ */

    fn on_interest(&mut self, in_face: u64, interest: Interest) -> Vec<Delivery> {
        let from_app = match self.faces.get_mut(&in_face) {
            Some(face) => {
                face.counters.in_interests += 1;
                face.is_app()
            }
            None => return Vec::new(),
        };
        self.n_in_interests += 1;
        self.expire_pit();

        if !self.remember_nonce(&interest) {
            trace!("[Forwarder] Duplicate nonce for {}, dropping", interest.name);
            return Vec::new();
        }

        let localhost = Name::from_uri("/localhost").unwrap_or_default();
        if localhost.is_prefix_of(&interest.name) {
            if !from_app {
                trace!("[Forwarder] /localhost Interest from face {} dropped", in_face);
                return Vec::new();
            }
            return self
                .management(in_face, &interest)
                .and_then(|data| self.deliver(in_face, Packet::Data(data)))
                .into_iter()
                .collect();
        }

        let localhop = Name::from_uri("/localhop").unwrap_or_default();
        let scoped = !from_app && localhop.is_prefix_of(&interest.name);

        let fib = self.fib();
        let entry = fib
            .iter()
            .filter(|entry| entry.prefix.is_prefix_of(&interest.name))
            .max_by_key(|entry| entry.prefix.len());
        let next_hop = entry.and_then(|entry| {
            entry.next_hops.iter().find(|hop| {
                hop.face_id != in_face
                    && self
                        .faces
                        .get(&hop.face_id)
                        .map(|face| !scoped || face.is_app())
                        .unwrap_or(false)
            })
        });

        let next_hop = match next_hop {
            Some(hop) => hop.face_id,
            None => {
                trace!("[Forwarder] No route for {}", interest.name);
                return Vec::new();
            }
        };

        self.pit.push(PitEntry {
            interest: interest.clone(),
            in_face,
            expires_at: Instant::now() + interest.lifetime(),
        });
        self.deliver(next_hop, Packet::Interest(interest))
            .into_iter()
            .collect()
    }

    fn on_data(&mut self, in_face: u64, data: Data) -> Vec<Delivery> {
        match self.faces.get_mut(&in_face) {
            Some(face) => {
                face.counters.in_datas += 1;
                face.counters.in_bytes += data.content.len() as u64;
            }
            None => return Vec::new(),
        }
        self.n_in_datas += 1;
        self.expire_pit();

        let mut downstreams = Vec::new();
        self.pit.retain(|entry| {
            if entry.interest.matches_data(&data) {
                if !downstreams.contains(&entry.in_face) {
                    downstreams.push(entry.in_face);
                }
                false
            } else {
                true
            }
        });

        if downstreams.is_empty() {
            trace!("[Forwarder] Unsolicited Data {}", data.name);
        }

        downstreams
            .into_iter()
            .filter(|face_id| *face_id != in_face)
            .filter_map(|face_id| self.deliver(face_id, Packet::Data(data.clone())))
            .collect()
    }

    /* ------------------------------------------------------------ *
     * Management
     * ------------------------------------------------------------ */

    fn management(&mut self, in_face: u64, interest: &Interest) -> Option<Data> {
        if !self.management_enabled {
            return None;
        }
        let name = &interest.name;
        let module = name.get(2).map(|c| c.to_string());
        let verb = name.get(3).map(|c| c.to_string());

        match (module.as_deref(), verb.as_deref()) {
            (None, _) | (Some("status"), _) => self.dataset(name, "status"),
            (Some(module @ ("faces" | "fib" | "rib")), Some("list")) => {
                let key = format!("{}/list", module);
                self.dataset(name, &key)
            }
            (Some(module), Some(verb)) => {
                let response = self.command(in_face, module, verb, name);
                Some(Data::new(name.clone(), response.wire_encode()))
            }
            _ => None,
        }
    }

    fn dataset(&mut self, name: &Name, key: &str) -> Option<Data> {
        if let Some(response) = self.dataset_failures.remove(key) {
            return Some(Data::new(name.clone(), response.wire_encode()));
        }

        let mut base = Name::from_uri(LOCALHOST_NFD).ok()?;
        for part in key.split('/') {
            base = base.append_str(part);
        }

        let content = match key {
            "faces/list" => encode_entries(
                self.faces.iter().map(|(id, face)| face.status(*id)),
                FaceStatus::encode,
            ),
            "fib/list" => encode_entries(self.fib().into_iter(), FibEntry::encode),
            "rib/list" => encode_entries(self.rib_entries().into_iter(), RibEntry::encode),
            _ => self.status().wire_encode(),
        };

        let segment = if name.len() > base.len() {
            match name.get_from_end(1).map(|c| c.to_segment()) {
                Some(Ok(segment)) => segment,
                _ => 0,
            }
        } else {
            0
        };

        let size = self.segment_size.max(1);
        let last = if content.is_empty() {
            0
        } else {
            ((content.len() - 1) / size) as u64
        };
        if segment > last {
            return None;
        }

        let start = (segment as usize) * size;
        let end = (start + size).min(content.len());
        let chunk = content.slice(start.min(end)..end);

        Some(
            Data::new(base.append_segment(segment), chunk)
                .with_freshness_period(DATASET_FRESHNESS_MS)
                .with_final_block_id(NameComponent::from_segment(last)),
        )
    }

    fn command(&mut self, in_face: u64, module: &str, verb: &str, name: &Name) -> ControlResponse {
        let key = format!("{}/{}", module, verb);
        if let Some(response) = self.command_failures.remove(&key) {
            return response;
        }
        if name.len() != 5 + SIGNATURE_COMPONENTS {
            return ControlResponse::new(403, "Authorization rejected");
        }
        let parameters = match name
            .get(4)
            .map(|component| ControlParameters::wire_decode(component.as_bytes()))
        {
            Some(Ok(parameters)) => parameters,
            _ => return ControlResponse::new(400, "Malformed command"),
        };

        debug!("[Forwarder] Command {} from face {}", key, in_face);
        match key.as_str() {
            "faces/create" => self.create_face(parameters),
            "faces/destroy" => match parameters.face_id {
                Some(face_id) => {
                    self.remove_face(face_id);
                    ok(parameters)
                }
                None => ControlResponse::new(400, "FaceId is required"),
            },
            "faces/enable-local-control" | "faces/disable-local-control" => {
                self.local_control(in_face, verb == "enable-local-control", parameters)
            }
            "rib/register" => self.rib_register(in_face, parameters),
            "rib/unregister" => match parameters.name.clone() {
                Some(prefix) => {
                    let face_id = requested_face(&parameters, in_face);
                    let origin = parameters.origin.unwrap_or(ORIGIN_APP);
                    self.unregister_route(&prefix, face_id, origin);
                    ok(parameters.with_face_id(face_id).with_origin(origin))
                }
                None => ControlResponse::new(400, "Name is required"),
            },
            "fib/add-nexthop" => self.add_next_hop(in_face, parameters),
            "strategy-choice/set" => match (parameters.name.clone(), parameters.strategy.clone()) {
                (Some(prefix), Some(strategy)) => {
                    self.strategies.insert(prefix, strategy);
                    ok(parameters)
                }
                _ => ControlResponse::new(400, "Name and Strategy are required"),
            },
            _ => ControlResponse::new(501, "Unsupported command"),
        }
    }

    fn create_face(&mut self, parameters: ControlParameters) -> ControlResponse {
        let uri = match parameters.uri.clone() {
            Some(uri) => uri,
            None => return ControlResponse::new(400, "Uri is required"),
        };
        let address = match parse_udp_uri(&uri) {
            Ok(address) => address,
            Err(response) => return response,
        };

        let face_id = match self.remote_face(&address) {
            Some(face_id) => {
                if let Some(face) = self.faces.get_mut(&face_id) {
                    face.persistency = FacePersistency::Persistent;
                }
                face_id
            }
            None => self.add_face(
                FaceKind::Remote { address },
                uri.clone(),
                FacePersistency::Persistent,
            ),
        };
        ok(parameters.with_face_id(face_id))
    }

    fn local_control(
        &mut self,
        in_face: u64,
        enable: bool,
        parameters: ControlParameters,
    ) -> ControlResponse {
        let feature = match parameters
            .local_control_feature
            .map(LocalControlHeader::from_number)
        {
            Some(Ok(feature)) => feature.number(),
            _ => return ControlResponse::new(400, "LocalControlFeature is required"),
        };
        match self.faces.get_mut(&in_face).map(|face| &mut face.kind) {
            Some(FaceKind::App { local_control, .. }) => {
                if enable {
                    local_control.insert(feature);
                } else {
                    local_control.remove(&feature);
                }
                ok(parameters)
            }
            _ => ControlResponse::new(412, "Face is non-local"),
        }
    }

    fn rib_register(&mut self, in_face: u64, parameters: ControlParameters) -> ControlResponse {
        let prefix = match parameters.name.clone() {
            Some(prefix) => prefix,
            None => return ControlResponse::new(400, "Name is required"),
        };
        let face_id = requested_face(&parameters, in_face);
        if !self.faces.contains_key(&face_id) {
            return ControlResponse::new(410, "Face not found");
        }

        let mut route = Route::new(
            face_id,
            parameters.origin.unwrap_or(ORIGIN_APP),
            parameters.cost.unwrap_or(0),
            parameters.flags.unwrap_or_default(),
        );
        route.expiration_period = parameters.expiration_period;
        self.register_route(prefix, route.clone());

        ok(parameters
            .with_face_id(route.face_id)
            .with_origin(route.origin)
            .with_cost(route.cost)
            .with_flags(route.flags))
    }

    fn add_next_hop(&mut self, in_face: u64, parameters: ControlParameters) -> ControlResponse {
        let prefix = match parameters.name.clone() {
            Some(prefix) => prefix,
            None => return ControlResponse::new(400, "Name is required"),
        };
        let face_id = requested_face(&parameters, in_face);
        if !self.faces.contains_key(&face_id) {
            return ControlResponse::new(410, "Face not found");
        }
        let cost = parameters.cost.unwrap_or(0);

        let hops = self.next_hops.entry(prefix).or_default();
        hops.retain(|hop| hop.face_id != face_id);
        hops.push(NextHopRecord { face_id, cost });
        ok(parameters.with_face_id(face_id).with_cost(cost))
    }
}

fn ok(parameters: ControlParameters) -> ControlResponse {
    ControlResponse::new(200, "OK").with_body(parameters)
}

/// FaceId 0 or absent means the face the command came from
fn requested_face(parameters: &ControlParameters, in_face: u64) -> u64 {
    match parameters.face_id {
        Some(0) | None => in_face,
        Some(face_id) => face_id,
    }
}

/// Host part of `udp://host[:port]` or `udp4://host[:port]`
fn parse_udp_uri(uri: &str) -> std::result::Result<String, ControlResponse> {
    let rest = uri
        .strip_prefix("udp://")
        .or_else(|| uri.strip_prefix("udp4://"))
        .ok_or_else(|| ControlResponse::new(406, "Unsupported protocol"))?;
    let host = rest.trim_end_matches('/');
    let host = host.split(':').next().unwrap_or("");
    if host.is_empty() {
        return Err(ControlResponse::new(400, "Malformed URI"));
    }
    Ok(host.to_string())
}

fn encode_entries<T>(entries: impl Iterator<Item = T>, encode: fn(&T, &mut TlvEncoder)) -> Bytes {
    let mut out = Vec::new();
    for entry in entries {
        let mut encoder = TlvEncoder::new();
        encode(&entry, &mut encoder);
        out.extend_from_slice(&encoder.finish());
    }
    Bytes::from(out)
}

/* ---------------------------------------------------------------- *
 * Forwarder handle
 * ---------------------------------------------------------------- */

struct Shared {
    state: Mutex<ForwarderState>,
    radio: Mutex<Option<MemoryRadio>>,
}

/// Handle to an in-memory forwarder; clones share the same tables.
#[derive(Clone)]
pub struct MemoryForwarder {
    shared: Arc<Shared>,
}

impl Default for MemoryForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryForwarder {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ForwarderState::new()),
                radio: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ForwarderState> {
        lock(&self.shared.state)
    }

    /// Join `radio` under `address`
    pub fn attach(&self, radio: &MemoryRadio, address: &str) {
        self.state().address = Some(address.to_string());
        *lock(&self.shared.radio) = Some(radio.clone());
        radio.attach(address, &self.shared);
        debug!("[Forwarder {}] Attached to radio", address);
    }

    /// Address on the radio, if attached
    pub fn address(&self) -> Option<String> {
        self.state().address.clone()
    }

    /// Open an application face with a signing identity
    pub fn connect(&self) -> MemoryTransport {
        self.open_app_face(true)
    }

    /// Open an application face that cannot sign commands
    pub fn connect_without_identity(&self) -> MemoryTransport {
        self.open_app_face(false)
    }

    fn open_app_face(&self, identity: bool) -> MemoryTransport {
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let face_id = self.state().add_app_face(inbox.clone());
        trace!("[Forwarder] Application face {} opened", face_id);
        MemoryTransport {
            forwarder: self.clone(),
            face_id,
            inbox,
            identity,
            closed: AtomicBool::new(false),
            next_signature: AtomicU64::new(1),
        }
    }

    /* ------------------------------------------------------------ *
     * Knobs
     * ------------------------------------------------------------ */

    /// Maximum content bytes per dataset segment
    pub fn set_segment_size(&self, segment_size: usize) {
        self.state().segment_size = segment_size.max(1);
    }

    /// When disabled, management Interests go unanswered
    pub fn set_management_enabled(&self, enabled: bool) {
        self.state().management_enabled = enabled;
    }

    /// Answer the next `module/verb` command with the given status
    pub fn fail_next_command(&self, command: &str, code: u64, text: &str) {
        self.state()
            .command_failures
            .insert(command.to_string(), ControlResponse::new(code, text));
    }

    /// Answer the next request for a dataset (`faces/list`, ...) with a
    /// ControlResponse instead of content
    pub fn fail_next_dataset(&self, dataset: &str, code: u64, text: &str) {
        self.state()
            .dataset_failures
            .insert(dataset.to_string(), ControlResponse::new(code, text));
    }

    /* ------------------------------------------------------------ *
     * Inspection and out-of-band changes
     * ------------------------------------------------------------ */

    pub fn faces(&self) -> Vec<FaceStatus> {
        self.state()
            .faces
            .iter()
            .map(|(id, face)| face.status(*id))
            .collect()
    }

    pub fn fib(&self) -> Vec<FibEntry> {
        self.state().fib()
    }

    pub fn rib(&self) -> Vec<RibEntry> {
        self.state().rib_entries()
    }

    pub fn status(&self) -> ForwarderStatus {
        self.state().status()
    }

    pub fn strategy(&self, prefix: &Name) -> Option<Name> {
        self.state().strategies.get(prefix).cloned()
    }

    /// FaceId of the face towards `address`
    pub fn face_to(&self, address: &str) -> Option<u64> {
        self.state().remote_face(address)
    }

    /// Destroy a face behind the management protocol's back
    pub fn destroy_face(&self, face_id: u64) -> bool {
        self.state().remove_face(face_id)
    }

    /// Remove every route for `prefix` behind the management protocol's back
    pub fn remove_routes(&self, prefix: &Name) {
        self.state().rib.remove(prefix);
    }

    /* ------------------------------------------------------------ *
     * Packet entry points
     * ------------------------------------------------------------ */

    fn execute(&self, deliveries: Vec<Delivery>) {
        if deliveries.is_empty() {
            return;
        }
        let radio = lock(&self.shared.radio).clone();
        let address = self.address();

        for delivery in deliveries {
            match delivery {
                Delivery::Local(inbox, packet) => lock(&inbox).push_back(packet),
                Delivery::Remote { to, packet } => match (&radio, &address) {
                    (Some(radio), Some(from)) => {
                        radio.transmit(from, &to, packet);
                    }
                    _ => trace!("[Forwarder] Not on a radio, dropping packet for {}", to),
                },
            }
        }
    }

    fn app_interest(&self, face_id: u64, interest: Interest) {
        let deliveries = self.state().on_interest(face_id, interest);
        self.execute(deliveries);
    }

    fn app_data(&self, face_id: u64, data: Data) {
        let deliveries = self.state().on_data(face_id, data);
        self.execute(deliveries);
    }

    /// A packet arrived over the radio from `from`
    fn receive_remote(&self, from: &str, packet: Packet) {
        let deliveries = {
            let mut state = self.state();
            let face_id = match state.remote_face(from) {
                Some(face_id) => face_id,
                None => {
                    let face_id = state.add_face(
                        FaceKind::Remote {
                            address: from.to_string(),
                        },
                        format!("udp://{}", from),
                        FacePersistency::OnDemand,
                    );
                    debug!("[Forwarder] On-demand face {} for {}", face_id, from);
                    face_id
                }
            };
            match packet {
                Packet::Interest(interest) => state.on_interest(face_id, interest),
                Packet::Data(data) => state.on_data(face_id, data),
            }
        };
        self.execute(deliveries);
    }

    fn app_register(&self, face_id: u64, prefix: &Name) {
        self.state().register_route(
            prefix.clone(),
            Route::new(face_id, ORIGIN_APP, 0, ForwardingFlags::default()),
        );
    }

    fn app_unregister(&self, face_id: u64, prefix: &Name) {
        self.state().unregister_route(prefix, face_id, ORIGIN_APP);
    }

    fn close_app_face(&self, face_id: u64) {
        self.state().remove_face(face_id);
    }
}

impl Connector for MemoryForwarder {
    fn connect(&self) -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(MemoryForwarder::connect(self)))
    }
}

/* ---------------------------------------------------------------- *
 * Application transport
 * ---------------------------------------------------------------- */

/// An application's connection to a [`MemoryForwarder`]
pub struct MemoryTransport {
    forwarder: MemoryForwarder,
    face_id: u64,
    inbox: Inbox,
    identity: bool,
    closed: AtomicBool,
    next_signature: AtomicU64,
}

impl MemoryTransport {
    /// FaceId of this application on the forwarder
    pub fn face_id(&self) -> u64 {
        self.face_id
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Transport(format!(
                "Application face {} is closed",
                self.face_id
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn sign_command(&self, name: &Name) -> Result<Name> {
        if !self.identity {
            return Err(Error::Security(
                "No signing identity configured".to_string(),
            ));
        }
        let counter = self.next_signature.fetch_add(1, Ordering::Relaxed);
        Ok(name
            .append(NameComponent::new(unix_millis().to_be_bytes().to_vec()))
            .append(NameComponent::new(counter.to_be_bytes().to_vec()))
            .append(NameComponent::new(Bytes::from_static(&[0x16, 0x03, 0x1b, 0x01, 0x01])))
            .append(NameComponent::new(Bytes::from_static(&[0x17, 0x00]))))
    }

    async fn send_interest(&self, interest: &Interest) -> Result<()> {
        self.ensure_open()?;
        self.forwarder.app_interest(self.face_id, interest.clone());
        Ok(())
    }

    async fn put_data(&self, data: &Data) -> Result<()> {
        self.ensure_open()?;
        self.forwarder.app_data(self.face_id, data.clone());
        Ok(())
    }

    async fn register_prefix(&self, prefix: &Name) -> Result<()> {
        self.ensure_open()?;
        self.forwarder.app_register(self.face_id, prefix);
        Ok(())
    }

    async fn unregister_prefix(&self, prefix: &Name) -> Result<()> {
        self.ensure_open()?;
        self.forwarder.app_unregister(self.face_id, prefix);
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<Packet>> {
        self.ensure_open()?;
        Ok(lock(&self.inbox).drain(..).collect())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.forwarder.close_app_face(self.face_id);
        }
    }
}

/* ---------------------------------------------------------------- *
 * Radio
 * ---------------------------------------------------------------- */

struct RadioNode {
    forwarder: Weak<Shared>,
    reachable: bool,
}

/// Shared medium linking forwarders by address
#[derive(Clone, Default)]
pub struct MemoryRadio {
    nodes: Arc<Mutex<HashMap<String, RadioNode>>>,
}

impl MemoryRadio {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, address: &str, shared: &Arc<Shared>) {
        lock(&self.nodes).insert(
            address.to_string(),
            RadioNode {
                forwarder: Arc::downgrade(shared),
                reachable: true,
            },
        );
    }

    /// Take a node out of range (or bring it back)
    pub fn set_reachable(&self, address: &str, reachable: bool) {
        match lock(&self.nodes).get_mut(address) {
            Some(node) => node.reachable = reachable,
            None => warn!("[Radio] Unknown address {}", address),
        }
    }

    pub fn detach(&self, address: &str) {
        lock(&self.nodes).remove(address);
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = lock(&self.nodes).keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Hand `packet` to the forwarder at `to`; false when it was lost
    fn transmit(&self, from: &str, to: &str, packet: Packet) -> bool {
        let target = {
            let nodes = lock(&self.nodes);
            let sender_up = nodes.get(from).map(|node| node.reachable).unwrap_or(false);
            nodes
                .get(to)
                .filter(|node| sender_up && node.reachable)
                .and_then(|node| node.forwarder.upgrade())
        };

        match target {
            Some(shared) => {
                trace!("[Radio] {} -> {}: {}", from, to, packet.name());
                MemoryForwarder { shared }.receive_remote(from, packet);
                true
            }
            None => {
                trace!("[Radio] {} -> {} lost: {}", from, to, packet.name());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{face::spawn_event_pump, ClientOptions, Face, NfdClient};
    use std::time::Duration;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn pumped(forwarder: &MemoryForwarder) -> Arc<Face> {
        let face = Arc::new(Face::new(Arc::new(forwarder.connect())));
        spawn_event_pump(face.clone(), Duration::from_millis(1));
        face
    }

    #[test]
    fn test_parse_udp_uri() {
        assert_eq!(parse_udp_uri("udp://10.0.0.1").unwrap(), "10.0.0.1");
        assert_eq!(parse_udp_uri("udp4://10.0.0.1:6363").unwrap(), "10.0.0.1");
        assert_eq!(parse_udp_uri("tcp://10.0.0.1").unwrap_err().status_code, 406);
        assert_eq!(parse_udp_uri("udp://").unwrap_err().status_code, 400);
    }

    #[test]
    fn test_fib_follows_rib_and_faces() {
        let forwarder = MemoryForwarder::new();
        let face_id = {
            let mut state = forwarder.state();
            let face_id = state.add_face(
                FaceKind::Remote {
                    address: "10.0.0.2".to_string(),
                },
                "udp://10.0.0.2".to_string(),
                FacePersistency::Persistent,
            );
            state.register_route(name("/a"), Route::new(face_id, 0, 5, ForwardingFlags::default()));
            state.register_route(name("/a"), Route::new(face_id, 255, 1, ForwardingFlags::default()));
            face_id
        };

        let fib = forwarder.fib();
        assert_eq!(fib.len(), 1);
        assert_eq!(fib[0].next_hops, vec![NextHopRecord { face_id, cost: 1 }]);

        assert!(forwarder.destroy_face(face_id));
        assert!(forwarder.fib().is_empty());
        assert!(forwarder.rib().is_empty());
    }

    #[test]
    fn test_duplicate_nonce_is_dropped() {
        let forwarder = MemoryForwarder::new();
        let producer = forwarder.connect();
        forwarder.app_register(producer.face_id(), &name("/p"));
        let consumer = forwarder.connect();

        let interest = Interest::new(name("/p/x")).with_nonce(7);
        forwarder.app_interest(consumer.face_id(), interest.clone());
        forwarder.app_interest(consumer.face_id(), interest);
        assert_eq!(lock(&producer.inbox).len(), 1);
    }

    #[tokio::test]
    async fn test_interest_crosses_the_radio() {
        let radio = MemoryRadio::new();
        let a = MemoryForwarder::new();
        let b = MemoryForwarder::new();
        a.attach(&radio, "192.168.49.1");
        b.attach(&radio, "192.168.49.20");

        let producer = pumped(&b);
        let mut interests = producer.register_prefix(&name("/b")).await.unwrap();
        tokio::spawn(async move {
            while let Some(interest) = interests.recv().await {
                let data = Data::new(interest.name.clone(), Bytes::from_static(b"from b"));
                producer.put_data(data).await.unwrap();
            }
        });

        let consumer = pumped(&a);
        let nfd = NfdClient::new(consumer.clone(), ClientOptions::default());
        let face_id = nfd.create_face("udp://192.168.49.20").await.unwrap();
        nfd.register_route(&name("/b"), face_id, 0).await.unwrap();

        let data = consumer
            .express_interest(Interest::new(name("/b/hello")).with_lifetime(1000))
            .await
            .unwrap();
        assert_eq!(data.content.as_ref(), b"from b");

        // b learned about a through an on-demand face
        let on_demand = b.face_to("192.168.49.1").unwrap();
        let status = b.faces().into_iter().find(|f| f.face_id == on_demand).unwrap();
        assert_eq!(status.face_persistency, FacePersistency::OnDemand);
    }

    #[tokio::test(start_paused = true)]
    async fn test_localhop_is_not_relayed() {
        let radio = MemoryRadio::new();
        let a = MemoryForwarder::new();
        let b = MemoryForwarder::new();
        let c = MemoryForwarder::new();
        a.attach(&radio, "10.0.0.1");
        b.attach(&radio, "10.0.0.2");
        c.attach(&radio, "10.0.0.3");

        // c serves /localhop/x, b routes it towards c, a towards b
        let producer = pumped(&c);
        let mut interests = producer.register_prefix(&name("/localhop/x")).await.unwrap();

        let b_face = pumped(&b);
        let b_nfd = NfdClient::new(b_face, ClientOptions::default());
        let to_c = b_nfd.create_face("udp://10.0.0.3").await.unwrap();
        b_nfd.register_route(&name("/localhop/x"), to_c, 0).await.unwrap();

        let a_face = pumped(&a);
        let a_nfd = NfdClient::new(a_face.clone(), ClientOptions::default());
        let to_b = a_nfd.create_face("udp://10.0.0.2").await.unwrap();
        a_nfd.register_route(&name("/localhop/x"), to_b, 0).await.unwrap();

        let result = a_face
            .express_interest(Interest::new(name("/localhop/x/1")).with_lifetime(500))
            .await;
        assert!(result.unwrap_err().is_timeout());
        assert!(interests.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_node_loses_packets() {
        let radio = MemoryRadio::new();
        let a = MemoryForwarder::new();
        let b = MemoryForwarder::new();
        a.attach(&radio, "10.0.0.1");
        b.attach(&radio, "10.0.0.2");
        radio.set_reachable("10.0.0.2", false);

        let face = pumped(&a);
        let nfd = NfdClient::new(face.clone(), ClientOptions::default());
        let to_b = nfd.create_face("udp://10.0.0.2").await.unwrap();
        nfd.register_route(&name("/b"), to_b, 0).await.unwrap();

        let result = face
            .express_interest(Interest::new(name("/b/1")).with_lifetime(500))
            .await;
        assert!(result.unwrap_err().is_timeout());
        assert!(b.face_to("10.0.0.1").is_none());
        assert_eq!(radio.addresses(), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_management_scope() {
        let radio = MemoryRadio::new();
        let a = MemoryForwarder::new();
        a.attach(&radio, "10.0.0.1");

        // a remote face cannot reach /localhost
        let b = MemoryForwarder::new();
        b.attach(&radio, "10.0.0.2");
        radio.transmit("10.0.0.2", "10.0.0.1", Packet::Interest(Interest::new(name("/localhost/nfd"))));
        let remote = a.face_to("10.0.0.2").unwrap();
        let status = a.faces().into_iter().find(|f| f.face_id == remote).unwrap();
        assert_eq!(status.out_datas, 0);
        assert_eq!(status.in_interests, 1);
    }
}
