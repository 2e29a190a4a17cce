//! The mesh controller.
//!
//! Five loops run independently on their own timers: peer discovery,
//! probing, face/route consistency, group consistency and the face event
//! pump. Every change to the forwarder's face table goes through a single
//! command worker so that creations and destructions never interleave.
//!
//! The peer table lives behind one lock which is only held to read or
//! update it; commands are collected under the lock and submitted after it
//! is released.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, Weak},
    time::Duration,
};

use futures::future::join_all;
use log::{debug, error, info, trace, warn};
use ndn_mesh_common::{
    metrics::MeshMetrics, Data, Error, ForwardingFlags, Interest, Name, Result,
};
use ndn_mesh_mgmt::{spawn_event_pump, ClientOptions, Connector, Face, NfdClient};
use tokio::{
    sync::{mpsc, oneshot, Mutex, RwLock},
    task::JoinHandle,
    time::{sleep, Instant},
};

use crate::{
    config::MeshConfig,
    discovery::{ConnectionInfo, DiscoveredDevice, PeerDiscovery},
    peer::Peer,
    probe,
};

/// Capacity of the face command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 100;

/// Face table mutations, executed one at a time by the command worker
#[derive(Debug)]
enum FaceCommand {
    CreateFace {
        address: String,
        register_probe_prefix: bool,
    },
    DestroyFace {
        face_id: u64,
    },
    RegisterPrefixes {
        face_id: u64,
        prefixes: Vec<Name>,
    },
    UnregisterPrefix {
        face_id: u64,
        prefix: Name,
    },
    RegisterOwnPrefix {
        prefix: Name,
    },
    Cleanup {
        own_prefix: Option<Name>,
        face_ids: Vec<u64>,
        recreate_face: bool,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct MeshState {
    peers: HashMap<String, Peer>,

    /// Addresses with a CreateFace command in flight
    pending_faces: HashSet<String>,

    /// Last discovery snapshot
    devices: Arc<Vec<DiscoveredDevice>>,

    my_address: Option<String>,
    group_owner_address: Option<String>,
    is_group_owner: bool,
    own_prefix_registered: bool,

    /// Consecutive group checks that found no peers
    group_timeouts: u32,
}

impl MeshState {
    /// Mark `address` as pending; false when it needs no new face
    fn claim_face(&mut self, address: &str) -> bool {
        if self.my_address.as_deref() == Some(address) || self.peers.contains_key(address) {
            return false;
        }
        self.pending_faces.insert(address.to_string())
    }
}

/// What the discovery cycle concluded about our group membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Membership {
    Steady,
    Joined,
    Lost,
}

struct FaceHandle {
    face: Arc<Face>,
    pump: JoinHandle<()>,
}

struct Inner {
    config: MeshConfig,
    probe_prefix: Name,
    client_options: ClientOptions,
    connector: Arc<dyn Connector>,
    discovery: Arc<dyn PeerDiscovery>,
    face: RwLock<FaceHandle>,
    state: Mutex<MeshState>,
    commands: mpsc::Sender<FaceCommand>,
    responder: StdMutex<Option<JoinHandle<()>>>,
    metrics: MeshMetrics,
}

/// Keeps a forwarder's faces and routes in line with the mesh around it.
pub struct MeshController {
    inner: Arc<Inner>,
    worker: JoinHandle<()>,
    loops: StdMutex<Vec<JoinHandle<()>>>,
}

fn lock_std<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MeshController {
    /// Connect the management face and start the command worker.
    ///
    /// Must be called from within a tokio runtime. The loops only run
    /// after [`MeshController::start`].
    pub fn new(
        config: MeshConfig,
        connector: Arc<dyn Connector>,
        discovery: Arc<dyn PeerDiscovery>,
    ) -> Result<Self> {
        config.validate()?;
        let probe_prefix = config.probe_prefix_name()?;

        let face = Arc::new(Face::new(connector.connect()?));
        let pump = spawn_event_pump(face.clone(), config.event_pump_period());
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        let inner = Arc::new(Inner {
            config,
            probe_prefix,
            client_options: ClientOptions::default(),
            connector,
            discovery,
            face: RwLock::new(FaceHandle { face, pump }),
            state: Mutex::new(MeshState::default()),
            commands,
            responder: StdMutex::new(None),
            metrics: MeshMetrics::new(),
        });
        let worker = tokio::spawn(run_worker(Arc::downgrade(&inner), receiver));

        Ok(Self {
            inner,
            worker,
            loops: StdMutex::new(Vec::new()),
        })
    }

    /// Spawn the discovery, probe and consistency loops
    pub fn start(&self) {
        let mut loops = lock_std(&self.loops);
        if !loops.is_empty() {
            debug!("[Mesh] Already started");
            return;
        }
        let config = &self.inner.config;
        let ms = Duration::from_millis;

        loops.push(spawn_loop(
            "discovery",
            self.inner.clone(),
            ms(config.discovery_initial_delay_ms),
            config.discovery_period(),
            |inner| async move { inner.discover_once().await },
        ));
        loops.push(spawn_loop(
            "probe",
            self.inner.clone(),
            ms(config.probe_initial_delay_ms),
            config.probe_period(),
            |inner| async move { inner.probe_once().await },
        ));
        loops.push(spawn_loop(
            "face/route consistency",
            self.inner.clone(),
            ms(config.face_route_initial_delay_ms),
            config.face_route_period(),
            |inner| async move { inner.check_face_and_route_consistency().await },
        ));
        loops.push(spawn_loop(
            "group consistency",
            self.inner.clone(),
            ms(config.group_initial_delay_ms),
            config.group_period(),
            |inner| async move { inner.check_group_consistency().await },
        ));
        info!("[Mesh] Controller started");
    }

    /// Stop the loops and the probe responder, tear down what the
    /// controller created, leave the group and close the management face.
    pub async fn stop(&self) {
        // nothing may queue face commands behind the cleanup
        let loops: Vec<JoinHandle<()>> = lock_std(&self.loops).drain(..).collect();
        let responder = lock_std(&self.inner.responder).take();
        for handle in loops.into_iter().chain(responder) {
            handle.abort();
            let _ = handle.await;
        }

        self.inner.cleanup(false).await;
        self.flush().await;
        self.worker.abort();

        if let Err(e) = self.inner.discovery.disconnect().await {
            warn!("[Mesh] Could not leave group: {}", e);
        }

        let handle = self.inner.face.read().await;
        handle.pump.abort();
        handle.face.shutdown().await;
        info!("[Mesh] Controller stopped");
    }

    /// Wait until every face command submitted so far has run
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        if self.inner.commands.send(FaceCommand::Flush(done)).await.is_ok() {
            let _ = finished.await;
        }
    }

    /// One discovery cycle
    pub async fn discover_once(&self) -> Result<()> {
        self.inner.discover_once().await
    }

    /// Probe every peer once and wait for all answers or timeouts
    pub async fn probe_once(&self) -> Result<()> {
        self.inner.probe_once().await
    }

    pub async fn check_face_and_route_consistency(&self) -> Result<()> {
        self.inner.check_face_and_route_consistency().await
    }

    pub async fn check_group_consistency(&self) -> Result<()> {
        self.inner.check_group_consistency().await
    }

    /// React to the group details reported after a connection
    pub async fn on_connection_info(&self, info: ConnectionInfo) {
        self.inner.on_connection_info(info).await
    }

    /// The transport lost its connection: drop all state right away
    pub async fn on_channel_disconnected(&self) {
        warn!("[Mesh] Channel disconnected");
        self.inner.cleanup(true).await
    }

    /// Ask discovery to join the group of `device_address`
    pub async fn connect(&self, device_address: &str) -> Result<()> {
        self.inner.discovery.connect(device_address).await
    }

    /* ---------------------------------------------------------------- *
     * Accessors
     * ---------------------------------------------------------------- */

    /// Peers ordered by address
    pub async fn peers(&self) -> Vec<Peer> {
        let state = self.inner.state.lock().await;
        let mut peers: Vec<Peer> = state.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.ip_address.cmp(&b.ip_address));
        peers
    }

    pub async fn my_address(&self) -> Option<String> {
        self.inner.state.lock().await.my_address.clone()
    }

    pub async fn group_owner_address(&self) -> Option<String> {
        self.inner.state.lock().await.group_owner_address.clone()
    }

    pub async fn is_group_owner(&self) -> bool {
        self.inner.state.lock().await.is_group_owner
    }

    pub async fn has_registered_own_prefix(&self) -> bool {
        self.inner.state.lock().await.own_prefix_registered
    }

    pub fn metrics(&self) -> &MeshMetrics {
        &self.inner.metrics
    }

    pub fn config(&self) -> &MeshConfig {
        &self.inner.config
    }

    /// Management client on the current face
    pub async fn nfd(&self) -> NfdClient {
        self.inner.nfd().await
    }
}

impl Drop for MeshController {
    fn drop(&mut self) {
        for handle in lock_std(&self.loops).drain(..) {
            handle.abort();
        }
        self.worker.abort();
        if let Some(responder) = lock_std(&self.inner.responder).take() {
            responder.abort();
        }
        if let Ok(handle) = self.inner.face.try_read() {
            handle.pump.abort();
        }
    }
}

/// Run `step` after `initial_delay`, then again `period` after each run
/// finishes. Failures are logged and the loop carries on.
fn spawn_loop<F, Fut>(
    name: &'static str,
    inner: Arc<Inner>,
    initial_delay: Duration,
    period: Duration,
    step: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Inner>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        sleep(initial_delay).await;
        loop {
            if let Err(e) = step(inner.clone()).await {
                warn!("[Mesh] {} cycle failed: {}", name, e);
            }
            sleep(period).await;
        }
    })
}

async fn run_worker(inner: Weak<Inner>, mut commands: mpsc::Receiver<FaceCommand>) {
    while let Some(command) = commands.recv().await {
        let inner = match inner.upgrade() {
            Some(inner) => inner,
            None => break,
        };
        inner.execute(command).await;
    }
    debug!("[Mesh] Command worker stopped");
}

impl Inner {
    async fn face(&self) -> Arc<Face> {
        self.face.read().await.face.clone()
    }

    async fn nfd(&self) -> NfdClient {
        NfdClient::new(self.face().await, self.client_options.clone())
    }

    async fn submit(&self, commands: Vec<FaceCommand>) {
        for command in commands {
            trace!("[Mesh] Queue {:?}", command);
            if self.commands.send(command).await.is_err() {
                error!("[Mesh] Command worker is gone");
                return;
            }
        }
    }

    fn own_prefix(&self, address: &str) -> Name {
        probe::peer_prefix(&self.probe_prefix, address)
    }

    /* ---------------------------------------------------------------- *
     * Command worker
     * ---------------------------------------------------------------- */

    async fn execute(self: &Arc<Self>, command: FaceCommand) {
        let result = match command {
            FaceCommand::CreateFace {
                address,
                register_probe_prefix,
            } => self.create_face(&address, register_probe_prefix).await,
            FaceCommand::DestroyFace { face_id } => self.destroy_face(face_id).await,
            FaceCommand::RegisterPrefixes { face_id, prefixes } => {
                self.register_prefixes(face_id, &prefixes).await
            }
            FaceCommand::UnregisterPrefix { face_id, prefix } => {
                let nfd = self.nfd().await;
                nfd.unregister_route_on_face(&prefix, face_id).await.map(|_| {
                    self.metrics.prefixes_unregistered.increment();
                    info!("[Mesh] Unregistered {} from face {}", prefix, face_id);
                })
            }
            FaceCommand::RegisterOwnPrefix { prefix } => self.register_own_prefix(prefix).await,
            FaceCommand::Cleanup {
                own_prefix,
                face_ids,
                recreate_face,
            } => self.run_cleanup(own_prefix, face_ids, recreate_face).await,
            FaceCommand::Flush(done) => {
                let _ = done.send(());
                Ok(())
            }
        };

        if let Err(e) = result {
            self.metrics.command_failures.increment();
            warn!("[Mesh] Face command failed: {}", e);
        }
    }

    async fn create_face(&self, address: &str, register_probe_prefix: bool) -> Result<()> {
        if !self.state.lock().await.pending_faces.contains(address) {
            debug!("[Mesh] Face for {} no longer wanted", address);
            return Ok(());
        }

        let nfd = self.nfd().await;
        let face_id = match nfd.create_face(&self.config.face_uri(address)).await {
            Ok(face_id) => face_id,
            Err(e) => {
                self.state.lock().await.pending_faces.remove(address);
                return Err(e);
            }
        };
        self.metrics.faces_created.increment();

        {
            let mut state = self.state.lock().await;
            if !state.pending_faces.remove(address) {
                // a cleanup ran while the face was being created
                drop(state);
                debug!("[Mesh] Dropping face {} created for {}", face_id, address);
                return self.destroy_face(face_id).await;
            }
            let device = state
                .devices
                .iter()
                .find(|device| device.ip_address.as_deref() == Some(address))
                .cloned();
            let peer = state
                .peers
                .entry(address.to_string())
                .or_insert_with(|| Peer::new(address, face_id));
            peer.face_id = Some(face_id);
            if device.is_some() {
                peer.device = device;
            }
            let count = state.peers.len() as u64;
            self.metrics.peers.set(count);
        }
        info!("[Mesh] Face {} created for peer {}", face_id, address);

        if register_probe_prefix {
            let prefix = probe::peer_prefix(&self.probe_prefix, address);
            nfd.register_route_with_flags(&prefix, face_id, 0, ForwardingFlags::default())
                .await?;
            self.metrics.prefixes_registered.increment();
        }
        Ok(())
    }

    async fn destroy_face(&self, face_id: u64) -> Result<()> {
        self.nfd().await.destroy_face(face_id).await?;
        self.metrics.faces_destroyed.increment();
        info!("[Mesh] Face {} destroyed", face_id);
        Ok(())
    }

    /// Register `prefixes` on `face_id` if it still belongs to a peer
    async fn register_prefixes(&self, face_id: u64, prefixes: &[Name]) -> Result<()> {
        let known = self
            .state
            .lock()
            .await
            .peers
            .values()
            .any(|peer| peer.face_id == Some(face_id));
        if !known {
            debug!("[Mesh] Face {} belongs to no peer, not registering", face_id);
            return Ok(());
        }

        let nfd = self.nfd().await;
        let mut failure = None;
        for prefix in prefixes {
            match nfd
                .register_route_with_flags(prefix, face_id, 0, ForwardingFlags::default())
                .await
            {
                Ok(()) => {
                    self.metrics.prefixes_registered.increment();
                    info!("[Mesh] Registered {} on face {}", prefix, face_id);
                }
                Err(e) => {
                    warn!("[Mesh] Could not register {} on face {}: {}", prefix, face_id, e);
                    failure = Some(e);
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Listen for probes on `prefix` and answer them
    async fn register_own_prefix(self: &Arc<Self>, prefix: Name) -> Result<()> {
        let face = self.face().await;
        let mut interests = face.register_prefix(&prefix).await?;
        self.metrics.prefixes_registered.increment();

        let weak = Arc::downgrade(self);
        let responder = tokio::spawn(async move {
            while let Some(interest) = interests.recv().await {
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => break,
                };
                if let Err(e) = inner.answer_probe(&interest).await {
                    warn!("[Probe] Could not answer {}: {}", interest.name, e);
                }
            }
        });

        if let Some(previous) = lock_std(&self.responder).replace(responder) {
            previous.abort();
        }
        info!("[Mesh] Listening for probes on {}", prefix);
        Ok(())
    }

    async fn run_cleanup(
        &self,
        own_prefix: Option<Name>,
        face_ids: Vec<u64>,
        recreate_face: bool,
    ) -> Result<()> {
        if let Some(responder) = lock_std(&self.responder).take() {
            responder.abort();
        }

        if let Some(prefix) = own_prefix {
            let face = self.face().await;
            let nfd = self.nfd().await;
            if let Err(e) = nfd.unregister_route(&prefix).await {
                warn!("[Mesh] Could not unregister {}: {}", prefix, e);
            }
            if let Err(e) = face.unregister_prefix(&prefix).await {
                debug!("[Mesh] Could not remove filter {}: {}", prefix, e);
            }
            self.metrics.prefixes_unregistered.increment();
        }

        for face_id in face_ids {
            if let Err(e) = self.destroy_face(face_id).await {
                warn!("[Mesh] Could not destroy face {}: {}", face_id, e);
            }
        }

        if recreate_face {
            self.recreate_face().await?;
        }
        Ok(())
    }

    async fn recreate_face(&self) -> Result<()> {
        let face = Arc::new(Face::new(self.connector.connect()?));
        let pump = spawn_event_pump(face.clone(), self.config.event_pump_period());

        let previous = {
            let mut handle = self.face.write().await;
            std::mem::replace(&mut *handle, FaceHandle { face, pump })
        };
        previous.pump.abort();
        previous.face.shutdown().await;
        info!("[Mesh] Management face recreated");
        Ok(())
    }

    /* ---------------------------------------------------------------- *
     * State transitions
     * ---------------------------------------------------------------- */

    /// Forget everything and queue the teardown
    async fn cleanup(&self, recreate_face: bool) {
        let command = {
            let mut state = self.state.lock().await;
            let own_prefix = match (&state.my_address, state.own_prefix_registered) {
                (Some(address), true) => Some(self.own_prefix(address)),
                _ => None,
            };
            let face_ids = state.peers.values().filter_map(|peer| peer.face_id).collect();

            state.peers.clear();
            state.pending_faces.clear();
            state.my_address = None;
            state.group_owner_address = None;
            state.is_group_owner = false;
            state.own_prefix_registered = false;
            state.group_timeouts = 0;
            self.metrics.peers.set(0);

            FaceCommand::Cleanup {
                own_prefix,
                face_ids,
                recreate_face,
            }
        };
        self.metrics.cleanups.increment();
        info!("[Mesh] Cleaning up (recreate face: {})", recreate_face);
        self.submit(vec![command]).await;
    }

    /// Drop `address` from the table and tear its link down
    async fn remove_peer(&self, address: &str) {
        let (face_id, is_group_owner) = {
            let mut state = self.state.lock().await;
            let removed = state.peers.remove(address);
            let count = state.peers.len() as u64;
            self.metrics.peers.set(count);
            match removed {
                Some(peer) => (peer.face_id, state.is_group_owner),
                None => return,
            }
        };
        self.metrics.peers_expired.increment();
        info!("[Mesh] Removing peer {}", address);

        if !is_group_owner {
            // a member only has the link to its owner
            if let Err(e) = self.discovery.disconnect().await {
                warn!("[Mesh] Could not leave group: {}", e);
            }
        }
        if let Some(face_id) = face_id {
            self.submit(vec![FaceCommand::DestroyFace { face_id }]).await;
        }
    }

    async fn on_connection_info(&self, info: ConnectionInfo) {
        if !info.group_formed {
            debug!("[Mesh] Connection info without a formed group");
            return;
        }
        let local_address = self.discovery.local_address();

        let commands = {
            let mut state = self.state.lock().await;
            state.group_owner_address = info.group_owner_address.clone();
            state.my_address = local_address.clone();
            state.is_group_owner = info.is_group_owner;

            let mut commands = Vec::new();
            if let Some(address) = &local_address {
                if !state.own_prefix_registered {
                    state.own_prefix_registered = true;
                    commands.push(FaceCommand::RegisterOwnPrefix {
                        prefix: self.own_prefix(address),
                    });
                }
            }
            if !info.is_group_owner {
                if let Some(owner) = &info.group_owner_address {
                    if state.claim_face(owner) {
                        commands.push(FaceCommand::CreateFace {
                            address: owner.clone(),
                            register_probe_prefix: true,
                        });
                    }
                }
            }
            commands
        };

        info!(
            "[Mesh] Group formed: me {:?}, owner {:?} (owner: {})",
            local_address, info.group_owner_address, info.is_group_owner
        );
        self.submit(commands).await;
    }

    /* ---------------------------------------------------------------- *
     * Loops
     * ---------------------------------------------------------------- */

    async fn discover_once(&self) -> Result<()> {
        self.metrics.discovery_cycles.increment();
        let devices = match self.discovery.discover_peers().await {
            Ok(devices) => Arc::new(devices),
            Err(e) => {
                self.metrics.discovery_failures.increment();
                return Err(e);
            }
        };

        let local_address = self.discovery.local_address();

        let (membership, commands) = {
            let mut state = self.state.lock().await;
            state.devices = devices.clone();

            for peer in state.peers.values_mut() {
                if let Some(device) = devices
                    .iter()
                    .find(|device| device.ip_address.as_deref() == Some(peer.ip_address.as_str()))
                {
                    peer.device = Some(device.clone());
                }
            }

            let lost: Vec<String> = state
                .peers
                .values()
                .filter(|peer| match &peer.device {
                    Some(known) => !devices.iter().any(|device| {
                        device.device_address == known.device_address && device.is_connected()
                    }),
                    None => false,
                })
                .map(|peer| peer.ip_address.clone())
                .collect();

            let mut commands = Vec::new();
            for address in lost {
                if let Some(peer) = state.peers.remove(&address) {
                    info!("[Mesh] Peer {} no longer connected", address);
                    self.metrics.peers_expired.increment();
                    if let Some(face_id) = peer.face_id {
                        commands.push(FaceCommand::DestroyFace { face_id });
                    }
                }
            }
            let count = state.peers.len() as u64;
            self.metrics.peers.set(count);

            let any_connected = devices.iter().any(DiscoveredDevice::is_connected);
            let membership = match (any_connected, state.my_address.is_some()) {
                (true, false) => Membership::Joined,
                (false, true) => Membership::Lost,
                _ => Membership::Steady,
            };

            if membership != Membership::Lost {
                for device in devices.iter().filter(|device| device.is_connected()) {
                    if let Some(address) = &device.ip_address {
                        if local_address.as_ref() == Some(address) {
                            continue;
                        }
                        if state.claim_face(address) {
                            commands.push(FaceCommand::CreateFace {
                                address: address.clone(),
                                register_probe_prefix: true,
                            });
                        }
                    }
                }
            }
            (membership, commands)
        };

        trace!(
            "[Mesh] Discovered {} device(s), {:?}",
            devices.len(),
            membership
        );
        self.submit(commands).await;

        match membership {
            Membership::Joined => {
                let info = self.discovery.connection_info().await?;
                self.on_connection_info(info).await;
            }
            Membership::Lost => {
                info!("[Mesh] No connected devices left");
                self.cleanup(true).await;
            }
            Membership::Steady => {}
        }
        Ok(())
    }

    async fn probe_once(&self) -> Result<()> {
        let local_address = self.discovery.local_address();
        let (my_address, targets) = {
            let state = self.state.lock().await;
            let targets: Vec<(String, u64)> = state
                .peers
                .values()
                .filter_map(|peer| peer.face_id.map(|face_id| (peer.ip_address.clone(), face_id)))
                .collect();
            (state.my_address.clone(), targets)
        };

        let my_address = match (my_address, local_address) {
            (None, _) => return Ok(()),
            (Some(_), None) => {
                warn!("[Probe] Lost our group address");
                self.cleanup(true).await;
                return Ok(());
            }
            (Some(address), Some(_)) => address,
        };

        let face = self.face().await;
        let probes = targets
            .into_iter()
            .map(|(address, face_id)| self.probe_peer(&face, &my_address, address, face_id));
        join_all(probes).await;
        Ok(())
    }

    async fn probe_peer(&self, face: &Face, my_address: &str, address: String, face_id: u64) {
        let name = probe::probe_name(&self.probe_prefix, &address, my_address);
        let interest = Interest::new(name)
            .with_must_be_fresh(true)
            .with_lifetime(self.config.probe_lifetime_ms);

        self.metrics.probes_sent.increment();
        let started = Instant::now();

        match face.express_interest(interest).await {
            Ok(data) => {
                self.metrics.probes_answered.increment();
                self.metrics
                    .probe_round_trip_ms
                    .observe(started.elapsed().as_millis() as u64);
                if let Some(peer) = self.state.lock().await.peers.get_mut(&address) {
                    peer.record_answer();
                }
                if let Err(e) = self.reconcile_peer(face_id, &data).await {
                    warn!("[Probe {}] Could not reconcile: {}", address, e);
                }
            }
            Err(e) if e.is_timeout() => {
                self.metrics.probes_timed_out.increment();
                let expired = {
                    let mut state = self.state.lock().await;
                    match state.peers.get_mut(&address) {
                        Some(peer) => peer.record_timeout(self.config.max_probe_timeouts),
                        None => false,
                    }
                };
                debug!("[Probe {}] Timed out", address);
                if expired {
                    self.remove_peer(&address).await;
                }
            }
            Err(e) => warn!("[Probe {}] Failed: {}", address, e),
        }
    }

    /// Align the routes on `face_id` with the prefixes in probe `data`
    async fn reconcile_peer(&self, face_id: u64, data: &Data) -> Result<()> {
        let advertised = probe::parse_payload(&data.content)?;
        let fib = self.nfd().await.list_fib().await?;
        let changes = probe::reconcile(&fib, face_id, &advertised);
        if changes.is_empty() {
            trace!("[Mesh] Routes on face {} up to date", face_id);
            return Ok(());
        }

        debug!(
            "[Mesh] Face {}: {} new prefix(es), {} stale",
            face_id,
            changes.register.len(),
            changes.unregister.len()
        );
        let mut commands = Vec::new();
        if !changes.register.is_empty() {
            commands.push(FaceCommand::RegisterPrefixes {
                face_id,
                prefixes: changes.register,
            });
        }
        commands.extend(
            changes
                .unregister
                .into_iter()
                .map(|prefix| FaceCommand::UnregisterPrefix { face_id, prefix }),
        );
        self.submit(commands).await;
        Ok(())
    }

    /// Answer a probe with the prefixes reachable through other faces
    async fn answer_probe(&self, interest: &Interest) -> Result<()> {
        let requester = probe::requester_address(&interest.name).ok_or_else(|| {
            Error::Encoding(format!("No requester address in {}", interest.name))
        })?;
        trace!("[Probe] Request from {}", requester);

        let (requester_face, commands) = {
            let mut state = self.state.lock().await;
            let mut commands = Vec::new();
            if state.claim_face(&requester) {
                commands.push(FaceCommand::CreateFace {
                    address: requester.clone(),
                    register_probe_prefix: true,
                });
            }
            let face_id = state.peers.get(&requester).and_then(|peer| peer.face_id);
            (face_id, commands)
        };
        self.submit(commands).await;

        let nfd = self.nfd().await;
        let fib = nfd.list_fib().await?;
        let faces = nfd.list_faces().await?;
        let requester_uri = self.config.face_uri(&requester);
        let face_ids: HashSet<u64> = faces
            .iter()
            .filter(|face| Some(face.face_id) != requester_face && face.uri != requester_uri)
            .map(|face| face.face_id)
            .collect();

        let prefixes = probe::advertised_prefixes(&fib, &face_ids);
        let data = Data::new(interest.name.clone(), probe::encode_payload(&prefixes))
            .with_freshness_period(self.config.probe_freshness_ms);
        nfd.face().put_data(data).await?;

        self.metrics.probes_served.increment();
        debug!("[Probe] Told {} about {} prefix(es)", requester, prefixes.len());
        Ok(())
    }

    async fn check_face_and_route_consistency(&self) -> Result<()> {
        let nfd = self.nfd().await;
        let faces = nfd.list_faces().await?;
        let rib = nfd.list_rib().await?;
        let active: HashSet<u64> = faces.iter().map(|face| face.face_id).collect();
        let routes: HashSet<Name> = rib.into_iter().map(|entry| entry.name).collect();

        let commands = {
            let mut state = self.state.lock().await;
            let mut commands = Vec::new();
            let mut recreate = Vec::new();

            for peer in state.peers.values_mut() {
                match peer.face_id {
                    Some(face_id) if !active.contains(&face_id) => {
                        warn!(
                            "[Mesh] Face {} of peer {} disappeared",
                            face_id, peer.ip_address
                        );
                        peer.face_id = None;
                        recreate.push(peer.ip_address.clone());
                    }
                    Some(face_id) => {
                        let prefix = probe::peer_prefix(&self.probe_prefix, &peer.ip_address);
                        if !routes.contains(&prefix) {
                            warn!("[Mesh] Probe route {} disappeared", prefix);
                            commands.push(FaceCommand::RegisterPrefixes {
                                face_id,
                                prefixes: vec![prefix],
                            });
                        }
                    }
                    None => recreate.push(peer.ip_address.clone()),
                }
            }

            for address in recreate {
                if state.pending_faces.insert(address.clone()) {
                    commands.push(FaceCommand::CreateFace {
                        address,
                        register_probe_prefix: true,
                    });
                }
            }

            if let Some(address) = state.my_address.clone() {
                let prefix = self.own_prefix(&address);
                if !routes.contains(&prefix) {
                    warn!("[Mesh] Own prefix {} missing, registering again", prefix);
                    state.own_prefix_registered = true;
                    commands.push(FaceCommand::RegisterOwnPrefix { prefix });
                }
            }
            commands
        };

        self.submit(commands).await;
        Ok(())
    }

    async fn check_group_consistency(&self) -> Result<()> {
        let leave = {
            let mut state = self.state.lock().await;
            if state.peers.is_empty() && state.my_address.is_some() {
                state.group_timeouts += 1;
                debug!(
                    "[Mesh] Group has no peers ({}/{})",
                    state.group_timeouts, self.config.max_group_timeouts
                );
                if state.group_timeouts >= self.config.max_group_timeouts {
                    state.group_timeouts = 0;
                    true
                } else {
                    false
                }
            } else {
                state.group_timeouts = 0;
                false
            }
        };

        if leave {
            info!("[Mesh] Group stayed empty, leaving it");
            if let Err(e) = self.discovery.disconnect().await {
                warn!("[Mesh] Could not leave group: {}", e);
            }
            self.cleanup(true).await;
        }
        Ok(())
    }
}
