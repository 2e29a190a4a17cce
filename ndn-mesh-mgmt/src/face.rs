//! Application face over a [`Transport`].
//!
//! A `Face` turns the packet-level transport into request/response calls:
//! every expressed Interest gets a pending entry and a oneshot channel, and
//! the explicit [`Face::process_events`] step drains the transport and
//! completes the matching entries. Interests for registered prefixes are
//! handed to the registrant over an mpsc channel.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, info, trace, warn};
use ndn_mesh_common::{
    ndn::{Data, Interest, Name},
    Error, Result,
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::{interval, timeout, MissedTickBehavior},
};

use crate::transport::{Packet, Transport};

/// Capacity of the channel handed out by [`Face::register_prefix`]
pub const INTEREST_FILTER_CAPACITY: usize = 100;

static NEXT_FACE_ID: AtomicU64 = AtomicU64::new(1);

/// An expressed Interest waiting for Data
struct PendingInterest {
    interest: Interest,
    sender: oneshot::Sender<Data>,
}

/// A registered prefix and the channel its Interests go to
struct InterestFilter {
    prefix: Name,
    sender: mpsc::Sender<Interest>,
}

/// An application face
pub struct Face {
    /// Identifier used in log lines
    id: u64,

    /// Underlying transport
    transport: Arc<dyn Transport>,

    /// Whether the face is shut down
    closed: AtomicBool,

    /// Serializes sends and the event-processing step
    io: Mutex<()>,

    /// Token of the next pending Interest
    next_token: AtomicU64,

    /// Pending Interests waiting for Data
    pending: Mutex<HashMap<u64, PendingInterest>>,

    /// Registered prefixes
    filters: Mutex<Vec<InterestFilter>>,
}

impl fmt::Debug for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Face")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Face {
    /// Create a face over a transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            id: NEXT_FACE_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            closed: AtomicBool::new(false),
            io: Mutex::new(()),
            next_token: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            filters: Mutex::new(Vec::new()),
        }
    }

    /// Get the face ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if the face is shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Transport(format!("Face {} is closed", self.id)))
        } else {
            Ok(())
        }
    }

    /// Sign a command name with the transport's identity
    pub fn sign_command(&self, name: &Name) -> Result<Name> {
        self.ensure_open()?;
        self.transport.sign_command(name)
    }

    /// Send an Interest and wait for Data.
    ///
    /// The wait is bounded by the Interest lifetime; someone must keep
    /// calling [`Face::process_events`] for Data to be delivered.
    pub async fn express_interest(&self, interest: Interest) -> Result<Data> {
        self.ensure_open()?;

        let name = interest.name.clone();
        let lifetime = interest.lifetime();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        debug!("[Face {}] Express Interest: {}", self.id, name);

        self.pending.lock().await.insert(
            token,
            PendingInterest {
                interest: interest.clone(),
                sender,
            },
        );

        let sent = {
            let _io = self.io.lock().await;
            self.transport.send_interest(&interest).await
        };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&token);
            return Err(e);
        }

        match timeout(lifetime, receiver).await {
            Ok(Ok(data)) => {
                trace!("[Face {}] Received Data for {}: {}", self.id, name, data.name);
                Ok(data)
            }
            Ok(Err(_)) => Err(Error::Transport(format!(
                "Face {} closed while waiting for {}",
                self.id, name
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&token);
                debug!("[Face {}] Interest timed out: {}", self.id, name);
                Err(Error::Timeout(format!(
                    "{} after {} ms",
                    name,
                    lifetime.as_millis()
                )))
            }
        }
    }

    /// Send a Data packet
    pub async fn put_data(&self, data: Data) -> Result<()> {
        self.ensure_open()?;
        debug!("[Face {}] Send Data: {}", self.id, data.name);

        let _io = self.io.lock().await;
        self.transport.put_data(&data).await
    }

    /// Register `prefix` and receive the Interests sent to it.
    ///
    /// Registering the same prefix again replaces the previous channel.
    pub async fn register_prefix(&self, prefix: &Name) -> Result<mpsc::Receiver<Interest>> {
        self.ensure_open()?;
        {
            let _io = self.io.lock().await;
            self.transport.register_prefix(prefix).await?;
        }

        let (sender, receiver) = mpsc::channel(INTEREST_FILTER_CAPACITY);
        let mut filters = self.filters.lock().await;
        filters.retain(|filter| &filter.prefix != prefix);
        filters.push(InterestFilter {
            prefix: prefix.clone(),
            sender,
        });

        info!("[Face {}] Registered prefix {}", self.id, prefix);
        Ok(receiver)
    }

    /// Remove a prefix registration
    pub async fn unregister_prefix(&self, prefix: &Name) -> Result<()> {
        self.ensure_open()?;
        self.filters
            .lock()
            .await
            .retain(|filter| &filter.prefix != prefix);

        let _io = self.io.lock().await;
        self.transport.unregister_prefix(prefix).await?;
        info!("[Face {}] Unregistered prefix {}", self.id, prefix);
        Ok(())
    }

    /// Drain the transport and dispatch what arrived.
    ///
    /// Returns the number of packets processed.
    pub async fn process_events(&self) -> Result<usize> {
        if self.is_closed() {
            return Ok(0);
        }

        let packets = {
            let _io = self.io.lock().await;
            self.transport.receive().await?
        };

        let count = packets.len();
        for packet in packets {
            match packet {
                Packet::Data(data) => self.dispatch_data(data).await,
                Packet::Interest(interest) => self.dispatch_interest(interest).await,
            }
        }
        Ok(count)
    }

    async fn dispatch_data(&self, data: Data) {
        let mut pending = self.pending.lock().await;
        let tokens: Vec<u64> = pending
            .iter()
            .filter(|(_, entry)| entry.interest.matches_data(&data))
            .map(|(token, _)| *token)
            .collect();

        if tokens.is_empty() {
            trace!("[Face {}] Dropping unsolicited Data {}", self.id, data.name);
            return;
        }

        for token in tokens {
            if let Some(entry) = pending.remove(&token) {
                if entry.sender.send(data.clone()).is_err() {
                    trace!("[Face {}] Waiter for {} already gone", self.id, data.name);
                }
            }
        }
    }

    async fn dispatch_interest(&self, interest: Interest) {
        let filters = self.filters.lock().await;
        let mut delivered = false;

        for filter in filters
            .iter()
            .filter(|filter| filter.prefix.is_prefix_of(&interest.name))
        {
            match filter.sender.try_send(interest.clone()) {
                Ok(()) => delivered = true,
                Err(e) => warn!(
                    "[Face {}] Could not hand Interest {} to {}: {}",
                    self.id, interest.name, filter.prefix, e
                ),
            }
        }

        if !delivered {
            trace!("[Face {}] No filter for Interest {}", self.id, interest.name);
        }
    }

    /// Number of Interests still waiting for Data
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Shut the face down.
    ///
    /// Pending Interests fail with a transport error and filter channels close.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("[Face {}] Shutting down", self.id);

        self.pending.lock().await.clear();
        self.filters.lock().await.clear();
        self.transport.close().await;
    }
}

/// Call [`Face::process_events`] every `period` until the face shuts down.
pub fn spawn_event_pump(face: Arc<Face>, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !face.is_closed() {
            ticker.tick().await;
            if let Err(e) = face.process_events().await {
                warn!("[Face {}] Event processing failed: {}", face.id(), e);
            }
        }
        debug!("[Face {}] Event pump stopped", face.id());
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryForwarder;
    use bytes::Bytes;

    fn face_on(forwarder: &MemoryForwarder) -> Arc<Face> {
        Arc::new(Face::new(Arc::new(forwarder.connect())))
    }

    #[tokio::test]
    async fn test_interest_reaches_producer_and_data_returns() {
        let forwarder = MemoryForwarder::new();
        let consumer = face_on(&forwarder);
        let producer = face_on(&forwarder);
        let _pumps = (
            spawn_event_pump(consumer.clone(), Duration::from_millis(1)),
            spawn_event_pump(producer.clone(), Duration::from_millis(1)),
        );

        let prefix = Name::from_uri("/app").unwrap();
        let mut interests = producer.register_prefix(&prefix).await.unwrap();
        let responder = {
            let producer = producer.clone();
            tokio::spawn(async move {
                let interest = interests.recv().await.unwrap();
                let data = Data::new(interest.name.clone(), Bytes::from_static(b"hello"));
                producer.put_data(data).await.unwrap();
            })
        };

        let interest = Interest::new(Name::from_uri("/app/greeting").unwrap()).with_lifetime(1000);
        let data = consumer.express_interest(interest).await.unwrap();
        assert_eq!(data.content.as_ref(), b"hello");
        responder.await.unwrap();
        assert_eq!(consumer.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_interest_times_out() {
        let forwarder = MemoryForwarder::new();
        let face = face_on(&forwarder);
        let _pump = spawn_event_pump(face.clone(), Duration::from_millis(5));

        let interest = Interest::new(Name::from_uri("/nobody/home").unwrap()).with_lifetime(1000);
        let err = face.express_interest(interest).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(face.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_fails_new_requests() {
        let forwarder = MemoryForwarder::new();
        let face = face_on(&forwarder);
        face.shutdown().await;

        assert!(face.is_closed());
        let interest = Interest::new(Name::from_uri("/a").unwrap());
        assert!(matches!(
            face.express_interest(interest).await,
            Err(Error::Transport(_))
        ));
        assert_eq!(face.process_events().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_prefix_gets_no_interests() {
        let forwarder = MemoryForwarder::new();
        let consumer = face_on(&forwarder);
        let producer = face_on(&forwarder);

        let prefix = Name::from_uri("/app").unwrap();
        let mut interests = producer.register_prefix(&prefix).await.unwrap();
        producer.unregister_prefix(&prefix).await.unwrap();

        let interest = Interest::new(Name::from_uri("/app/x").unwrap()).with_lifetime(10);
        consumer.transport.send_interest(&interest).await.unwrap();
        producer.process_events().await.unwrap();

        assert!(interests.recv().await.is_none());
    }
}
