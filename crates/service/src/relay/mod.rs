//! The event relay: stores published events and fans them out to live
//! subscriptions.
//!
//! A subscription starts out *buffering*: while its stored-event snapshot
//! is being sent, matching events published in the meantime are held back.
//! Once `EOSE` is out the buffer is flushed (skipping anything the snapshot
//! already carried) and the subscription goes live, so a client sees the
//! snapshot, then `EOSE`, then every later match exactly once.

mod connection;
mod socket;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use common::prelude::{Filter, RelayEvent, RelayMessage};
use common::relay::EventError;

use crate::database::Database;

pub use connection::Connection;
pub use socket::serve_socket;

pub type ConnectionId = u64;
pub type MessageSender = mpsc::UnboundedSender<RelayMessage>;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid: {0}")]
    Invalid(#[from] EventError),
    #[error("restricted: this relay does not accept events from {0}")]
    Restricted(String),
    #[error("error: could not store event")]
    Storage(#[from] sqlx::Error),
}

/// How a publish was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Stored,
    Duplicate,
}

impl Published {
    /// The message that goes with `["OK", id, true, message]`
    pub fn message(&self) -> &'static str {
        match self {
            Published::Stored => "",
            Published::Duplicate => "duplicate: already have this event",
        }
    }
}

enum Delivery {
    Buffering(Vec<Arc<RelayEvent>>),
    Live,
}

struct Subscription {
    filters: Vec<Filter>,
    sender: MessageSender,
    /// distinguishes a subscription from a later `REQ` reusing its id
    generation: u64,
    delivery: Delivery,
}

impl Subscription {
    fn matches(&self, event: &RelayEvent) -> bool {
        self.filters.iter().any(|filter| filter.matches(event))
    }
}

type SubscriptionKey = (ConnectionId, String);

struct Inner {
    database: Database,
    posters: HashSet<String>,
    subscriptions: RwLock<HashMap<SubscriptionKey, Subscription>>,
    next_connection: AtomicU64,
    next_generation: AtomicU64,
}

/// Shared relay handle; clones refer to the same registry
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

impl Relay {
    pub fn new(database: Database, posters: HashSet<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                database,
                posters,
                subscriptions: RwLock::new(HashMap::new()),
                next_connection: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.inner.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Verify, authorize and store `event`, then deliver it to every
    /// matching subscription
    pub async fn publish(&self, event: RelayEvent) -> Result<Published, PublishError> {
        event.verify()?;
        if !self.inner.posters.contains(&event.pubkey) {
            return Err(PublishError::Restricted(event.pubkey));
        }
        if !self.inner.database.insert_event(&event).await? {
            return Ok(Published::Duplicate);
        }
        tracing::debug!(id = %event.id, kind = event.kind, "stored event");

        self.broadcast(Arc::new(event));
        Ok(Published::Stored)
    }

    fn broadcast(&self, event: Arc<RelayEvent>) {
        let mut subscriptions = self.inner.subscriptions.write();
        for ((_, id), subscription) in subscriptions.iter_mut() {
            if !subscription.matches(&event) {
                continue;
            }
            match &mut subscription.delivery {
                Delivery::Buffering(pending) => pending.push(event.clone()),
                Delivery::Live => {
                    let _ = subscription.sender.send(RelayMessage::Event {
                        subscription_id: id.clone(),
                        event: event.clone(),
                    });
                }
            }
        }
    }

    /// Register a subscription and stream its snapshot, `EOSE` and then
    /// live matches to `sender`. A previous subscription with the same id on
    /// the same connection is replaced.
    pub async fn subscribe(
        &self,
        connection: ConnectionId,
        id: String,
        filters: Vec<Filter>,
        sender: MessageSender,
    ) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let key = (connection, id.clone());
        self.inner.subscriptions.write().insert(
            key.clone(),
            Subscription {
                filters: filters.clone(),
                sender: sender.clone(),
                generation,
                delivery: Delivery::Buffering(Vec::new()),
            },
        );

        let snapshot = match self.inner.database.query_events(&filters).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(subscription = %id, "snapshot query failed: {}", e);
                self.remove_generation(&key, generation);
                let _ = sender.send(RelayMessage::Closed {
                    subscription_id: id,
                    message: "error: could not query stored events".into(),
                });
                return;
            }
        };

        let mut sent = HashSet::with_capacity(snapshot.len());
        for event in snapshot {
            sent.insert(event.id.clone());
            let _ = sender.send(RelayMessage::Event {
                subscription_id: id.clone(),
                event: Arc::new(event),
            });
        }
        let _ = sender.send(RelayMessage::Eose(id.clone()));

        let mut subscriptions = self.inner.subscriptions.write();
        let Some(subscription) = subscriptions.get_mut(&key) else {
            return;
        };
        if subscription.generation != generation {
            return;
        }
        if let Delivery::Buffering(pending) =
            std::mem::replace(&mut subscription.delivery, Delivery::Live)
        {
            for event in pending {
                if sent.insert(event.id.clone()) {
                    let _ = sender.send(RelayMessage::Event {
                        subscription_id: id.clone(),
                        event,
                    });
                }
            }
        }
        tracing::debug!(connection, subscription = %id, "subscription live");
    }

    fn remove_generation(&self, key: &SubscriptionKey, generation: u64) {
        let mut subscriptions = self.inner.subscriptions.write();
        if subscriptions
            .get(key)
            .is_some_and(|s| s.generation == generation)
        {
            subscriptions.remove(key);
        }
    }

    /// Returns whether a subscription was removed
    pub fn unsubscribe(&self, connection: ConnectionId, id: &str) -> bool {
        self.inner
            .subscriptions
            .write()
            .remove(&(connection, id.to_string()))
            .is_some()
    }

    /// Drop every subscription of a connection, returning how many there were
    pub fn unsubscribe_all(&self, connection: ConnectionId) -> usize {
        let mut subscriptions = self.inner.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|(owner, _), _| *owner != connection);
        before - subscriptions.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }
}
