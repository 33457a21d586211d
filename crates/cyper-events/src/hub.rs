//! Registry of live client connections and fan-out of published events.
//!
//! Publishes enter a single queue and are dispatched one at a time, so every
//! client sees messages in hub-arrival order. Delivery never blocks: if a
//! client's outbound queue is full the client is unregistered instead.

use std::collections::HashMap;
use std::sync::Arc;

use cyper_core::{Clock, ConnectionId, UserId};
use cyper_metrics::SharedMetricsRegistry;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::envelope::{Envelope, RealtimeEvent};
use crate::error::{EventsError, EventsResult};

/// Serialized envelope shared by every recipient of one publish.
pub type Frame = Arc<str>;

/// Queue sizes for the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubOptions {
    /// Outbound slots per client.
    pub client_queue: usize,
    /// Slots in the shared publish queue.
    pub publish_queue: usize,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            client_queue: 256,
            publish_queue: 256,
        }
    }
}

/// A registered client as seen by its connection.
#[derive(Debug)]
pub struct Client {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Owning user.
    pub user_id: UserId,
    /// Outbound frames. Yields `None` once the hub unregisters the client.
    pub outbound: mpsc::Receiver<Frame>,
}

#[derive(Debug)]
struct ClientSlot {
    user_id: UserId,
    tx: mpsc::Sender<Frame>,
}

/// Why a client left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    Backpressure,
    Gone,
}

impl Departure {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Backpressure => "backpressure",
            Self::Gone => "gone",
        }
    }
}

/// Live connection registry and dispatcher.
#[derive(Debug)]
pub struct EventHub {
    clients: RwLock<HashMap<ConnectionId, ClientSlot>>,
    publish_tx: mpsc::Sender<Envelope>,
    publish_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
    clock: Arc<dyn Clock>,
    options: HubOptions,
    metrics: Option<SharedMetricsRegistry>,
}

impl EventHub {
    /// Create a hub. Nothing is delivered until [`run`](Self::run) is started.
    #[must_use]
    pub fn new(options: HubOptions, clock: Arc<dyn Clock>) -> Self {
        let (publish_tx, publish_rx) = mpsc::channel(options.publish_queue.max(1));
        Self {
            clients: RwLock::new(HashMap::new()),
            publish_tx,
            publish_rx: Mutex::new(Some(publish_rx)),
            clock,
            options,
            metrics: None,
        }
    }

    /// Record the connected client gauge and disconnect counts into
    /// `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SharedMetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_clients(&self, count: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.metrics().set_connected_clients(count);
        }
    }

    /// Unregister a client the hub itself gave up on.
    async fn drop_client(&self, id: ConnectionId, reason: Departure) {
        if self.unregister_client(id).await
            && let Some(metrics) = &self.metrics
        {
            metrics.metrics().client_dropped(reason.as_str());
        }
    }

    /// Dispatch loop. Runs until `cancel` fires; only the first call runs.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(mut rx) = self.publish_rx.lock().await.take() else {
            error!("Event hub dispatch loop already started");
            return;
        };
        info!("Event hub started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                envelope = rx.recv() => match envelope {
                    Some(envelope) => self.dispatch(&envelope).await,
                    None => break,
                },
            }
        }

        // Dropping every sender ends each connection's write loop.
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        self.record_clients(0);
        info!(clients = count, "Event hub stopped");
    }

    /// Deliver one envelope to every matching client.
    async fn dispatch(&self, envelope: &Envelope) {
        let frame: Frame = match serde_json::to_string(envelope) {
            Ok(text) => text.into(),
            Err(e) => {
                error!(event_type = %envelope.kind, error = %e, "Failed to encode event");
                return;
            },
        };

        let mut departed = Vec::new();
        let mut delivered: usize = 0;
        {
            let clients = self.clients.read().await;
            let recipients = clients.iter().filter(|(_, slot)| {
                envelope
                    .user_id
                    .as_ref()
                    .is_none_or(|user| *user == slot.user_id)
            });
            for (id, slot) in recipients {
                match slot.tx.try_send(Arc::clone(&frame)) {
                    Ok(()) => delivered = delivered.saturating_add(1),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        departed.push((*id, Departure::Backpressure));
                    },
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        departed.push((*id, Departure::Gone));
                    },
                }
            }
        }

        for (id, reason) in departed {
            if reason == Departure::Backpressure {
                warn!(connection_id = %id, event_type = %envelope.kind, "Client queue full; dropping slow client");
            }
            self.drop_client(id, reason).await;
        }
        debug!(event_type = %envelope.kind, delivered, "Event dispatched");
    }

    /// Add a client for `user_id` with a fresh bounded outbound queue.
    pub async fn register_client(&self, user_id: UserId) -> Client {
        let id = ConnectionId::new();
        let (tx, outbound) = mpsc::channel(self.options.client_queue.max(1));
        {
            let mut clients = self.clients.write().await;
            clients.insert(
                id,
                ClientSlot {
                    user_id: user_id.clone(),
                    tx,
                },
            );
            self.record_clients(clients.len());
        }
        info!(connection_id = %id, user_id = %user_id, "Client registered");
        Client {
            id,
            user_id,
            outbound,
        }
    }

    /// Remove a client and close its outbound queue.
    ///
    /// Returns `false` if it was already gone.
    pub async fn unregister_client(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut clients = self.clients.write().await;
            let removed = clients.remove(&id);
            self.record_clients(clients.len());
            removed
        };
        match removed {
            Some(slot) => {
                info!(connection_id = %id, user_id = %slot.user_id, "Client unregistered");
                true
            },
            None => false,
        }
    }

    fn envelope(&self, kind: &str, user_id: Option<UserId>, data: Value) -> Envelope {
        Envelope {
            kind: kind.to_owned(),
            user_id,
            data,
            timestamp: self.clock.now(),
        }
    }

    /// Publish to every registered client.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::HubClosed`] if the dispatch loop has stopped.
    pub async fn broadcast(&self, kind: &str, data: Value) -> EventsResult<()> {
        let envelope = self.envelope(kind, None, data);
        self.publish_tx
            .send(envelope)
            .await
            .map_err(|_| EventsError::HubClosed)
    }

    /// Publish to every registered client of `user_id` and nobody else.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::HubClosed`] if the dispatch loop has stopped.
    pub async fn broadcast_to_user(
        &self,
        user_id: &UserId,
        kind: &str,
        data: Value,
    ) -> EventsResult<()> {
        let envelope = self.envelope(kind, Some(user_id.clone()), data);
        self.publish_tx
            .send(envelope)
            .await
            .map_err(|_| EventsError::HubClosed)
    }

    /// Publish a typed event, to one user or to everyone.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::HubClosed`] if the dispatch loop has stopped.
    pub async fn publish(&self, user_id: Option<&UserId>, event: RealtimeEvent) -> EventsResult<()> {
        let kind = event.kind();
        match user_id {
            Some(user) => self.broadcast_to_user(user, kind, event.into_data()).await,
            None => self.broadcast(kind, event.into_data()).await,
        }
    }

    /// Queue a message for a single connection, bypassing the publish queue.
    ///
    /// Used for direct replies such as `pong`. The same backpressure rule
    /// applies: a full queue unregisters the client.
    ///
    /// # Errors
    ///
    /// Returns [`EventsError::QueueFull`] if the client was dropped for
    /// backpressure.
    pub async fn send_to_client(&self, id: ConnectionId, kind: &str, data: Value) -> EventsResult<bool> {
        let envelope = self.envelope(kind, None, data);
        let frame: Frame = serde_json::to_string(&envelope)?.into();
        let outcome = {
            let clients = self.clients.read().await;
            clients.get(&id).map(|slot| slot.tx.try_send(frame))
        };
        match outcome {
            None => Ok(false),
            Some(Ok(())) => Ok(true),
            Some(Err(mpsc::error::TrySendError::Full(_))) => {
                warn!(connection_id = %id, event_type = kind, "Client queue full; dropping slow client");
                self.drop_client(id, Departure::Backpressure).await;
                Err(EventsError::QueueFull)
            },
            Some(Err(mpsc::error::TrySendError::Closed(_))) => {
                self.drop_client(id, Departure::Gone).await;
                Ok(false)
            },
        }
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Number of registered clients owned by `user_id`.
    pub async fn user_client_count(&self, user_id: &UserId) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|slot| slot.user_id == *user_id)
            .count()
    }
}
