//! SessionConnection: one client's view of the media service and engine.
//!
//! ```text
//!   MediaService ──load_children──┐
//!        │ CatalogReplaced        │
//!        ▼                        ▼
//!   pump task ───────────► DeliveryContext ──► observers / subscriptions
//!        ▲
//!   EngineEvent (mpsc)
//! ```
//!
//! All observer callbacks and children deliveries of a session run on its
//! single [`DeliveryContext`].  Subscriptions are keyed by [`SubscriptionId`];
//! a delivery checks its registration when it runs, so nothing reaches a
//! callback after [`SessionConnection::unsubscribe`] returns.  Each
//! subscription receives a given catalog generation at most once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use mmedia_library::service::{ChildrenReply, MediaService, ServiceEvent};
use mmedia_proto::model::{NowPlaying, PlaybackState};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delivery::DeliveryContext;
use crate::engine::{EngineError, EngineEvent, PlaybackEngine};
use crate::observable::Observable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChildrenCallback = Arc<dyn Fn(&str, &ChildrenReply) + Send + Sync + 'static>;

struct Subscription {
    node_id: String,
    callback: ChildrenCallback,
    /// Catalog generation of the last delivery; 0 before the first.
    delivered: u64,
}

#[derive(Default)]
struct Subscriptions {
    entries: HashMap<SubscriptionId, Subscription>,
    next_id: u64,
}

type SharedSubscriptions = Arc<Mutex<Subscriptions>>;

fn lock(subs: &SharedSubscriptions) -> MutexGuard<'_, Subscriptions> {
    subs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Answer to a one-off children query.
pub enum ChildrenQuery {
    Ready(ChildrenReply),
    /// The catalog is still loading; the reply arrives on the receiver.
    Pending(oneshot::Receiver<ChildrenReply>),
}

impl ChildrenQuery {
    pub fn is_pending(&self) -> bool {
        matches!(self, ChildrenQuery::Pending(_))
    }

    pub async fn wait(self) -> ChildrenReply {
        match self {
            ChildrenQuery::Ready(reply) => reply,
            ChildrenQuery::Pending(rx) => rx.await.unwrap_or(ChildrenReply::Unavailable),
        }
    }
}

pub struct SessionConnection {
    service: Arc<MediaService>,
    engine: Arc<dyn PlaybackEngine>,
    delivery: DeliveryContext,
    is_connected: Observable<bool>,
    playback_state: Observable<PlaybackState>,
    now_playing: Observable<NowPlaying>,
    subscriptions: SharedSubscriptions,
    cancel: CancellationToken,
}

impl SessionConnection {
    /// Open a session over `service`, forwarding transport commands to
    /// `engine` and publishing what arrives on `events`.  Must be called from
    /// inside a tokio runtime.
    pub fn connect(
        service: Arc<MediaService>,
        engine: Arc<dyn PlaybackEngine>,
        events: mpsc::Receiver<EngineEvent>,
    ) -> Arc<Self> {
        let delivery = DeliveryContext::spawn();
        let session = Arc::new(Self {
            is_connected: Observable::new(false, delivery.clone()),
            playback_state: Observable::new(PlaybackState::empty(), delivery.clone()),
            now_playing: Observable::new(NowPlaying::Nothing, delivery.clone()),
            service,
            engine,
            delivery,
            subscriptions: Arc::new(Mutex::new(Subscriptions::default())),
            cancel: CancellationToken::new(),
        });

        let service_events = session.service.subscribe_events();
        tokio::spawn(pump(
            Arc::downgrade(&session),
            events,
            service_events,
            session.cancel.clone(),
        ));

        session.is_connected.set(true);
        info!("session: connected (root {})", session.service.root());
        session
    }

    pub fn delivery(&self) -> &DeliveryContext {
        &self.delivery
    }

    pub fn service(&self) -> &Arc<MediaService> {
        &self.service
    }

    pub fn is_connected(&self) -> &Observable<bool> {
        &self.is_connected
    }

    pub fn playback_state(&self) -> &Observable<PlaybackState> {
        &self.playback_state
    }

    pub fn now_playing(&self) -> &Observable<NowPlaying> {
        &self.now_playing
    }

    /// Root browse id, while connected.
    pub fn root_id(&self) -> Option<String> {
        self.is_connected
            .value()
            .then(|| self.service.root().to_string())
    }

    /// Register interest in the children of `node_id`.  `callback` receives
    /// the current children once the catalog is ready, then again whenever
    /// the catalog is replaced.
    pub fn subscribe<F>(&self, node_id: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &ChildrenReply) + Send + Sync + 'static,
    {
        let id = {
            let mut subs = lock(&self.subscriptions);
            subs.next_id += 1;
            let id = SubscriptionId(subs.next_id);
            subs.entries.insert(
                id,
                Subscription {
                    node_id: node_id.to_string(),
                    callback: Arc::new(callback),
                    delivered: 0,
                },
            );
            id
        };
        debug!("session: subscription {:?} on {:?}", id, node_id);
        deliver_children(&self.service, &self.delivery, &self.subscriptions, id, node_id);
        id
    }

    /// Remove a subscription.  Returns `false` if `id` was not subscribed to
    /// `node_id`.
    pub fn unsubscribe(&self, node_id: &str, id: SubscriptionId) -> bool {
        let mut subs = lock(&self.subscriptions);
        let registered = subs
            .entries
            .get(&id)
            .is_some_and(|sub| sub.node_id == node_id);
        if registered {
            subs.entries.remove(&id);
            debug!("session: unsubscribed {:?} from {:?}", id, node_id);
        }
        registered
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).entries.len()
    }

    /// One-off children query: answered now when the catalog is settled,
    /// otherwise pending until it is.
    pub fn children(&self, node_id: &str) -> ChildrenQuery {
        let (tx, mut rx) = oneshot::channel();
        let handled = self.service.load_children(node_id, move |reply| {
            let _ = tx.send(reply);
        });
        if handled {
            ChildrenQuery::Ready(rx.try_recv().unwrap_or(ChildrenReply::Unavailable))
        } else {
            ChildrenQuery::Pending(rx)
        }
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.engine.play()
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.engine.pause()
    }

    pub fn play_from_id(&self, id: &str) -> Result<(), EngineError> {
        self.engine.play_from_id(id, None)
    }

    /// Stop the background pump.  Observers keep their last values.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!("session: closing");
            self.cancel.cancel();
            self.is_connected.set(false);
        }
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Ask the service for the children of `node_id` and hand them to
/// subscription `id` on the delivery context, if it is still registered and
/// has not already received that catalog generation.
fn deliver_children(
    service: &MediaService,
    delivery: &DeliveryContext,
    subscriptions: &SharedSubscriptions,
    id: SubscriptionId,
    node_id: &str,
) {
    let delivery = delivery.clone();
    let subscriptions = Arc::clone(subscriptions);
    let node = node_id.to_string();
    service.load_children_versioned(node_id, move |generation, reply| {
        delivery.post(move || {
            let callback = {
                let mut subs = lock(&subscriptions);
                match subs.entries.get_mut(&id) {
                    Some(sub) if sub.delivered < generation => {
                        sub.delivered = generation;
                        Some(Arc::clone(&sub.callback))
                    }
                    Some(_) => {
                        debug!("session: {:?} already has generation {}", id, generation);
                        None
                    }
                    None => None,
                }
            };
            if let Some(callback) = callback {
                callback(&node, &reply);
            }
        });
    });
}

async fn pump(
    session: Weak<SessionConnection>,
    mut engine_events: mpsc::Receiver<EngineEvent>,
    mut service_events: broadcast::Receiver<ServiceEvent>,
    cancel: CancellationToken,
) {
    let mut engine_open = true;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = engine_events.recv(), if engine_open => {
                let Some(session) = session.upgrade() else { break };
                match event {
                    Some(EngineEvent::PlaybackStateChanged(state)) => {
                        debug!("session: playback state {:?}", state.transport);
                        session.playback_state.set(state);
                    }
                    Some(EngineEvent::MetadataChanged(now_playing)) => {
                        debug!("session: now playing {:?}", now_playing.id());
                        session.now_playing.set(now_playing);
                    }
                    Some(EngineEvent::Disconnected) | None => {
                        warn!("session: playback engine disconnected");
                        engine_open = false;
                        session.is_connected.set(false);
                    }
                }
            }

            event = service_events.recv() => {
                let Some(session) = session.upgrade() else { break };
                match event {
                    Ok(ServiceEvent::CatalogReplaced { generation })
                        if generation < session.service.generation() =>
                    {
                        debug!("session: ignoring superseded catalog generation {}", generation);
                    }
                    Ok(ServiceEvent::CatalogReplaced { generation }) => {
                        info!("session: catalog generation {} replaced, redelivering", generation);
                        redeliver_all(&session);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("session: missed {} service events, redelivering", n);
                        redeliver_all(&session);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("session: pump exiting");
}

fn redeliver_all(session: &SessionConnection) {
    let targets: Vec<(SubscriptionId, String)> = lock(&session.subscriptions)
        .entries
        .iter()
        .map(|(id, sub)| (*id, sub.node_id.clone()))
        .collect();
    for (id, node_id) in targets {
        deliver_children(
            &session.service,
            &session.delivery,
            &session.subscriptions,
            id,
            &node_id,
        );
    }
}
