//! Live projection of one browse node.
//!
//! Combines the node's children subscription with the playback-state and
//! now-playing observers and republishes the projection whenever any of the
//! three changes.  All inputs arrive on the session's delivery context, so the
//! projection inputs are only ever updated one at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mmedia_library::service::ChildrenReply;
use mmedia_proto::model::{MediaItem, MediaItemData, NowPlaying, PlaybackState};
use tracing::{debug, warn};

use crate::observable::{Observable, ObserverId};
use crate::projector;
use crate::session::{SessionConnection, SubscriptionId};

#[derive(Default)]
struct Inputs {
    children: Vec<MediaItem>,
    state: PlaybackState,
    now_playing: NowPlaying,
}

struct Projection {
    inputs: Mutex<Inputs>,
    items: Observable<Vec<MediaItemData>>,
}

impl Projection {
    fn update(&self, apply: impl FnOnce(&mut Inputs)) {
        let projected = {
            let mut inputs = self.inputs.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut inputs);
            projector::project(&inputs.children, &inputs.state, &inputs.now_playing)
        };
        self.items.set(projected);
    }
}

pub struct MediaItemsModel {
    session: Arc<SessionConnection>,
    node_id: String,
    projection: Arc<Projection>,
    subscription: SubscriptionId,
    state_observer: ObserverId,
    now_playing_observer: ObserverId,
    closed: AtomicBool,
}

impl MediaItemsModel {
    pub fn new(session: Arc<SessionConnection>, node_id: &str) -> Self {
        let projection = Arc::new(Projection {
            inputs: Mutex::new(Inputs::default()),
            items: Observable::new(Vec::new(), session.delivery().clone()),
        });

        let p = Arc::clone(&projection);
        let subscription = session.subscribe(node_id, move |node, reply| match reply {
            ChildrenReply::Children(children) => {
                debug!("media items: {} children for {:?}", children.len(), node);
                let children = children.clone();
                p.update(|inputs| inputs.children = children);
            }
            ChildrenReply::NoSuchNode => {
                warn!("media items: {:?} is not a browse node", node);
                p.update(|inputs| inputs.children.clear());
            }
            ChildrenReply::Unavailable => {
                warn!("media items: catalog unavailable for {:?}", node);
                p.update(|inputs| inputs.children.clear());
            }
        });

        let p = Arc::clone(&projection);
        let state_observer = session
            .playback_state()
            .observe(move |state| {
                let state = state.clone();
                p.update(|inputs| inputs.state = state);
            });

        let p = Arc::clone(&projection);
        let now_playing_observer = session.now_playing().observe(move |now_playing| {
            let now_playing = now_playing.clone();
            p.update(|inputs| inputs.now_playing = now_playing);
        });

        Self {
            session,
            node_id: node_id.to_string(),
            projection,
            subscription,
            state_observer,
            now_playing_observer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The projected children, starting from an empty list.
    pub fn items(&self) -> &Observable<Vec<MediaItemData>> {
        &self.projection.items
    }

    /// Stop following the node.  Called on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.unsubscribe(&self.node_id, self.subscription);
        self.session.playback_state().remove(self.state_observer);
        self.session.now_playing().remove(self.now_playing_observer);
        debug!("media items: closed {:?}", self.node_id);
    }
}

impl Drop for MediaItemsModel {
    fn drop(&mut self) {
        self.close();
    }
}
