//! Selection handling.
//!
//! Browsable items navigate; playable items either toggle the loaded track or
//! switch to a new one.
//!
//! ```text
//!   browsable ───────────────────────────► navigation Event(id)
//!   playable, loaded + active ──┬─ pause permitted ─► pause()
//!                               ├─ play permitted ──► play()
//!                               └─ neither ─────────► no-op (logged)
//!   playable, otherwise ─────────────────► play_from_id(id)
//! ```

use std::sync::Arc;

use mmedia_proto::model::MediaItemData;
use serde::Serialize;
use tracing::{debug, warn};

use crate::observable::{Event, Observable, ObserverId};
use crate::session::SessionConnection;

/// What a selection did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "id", rename_all = "snake_case")]
pub enum Selection {
    Navigated(String),
    Paused,
    Resumed,
    Started(String),
    /// The item is loaded but the engine permits neither play nor pause.
    NoAction,
}

pub type NavigationEvent = Option<Arc<Event<String>>>;

pub struct SelectionDispatcher {
    session: Arc<SessionConnection>,
    root_media_id: Observable<Option<String>>,
    navigate_to: Observable<NavigationEvent>,
    connection_observer: ObserverId,
}

impl SelectionDispatcher {
    pub fn new(session: Arc<SessionConnection>) -> Self {
        let delivery = session.delivery().clone();
        let root_media_id = Observable::new(None, delivery.clone());
        let navigate_to = Observable::new(None, delivery);

        let root = root_media_id.clone();
        let root_id = session.service().root().to_string();
        let connection_observer = session.is_connected().observe(move |&connected| {
            root.set(connected.then(|| root_id.clone()));
        });

        Self {
            session,
            root_media_id,
            navigate_to,
            connection_observer,
        }
    }

    /// Root id while the session is connected, `None` otherwise.
    pub fn root_media_id(&self) -> &Observable<Option<String>> {
        &self.root_media_id
    }

    /// Navigation requests.  Each event is meant for one consumer.
    pub fn navigate_to(&self) -> &Observable<NavigationEvent> {
        &self.navigate_to
    }

    pub fn on_item_selected(&self, item: &MediaItemData) -> Selection {
        if item.browsable {
            debug!("dispatcher: navigate to {:?}", item.media_id);
            self.navigate_to
                .set(Some(Arc::new(Event::new(item.media_id.clone()))));
            return Selection::Navigated(item.media_id.clone());
        }

        let state = self.session.playback_state().value();
        let now_playing = self.session.now_playing().value();

        if state.is_prepared() && now_playing.is_active(&item.media_id) {
            if state.can_pause() {
                if let Err(e) = self.session.pause() {
                    warn!("dispatcher: pause failed: {}", e);
                }
                Selection::Paused
            } else if state.can_play() {
                if let Err(e) = self.session.play() {
                    warn!("dispatcher: play failed: {}", e);
                }
                Selection::Resumed
            } else {
                warn!(
                    "dispatcher: {:?} is loaded ({:?}) but neither play nor pause is permitted",
                    item.media_id, state.transport
                );
                Selection::NoAction
            }
        } else {
            if let Err(e) = self.session.play_from_id(&item.media_id) {
                warn!("dispatcher: play_from_id {:?} failed: {}", item.media_id, e);
            }
            Selection::Started(item.media_id.clone())
        }
    }
}

impl Drop for SelectionDispatcher {
    fn drop(&mut self) {
        self.session.is_connected().remove(self.connection_observer);
    }
}
