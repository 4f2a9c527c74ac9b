#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use mmedia_library::catalog::LoadOptions;
use mmedia_library::fetch::{CatalogFetcher, FetchError};
use mmedia_library::service::MediaService;
use mmedia_proto::model::{
    Artwork, NowPlaying, PlaybackActions, PlaybackState, TrackMetadata, TransportState,
};
use mmedia_session::engine::{EngineError, EngineEvent, PlaybackEngine};
use mmedia_session::session::SessionConnection;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

pub const CATALOG_URL: &str = "https://h/cat/list.json";

/// Serves a fixed catalog document; the first fetch can be held back.
pub struct StaticFetcher {
    document: Mutex<String>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl StaticFetcher {
    pub fn new(document: String) -> Self {
        Self {
            document: Mutex::new(document),
            hold: Mutex::new(None),
        }
    }

    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn set_document(&self, document: String) {
        *self.document.lock().unwrap() = document;
    }
}

impl CatalogFetcher for StaticFetcher {
    fn fetch_document<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            let hold = self.hold.lock().unwrap().take();
            if let Some(hold) = hold {
                let _ = hold.await;
            }
            let document = self.document.lock().unwrap().clone();
            Ok(document)
        })
    }

    fn fetch_artwork<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Artwork, FetchError>> {
        Box::pin(async { Ok(Artwork::Placeholder) })
    }
}

/// Catalog with (id, album) pairs.
pub fn catalog(tracks: &[(&str, &str)]) -> String {
    let music: Vec<_> = tracks
        .iter()
        .map(|(id, album)| {
            json!({
                "id": id,
                "title": format!("Title {id}"),
                "album": album,
                "artist": "Artist",
                "source": format!("{id}.mp3"),
                "image": format!("{id}.jpg"),
                "duration": 60
            })
        })
        .collect();
    json!({ "music": music }).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Play,
    Pause,
    PlayFromId(String),
}

#[derive(Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<Call>>,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl PlaybackEngine for RecordingEngine {
    fn play(&self) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::Play);
        Ok(())
    }

    fn pause(&self) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::Pause);
        Ok(())
    }

    fn play_from_id(&self, id: &str, _extras: Option<serde_json::Value>) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(Call::PlayFromId(id.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub fetcher: Arc<StaticFetcher>,
    pub service: Arc<MediaService>,
    pub engine: Arc<RecordingEngine>,
    pub events: mpsc::Sender<EngineEvent>,
    pub session: Arc<SessionConnection>,
}

impl Harness {
    pub fn start(document: String) -> Self {
        Self::start_with(Arc::new(StaticFetcher::new(document)))
    }

    pub fn start_with(fetcher: Arc<StaticFetcher>) -> Self {
        let service = MediaService::start(CATALOG_URL, fetcher.clone(), LoadOptions::default());
        let engine = Arc::new(RecordingEngine::default());
        let (events, rx) = mpsc::channel(64);
        let session = SessionConnection::connect(Arc::clone(&service), engine.clone(), rx);
        Self {
            fetcher,
            service,
            engine,
            events,
            session,
        }
    }

    /// Push engine state and wait until the session has delivered it.
    pub async fn engine_state(&self, transport: TransportState, actions: PlaybackActions, now: Option<&str>) {
        self.events
            .send(EngineEvent::PlaybackStateChanged(PlaybackState::new(transport, actions)))
            .await
            .unwrap();
        let now_playing = match now {
            Some(id) => NowPlaying::Track(TrackMetadata {
                id: id.to_string(),
                ..Default::default()
            }),
            None => NowPlaying::Nothing,
        };
        self.events
            .send(EngineEvent::MetadataChanged(now_playing.clone()))
            .await
            .unwrap();
        let session = &self.session;
        assert!(
            eventually(|| session.now_playing().value() == now_playing
                && session.playback_state().value().transport == transport)
            .await
        );
        self.session.delivery().flush().await;
    }
}

/// Poll `cond` until it holds or a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
