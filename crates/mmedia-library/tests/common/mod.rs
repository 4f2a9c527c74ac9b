#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use mmedia_library::fetch::{CatalogFetcher, FetchError};
use mmedia_proto::model::Artwork;
use serde_json::{json, Value};
use tokio::sync::oneshot;

pub const CATALOG_URL: &str = "https://h/cat/list.json";

/// In-memory fetcher.  The document can be held back until `release()` is
/// called, so tests can observe the loader while it is still initializing.
pub struct ScriptedFetcher {
    document: Mutex<Option<String>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    failing_artwork: HashSet<String>,
    panic_on_document: bool,
    pub document_calls: AtomicUsize,
    pub artwork_calls: Mutex<Vec<String>>,
}

pub struct Release(oneshot::Sender<()>);

impl Release {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

impl ScriptedFetcher {
    /// Serves `document` (or a 404 when `None`).
    pub fn new(document: Option<String>) -> Self {
        Self {
            document: Mutex::new(document),
            hold: Mutex::new(None),
            failing_artwork: HashSet::new(),
            panic_on_document: false,
            document_calls: AtomicUsize::new(0),
            artwork_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_artwork(mut self, url: &str) -> Self {
        self.failing_artwork.insert(url.to_string());
        self
    }

    /// The document fetch panics, killing the load task.
    pub fn panicking(mut self) -> Self {
        self.panic_on_document = true;
        self
    }

    /// Hold the next document fetch until the returned handle is released.
    pub fn hold(&self) -> Release {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        Release(tx)
    }

    pub fn set_document(&self, document: Option<String>) {
        *self.document.lock().unwrap() = document;
    }
}

impl CatalogFetcher for ScriptedFetcher {
    fn fetch_document<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_document {
                panic!("document fetch blew up");
            }
            let hold = self.hold.lock().unwrap().take();
            if let Some(hold) = hold {
                let _ = hold.await;
            }
            let document = self.document.lock().unwrap().clone();
            document.ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }

    fn fetch_artwork<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Artwork, FetchError>> {
        Box::pin(async move {
            self.artwork_calls.lock().unwrap().push(url.to_string());
            if self.failing_artwork.contains(url) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 500,
                });
            }
            Ok(Artwork::Image {
                bytes: Arc::from(url.as_bytes()),
                content_type: "image/jpeg".to_string(),
            })
        })
    }
}

pub fn entry(id: &str, album: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Title {id}"),
        "album": album,
        "artist": format!("Artist of {album}"),
        "genre": "Electronic",
        "source": format!("{id}.mp3"),
        "image": format!("/art/{id}.jpg"),
        "trackNumber": 1,
        "totalTrackCount": 2,
        "duration": 90,
        "site": "http://example.org/"
    })
}

pub fn document(entries: &[Value]) -> String {
    json!({ "music": entries }).to_string()
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
