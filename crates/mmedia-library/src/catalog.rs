//! Catalog loading.
//!
//! A [`CatalogLoader`] is created in `Initializing` and immediately spawns one
//! background task that:
//!   1. fetches and parses the catalog document (failure → empty catalog),
//!   2. validates entries (malformed or duplicate ids are skipped and counted),
//!   3. resolves relative locators against the document's base path,
//!   4. fetches artwork per entry with bounded, order-preserving concurrency
//!      (failure → placeholder),
//!   5. publishes the catalog and opens the readiness gate.
//!
//! ## Document schema
//!
//! ```json
//! { "music": [ { "id": "wake_up_01", "title": "Intro - The Way Of Waking Up",
//!                "album": "Wake Up", "artist": "The Kyoto Connection",
//!                "genre": "Electronic", "source": "01_Intro.mp3",
//!                "image": "art.jpg", "trackNumber": 1, "totalTrackCount": 13,
//!                "duration": 90, "site": "http://freemusicarchive.org/" } ] }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use futures_util::stream::{self, StreamExt};
use mmedia_proto::config::CatalogConfig;
use mmedia_proto::model::{Artwork, Track};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::fetch::CatalogFetcher;
use crate::readiness::{ReadinessGate, SourceState};

// ── Document schema ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonCatalog {
    music: Vec<serde_json::Value>,
}

/// One entry of the catalog document.  Missing fields take these defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonMusic {
    pub id: String,
    pub title: String,
    pub album: String,
    pub artist: String,
    pub genre: String,
    pub source: String,
    pub image: String,
    pub track_number: i64,
    pub total_track_count: i64,
    /// Seconds; negative when unknown.
    pub duration: i64,
    pub site: String,
}

impl Default for JsonMusic {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            album: String::new(),
            artist: String::new(),
            genre: String::new(),
            source: String::new(),
            image: String::new(),
            track_number: 0,
            total_track_count: 0,
            duration: -1,
            site: String::new(),
        }
    }
}

impl JsonMusic {
    pub fn into_track(self, artwork: Artwork) -> Track {
        Track {
            duration_ms: u64::try_from(self.duration)
                .ok()
                .map(|secs| secs.saturating_mul(1000)),
            track_number: self.track_number.max(0) as u64,
            track_count: self.total_track_count.max(0) as u64,
            id: self.id,
            title: self.title,
            artist: self.artist,
            album: self.album,
            genre: self.genre,
            media_uri: self.source,
            artwork_uri: self.image,
            artwork,
            playable: true,
        }
    }
}

/// Raw entries of a catalog document.  A document without a `music` list is
/// an empty catalog; a body that is not a JSON object is an error.
pub fn parse_document(body: &str) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    let catalog: JsonCatalog = serde_json::from_str(body)?;
    Ok(catalog.music)
}

/// Keep well-formed entries with unique, non-empty ids.  Returns the kept
/// entries in document order and the number skipped.
pub fn validate_entries(raw: Vec<serde_json::Value>) -> (Vec<JsonMusic>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(raw.len());
    let mut skipped = 0;

    for (idx, value) in raw.into_iter().enumerate() {
        let entry: JsonMusic = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("catalog: skipping malformed entry #{}: {}", idx, e);
                skipped += 1;
                continue;
            }
        };
        if entry.id.is_empty() {
            warn!("catalog: skipping entry #{} without an id", idx);
            skipped += 1;
            continue;
        }
        if !seen.insert(entry.id.clone()) {
            warn!("catalog: skipping entry #{} with duplicate id {:?}", idx, entry.id);
            skipped += 1;
            continue;
        }
        kept.push(entry);
    }

    (kept, skipped)
}

// ── Locators ──────────────────────────────────────────────────────────────────

/// Document locator with its last path segment removed, keeping the trailing
/// `/`.  Query and fragment are dropped.
pub fn base_uri(document_url: &str) -> &str {
    let end = document_url
        .find(|c| c == '?' || c == '#')
        .unwrap_or(document_url.len());
    let path = &document_url[..end];
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

/// Prefix `locator` with `base` unless it already carries `scheme`.
pub fn resolve_locator(locator: &str, scheme: &str, base: &str) -> String {
    let is_absolute = locator
        .strip_prefix(scheme)
        .is_some_and(|rest| rest.starts_with(':'));
    if is_absolute {
        locator.to_string()
    } else {
        format!("{}{}", base, locator.trim_start_matches('/'))
    }
}

// ── Loaded catalog ────────────────────────────────────────────────────────────

/// What happened during one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub tracks: usize,
    /// Entries dropped as malformed or duplicate.
    pub skipped: usize,
    /// Tracks that fell back to placeholder artwork.
    pub artwork_fallbacks: usize,
    /// Why the whole document was treated as empty, if it was.
    pub document_error: Option<String>,
}

/// Immutable result of a completed load.
#[derive(Debug, Default)]
pub struct Catalog {
    tracks: Vec<Arc<Track>>,
    report: LoadReport,
}

impl Catalog {
    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Arc<Track>> {
        self.tracks.iter().find(|track| track.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub artwork_concurrency: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            artwork_concurrency: 4,
        }
    }
}

impl From<&CatalogConfig> for LoadOptions {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            artwork_concurrency: config.artwork_concurrency.max(1),
        }
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

pub struct CatalogLoader {
    source: String,
    gate: ReadinessGate,
    catalog: OnceLock<Catalog>,
}

impl CatalogLoader {
    /// Start loading `source` in the background.  Must be called from inside
    /// a tokio runtime.
    ///
    /// A source that is not a valid URL moves the loader straight to `Error`.
    pub fn spawn(
        source: impl Into<String>,
        fetcher: Arc<dyn CatalogFetcher>,
        options: LoadOptions,
    ) -> Arc<Self> {
        let loader = Arc::new(Self {
            source: source.into(),
            gate: ReadinessGate::new(),
            catalog: OnceLock::new(),
        });

        let url = match reqwest::Url::parse(&loader.source) {
            Ok(url) => url,
            Err(e) => {
                error!("catalog: invalid source {:?}: {}", loader.source, e);
                loader.gate.set_state(SourceState::Error);
                return loader;
            }
        };

        loader.gate.set_state(SourceState::Initializing);
        info!("catalog: loading {}", url);

        let mut guard = LoadGuard {
            loader: Arc::clone(&loader),
            published: false,
        };
        tokio::spawn(async move {
            let catalog = load_catalog(&url, fetcher.as_ref(), &options).await;
            guard.loader.publish(catalog);
            guard.published = true;
        });

        loader
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> SourceState {
        self.gate.state()
    }

    /// See [`ReadinessGate::when_ready`].  `true` means the callback already
    /// ran; `false` means it is pending.
    pub fn when_ready<F>(&self, callback: F) -> bool
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.gate.when_ready(callback)
    }

    pub async fn ready(&self) -> bool {
        self.gate.ready().await
    }

    /// The loaded catalog, once initialized.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.get()
    }

    fn publish(&self, catalog: Catalog) {
        info!(
            "catalog: {} tracks ready ({} skipped, {} artwork fallbacks)",
            catalog.report.tracks, catalog.report.skipped, catalog.report.artwork_fallbacks
        );
        if self.catalog.set(catalog).is_err() {
            warn!("catalog: {} published twice, keeping the first", self.source);
        }
        self.gate.set_state(SourceState::Initialized);
    }
}

/// Moves the loader to `Error` if the load task ends without publishing
/// (panic or runtime shutdown), so no waiter is left hanging.
struct LoadGuard {
    loader: Arc<CatalogLoader>,
    published: bool,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if !self.published {
            error!("catalog: load of {} ended without a result", self.loader.source);
            self.loader.gate.set_state(SourceState::Error);
        }
    }
}

async fn load_catalog(
    url: &reqwest::Url,
    fetcher: &dyn CatalogFetcher,
    options: &LoadOptions,
) -> Catalog {
    let mut report = LoadReport::default();

    let raw = match fetcher.fetch_document(url.as_str()).await {
        Ok(body) => match parse_document(&body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("catalog: {} is not a catalog document, using an empty catalog: {}", url, e);
                report.document_error = Some(e.to_string());
                Vec::new()
            }
        },
        Err(e) => {
            warn!("catalog: failed to fetch {}, using an empty catalog: {}", url, e);
            report.document_error = Some(e.to_string());
            Vec::new()
        }
    };

    let (entries, skipped) = validate_entries(raw);
    report.skipped = skipped;

    let base = base_uri(url.as_str());
    let scheme = url.scheme();

    let tracks: Vec<Arc<Track>> = stream::iter(entries)
        .map(|mut entry| async move {
            entry.source = resolve_locator(&entry.source, scheme, base);

            // An entry without an image stays without a locator.
            let artwork = if entry.image.is_empty() {
                debug!("catalog: {:?} has no artwork, using placeholder", entry.id);
                Artwork::Placeholder
            } else {
                entry.image = resolve_locator(&entry.image, scheme, base);
                match fetcher.fetch_artwork(&entry.image).await {
                    Ok(artwork) => artwork,
                    Err(e) => {
                        warn!("catalog: artwork for {:?} unavailable, using placeholder: {}", entry.id, e);
                        Artwork::Placeholder
                    }
                }
            };
            debug!("catalog: prepared {:?}", entry.id);
            Arc::new(entry.into_track(artwork))
        })
        .buffered(options.artwork_concurrency.max(1))
        .collect()
        .await;

    report.tracks = tracks.len();
    report.artwork_fallbacks = tracks
        .iter()
        .filter(|track| track.artwork.is_placeholder())
        .count();

    Catalog { tracks, report }
}
