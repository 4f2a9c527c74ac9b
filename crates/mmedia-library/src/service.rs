//! MediaService — answers browse queries against the current catalog.
//!
//! Child queries are gated on catalog readiness: if the catalog is loaded the
//! reply is produced on the calling thread, otherwise it is produced once,
//! from the load task, when the catalog settles.
//!
//! The catalog snapshot (loader + lazily built [`BrowseTree`]) is replaced as a
//! whole by [`MediaService::reload`].  When a replacement becomes ready the
//! service broadcasts [`ServiceEvent::CatalogReplaced`] so sessions can
//! re-deliver children to their subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use mmedia_proto::model::{MediaItem, Track, ROOT_ID};
use tokio::sync::{broadcast, oneshot};
use tracing::info;

use crate::browse_tree::BrowseTree;
use crate::catalog::{CatalogLoader, LoadOptions, LoadReport};
use crate::fetch::CatalogFetcher;
use crate::readiness::SourceState;

/// Result of a child query.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildrenReply {
    Children(Vec<MediaItem>),
    /// The id names no node in the current catalog.
    NoSuchNode,
    /// The catalog source never became usable.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A reloaded catalog replaced the previous one and is ready.
    CatalogReplaced { generation: u64 },
}

struct Snapshot {
    generation: u64,
    loader: Arc<CatalogLoader>,
    tree: OnceLock<Arc<BrowseTree>>,
}

impl Snapshot {
    fn tree(&self) -> Option<Arc<BrowseTree>> {
        let catalog = self.loader.catalog()?;
        Some(Arc::clone(
            self.tree
                .get_or_init(|| Arc::new(BrowseTree::build(catalog.tracks()))),
        ))
    }

    fn children(&self, parent_id: &str, ready: bool) -> ChildrenReply {
        if !ready {
            return ChildrenReply::Unavailable;
        }
        match self.tree() {
            Some(tree) => tree
                .media_items(parent_id)
                .map(ChildrenReply::Children)
                .unwrap_or(ChildrenReply::NoSuchNode),
            None => ChildrenReply::Unavailable,
        }
    }
}

pub struct MediaService {
    source: String,
    fetcher: Arc<dyn CatalogFetcher>,
    options: LoadOptions,
    snapshot: RwLock<Arc<Snapshot>>,
    next_generation: AtomicU64,
    events: broadcast::Sender<ServiceEvent>,
}

impl MediaService {
    /// Create the service and start loading `source`.  Must be called from
    /// inside a tokio runtime.
    pub fn start(
        source: impl Into<String>,
        fetcher: Arc<dyn CatalogFetcher>,
        options: LoadOptions,
    ) -> Arc<Self> {
        let source = source.into();
        let loader = CatalogLoader::spawn(source.clone(), Arc::clone(&fetcher), options.clone());
        let (events, _) = broadcast::channel(16);

        Arc::new(Self {
            source,
            fetcher,
            options,
            snapshot: RwLock::new(Arc::new(Snapshot {
                generation: 1,
                loader,
                tree: OnceLock::new(),
            })),
            next_generation: AtomicU64::new(2),
            events,
        })
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Id of the browsable root.
    pub fn root(&self) -> &'static str {
        ROOT_ID
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> SourceState {
        self.current().loader.state()
    }

    pub fn generation(&self) -> u64 {
        self.current().generation
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    /// Produce the children of `parent_id` through `reply`, exactly once.
    ///
    /// Returns `true` if `reply` already ran, `false` if it is deferred until
    /// the catalog settles.
    pub fn load_children<F>(&self, parent_id: &str, reply: F) -> bool
    where
        F: FnOnce(ChildrenReply) + Send + 'static,
    {
        self.load_children_versioned(parent_id, move |_, children| reply(children))
    }

    /// [`load_children`](Self::load_children), also passing the generation
    /// of the snapshot the reply was produced from.
    pub fn load_children_versioned<F>(&self, parent_id: &str, reply: F) -> bool
    where
        F: FnOnce(u64, ChildrenReply) + Send + 'static,
    {
        let snapshot = self.current();
        let gated = Arc::clone(&snapshot);
        let parent_id = parent_id.to_string();
        snapshot.loader.when_ready(move |ready| {
            reply(gated.generation, gated.children(&parent_id, ready))
        })
    }

    /// Children of `parent_id`, waiting for the catalog if necessary.
    pub async fn children(&self, parent_id: &str) -> ChildrenReply {
        let (tx, rx) = oneshot::channel();
        self.load_children(parent_id, move |reply| {
            let _ = tx.send(reply);
        });
        rx.await.unwrap_or(ChildrenReply::Unavailable)
    }

    /// Track by id in the current catalog, if it is loaded.
    pub fn track(&self, id: &str) -> Option<Arc<Track>> {
        self.current().loader.catalog()?.find(id).cloned()
    }

    pub fn report(&self) -> Option<LoadReport> {
        self.current()
            .loader
            .catalog()
            .map(|catalog| catalog.report().clone())
    }

    /// Replace the catalog with a fresh load of the same source.  Returns the
    /// generation of the new snapshot.
    pub fn reload(&self) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let loader = CatalogLoader::spawn(
            self.source.clone(),
            Arc::clone(&self.fetcher),
            self.options.clone(),
        );
        let snapshot = Arc::new(Snapshot {
            generation,
            loader: Arc::clone(&loader),
            tree: OnceLock::new(),
        });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        info!("service: reloading catalog (generation {})", generation);

        let events = self.events.clone();
        loader.when_ready(move |ready| {
            if ready {
                info!("service: catalog generation {} ready", generation);
                let _ = events.send(ServiceEvent::CatalogReplaced { generation });
            }
        });
        generation
    }
}
