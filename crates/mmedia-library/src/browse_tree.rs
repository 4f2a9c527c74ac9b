//! Browse hierarchy derived from a loaded catalog.
//!
//! ```text
//!   "/" ──┬── album "Wake Up" ──┬── wake_up_01
//!         │                     └── wake_up_02
//!         └── album "Spatial"  ─── spatial_01
//! ```
//!
//! Built in two passes: tracks are grouped by album id in first-occurrence
//! order, then the groups are flattened into one node arena.  Every child list
//! is a list of arena indices, so a node is stored exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use mmedia_proto::model::{album_id, AlbumNode, BrowseNode, MediaItem, Track, EMPTY_ROOT_ID, ROOT_ID};

pub struct BrowseTree {
    nodes: Vec<BrowseNode>,
    children: HashMap<String, Vec<usize>>,
}

impl BrowseTree {
    pub fn build(tracks: &[Arc<Track>]) -> Self {
        // Pass 1: group by album, first occurrence decides album order.
        let mut groups: Vec<(AlbumNode, Vec<Arc<Track>>)> = Vec::new();
        let mut group_of: HashMap<String, usize> = HashMap::new();
        for track in tracks {
            let id = album_id(&track.album);
            let group = *group_of.entry(id).or_insert_with(|| {
                groups.push((AlbumNode::from_track(track), Vec::new()));
                groups.len() - 1
            });
            groups[group].1.push(Arc::clone(track));
        }

        // Pass 2: flatten into the arena.
        let mut nodes = Vec::with_capacity(groups.len() + tracks.len());
        let mut children = HashMap::with_capacity(groups.len() + 2);
        let mut root = Vec::with_capacity(groups.len());
        for (album, album_tracks) in groups {
            let album_id = album.id.clone();
            root.push(nodes.len());
            nodes.push(BrowseNode::Album(album));

            let mut album_children = Vec::with_capacity(album_tracks.len());
            for track in album_tracks {
                album_children.push(nodes.len());
                nodes.push(BrowseNode::Track(track));
            }
            children.insert(album_id, album_children);
        }
        children.insert(ROOT_ID.to_string(), root);
        children.insert(EMPTY_ROOT_ID.to_string(), Vec::new());

        Self { nodes, children }
    }

    /// Children of `id` in order, or `None` if no such node exists.
    pub fn lookup(&self, id: &str) -> Option<Vec<&BrowseNode>> {
        self.children
            .get(id)
            .map(|indices| indices.iter().map(|&idx| &self.nodes[idx]).collect())
    }

    /// Children of `id` as handed to browsing clients.
    pub fn media_items(&self, id: &str) -> Option<Vec<MediaItem>> {
        self.lookup(id)
            .map(|nodes| nodes.into_iter().map(BrowseNode::to_media_item).collect())
    }

    pub fn album_count(&self) -> usize {
        self.children.get(ROOT_ID).map_or(0, Vec::len)
    }

    pub fn track_count(&self) -> usize {
        self.nodes.len() - self.album_count()
    }
}
