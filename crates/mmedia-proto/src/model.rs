//! Catalog, browse and playback model shared by every crate in the workspace.
//!
//! Catalog records (`Track`, `AlbumNode`) are immutable once built.  The
//! playback side (`PlaybackState`, `NowPlaying`) is replaced wholesale on every
//! engine update, never patched in place.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Id of the browsable root node.
pub const ROOT_ID: &str = "/";

/// Root handed to callers that may not browse.  Always resolves to no children.
pub const EMPTY_ROOT_ID: &str = "@empty@";

// ── Album ids ─────────────────────────────────────────────────────────────────

/// Browse id for an album name.  Percent-encoding keeps `/` and `@` out of the
/// result, so an album id can never equal [`ROOT_ID`] or [`EMPTY_ROOT_ID`].
pub fn album_id(album: &str) -> String {
    urlencoding::encode(album).into_owned()
}

/// Inverse of [`album_id`].  `None` if `id` is not a valid encoding.
pub fn album_name(id: &str) -> Option<String> {
    urlencoding::decode(id).ok().map(|name| name.into_owned())
}

// ── Catalog records ───────────────────────────────────────────────────────────

/// Artwork fetched for a track, or the placeholder used when the fetch failed.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Artwork {
    Image {
        bytes: Arc<[u8]>,
        content_type: String,
    },
    #[default]
    Placeholder,
}

impl Artwork {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Artwork::Placeholder)
    }
}

/// One playable entry of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    /// `None` when the document did not carry a usable duration.
    pub duration_ms: Option<u64>,
    /// Absolute locator of the playable media.
    pub media_uri: String,
    /// Absolute locator of the artwork.
    pub artwork_uri: String,
    pub artwork: Artwork,
    pub track_number: u64,
    pub track_count: u64,
    pub playable: bool,
}

/// Synthetic, browsable grouping of tracks that share an album name.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumNode {
    /// `album_id(title)`.
    pub id: String,
    pub title: String,
    /// Artist of the first track seen for this album.
    pub artist: String,
    pub artwork_uri: String,
    pub artwork: Artwork,
}

impl AlbumNode {
    /// Album node synthesized from the first track seen for its album.
    pub fn from_track(track: &Track) -> Self {
        Self {
            id: album_id(&track.album),
            title: track.album.clone(),
            artist: track.artist.clone(),
            artwork_uri: track.artwork_uri.clone(),
            artwork: track.artwork.clone(),
        }
    }
}

/// A child in the browse hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseNode {
    Album(AlbumNode),
    Track(Arc<Track>),
}

impl BrowseNode {
    pub fn id(&self) -> &str {
        match self {
            BrowseNode::Album(album) => &album.id,
            BrowseNode::Track(track) => &track.id,
        }
    }

    pub fn is_browsable(&self) -> bool {
        matches!(self, BrowseNode::Album(_))
    }

    /// Description handed to browsing clients.
    pub fn to_media_item(&self) -> MediaItem {
        match self {
            BrowseNode::Album(album) => MediaItem {
                id: album.id.clone(),
                title: album.title.clone(),
                subtitle: album.artist.clone(),
                description: String::new(),
                icon_uri: album.artwork_uri.clone(),
                flag: MediaFlag::Browsable,
            },
            BrowseNode::Track(track) => MediaItem {
                id: track.id.clone(),
                title: track.title.clone(),
                subtitle: track.artist.clone(),
                description: track.album.clone(),
                icon_uri: track.artwork_uri.clone(),
                flag: if track.playable {
                    MediaFlag::Playable
                } else {
                    MediaFlag::Browsable
                },
            },
        }
    }
}

// ── Browse surface ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFlag {
    Browsable,
    Playable,
}

/// What the service hands to browsing clients for each child of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    pub icon_uri: String,
    pub flag: MediaFlag,
}

impl MediaItem {
    pub fn is_browsable(&self) -> bool {
        self.flag == MediaFlag::Browsable
    }
}

// ── Playback ──────────────────────────────────────────────────────────────────

/// Transport state reported by the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    None,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Error,
}

/// Which transport commands the engine currently accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackActions {
    #[serde(default)]
    pub play: bool,
    #[serde(default)]
    pub pause: bool,
}

impl PlaybackActions {
    pub const NONE: Self = Self {
        play: false,
        pause: false,
    };
    pub const PLAY: Self = Self {
        play: true,
        pause: false,
    };
    pub const PAUSE: Self = Self {
        play: false,
        pause: true,
    };
    pub const PLAY_PAUSE: Self = Self {
        play: true,
        pause: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub transport: TransportState,
    #[serde(default)]
    pub actions: PlaybackActions,
}

impl PlaybackState {
    pub fn new(transport: TransportState, actions: PlaybackActions) -> Self {
        Self { transport, actions }
    }

    /// State before the engine has reported anything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A track is loaded in the engine (anything but `None`).
    pub fn is_prepared(&self) -> bool {
        self.transport != TransportState::None
    }

    pub fn is_playing(&self) -> bool {
        self.transport == TransportState::Playing
    }

    pub fn can_play(&self) -> bool {
        self.actions.play
    }

    pub fn can_pause(&self) -> bool {
        self.actions.pause
    }
}

/// Metadata of the track currently loaded in the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub artwork_uri: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl From<&Track> for TrackMetadata {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            artwork_uri: track.artwork_uri.clone(),
            duration_ms: track.duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NowPlaying {
    #[default]
    Nothing,
    Track(TrackMetadata),
}

impl NowPlaying {
    pub fn id(&self) -> Option<&str> {
        match self {
            NowPlaying::Nothing => None,
            NowPlaying::Track(meta) => Some(&meta.id),
        }
    }

    pub fn is_active(&self, media_id: &str) -> bool {
        self.id() == Some(media_id)
    }
}

// ── UI projection ─────────────────────────────────────────────────────────────

/// Playback marker drawn next to a projected item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    #[default]
    None,
    Playing,
    Paused,
}

/// One row of the UI projection of a node's children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItemData {
    pub media_id: String,
    pub title: String,
    pub subtitle: String,
    pub icon_uri: String,
    pub browsable: bool,
    pub marker: Marker,
}

impl MediaItemData {
    pub fn from_item(item: &MediaItem, marker: Marker) -> Self {
        Self {
            media_id: item.id.clone(),
            title: item.title.clone(),
            subtitle: item.subtitle.clone(),
            icon_uri: item.icon_uri.clone(),
            browsable: item.is_browsable(),
            marker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, album: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Title {id}"),
            artist: "Artist".to_string(),
            album: album.to_string(),
            genre: String::new(),
            duration_ms: Some(1000),
            media_uri: format!("https://h/{id}.mp3"),
            artwork_uri: format!("https://h/{id}.png"),
            artwork: Artwork::Placeholder,
            track_number: 1,
            track_count: 1,
            playable: true,
        }
    }

    #[test]
    fn test_album_id_is_reversible() {
        for name in ["Wake Up", "AC/DC Live", "@empty@", "Ünïcødé & more", ""] {
            let id = album_id(name);
            assert_eq!(album_name(&id).as_deref(), Some(name));
        }
    }

    #[test]
    fn test_album_id_never_collides_with_reserved_ids() {
        assert_ne!(album_id("/"), ROOT_ID);
        assert_ne!(album_id("@empty@"), EMPTY_ROOT_ID);
    }

    #[test]
    fn test_track_media_item() {
        let item = BrowseNode::Track(Arc::new(track("a", "X"))).to_media_item();
        assert_eq!(item.id, "a");
        assert_eq!(item.subtitle, "Artist");
        assert_eq!(item.description, "X");
        assert!(!item.is_browsable());
    }

    #[test]
    fn test_album_media_item_is_browsable() {
        let album = AlbumNode::from_track(&track("a", "Some Album"));
        assert_eq!(album.id, "Some%20Album");
        let item = BrowseNode::Album(album).to_media_item();
        assert!(item.is_browsable());
        assert_eq!(item.icon_uri, "https://h/a.png");
    }

    #[test]
    fn test_prepared_means_not_none() {
        assert!(!PlaybackState::empty().is_prepared());
        for transport in [
            TransportState::Buffering,
            TransportState::Playing,
            TransportState::Paused,
            TransportState::Stopped,
            TransportState::Error,
        ] {
            assert!(PlaybackState::new(transport, PlaybackActions::NONE).is_prepared());
        }
    }

    #[test]
    fn test_now_playing_wire_shape() {
        let json = serde_json::to_value(NowPlaying::Nothing).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "nothing" }));

        let np: NowPlaying =
            serde_json::from_str(r#"{"kind":"track","id":"wake_up_01","title":"Intro"}"#).unwrap();
        assert!(np.is_active("wake_up_01"));
        assert!(!np.is_active("other"));
    }
}
