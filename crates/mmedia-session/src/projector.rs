//! Projection of browse children against the live playback state.

use mmedia_proto::model::{Marker, MediaItem, MediaItemData, NowPlaying, PlaybackState, TransportState};

/// Marker for the item `media_id`: playing when it is the loaded track and
/// the engine is playing, paused when it is the loaded track in any other
/// prepared state, none otherwise.
pub fn marker_for(media_id: &str, state: &PlaybackState, now_playing: &NowPlaying) -> Marker {
    if !now_playing.is_active(media_id) {
        return Marker::None;
    }
    match state.transport {
        TransportState::Playing => Marker::Playing,
        TransportState::None => Marker::None,
        _ => Marker::Paused,
    }
}

pub fn project(
    children: &[MediaItem],
    state: &PlaybackState,
    now_playing: &NowPlaying,
) -> Vec<MediaItemData> {
    children
        .iter()
        .map(|item| MediaItemData::from_item(item, marker_for(&item.id, state, now_playing)))
        .collect()
}
