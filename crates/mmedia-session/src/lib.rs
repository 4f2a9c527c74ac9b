//! Client side of mmedia: a session over the media service and a playback
//! engine, the live projection of browse nodes and selection handling.

pub mod delivery;
pub mod dispatcher;
pub mod engine;
pub mod http;
pub mod media_items;
pub mod observable;
pub mod projector;
pub mod session;
