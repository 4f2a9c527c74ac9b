use crate::dispatcher::{Selection, SelectionDispatcher};
use crate::projector;
use crate::session::SessionConnection;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use mmedia_library::service::ChildrenReply;
use mmedia_proto::model::{MediaItemData, NowPlaying, PlaybackState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct HttpState {
    pub session: Arc<SessionConnection>,
    pub dispatcher: Arc<SelectionDispatcher>,
}

#[derive(Serialize)]
struct ApiState {
    connected: bool,
    root_id: Option<String>,
    playback_state: PlaybackState,
    now_playing: NowPlaying,
}

#[derive(Serialize)]
struct RootInfo {
    root_id: String,
}

#[derive(Deserialize)]
struct ChildrenParams {
    id: String,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/root", get(get_root))
        .route("/api/children", get(get_children))
        .route("/api/play", post(play))
        .route("/api/pause", post(pause))
        .route("/api/play/:id", post(play_from_id))
        .route("/api/select", post(select))
        .with_state(state)
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<ApiState> {
    let session = &state.session;
    Json(ApiState {
        connected: session.is_connected().value(),
        root_id: session.root_id(),
        playback_state: session.playback_state().value(),
        now_playing: session.now_playing().value(),
    })
}

async fn get_root(State(state): State<HttpState>) -> Result<Json<RootInfo>, StatusCode> {
    state
        .session
        .root_id()
        .map(|root_id| Json(RootInfo { root_id }))
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_children(
    State(state): State<HttpState>,
    Query(params): Query<ChildrenParams>,
) -> Result<Json<Vec<MediaItemData>>, StatusCode> {
    match state.session.children(&params.id).wait().await {
        ChildrenReply::Children(children) => {
            let playback = state.session.playback_state().value();
            let now_playing = state.session.now_playing().value();
            Ok(Json(projector::project(&children, &playback, &now_playing)))
        }
        ChildrenReply::NoSuchNode => Err(StatusCode::NOT_FOUND),
        ChildrenReply::Unavailable => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn play(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Play");
    match state.session.play() {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!("HTTP API: play failed: {}", e);
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn pause(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Pause");
    match state.session.pause() {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!("HTTP API: pause failed: {}", e);
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn play_from_id(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    info!("HTTP API: Play {}", id);
    match state.session.play_from_id(&id) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!("HTTP API: play {} failed: {}", id, e);
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn select(State(state): State<HttpState>, Json(item): Json<MediaItemData>) -> Json<Selection> {
    info!("HTTP API: Select {}", item.media_id);
    Json(state.dispatcher.on_item_selected(&item))
}
