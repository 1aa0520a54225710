//! HTTP control surface.
//!
//! Mirrors the original jukebox API: transport commands go through
//! `PUT /playlist/:action`, new tracks through `POST /playlist/add` with
//! the raw identifier as the body. Admission control lives here, not in
//! the sequencer: an identifier that does not resolve, or whose title is
//! already queued, is rejected with 409 before the core ever sees it.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use anyhow::Context;
use tracing::{info, warn};

use crate::playlist::Playlist;
use crate::source::TrackSource;
use crate::track::Track;

/// Shared application context passed to all handlers.
#[derive(Clone)]
pub struct AppContext {
    pub playlist: Playlist,
    pub source: Arc<dyn TrackSource>,
    pub cache_dir: PathBuf,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/playlist", get(get_playlist))
        .route("/playlist/add", post(add_track))
        .route("/playlist/:action", put(control))
        .with_state(ctx)
}

/// Bind `addr` and serve the control API until the process exits.
pub async fn serve(ctx: AppContext, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");
    axum::serve(listener, router(ctx))
        .await
        .context("http server error")
}

async fn control(State(ctx): State<AppContext>, Path(action): Path<String>) -> StatusCode {
    match action.as_str() {
        "pause" => ctx.playlist.pause().await,
        "unpause" => ctx.playlist.unpause().await,
        "togglePause" => ctx.playlist.toggle_pause().await,
        "next" => ctx.playlist.next().await,
        _ => return StatusCode::NOT_FOUND,
    }
    StatusCode::OK
}

async fn add_track(State(ctx): State<AppContext>, body: String) -> StatusCode {
    let id = body.trim();
    let track = match Track::resolve(ctx.source.as_ref(), id, &ctx.cache_dir).await {
        Ok(track) => track,
        Err(err) => {
            warn!("rejecting {id}: {err}");
            return StatusCode::CONFLICT;
        }
    };
    if ctx.playlist.contains(&track.title) {
        warn!("rejecting {id}: {} is already queued", track.title);
        return StatusCode::CONFLICT;
    }
    ctx.playlist.enqueue(track).await;
    StatusCode::OK
}

async fn get_playlist(State(ctx): State<AppContext>) -> Json<Vec<String>> {
    Json(ctx.playlist.titles())
}
