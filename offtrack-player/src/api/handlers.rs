//! HTTP request handlers
//!
//! Handlers that change the store ask the controller to re-resolve its view
//! afterwards and publish a change event for the UI.

use crate::api::server::AppContext;
use crate::db::{PlaylistRecord, TrackPatch, TrackRecord};
use crate::error::{Error, Result};
use crate::import::{self, ImportReport};
use crate::library::ViewMode;
use crate::playback::{LoadTicket, LoopRegion, SessionSnapshot};
use axum::{
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    body::Bytes,
    Json,
};
use chrono::Utc;
use offtrack_common::events::{EndPolicy, PlayerEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            status: "ok".to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    pub index_a: usize,
    pub index_b: usize,
}

#[derive(Debug, Deserialize)]
pub struct ImportFolderRequest {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub track_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub playlist_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub mode: ViewMode,
    pub tracks: Vec<TrackRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position: f64,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub delta: f64,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct PitchRequest {
    pub preserve_pitch: bool,
}

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub policy: EndPolicy,
}

/// Both bounds set a region, neither clears it
#[derive(Debug, Deserialize)]
pub struct LoopRequest {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// Result of a playback control call
#[derive(Debug, Serialize)]
pub struct PlaybackResponse {
    /// Set when the call started a new load
    pub ticket: Option<LoadTicket>,
    pub session: SessionSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct TicketReport {
    pub ticket: LoadTicket,
}

#[derive(Debug, Deserialize)]
pub struct FailureReport {
    pub ticket: LoadTicket,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressReport {
    pub ticket: LoadTicket,
    pub position: f64,
}

#[derive(Debug, Deserialize)]
pub struct MetadataReport {
    pub ticket: LoadTicket,
    pub duration: f64,
}

#[derive(Debug, Serialize)]
pub struct TransportAck {
    /// False when the report belonged to a superseded load
    pub applied: bool,
    pub fault: Option<String>,
}

impl TransportAck {
    fn applied(applied: bool) -> Json<Self> {
        Json(Self {
            applied,
            fault: None,
        })
    }
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "offtrack-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Tracks
// ============================================================================

fn library_changed(ctx: &AppContext) {
    ctx.state.broadcast_event(PlayerEvent::LibraryChanged {
        timestamp: Utc::now(),
    });
}

fn playlists_changed(ctx: &AppContext, playlist_id: Option<i64>) {
    ctx.state.broadcast_event(PlayerEvent::PlaylistsChanged {
        playlist_id,
        timestamp: Utc::now(),
    });
}

/// GET /api/tracks - the library in normalized order
pub async fn list_tracks(State(ctx): State<AppContext>) -> Result<Json<Vec<TrackRecord>>> {
    Ok(Json(ctx.resolver.resolve_library().await?))
}

/// GET /api/tracks/:id
pub async fn get_track(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<TrackRecord>> {
    Ok(Json(ctx.tracks.get(id).await?))
}

/// POST /api/tracks?name=<name> - raw payload body
pub async fn upload_track(
    State(ctx): State<AppContext>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<TrackRecord>)> {
    let media_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let id = import::import_bytes(&ctx.tracks, &query.name, media_type.as_deref(), &body).await?;
    let record = ctx.tracks.get(id).await?;

    ctx.controller.lock().await.reload().await?;
    library_changed(&ctx);

    Ok((StatusCode::CREATED, Json(record)))
}

/// PATCH /api/tracks/:id
pub async fn update_track(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(patch): Json<TrackPatch>,
) -> Result<Json<TrackRecord>> {
    if patch.is_empty() {
        return Err(Error::BadRequest("nothing to update".to_string()));
    }

    let record = ctx.controller.lock().await.update_track(id, patch).await?;
    library_changed(&ctx);

    Ok(Json(record))
}

/// DELETE /api/tracks/:id
pub async fn delete_track(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>> {
    ctx.tracks.delete(id).await?;

    ctx.controller.lock().await.track_removed(id).await?;
    library_changed(&ctx);
    playlists_changed(&ctx, None);

    Ok(StatusResponse::ok())
}

/// POST /api/tracks/reorder - swap two library positions
pub async fn reorder_library(
    State(ctx): State<AppContext>,
    Json(request): Json<SwapRequest>,
) -> Result<Json<Vec<TrackRecord>>> {
    let view = ctx
        .resolver
        .reorder_library(request.index_a, request.index_b)
        .await?;

    ctx.controller.lock().await.reload().await?;
    library_changed(&ctx);

    Ok(Json(view))
}

/// POST /api/import/folder
pub async fn import_folder(
    State(ctx): State<AppContext>,
    Json(request): Json<ImportFolderRequest>,
) -> Result<Json<ImportReport>> {
    let report = import::import_folder(&ctx.tracks, &request.path).await?;

    if !report.imported.is_empty() {
        ctx.controller.lock().await.reload().await?;
        library_changed(&ctx);
    }

    Ok(Json(report))
}

// ============================================================================
// Playlists
// ============================================================================

/// GET /api/playlists
pub async fn list_playlists(State(ctx): State<AppContext>) -> Result<Json<Vec<PlaylistRecord>>> {
    Ok(Json(ctx.playlists.list().await?))
}

/// POST /api/playlists
pub async fn create_playlist(
    State(ctx): State<AppContext>,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<PlaylistRecord>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest("playlist name is empty".to_string()));
    }

    let id = ctx.playlists.create(name).await?;
    playlists_changed(&ctx, Some(id));

    Ok((StatusCode::CREATED, Json(ctx.playlists.get(id).await?)))
}

/// GET /api/playlists/:id
pub async fn get_playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<PlaylistRecord>> {
    Ok(Json(ctx.playlists.get(id).await?))
}

/// DELETE /api/playlists/:id
pub async fn delete_playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<StatusResponse>> {
    ctx.playlists.delete(id).await?;

    ctx.controller.lock().await.reload().await?;
    playlists_changed(&ctx, Some(id));

    Ok(StatusResponse::ok())
}

/// POST /api/playlists/:id/rename
pub async fn rename_playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(request): Json<NameRequest>,
) -> Result<Json<PlaylistRecord>> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest("playlist name is empty".to_string()));
    }

    ctx.playlists.rename(id, name).await?;
    playlists_changed(&ctx, Some(id));

    Ok(Json(ctx.playlists.get(id).await?))
}

/// POST /api/playlists/:id/members
pub async fn add_playlist_member(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(request): Json<MemberRequest>,
) -> Result<Json<PlaylistRecord>> {
    ctx.playlists.add_member(id, request.track_id).await?;
    membership_changed(&ctx, id).await
}

/// DELETE /api/playlists/:id/members/:track_id
pub async fn remove_playlist_member(
    State(ctx): State<AppContext>,
    Path((id, track_id)): Path<(i64, i64)>,
) -> Result<Json<PlaylistRecord>> {
    ctx.playlists.remove_member(id, track_id).await?;
    membership_changed(&ctx, id).await
}

/// POST /api/playlists/:id/reorder - swap two member positions
pub async fn reorder_playlist(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
    Json(request): Json<SwapRequest>,
) -> Result<Json<PlaylistRecord>> {
    ctx.playlists
        .reorder_members(id, request.index_a, request.index_b)
        .await?;
    membership_changed(&ctx, id).await
}

async fn membership_changed(ctx: &AppContext, id: i64) -> Result<Json<PlaylistRecord>> {
    {
        let mut controller = ctx.controller.lock().await;
        if controller.session().mode == ViewMode::Playlist(id) {
            controller.reload().await?;
        }
    }
    playlists_changed(ctx, Some(id));

    Ok(Json(ctx.playlists.get(id).await?))
}

// ============================================================================
// View
// ============================================================================

/// GET /api/view
pub async fn get_view(State(ctx): State<AppContext>) -> Json<ViewResponse> {
    let controller = ctx.controller.lock().await;
    let session = controller.session();

    Json(ViewResponse {
        mode: session.mode,
        tracks: session.view.clone(),
    })
}

/// POST /api/view - `{"playlist_id": null}` selects the library
pub async fn set_view(
    State(ctx): State<AppContext>,
    Json(request): Json<ViewRequest>,
) -> Result<Json<ViewResponse>> {
    let mut controller = ctx.controller.lock().await;
    controller.set_mode(ViewMode::from(request.playlist_id)).await?;

    let session = controller.session();
    Ok(Json(ViewResponse {
        mode: session.mode,
        tracks: session.view.clone(),
    }))
}

// ============================================================================
// Playback Control
// ============================================================================

/// GET /api/playback
pub async fn get_playback(State(ctx): State<AppContext>) -> Json<SessionSnapshot> {
    Json(ctx.controller.lock().await.snapshot())
}

/// POST /api/playback/select
pub async fn select(
    State(ctx): State<AppContext>,
    Json(request): Json<SelectRequest>,
) -> Result<Json<PlaybackResponse>> {
    let mut controller = ctx.controller.lock().await;
    let ticket = controller.select(request.index).await?;

    Ok(Json(PlaybackResponse {
        ticket: Some(ticket),
        session: controller.snapshot(),
    }))
}

/// POST /api/playback/pause
pub async fn pause(State(ctx): State<AppContext>) -> Json<PlaybackResponse> {
    let mut controller = ctx.controller.lock().await;
    controller.pause();

    Json(PlaybackResponse {
        ticket: None,
        session: controller.snapshot(),
    })
}

/// POST /api/playback/resume
pub async fn resume(State(ctx): State<AppContext>) -> Result<Json<PlaybackResponse>> {
    let mut controller = ctx.controller.lock().await;
    let ticket = controller.resume().await?;

    Ok(Json(PlaybackResponse {
        ticket,
        session: controller.snapshot(),
    }))
}

/// POST /api/playback/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> Result<Json<PlaybackResponse>> {
    let mut controller = ctx.controller.lock().await;
    let ticket = controller.toggle().await?;

    Ok(Json(PlaybackResponse {
        ticket,
        session: controller.snapshot(),
    }))
}

/// POST /api/playback/next
pub async fn next(State(ctx): State<AppContext>) -> Result<Json<PlaybackResponse>> {
    let mut controller = ctx.controller.lock().await;
    let ticket = controller.next().await?;

    Ok(Json(PlaybackResponse {
        ticket: Some(ticket),
        session: controller.snapshot(),
    }))
}

/// POST /api/playback/previous
pub async fn previous(State(ctx): State<AppContext>) -> Result<Json<PlaybackResponse>> {
    let mut controller = ctx.controller.lock().await;
    let ticket = controller.previous().await?;

    Ok(Json(PlaybackResponse {
        ticket: Some(ticket),
        session: controller.snapshot(),
    }))
}

/// POST /api/playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(request): Json<SeekRequest>,
) -> Result<Json<SessionSnapshot>> {
    let mut controller = ctx.controller.lock().await;
    controller.seek_to(request.position)?;
    Ok(Json(controller.snapshot()))
}

/// POST /api/playback/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Json(request): Json<SkipRequest>,
) -> Result<Json<SessionSnapshot>> {
    let mut controller = ctx.controller.lock().await;
    controller.skip_by(request.delta)?;
    Ok(Json(controller.snapshot()))
}

/// POST /api/playback/rate
pub async fn set_rate(
    State(ctx): State<AppContext>,
    Json(request): Json<RateRequest>,
) -> Result<Json<SessionSnapshot>> {
    let mut controller = ctx.controller.lock().await;
    controller.set_rate(request.rate)?;
    Ok(Json(controller.snapshot()))
}

/// POST /api/playback/pitch
pub async fn set_pitch(
    State(ctx): State<AppContext>,
    Json(request): Json<PitchRequest>,
) -> Result<Json<SessionSnapshot>> {
    let mut controller = ctx.controller.lock().await;
    controller.set_preserve_pitch(request.preserve_pitch)?;
    Ok(Json(controller.snapshot()))
}

/// POST /api/playback/policy
pub async fn set_policy(
    State(ctx): State<AppContext>,
    Json(request): Json<PolicyRequest>,
) -> Result<Json<SessionSnapshot>> {
    let mut controller = ctx.controller.lock().await;
    controller.set_end_policy(request.policy).await?;
    Ok(Json(controller.snapshot()))
}

/// POST /api/playback/loop
pub async fn set_loop(
    State(ctx): State<AppContext>,
    Json(request): Json<LoopRequest>,
) -> Result<Json<SessionSnapshot>> {
    let region = match (request.start, request.end) {
        (Some(start), Some(end)) => Some(LoopRegion { start, end }),
        (None, None) => None,
        _ => {
            return Err(Error::BadRequest(
                "loop region needs both start and end".to_string(),
            ))
        }
    };

    let mut controller = ctx.controller.lock().await;
    controller.set_loop_region(region)?;
    Ok(Json(controller.snapshot()))
}

// ============================================================================
// Transport Reports
// ============================================================================

/// POST /api/playback/transport/started
pub async fn transport_started(
    State(ctx): State<AppContext>,
    Json(report): Json<TicketReport>,
) -> Json<TransportAck> {
    let applied = ctx.controller.lock().await.playback_started(&report.ticket);
    TransportAck::applied(applied)
}

/// POST /api/playback/transport/failed
pub async fn transport_failed(
    State(ctx): State<AppContext>,
    Json(report): Json<FailureReport>,
) -> Result<Json<TransportAck>> {
    let mut controller = ctx.controller.lock().await;

    match controller.playback_failed(&report.ticket, &report.reason) {
        Ok(()) => Ok(TransportAck::applied(false)),
        Err(Error::Playback(reason)) => {
            info!("Media element could not play track {}", report.ticket.track_id);
            Ok(Json(TransportAck {
                applied: true,
                fault: Some(reason),
            }))
        }
        Err(e) => Err(e),
    }
}

/// POST /api/playback/transport/ended
pub async fn transport_ended(
    State(ctx): State<AppContext>,
    Json(report): Json<TicketReport>,
) -> Result<Json<PlaybackResponse>> {
    let mut controller = ctx.controller.lock().await;
    let ticket = controller.reach_end(&report.ticket).await?;

    Ok(Json(PlaybackResponse {
        ticket,
        session: controller.snapshot(),
    }))
}

/// POST /api/playback/transport/progress
pub async fn transport_progress(
    State(ctx): State<AppContext>,
    Json(report): Json<ProgressReport>,
) -> Json<TransportAck> {
    let applied = ctx
        .controller
        .lock()
        .await
        .time_update(&report.ticket, report.position);
    TransportAck::applied(applied)
}

/// POST /api/playback/transport/metadata
pub async fn transport_metadata(
    State(ctx): State<AppContext>,
    Json(report): Json<MetadataReport>,
) -> Json<TransportAck> {
    let applied = ctx
        .controller
        .lock()
        .await
        .metadata_loaded(&report.ticket, report.duration);
    TransportAck::applied(applied)
}
