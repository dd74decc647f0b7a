//! HTTP server setup and routing
//!
//! One router carries the media route (`<scope>/audio/:id`), the JSON
//! control API under `/api`, and the SSE event stream.

use crate::config::Config;
use crate::db::{PlaylistIndex, TrackStore};
use crate::error::Result;
use crate::library::LibraryResolver;
use crate::playback::{RemoteTransport, SessionController, SettingsWriter};
use crate::state::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{handlers, media, sse};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub tracks: TrackStore,
    pub playlists: PlaylistIndex,
    pub resolver: LibraryResolver,
    /// The one controller; holding the lock gives exclusive use of the transport
    pub controller: Arc<Mutex<SessionController<RemoteTransport>>>,
    pub media_scope: String,
    pub max_upload_bytes: usize,
}

impl AppContext {
    /// Wire stores, the settings writer, and the controller over `pool`
    pub async fn new(pool: SqlitePool, config: &Config, state: Arc<SharedState>) -> Result<Self> {
        let tracks = TrackStore::new(pool.clone());
        let playlists = PlaylistIndex::new(pool);
        let resolver = LibraryResolver::new(tracks.clone(), playlists.clone());

        let writer = SettingsWriter::spawn(tracks.clone(), config.settings_debounce);
        let controller = SessionController::start(
            RemoteTransport::new(Arc::clone(&state)),
            resolver.clone(),
            writer,
            Arc::clone(&state),
            config.media_scope.clone(),
        )
        .await?;

        Ok(Self {
            state,
            tracks,
            playlists,
            resolver,
            controller: Arc::new(Mutex::new(controller)),
            media_scope: config.media_scope.clone(),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    let media_route = format!("{}/audio/:id", ctx.media_scope);
    let media_root = format!("{}/audio/", ctx.media_scope);
    let body_limit = ctx.max_upload_bytes;

    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))

        // Range-serving media endpoint (GET and HEAD)
        .route(&media_route, get(media::serve_audio))
        .route(&media_root, get(media::missing_audio_id))

        // Track store
        .route("/api/tracks", get(handlers::list_tracks).post(handlers::upload_track))
        .route("/api/tracks/reorder", post(handlers::reorder_library))
        .route(
            "/api/tracks/:id",
            get(handlers::get_track)
                .patch(handlers::update_track)
                .delete(handlers::delete_track),
        )
        .route("/api/import/folder", post(handlers::import_folder))

        // Playlists
        .route("/api/playlists", get(handlers::list_playlists).post(handlers::create_playlist))
        .route(
            "/api/playlists/:id",
            get(handlers::get_playlist).delete(handlers::delete_playlist),
        )
        .route("/api/playlists/:id/rename", post(handlers::rename_playlist))
        .route("/api/playlists/:id/members", post(handlers::add_playlist_member))
        .route(
            "/api/playlists/:id/members/:track_id",
            delete(handlers::remove_playlist_member),
        )
        .route("/api/playlists/:id/reorder", post(handlers::reorder_playlist))

        // Active view
        .route("/api/view", get(handlers::get_view).post(handlers::set_view))

        // Playback control
        .route("/api/playback", get(handlers::get_playback))
        .route("/api/playback/select", post(handlers::select))
        .route("/api/playback/pause", post(handlers::pause))
        .route("/api/playback/resume", post(handlers::resume))
        .route("/api/playback/toggle", post(handlers::toggle))
        .route("/api/playback/next", post(handlers::next))
        .route("/api/playback/previous", post(handlers::previous))
        .route("/api/playback/seek", post(handlers::seek))
        .route("/api/playback/skip", post(handlers::skip))
        .route("/api/playback/rate", post(handlers::set_rate))
        .route("/api/playback/pitch", post(handlers::set_pitch))
        .route("/api/playback/policy", post(handlers::set_policy))
        .route("/api/playback/loop", post(handlers::set_loop))

        // Reports from the media element
        .route("/api/playback/transport/started", post(handlers::transport_started))
        .route("/api/playback/transport/failed", post(handlers::transport_failed))
        .route("/api/playback/transport/ended", post(handlers::transport_ended))
        .route("/api/playback/transport/progress", post(handlers::transport_progress))
        .route("/api/playback/transport/metadata", post(handlers::transport_metadata))

        // SSE event stream
        .route("/api/events", get(sse::event_stream))

        .with_state(ctx)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves
pub async fn run(
    ctx: AppContext,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
