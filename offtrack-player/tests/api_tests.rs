//! HTTP API tests driven through the router with `oneshot`

use axum::body::Body;
use axum::Router;
use http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use offtrack_common::db::init_memory_database;
use offtrack_common::events::PlayerEvent;
use offtrack_player::api::{create_router, AppContext};
use offtrack_player::config::Config;
use offtrack_player::state::SharedState;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    ctx: AppContext,
    _root: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let pool = init_memory_database().await.unwrap();
        let config = Config::for_root(root.path());
        let ctx = AppContext::new(pool, &config, Arc::new(SharedState::new()))
            .await
            .unwrap();
        Self { ctx, _root: root }
    }

    fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    async fn json(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, _, bytes) = self.send(request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn upload(&self, name: &str, content_type: &str, payload: &[u8]) -> Value {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/tracks?name={}", name))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(payload.to_vec()))
            .unwrap();

        let (status, _, bytes) = self.send(request).await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn get_media(&self, uri: &str, range: Option<&str>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let (status, body) = app.json(Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "offtrack-player");
}

#[tokio::test]
async fn test_upload_and_list_in_order() {
    let app = TestApp::new().await;
    let a = app.upload("a.mp3", "audio/mpeg", b"first").await;
    let b = app.upload("b.ogg", "audio/ogg", b"second").await;

    assert_eq!(a["id"], 1);
    assert_eq!(a["order"], 0);
    assert_eq!(b["id"], 2);
    assert_eq!(b["order"], 1);
    assert_eq!(b["media_type"], "audio/ogg");
    assert_eq!(b["speed"], 1.0);
    assert_eq!(b["preserve_pitch"], true);

    let (status, list) = app.json(Method::GET, "/api/tracks", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a.mp3", "b.ogg"]);

    // Upload shows up in the controller's view too
    let (_, view) = app.json(Method::GET, "/api/view", None).await;
    assert_eq!(view["tracks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_upload_rejected() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/tracks?name=empty.mp3")
        .body(Body::empty())
        .unwrap();

    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_media_full_response() {
    let app = TestApp::new().await;
    let bytes = payload(1000);
    app.upload("song.mp3", "audio/mpeg", &bytes).await;

    let (status, headers, body) = app.get_media("/media/audio/1", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, bytes);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers[header::CONTENT_LENGTH], "1000");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    assert!(headers.get(header::CONTENT_RANGE).is_none());
}

#[tokio::test]
async fn test_media_range_responses() {
    let app = TestApp::new().await;
    let bytes = payload(1000);
    app.upload("song.mp3", "audio/mpeg", &bytes).await;

    let (status, headers, body) = app.get_media("/media/audio/1", Some("bytes=0-99")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &bytes[0..100]);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-99/1000");
    assert_eq!(headers[header::CONTENT_LENGTH], "100");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");

    // Open-ended
    let (status, headers, body) = app.get_media("/media/audio/1", Some("bytes=900-")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body, &bytes[900..]);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 900-999/1000");

    // End past the payload is clamped
    let (status, headers, body) = app.get_media("/media/audio/1", Some("bytes=990-5000")).await;
    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(body.len(), 10);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 990-999/1000");
}

#[tokio::test]
async fn test_media_unusable_range_falls_back_to_full() {
    let app = TestApp::new().await;
    let bytes = payload(64);
    app.upload("song.mp3", "audio/mpeg", &bytes).await;

    for range in ["bytes=-10", "bytes=40-20", "bytes=64-", "items=0-3", "bytes=0-1,4-5"] {
        let (status, headers, body) = app.get_media("/media/audio/1", Some(range)).await;
        assert_eq!(status, StatusCode::OK, "{}", range);
        assert_eq!(body, bytes, "{}", range);
        assert_eq!(headers[header::CONTENT_LENGTH], "64");
    }
}

#[tokio::test]
async fn test_media_head_has_headers_only() {
    let app = TestApp::new().await;
    app.upload("song.mp3", "audio/mpeg", &payload(500)).await;

    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/media/audio/1")
        .header(header::RANGE, "bytes=100-199")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = app.send(request).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert!(body.is_empty());
    assert_eq!(headers[header::CONTENT_LENGTH], "100");
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 100-199/500");
}

#[tokio::test]
async fn test_media_errors() {
    let app = TestApp::new().await;
    app.upload("song.mp3", "audio/mpeg", b"data").await;

    let (status, headers, body) = app.get_media("/media/audio/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("999"));

    let (status, headers, _) = app.get_media("/media/audio/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");

    let (status, _, _) = app.get_media("/media/audio/0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Outside the scope nothing is served
    let (status, _, _) = app.get_media("/other/audio/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_media_zero_length_payload_is_corrupt() {
    let app = TestApp::new().await;
    let id = app.ctx.tracks.create("broken.mp3", None, &[]).await.unwrap();

    let (status, headers, _) = app.get_media(&format!("/media/audio/{}", id), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}

#[tokio::test]
async fn test_media_type_falls_back_to_extension() {
    let app = TestApp::new().await;
    let id = app.ctx.tracks.create("take.flac", None, b"fLaC").await.unwrap();

    let (status, headers, _) = app.get_media(&format!("/media/audio/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/flac");
}

#[tokio::test]
async fn test_update_track_metadata() {
    let app = TestApp::new().await;
    app.upload("a.mp3", "audio/mpeg", b"a").await;

    let (status, body) = app
        .json(Method::PATCH, "/api/tracks/1", Some(json!({"speed": 0.75, "name": "renamed.mp3"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speed"], 0.75);
    assert_eq!(body["name"], "renamed.mp3");

    let (status, _) = app
        .json(Method::PATCH, "/api/tracks/1", Some(json!({"speed": 40.0})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.json(Method::PATCH, "/api/tracks/1", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(Method::PATCH, "/api/tracks/7", Some(json!({"speed": 1.5})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reorder_library() {
    let app = TestApp::new().await;
    for name in ["a.mp3", "b.mp3", "c.mp3"] {
        app.upload(name, "audio/mpeg", name.as_bytes()).await;
    }

    let (status, view) = app
        .json(Method::POST, "/api/tracks/reorder", Some(json!({"index_a": 0, "index_b": 2})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = view.as_array().unwrap().iter().map(|t| t["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![3, 2, 1]);

    let (status, _) = app
        .json(Method::POST, "/api/tracks/reorder", Some(json!({"index_a": 0, "index_b": 3})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_playlist_lifecycle() {
    let app = TestApp::new().await;
    app.upload("a.mp3", "audio/mpeg", b"a").await;
    app.upload("b.mp3", "audio/mpeg", b"b").await;

    let (status, playlist) = app
        .json(Method::POST, "/api/playlists", Some(json!({"name": "Evening"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let pid = playlist["id"].as_i64().unwrap();

    app.json(Method::POST, &format!("/api/playlists/{}/members", pid), Some(json!({"track_id": 2})))
        .await;
    let (_, playlist) = app
        .json(Method::POST, &format!("/api/playlists/{}/members", pid), Some(json!({"track_id": 1})))
        .await;
    assert_eq!(playlist["song_ids"], json!([2, 1]));

    // Adding twice keeps one membership
    let (_, playlist) = app
        .json(Method::POST, &format!("/api/playlists/{}/members", pid), Some(json!({"track_id": 1})))
        .await;
    assert_eq!(playlist["song_ids"], json!([2, 1]));

    let (status, _) = app
        .json(Method::POST, &format!("/api/playlists/{}/members", pid), Some(json!({"track_id": 42})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Playlist order wins over library order
    let (status, view) = app
        .json(Method::POST, "/api/view", Some(json!({"playlist_id": pid})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = view["tracks"].as_array().unwrap().iter().map(|t| t["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 1]);

    let (_, playlist) = app
        .json(Method::POST, &format!("/api/playlists/{}/rename", pid), Some(json!({"name": "Night"})))
        .await;
    assert_eq!(playlist["name"], "Night");

    // Deleting a track drops it from the playlist and the view
    let (status, _) = app.json(Method::DELETE, "/api/tracks/2", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, playlist) = app.json(Method::GET, &format!("/api/playlists/{}", pid), None).await;
    assert_eq!(playlist["song_ids"], json!([1]));
    let (_, view) = app.json(Method::GET, "/api/view", None).await;
    assert_eq!(view["tracks"].as_array().unwrap().len(), 1);

    // Deleting the active playlist falls back to the library
    let (status, _) = app.json(Method::DELETE, &format!("/api/playlists/{}", pid), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, view) = app.json(Method::GET, "/api/view", None).await;
    assert_eq!(view["mode"]["mode"], "library");
}

#[tokio::test]
async fn test_playback_flow_over_http() {
    let app = TestApp::new().await;
    app.upload("a.mp3", "audio/mpeg", b"a").await;
    app.upload("b.mp3", "audio/mpeg", b"b").await;
    let mut events = app.ctx.state.subscribe_events();

    let (status, body) = app
        .json(Method::POST, "/api/playback/select", Some(json!({"index": 0})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["state"], "loading");
    assert_eq!(body["session"]["source"]["url"], "/media/audio/1");
    let ticket = body["ticket"].clone();

    let mut saw_load = false;
    while let Ok(event) = events.try_recv() {
        if let PlayerEvent::Transport { command, .. } = event {
            if serde_json::to_value(&command).unwrap()["command"] == "load" {
                saw_load = true;
            }
        }
    }
    assert!(saw_load);

    let (_, ack) = app
        .json(Method::POST, "/api/playback/transport/started", Some(json!({"ticket": ticket})))
        .await;
    assert_eq!(ack["applied"], true);

    let (_, ack) = app
        .json(
            Method::POST,
            "/api/playback/transport/metadata",
            Some(json!({"ticket": ticket, "duration": 180.0})),
        )
        .await;
    assert_eq!(ack["applied"], true);

    let (_, snapshot) = app
        .json(Method::POST, "/api/playback/seek", Some(json!({"position": 500.0})))
        .await;
    assert_eq!(snapshot["position"], 180.0);

    let (_, ended) = app
        .json(Method::POST, "/api/playback/transport/ended", Some(json!({"ticket": ticket})))
        .await;
    assert_eq!(ended["ticket"]["track_id"], 2);

    // The first ticket is now stale
    let (_, ack) = app
        .json(Method::POST, "/api/playback/transport/started", Some(json!({"ticket": ticket})))
        .await;
    assert_eq!(ack["applied"], false);

    let (status, _) = app
        .json(Method::POST, "/api/playback/select", Some(json!({"index": 5})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transport_failure_is_reported_as_fault() {
    let app = TestApp::new().await;
    app.upload("a.mp3", "audio/mpeg", b"a").await;

    let (_, body) = app
        .json(Method::POST, "/api/playback/select", Some(json!({"index": 0})))
        .await;
    let ticket = body["ticket"].clone();

    let (status, ack) = app
        .json(
            Method::POST,
            "/api/playback/transport/failed",
            Some(json!({"ticket": ticket, "reason": "decode error"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["applied"], true);
    assert_eq!(ack["fault"], "decode error");

    let (_, snapshot) = app.json(Method::GET, "/api/playback", None).await;
    assert_eq!(snapshot["state"], "idle");
}

#[tokio::test]
async fn test_controls_without_a_track() {
    let app = TestApp::new().await;

    let (status, _) = app.json(Method::POST, "/api/playback/resume", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(Method::POST, "/api/playback/seek", Some(json!({"position": 3.0})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .json(Method::POST, "/api/playback/policy", Some(json!({"policy": "loop-one"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["end_policy"], "loop-one");
}

#[tokio::test]
async fn test_import_folder_endpoint() {
    let app = TestApp::new().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("one.mp3"), b"one").unwrap();
    std::fs::write(dir.path().join("two.wav"), b"two").unwrap();
    std::fs::write(dir.path().join("cover.jpg"), b"jpg").unwrap();

    let (status, report) = app
        .json(
            Method::POST,
            "/api/import/folder",
            Some(json!({"path": dir.path().to_string_lossy()})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["imported"].as_array().unwrap().len(), 2);

    // Second pass skips what is already there
    let (_, report) = app
        .json(
            Method::POST,
            "/api/import/folder",
            Some(json!({"path": dir.path().to_string_lossy()})),
        )
        .await;
    assert!(report["imported"].as_array().unwrap().is_empty());
    assert_eq!(report["skipped"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/import/folder",
            Some(json!({"path": dir.path().join("missing").to_string_lossy()})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_track_patch_overrides_pending_rate_edit() {
    let app = TestApp::new().await;
    app.upload("a.mp3", "audio/mpeg", b"a").await;

    app.json(Method::POST, "/api/playback/select", Some(json!({"index": 0})))
        .await;
    let (status, _) = app
        .json(Method::POST, "/api/playback/rate", Some(json!({"rate": 1.5})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .json(Method::PATCH, "/api/tracks/1", Some(json!({"speed": 2.0})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["speed"], 2.0);

    let (_, track) = app.json(Method::GET, "/api/tracks/1", None).await;
    assert_eq!(track["speed"], 2.0);
    let (_, snapshot) = app.json(Method::GET, "/api/playback", None).await;
    assert_eq!(snapshot["track"]["speed"], 2.0);
}

#[tokio::test]
async fn test_media_route_without_id() {
    let app = TestApp::new().await;

    let (status, headers, body) = app.get_media("/media/audio/", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().starts_with("Invalid identifier"));
}
