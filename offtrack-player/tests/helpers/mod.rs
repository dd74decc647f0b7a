//! Shared test fixtures: a recording transport and a wired-up controller

#![allow(dead_code)]

use offtrack_common::db::init_memory_database;
use offtrack_player::db::{PlaylistIndex, TrackStore};
use offtrack_player::error::{Error, Result};
use offtrack_player::library::LibraryResolver;
use offtrack_player::playback::{MediaSource, MediaTransport, SessionController, SettingsWriter};
use offtrack_player::state::SharedState;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load { generation: u64, source: String },
    Clear,
    Play,
    Pause,
    Seek(f64),
    SetRate(f64),
    SetPreservePitch(bool),
    Create(String),
    Revoke(String),
}

#[derive(Debug, Default)]
pub struct TransportLog {
    pub calls: Vec<Call>,
    /// Make every `play()` fail until cleared
    pub reject_play: bool,
    next_handle: u32,
}

impl TransportLog {
    pub fn take(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }
}

/// Transport that records calls instead of playing audio
pub struct RecordingTransport {
    log: Arc<Mutex<TransportLog>>,
    interceptor: bool,
}

impl RecordingTransport {
    pub fn new(interceptor: bool) -> (Self, Arc<Mutex<TransportLog>>) {
        let log = Arc::new(Mutex::new(TransportLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                interceptor,
            },
            log,
        )
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().calls.push(call);
    }
}

impl MediaTransport for RecordingTransport {
    fn interceptor_available(&self) -> bool {
        self.interceptor
    }

    fn create_transient_source(&mut self, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        let handle = {
            let mut log = self.log.lock().unwrap();
            log.next_handle += 1;
            format!("blob:{}:{}", log.next_handle, bytes.len())
        };
        self.record(Call::Create(handle.clone()));
        Ok(handle)
    }

    fn revoke_transient_source(&mut self, handle: &str) {
        self.record(Call::Revoke(handle.to_string()));
    }

    fn load(&mut self, generation: u64, source: &MediaSource) {
        self.record(Call::Load {
            generation,
            source: source.locator().to_string(),
        });
    }

    fn clear(&mut self) {
        self.record(Call::Clear);
    }

    fn play(&mut self) -> Result<()> {
        if self.log.lock().unwrap().reject_play {
            return Err(Error::Playback("NotAllowedError: play() was rejected".to_string()));
        }
        self.record(Call::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.record(Call::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.record(Call::Seek(position));
    }

    fn set_rate(&mut self, rate: f64) {
        self.record(Call::SetRate(rate));
    }

    fn set_preserve_pitch(&mut self, preserve_pitch: bool) {
        self.record(Call::SetPreservePitch(preserve_pitch));
    }
}

pub struct Harness {
    pub controller: SessionController<RecordingTransport>,
    pub log: Arc<Mutex<TransportLog>>,
    pub tracks: TrackStore,
    pub playlists: PlaylistIndex,
    pub writer: SettingsWriter,
    pub state: Arc<SharedState>,
}

impl Harness {
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().take()
    }
}

/// Controller over a fresh in-memory store holding one track per name
pub async fn harness(interceptor: bool, names: &[&str]) -> Harness {
    let pool = init_memory_database().await.unwrap();
    let tracks = TrackStore::new(pool.clone());
    let playlists = PlaylistIndex::new(pool);

    for name in names {
        tracks
            .create(name, None, format!("payload of {}", name).as_bytes())
            .await
            .unwrap();
    }

    let writer = SettingsWriter::spawn(tracks.clone(), Duration::from_secs(60));
    let state = Arc::new(SharedState::new());
    let (transport, log) = RecordingTransport::new(interceptor);

    let controller = SessionController::start(
        transport,
        LibraryResolver::new(tracks.clone(), playlists.clone()),
        writer.clone(),
        Arc::clone(&state),
        "/media",
    )
    .await
    .unwrap();

    Harness {
        controller,
        log,
        tracks,
        playlists,
        writer,
        state,
    }
}
