//! Media transport seam
//!
//! The controller is the only caller of a [`MediaTransport`]. In a server
//! deployment the transport is the browser's media element, reached through
//! [`RemoteTransport`]: every command becomes a [`PlayerEvent::Transport`]
//! on the event stream, and the element reports back through the
//! `/api/playback/transport/*` endpoints.

use crate::error::{Error, Result};
use crate::playback::session::MediaSource;
use crate::state::SharedState;
use chrono::Utc;
use offtrack_common::events::{PlayerEvent, TransportCommand};
use std::sync::Arc;
use tracing::debug;

pub trait MediaTransport: Send {
    /// Whether the range endpoint can feed this transport
    fn interceptor_available(&self) -> bool;

    /// Wrap a whole payload in a per-load handle
    fn create_transient_source(&mut self, bytes: Vec<u8>, content_type: &str) -> Result<String>;

    /// Release a handle from [`MediaTransport::create_transient_source`]
    fn revoke_transient_source(&mut self, handle: &str);

    fn load(&mut self, generation: u64, source: &MediaSource);

    /// Detach the current source
    fn clear(&mut self);

    /// Start or continue playback; an immediate rejection is an error
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn seek(&mut self, position: f64);

    fn set_rate(&mut self, rate: f64);

    fn set_preserve_pitch(&mut self, preserve_pitch: bool);
}

/// Transport driving a media element over the event stream
pub struct RemoteTransport {
    shared: Arc<SharedState>,
    generation: u64,
}

impl RemoteTransport {
    pub fn new(shared: Arc<SharedState>) -> Self {
        Self {
            shared,
            generation: 0,
        }
    }

    fn send(&self, command: TransportCommand) {
        debug!("Transport command (generation {}): {:?}", self.generation, command);
        self.shared.broadcast_event(PlayerEvent::Transport {
            generation: self.generation,
            command,
            timestamp: Utc::now(),
        });
    }
}

impl MediaTransport for RemoteTransport {
    fn interceptor_available(&self) -> bool {
        true
    }

    fn create_transient_source(&mut self, _bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        Err(Error::Playback(
            "remote transport reads from the media route only".to_string(),
        ))
    }

    fn revoke_transient_source(&mut self, _handle: &str) {}

    fn load(&mut self, generation: u64, source: &MediaSource) {
        self.generation = generation;
        self.send(TransportCommand::Load {
            source: source.locator().to_string(),
        });
    }

    fn clear(&mut self) {
        self.send(TransportCommand::Clear);
    }

    /// Rejections arrive later through the `failed` report
    fn play(&mut self) -> Result<()> {
        self.send(TransportCommand::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.send(TransportCommand::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.send(TransportCommand::Seek { position });
    }

    fn set_rate(&mut self, rate: f64) {
        self.send(TransportCommand::SetRate { rate });
    }

    fn set_preserve_pitch(&mut self, preserve_pitch: bool) {
        self.send(TransportCommand::SetPreservePitch { preserve_pitch });
    }
}
