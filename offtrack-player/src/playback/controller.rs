//! Playback session controller
//!
//! State machine over `Idle`, `Loading`, `Playing`, `Paused`, `Ended` that
//! owns the [`MediaTransport`] exclusively. Each `select` starts a new load
//! generation; reports from the transport carry the [`LoadTicket`] of the
//! load they belong to, and reports for a superseded load are ignored.

use crate::db::settings;
use crate::db::{TrackPatch, TrackRecord};
use crate::error::{Error, Result};
use crate::library::{LibraryResolver, ViewMode};
use crate::media::resolve_content_type;
use crate::playback::session::{LoadTicket, LoopRegion, MediaSource, SessionSnapshot, SessionState};
use crate::playback::settings_writer::SettingsWriter;
use crate::playback::transport::MediaTransport;
use crate::state::SharedState;
use chrono::Utc;
use offtrack_common::events::{EndPolicy, PlaybackState, PlayerEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SessionController<T: MediaTransport> {
    transport: T,
    resolver: LibraryResolver,
    writer: SettingsWriter,
    shared: Arc<SharedState>,
    media_scope: String,
    session: SessionState,
}

impl<T: MediaTransport> SessionController<T> {
    /// Controller in library mode with the stored end-of-track policy
    pub async fn start(
        transport: T,
        resolver: LibraryResolver,
        writer: SettingsWriter,
        shared: Arc<SharedState>,
        media_scope: impl Into<String>,
    ) -> Result<Self> {
        let end_policy = settings::load_end_policy(resolver.tracks().pool()).await?;
        let view = resolver.resolve(ViewMode::Library).await?;

        info!(
            "Playback session ready: {} track(s), end policy {}",
            view.len(),
            end_policy
        );

        Ok(Self {
            transport,
            resolver,
            writer,
            shared,
            media_scope: media_scope.into(),
            session: SessionState {
                view,
                end_policy,
                ..SessionState::default()
            },
        })
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn resolver(&self) -> &LibraryResolver {
        &self.resolver
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&self.session)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load and start the track at `index` of the current view
    ///
    /// Valid from any state; whatever load was in flight is superseded.
    pub async fn select(&mut self, index: usize) -> Result<LoadTicket> {
        let track = self.session.view.get(index).cloned().ok_or_else(|| {
            Error::Range(format!(
                "index {} outside view of {} track(s)",
                index,
                self.session.view.len()
            ))
        })?;

        // Edits for the outgoing track land before the incoming one is read
        self.writer.flush().await;
        self.release_source();

        let source = match self.build_source(&track).await {
            Ok(source) => source,
            Err(e) => {
                self.transport.clear();
                self.session.clear_track();
                self.publish_state();
                return Err(e);
            }
        };

        self.session.generation += 1;
        let ticket = LoadTicket {
            index,
            track_id: track.id,
            generation: self.session.generation,
        };

        self.transport.load(ticket.generation, &source);
        self.transport.set_rate(track.speed);
        self.transport.set_preserve_pitch(track.preserve_pitch);

        info!("Loading track {} ({}) at index {}", track.id, track.name, index);

        self.session.source = Some(source);
        self.session.current_index = Some(index);
        self.session.current_track_id = Some(track.id);
        self.session.loaded_track = Some(track);
        self.session.position = 0.0;
        self.session.duration = None;
        self.session.loop_region = None;
        self.session.state = PlaybackState::Loading;
        self.publish_state();

        if let Err(e) = self.transport.play() {
            return Err(self.fault(ticket.track_id, e.to_string()));
        }

        Ok(ticket)
    }

    async fn build_source(&mut self, track: &TrackRecord) -> Result<MediaSource> {
        if self.transport.interceptor_available() {
            return Ok(MediaSource::Served {
                url: format!("{}/audio/{}", self.media_scope, track.id),
            });
        }

        let store = self.resolver.tracks();
        let info = store.content_info(track.id).await?;
        if info.total_len == 0 {
            return Err(Error::Corrupt(format!("track {} has an empty payload", track.id)));
        }
        let bytes = store.read_range(track.id, 0, info.total_len).await?;
        let content_type = resolve_content_type(info.media_type.as_deref(), &info.name);

        let handle = self.transport.create_transient_source(bytes, &content_type)?;
        Ok(MediaSource::Transient { handle })
    }

    /// Drop the current source, revoking it only if it is transient
    fn release_source(&mut self) {
        if let Some(MediaSource::Transient { handle }) = self.session.source.take() {
            debug!("Revoking transient source {}", handle);
            self.transport.revoke_transient_source(&handle);
        }
    }

    /// Back to a stable `Idle` after the transport refused a load
    fn fault(&mut self, track_id: i64, reason: String) -> Error {
        warn!("Playback of track {} failed: {}", track_id, reason);

        self.transport.clear();
        self.release_source();
        self.session.state = PlaybackState::Idle;
        self.session.position = 0.0;

        self.shared.broadcast_event(PlayerEvent::PlaybackFault {
            track_id,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        self.publish_state();

        Error::Playback(reason)
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        let current = ticket.generation == self.session.generation
            && Some(ticket.track_id) == self.session.current_track_id;
        if !current {
            debug!(
                "Ignoring report for superseded load (generation {}, current {})",
                ticket.generation, self.session.generation
            );
        }
        current
    }

    // ========================================================================
    // Transport reports
    // ========================================================================

    /// The transport began playing; returns whether the report applied
    pub fn playback_started(&mut self, ticket: &LoadTicket) -> bool {
        if !self.is_current(ticket) || self.session.state != PlaybackState::Loading {
            return false;
        }

        self.session.state = PlaybackState::Playing;
        self.publish_state();
        true
    }

    /// The transport could not play the load; no retry is attempted
    pub fn playback_failed(&mut self, ticket: &LoadTicket, reason: &str) -> Result<()> {
        if !self.is_current(ticket) || self.session.state == PlaybackState::Idle {
            return Ok(());
        }
        Err(self.fault(ticket.track_id, reason.to_string()))
    }

    /// Natural end of the track, followed by the end-of-track policy
    ///
    /// An end report may overtake the started report of a short track, so
    /// it is accepted while still `Loading`.
    /// Returns the ticket of the next load when the policy advanced.
    pub async fn reach_end(&mut self, ticket: &LoadTicket) -> Result<Option<LoadTicket>> {
        if !self.is_current(ticket)
            || !matches!(
                self.session.state,
                PlaybackState::Playing | PlaybackState::Loading
            )
        {
            return Ok(None);
        }

        self.session.state = PlaybackState::Ended;
        self.publish_state();

        match self.session.end_policy {
            EndPolicy::LoopAll => {
                let len = self.session.view.len();
                if len == 0 {
                    return Ok(None);
                }
                let next = self.session.current_index.map_or(0, |i| (i + 1) % len);
                self.select(next).await.map(Some)
            }
            EndPolicy::LoopOne => {
                self.transport.seek(0.0);
                self.session.position = 0.0;
                if let Err(e) = self.transport.play() {
                    return Err(self.fault(ticket.track_id, e.to_string()));
                }
                self.session.state = PlaybackState::Playing;
                self.publish_state();
                Ok(None)
            }
            EndPolicy::Single => {
                self.transport.seek(0.0);
                self.session.position = 0.0;
                Ok(None)
            }
        }
    }

    /// Position report; enforces the loop region
    pub fn time_update(&mut self, ticket: &LoadTicket, position: f64) -> bool {
        if !self.is_current(ticket) || self.session.state == PlaybackState::Idle {
            return false;
        }
        if !position.is_finite() || position < 0.0 {
            return false;
        }

        self.session.position = position;
        if let Some(region) = self.session.loop_region {
            if position >= region.end {
                self.transport.seek(region.start);
                self.session.position = region.start;
            }
        }
        true
    }

    pub fn metadata_loaded(&mut self, ticket: &LoadTicket, duration: f64) -> bool {
        if !self.is_current(ticket) || !duration.is_finite() || duration <= 0.0 {
            return false;
        }
        self.session.duration = Some(duration);
        true
    }

    // ========================================================================
    // User controls
    // ========================================================================

    pub fn pause(&mut self) {
        if matches!(
            self.session.state,
            PlaybackState::Playing | PlaybackState::Loading
        ) {
            self.transport.pause();
            self.session.state = PlaybackState::Paused;
            self.publish_state();
        }
    }

    /// Continue playback; from `Idle` the first track of the view is loaded
    pub async fn resume(&mut self) -> Result<Option<LoadTicket>> {
        match self.session.state {
            PlaybackState::Paused | PlaybackState::Ended => {
                if let Err(e) = self.transport.play() {
                    let track_id = self.session.current_track_id.unwrap_or_default();
                    return Err(self.fault(track_id, e.to_string()));
                }
                self.session.state = PlaybackState::Playing;
                self.publish_state();
                Ok(None)
            }
            PlaybackState::Idle => {
                if self.session.view.is_empty() {
                    return Err(Error::InvalidState("nothing to play".to_string()));
                }
                self.select(0).await.map(Some)
            }
            PlaybackState::Playing | PlaybackState::Loading => Ok(None),
        }
    }

    pub async fn toggle(&mut self) -> Result<Option<LoadTicket>> {
        match self.session.state {
            PlaybackState::Playing | PlaybackState::Loading => {
                self.pause();
                Ok(None)
            }
            _ => self.resume().await,
        }
    }

    pub async fn next(&mut self) -> Result<LoadTicket> {
        let len = self.non_empty_view_len()?;
        let index = self.session.current_index.map_or(0, |i| (i + 1) % len);
        self.select(index).await
    }

    pub async fn previous(&mut self) -> Result<LoadTicket> {
        let len = self.non_empty_view_len()?;
        let index = self.session.current_index.map_or(0, |i| (i + len - 1) % len);
        self.select(index).await
    }

    fn non_empty_view_len(&self) -> Result<usize> {
        match self.session.view.len() {
            0 => Err(Error::InvalidState("the current view is empty".to_string())),
            len => Ok(len),
        }
    }

    /// Move to `seconds`, clamped to the track; returns the applied position
    pub fn seek_to(&mut self, seconds: f64) -> Result<f64> {
        if !seconds.is_finite() {
            return Err(Error::Range(format!("seek target {} is not finite", seconds)));
        }
        if self.session.source.is_none() {
            return Err(Error::InvalidState("no track loaded".to_string()));
        }

        let mut position = seconds.max(0.0);
        if let Some(duration) = self.session.duration {
            position = position.min(duration);
        }

        self.transport.seek(position);
        self.session.position = position;
        Ok(position)
    }

    pub fn skip_by(&mut self, delta_seconds: f64) -> Result<f64> {
        if !delta_seconds.is_finite() {
            return Err(Error::Range(format!("skip {} is not finite", delta_seconds)));
        }
        self.seek_to(self.session.position + delta_seconds)
    }

    /// Change the current track's rate now and persist it shortly after
    ///
    /// Works whether or not the loaded track is part of the current view.
    pub fn set_rate(&mut self, rate: f64) -> Result<()> {
        let rate = crate::db::tracks::validate_speed(rate)?;
        let track_id = self
            .session
            .edit_current_track(|track| track.speed = rate)
            .ok_or_else(no_track_loaded)?;

        self.transport.set_rate(rate);
        self.writer.stage(
            track_id,
            TrackPatch {
                speed: Some(rate),
                ..Default::default()
            },
        );
        Ok(())
    }

    pub fn set_preserve_pitch(&mut self, preserve_pitch: bool) -> Result<()> {
        let track_id = self
            .session
            .edit_current_track(|track| track.preserve_pitch = preserve_pitch)
            .ok_or_else(no_track_loaded)?;

        self.transport.set_preserve_pitch(preserve_pitch);
        self.writer.stage(
            track_id,
            TrackPatch {
                preserve_pitch: Some(preserve_pitch),
                ..Default::default()
            },
        );
        Ok(())
    }

    /// Write a metadata patch through to the store
    ///
    /// Edits still waiting in the settings writer are written first, so the
    /// patch is never overwritten by an older staged value. A patch to the
    /// loaded track reaches the transport right away.
    pub async fn update_track(&mut self, track_id: i64, patch: TrackPatch) -> Result<TrackRecord> {
        self.writer.flush().await;
        let record = self.resolver.tracks().update(track_id, patch).await?;

        if self.session.current_track_id == Some(track_id) {
            if let Some(loaded) = self.session.current_track() {
                if loaded.speed != record.speed {
                    self.transport.set_rate(record.speed);
                }
                if loaded.preserve_pitch != record.preserve_pitch {
                    self.transport.set_preserve_pitch(record.preserve_pitch);
                }
            }
            self.session.loaded_track = Some(record.clone());
        }

        self.reload().await?;
        Ok(record)
    }

    /// Set or clear the A-B repeat window
    pub fn set_loop_region(&mut self, region: Option<LoopRegion>) -> Result<()> {
        if let Some(region) = &region {
            if self.session.source.is_none() {
                return Err(Error::InvalidState("no track loaded".to_string()));
            }
            region.validate(self.session.duration)?;
        }
        self.session.loop_region = region;
        Ok(())
    }

    pub async fn set_end_policy(&mut self, policy: EndPolicy) -> Result<()> {
        settings::save_end_policy(self.resolver.tracks().pool(), policy).await?;
        self.session.end_policy = policy;

        info!("End-of-track policy set to {}", policy);
        self.shared.broadcast_event(PlayerEvent::EndPolicyChanged {
            policy,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    // ========================================================================
    // View management
    // ========================================================================

    /// Switch between the library and a playlist
    ///
    /// The current index is invalidated; playback of the loaded track
    /// continues.
    pub async fn set_mode(&mut self, mode: ViewMode) -> Result<()> {
        let view = self.resolver.resolve(mode).await?;

        self.session.mode = mode;
        self.session.view = view;
        self.session.current_index = None;

        debug!("View switched to {:?} ({} track(s))", mode, self.session.view.len());
        self.shared.broadcast_event(PlayerEvent::ViewChanged {
            playlist_id: mode.playlist_id(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Re-resolve the current view after the store changed
    ///
    /// A valid current index follows its track to the track's new position.
    /// If the active playlist is gone the view falls back to the library.
    pub async fn reload(&mut self) -> Result<()> {
        // Pending rate/pitch edits would otherwise be read back stale
        self.writer.flush().await;

        let view = match self.resolver.resolve(self.session.mode).await {
            Ok(view) => view,
            Err(Error::NotFound(_)) if self.session.mode != ViewMode::Library => {
                warn!("Active playlist disappeared; showing the library");
                return self.set_mode(ViewMode::Library).await;
            }
            Err(e) => return Err(e),
        };

        if let Some(id) = self.session.current_track_id {
            let position = view.iter().position(|track| track.id == id);
            if self.session.current_index.is_some() {
                self.session.current_index = position;
            }
            if let Some(position) = position {
                self.session.loaded_track = Some(view[position].clone());
            }
        }
        self.session.view = view;
        Ok(())
    }

    /// A track was deleted from the store
    ///
    /// If it is the loaded track, playback stops and the source is detached.
    pub async fn track_removed(&mut self, track_id: i64) -> Result<()> {
        if self.session.current_track_id == Some(track_id) {
            info!("Loaded track {} was deleted; stopping playback", track_id);
            self.transport.pause();
            self.transport.clear();
            self.release_source();
            self.session.clear_track();
            self.publish_state();
        }
        self.reload().await
    }

    fn publish_state(&self) {
        self.shared.broadcast_event(PlayerEvent::PlaybackStateChanged {
            state: self.session.state,
            index: self.session.current_index,
            track_id: self.session.current_track_id,
            timestamp: Utc::now(),
        });
    }
}

fn no_track_loaded() -> Error {
    Error::InvalidState("no track loaded".to_string())
}
