//! Session state owned by the controller

use crate::db::TrackRecord;
use crate::error::{Error, Result};
use crate::library::ViewMode;
use offtrack_common::events::{EndPolicy, PlaybackState};
use serde::{Deserialize, Serialize};

/// Token for one load, echoed back by transport reports
///
/// Reports carrying an older `generation` belong to a superseded load and
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTicket {
    pub index: usize,
    pub track_id: i64,
    pub generation: u64,
}

/// Where the transport reads the current track from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaSource {
    /// Served by the range endpoint, re-resolved by id on every request
    Served { url: String },
    /// Per-load handle created by the transport; revoked when replaced
    Transient { handle: String },
}

impl MediaSource {
    pub fn locator(&self) -> &str {
        match self {
            MediaSource::Served { url } => url,
            MediaSource::Transient { handle } => handle,
        }
    }
}

/// A-B repeat window in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    /// Check the window against itself and an optional known duration
    pub fn validate(&self, duration: Option<f64>) -> Result<()> {
        let ordered = self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.start < self.end;
        let fits = duration.map_or(true, |d| self.end <= d);

        if ordered && fits {
            Ok(())
        } else {
            Err(Error::Range(format!(
                "loop region {}..{} is not a valid window",
                self.start, self.end
            )))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub state: PlaybackState,
    pub mode: ViewMode,
    /// The resolved sequence being navigated
    pub view: Vec<TrackRecord>,
    /// Position in `view`; cleared by a mode switch
    pub current_index: Option<usize>,
    pub current_track_id: Option<i64>,
    /// The loaded track, kept even when it is not part of `view`
    pub loaded_track: Option<TrackRecord>,
    pub source: Option<MediaSource>,
    pub generation: u64,
    /// Seconds
    pub position: f64,
    pub duration: Option<f64>,
    pub end_policy: EndPolicy,
    pub loop_region: Option<LoopRegion>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            mode: ViewMode::Library,
            view: Vec::new(),
            current_index: None,
            current_track_id: None,
            loaded_track: None,
            source: None,
            generation: 0,
            position: 0.0,
            duration: None,
            end_policy: EndPolicy::default(),
            loop_region: None,
        }
    }
}

impl SessionState {
    pub fn current_track(&self) -> Option<&TrackRecord> {
        self.loaded_track.as_ref()
    }

    /// Apply `edit` to the loaded track and to its entry in `view`, if any
    ///
    /// Returns the edited track id, or `None` when nothing is loaded.
    pub fn edit_current_track(&mut self, edit: impl Fn(&mut TrackRecord)) -> Option<i64> {
        let track = self.loaded_track.as_mut()?;
        edit(track);
        let id = track.id;

        if let Some(entry) = self.view.iter_mut().find(|entry| entry.id == id) {
            edit(entry);
        }
        Some(id)
    }

    /// Forget the loaded track and everything measured about it
    pub fn clear_track(&mut self) {
        self.state = PlaybackState::Idle;
        self.current_index = None;
        self.current_track_id = None;
        self.loaded_track = None;
        self.source = None;
        self.position = 0.0;
        self.duration = None;
        self.loop_region = None;
    }
}

/// Serializable view of the session for the API
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub mode: ViewMode,
    pub current_index: Option<usize>,
    pub track: Option<TrackRecord>,
    pub generation: u64,
    pub source: Option<MediaSource>,
    pub position: f64,
    pub duration: Option<f64>,
    pub end_policy: EndPolicy,
    pub loop_region: Option<LoopRegion>,
    pub view: Vec<TrackRecord>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(session: &SessionState) -> Self {
        Self {
            state: session.state,
            mode: session.mode,
            current_index: session.current_index,
            track: session.current_track().cloned(),
            generation: session.generation,
            source: session.source.clone(),
            position: session.position,
            duration: session.duration,
            end_policy: session.end_policy,
            loop_region: session.loop_region,
            view: session.view.clone(),
        }
    }
}
