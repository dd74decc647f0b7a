//! # Offtrack Player
//!
//! Offline music player core: a SQLite store of audio payloads and
//! playlists, a byte-range media endpoint that a browser media element can
//! stream from, and a playback session controller driven over HTTP with an
//! SSE feed back to the UI.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod library;
pub mod media;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
