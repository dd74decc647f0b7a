//! # Offtrack Common Library
//!
//! Shared code for the Offtrack player crates:
//! - Database bootstrap and additive schema upgrades
//! - Event types (PlayerEvent enum) streamed to the UI
//! - Bootstrap configuration loading and root folder resolution

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
