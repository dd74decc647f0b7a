//! Playback session: controller, transport seam, debounced settings writer

pub mod controller;
pub mod session;
pub mod settings_writer;
pub mod transport;

pub use controller::SessionController;
pub use session::{LoadTicket, LoopRegion, MediaSource, SessionSnapshot, SessionState};
pub use settings_writer::SettingsWriter;
pub use transport::{MediaTransport, RemoteTransport};
