//! OTA bundle updater — fetches, verifies, installs and rolls back web
//! asset bundles for a desktop application host.
//!
//! The [`coordinator::Coordinator`] is the single entry point a host wires
//! up: construct it with a [`config::UpdaterConfig`] and its two trait
//! seams ([`events::HostEvents`], [`events::HostWindow`]), call
//! [`coordinator::Coordinator::initialize`] once, then
//! [`coordinator::Coordinator::notify_app_ready`] after every reload.

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod delay;
pub mod downloader;
pub mod error;
pub mod events;
pub mod info;
pub mod registry;
pub mod stats;
pub mod store;

pub use config::UpdaterConfig;
pub use coordinator::Coordinator;
pub use error::{Result, UpdaterError};
pub use events::{HostEvents, HostWindow, NullHostEvents, UpdaterEvent};
