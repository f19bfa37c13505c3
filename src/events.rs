//! Trait seams for host collaborators this crate doesn't own: window
//! management and the event-emitter transport. A real host implements
//! these against its own IPC/window layer; this crate only needs to
//! call them.

use std::path::Path;

/// Every user-visible signal the coordinator may emit.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdaterEvent {
    UpdateAvailable,
    DownloadComplete,
    DownloadFailed { message: String },
    UpdateFailed { message: String },
    NoNeedUpdate,
    AppReady,
    AppReloaded,
    BreakingAvailable,
    MajorAvailable,
    Download { percent: u8 },
}

/// Emits updater events toward whatever transport the host uses (IPC,
/// channel, event bus — unspecified here by design).
pub trait HostEvents: Send + Sync {
    fn emit(&self, event: UpdaterEvent);
}

/// Instructs the host's main view to (re)load a bundle's entry point.
pub trait HostWindow: Send + Sync {
    fn reload(&self, path: &Path);
}

/// No-op double used in tests and by hosts with no event transport wired.
pub struct NullHostEvents;

impl HostEvents for NullHostEvents {
    fn emit(&self, _event: UpdaterEvent) {}
}

/// No-op double recording the last path it was asked to reload, useful in
/// tests that assert a reload happened without a real window.
#[derive(Default)]
pub struct RecordingHostWindow {
    pub reloads: std::sync::Mutex<Vec<std::path::PathBuf>>,
}

impl HostWindow for RecordingHostWindow {
    fn reload(&self, path: &Path) {
        self.reloads.lock().unwrap().push(path.to_path_buf());
    }
}

/// Records every event emitted, in order, for assertions in coordinator
/// tests.
#[derive(Default)]
pub struct RecordingHostEvents {
    pub events: std::sync::Mutex<Vec<UpdaterEvent>>,
}

impl HostEvents for RecordingHostEvents {
    fn emit(&self, event: UpdaterEvent) {
        self.events.lock().unwrap().push(event);
    }
}
