use std::sync::atomic::{AtomicUsize, Ordering};

use devflow::server::ReloadNotifier;

/// Counts reload notifications instead of talking to browsers.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reloads: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

impl ReloadNotifier for RecordingNotifier {
    fn notify_reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}
