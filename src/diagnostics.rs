use std::sync::Arc;

use parking_lot::Mutex;

/// Last failure message, shared with whoever displays it.
///
/// Cloning yields another handle to the same slot, so a UI thread can read the
/// most recent diagnostic while the controller is busy on the link.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    last: Arc<Mutex<Option<String>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn record(&self, message: impl Into<String>) {
        *self.last.lock() = Some(message.into());
    }

    pub fn last(&self) -> Option<String> {
        self.last.lock().clone()
    }

    pub fn clear(&self) {
        self.last.lock().take();
    }
}
