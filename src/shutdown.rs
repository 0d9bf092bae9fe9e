// Cancellation token shared by the Ctrl+C handler, the main loop and the mailbox poller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cloneable shutdown flag; cancelling any clone cancels all of them
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token when the process receives Ctrl+C
    ///
    /// Can be installed once per process.
    pub fn cancel_on_ctrl_c(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            let was_already_set = token.cancelled.swap(true, Ordering::SeqCst);
            if !was_already_set {
                info!("🛑 Ctrl+C received, shutting down");
            }
        })
    }
}
