//! Cooperative handling of the interrupt signal.
//!
//! The SIGINT handler never unwinds or jumps: it only records that a
//! cancellation was requested, and only when the shell is not blocked waiting
//! on a foreground child. The read-eval loop and the long-running built-ins
//! poll the token at their yield points.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Flags {
    requested: AtomicBool,
    waiting_for_child: AtomicBool,
}

/// Shared record of pending cancellations, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flags: Arc<Flags>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route the process' SIGINT to this token. Can only succeed once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            token.notify();
        })
    }

    /// Record a cancellation unless a foreground child is being waited on.
    ///
    /// Returns whether the cancellation was recorded. While waiting, the
    /// child receives the signal through its process group and the wait
    /// simply resumes.
    pub fn notify(&self) -> bool {
        if self.is_waiting_for_child() {
            return false;
        }
        self.flags.requested.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_requested(&self) -> bool {
        self.flags.requested.load(Ordering::SeqCst)
    }

    /// Consume a pending cancellation, if any.
    pub fn take(&self) -> bool {
        self.flags.requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_waiting_for_child(&self) -> bool {
        self.flags.waiting_for_child.load(Ordering::SeqCst)
    }

    /// Mark the shell as blocked on a foreground child until the guard drops.
    pub fn wait_for_child(&self) -> ChildWait {
        self.flags.waiting_for_child.store(true, Ordering::SeqCst);
        ChildWait {
            token: self.clone(),
        }
    }
}

/// Guard returned by [`CancelToken::wait_for_child`].
#[derive(Debug)]
pub struct ChildWait {
    token: CancelToken,
}

impl Drop for ChildWait {
    fn drop(&mut self) {
        self.token
            .flags
            .waiting_for_child
            .store(false, Ordering::SeqCst);
    }
}
