use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use crate::services::CodeSnapshot;

/// One attach-to-resume lifecycle of the debuggee.
pub(crate) struct DebugRun {
    /// Code as it was when the debugger attached.
    initial_snapshot: Arc<dyn CodeSnapshot>,
    edit_sessions: AtomicUsize,
}

impl DebugRun {
    pub(crate) fn new(initial_snapshot: Arc<dyn CodeSnapshot>) -> Self {
        Self {
            initial_snapshot,
            edit_sessions: AtomicUsize::new(0),
        }
    }

    pub(crate) fn initial_version(&self) -> u64 {
        self.initial_snapshot.version()
    }

    /// Returns the 1-based ordinal of the edit session being started.
    pub(crate) fn next_edit_session(&self) -> usize {
        self.edit_sessions.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn edit_session_count(&self) -> usize {
        self.edit_sessions.load(Ordering::SeqCst)
    }
}
