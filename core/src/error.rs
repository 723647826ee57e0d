use thiserror::Error;

/// A lifecycle transition was requested in a state that does not allow it.
///
/// These indicate host misuse of the debugger event sequence; the
/// orchestrator leaves its state untouched when returning one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("a debug run is already active")]
    DebugRunAlreadyActive,
    #[error("no debug run is active")]
    NoDebugRun,
    #[error("an edit session is already active")]
    EditSessionAlreadyActive,
    #[error("the debug run cannot end while an edit session is active")]
    EditSessionActive,
    #[error("no edit session is active")]
    NoEditSession,
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
