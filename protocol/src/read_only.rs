//! Reasons a project may not be edited right now.

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Why the whole debuggee is read-only, independent of any project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionReadOnlyReason {
    #[default]
    None,
    /// The debuggee is running; edits are only accepted while broken.
    Running,
    /// Execution stopped because of an unhandled exception.
    StoppedAtException,
}

/// Why a particular project is read-only while the debuggee is broken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectReadOnlyReason {
    #[default]
    None,
    /// The runtime has not loaded the project's module yet.
    NotLoaded,
    /// The module is loaded but debug metadata for it could not be read.
    MetadataNotAvailable,
}

/// Answer to "may this project be edited now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyStatus {
    pub is_read_only: bool,
    pub session_reason: SessionReadOnlyReason,
    pub project_reason: ProjectReadOnlyReason,
}

impl ReadOnlyStatus {
    pub const EDITABLE: ReadOnlyStatus = ReadOnlyStatus {
        is_read_only: false,
        session_reason: SessionReadOnlyReason::None,
        project_reason: ProjectReadOnlyReason::None,
    };

    pub fn session(reason: SessionReadOnlyReason) -> Self {
        Self {
            is_read_only: true,
            session_reason: reason,
            project_reason: ProjectReadOnlyReason::None,
        }
    }

    pub fn project(reason: ProjectReadOnlyReason) -> Self {
        Self {
            is_read_only: reason != ProjectReadOnlyReason::None,
            session_reason: SessionReadOnlyReason::None,
            project_reason: reason,
        }
    }
}
