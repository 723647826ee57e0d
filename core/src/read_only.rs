//! Decides whether a project may be edited in the current lifecycle state.

use std::collections::HashMap;

use livedit_protocol::ids::ProjectId;
use livedit_protocol::read_only::ProjectReadOnlyReason;
use livedit_protocol::read_only::ReadOnlyStatus;
use livedit_protocol::read_only::SessionReadOnlyReason;

/// The slice of lifecycle state the policy looks at.
#[derive(Debug, Clone, Copy)]
pub(crate) enum PolicyState<'a> {
    NotDebugging,
    Running,
    Broken {
        stopped_at_exception: bool,
        project_reasons: &'a HashMap<ProjectId, ProjectReadOnlyReason>,
    },
}

/// First matching rule wins:
/// 1. not debugging: editable
/// 2. running: read-only (`Running`)
/// 3. stopped at an exception: read-only (`StoppedAtException`)
/// 4. project has a recorded reason: read-only unless that reason is `None`
/// 5. otherwise: read-only (`MetadataNotAvailable`)
pub(crate) fn project_read_only_status(
    state: PolicyState<'_>,
    project: &ProjectId,
) -> ReadOnlyStatus {
    match state {
        PolicyState::NotDebugging => ReadOnlyStatus::EDITABLE,
        PolicyState::Running => ReadOnlyStatus::session(SessionReadOnlyReason::Running),
        PolicyState::Broken {
            stopped_at_exception: true,
            ..
        } => ReadOnlyStatus::session(SessionReadOnlyReason::StoppedAtException),
        PolicyState::Broken {
            project_reasons, ..
        } => ReadOnlyStatus::project(
            project_reasons
                .get(project)
                .copied()
                .unwrap_or(ProjectReadOnlyReason::MetadataNotAvailable),
        ),
    }
}
