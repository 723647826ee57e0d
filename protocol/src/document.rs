//! Document views handed to analyzers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

use crate::ids::DocumentId;
use crate::ids::ProjectId;
use crate::span::SourceSpan;

/// Immutable view of one document inside one code snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    pub project: ProjectId,
    pub path: PathBuf,
    pub text: Arc<str>,
}

impl DocumentSnapshot {
    pub fn new(
        id: DocumentId,
        project: ProjectId,
        path: impl Into<PathBuf>,
        text: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            id,
            project,
            path: path.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnavailableReason {
    /// The document currently fails to parse.
    SyntaxErrors,
    /// The document no longer exists in the current snapshot.
    DocumentRemoved,
}

/// Result of analyzing the current version of a document against the
/// baseline active statements it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentAnalysis {
    /// Current spans of the document's active statements, indexed by the
    /// ordinal the host reported for each statement.
    Available { active_statements: Vec<SourceSpan> },
    Unavailable { reason: UnavailableReason },
}

impl DocumentAnalysis {
    pub fn active_statement(&self, ordinal: usize) -> Option<SourceSpan> {
        match self {
            DocumentAnalysis::Available { active_statements } => {
                active_statements.get(ordinal).copied()
            }
            DocumentAnalysis::Unavailable { .. } => None,
        }
    }
}
