//! Active statements as reported by the debugger and as tracked across a
//! break.

use serde::Deserialize;
use serde::Serialize;

use crate::ids::DocumentId;
use crate::ids::InstructionId;
use crate::span::SourceSpan;

/// Properties of the stack frame an active statement belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveStatementFlags {
    /// The statement is in the top-most frame of its thread.
    pub is_leaf_frame: bool,
    /// Execution is in the middle of the statement (a call returned into it).
    pub partially_executed: bool,
    /// The frame belongs to code without user source.
    pub is_non_user_code: bool,
    /// The frame executes the latest compiled version of its method.
    pub method_up_to_date: bool,
}

/// One live execution point as reported by the host when the debuggee broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedActiveStatement {
    pub instruction: InstructionId,
    pub document: DocumentId,
    /// Position of the statement within its document's analysis.
    pub ordinal: usize,
    /// Span as observed by the host, possibly stale.
    pub span: SourceSpan,
    #[serde(default)]
    pub flags: ActiveStatementFlags,
}

/// A reported active statement after span corrections carried over from
/// earlier breaks have been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineActiveStatement {
    pub instruction: InstructionId,
    pub document: DocumentId,
    pub ordinal: usize,
    pub span: SourceSpan,
    pub flags: ActiveStatementFlags,
}

impl BaselineActiveStatement {
    /// Builds the baseline record, preferring `corrected` over the host's span.
    pub fn from_reported(reported: ReportedActiveStatement, corrected: Option<SourceSpan>) -> Self {
        let ReportedActiveStatement {
            instruction,
            document,
            ordinal,
            span,
            flags,
        } = reported;
        Self {
            instruction,
            document,
            ordinal,
            span: corrected.unwrap_or(span),
            flags,
        }
    }
}

/// Exception handling regions enclosing one active statement in the base
/// version of its document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRegions {
    pub spans: Vec<SourceSpan>,
    /// Whether the active statement lies inside any of `spans`.
    pub is_active_statement_covered: bool,
}

impl ExceptionRegions {
    pub fn new(spans: Vec<SourceSpan>, is_active_statement_covered: bool) -> Self {
        Self {
            spans,
            is_active_statement_covered,
        }
    }
}
