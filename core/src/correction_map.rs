//! Span corrections carried from one edit session to the next.
//!
//! Written only when an edit session ends and read only when the next one
//! starts, so sessions never contend on it. Entries are never removed: once
//! the runtime remaps execution to a recompiled method the old instruction
//! identity is simply never looked up again. Identities are unique for the
//! life of the debuggee process, so the table grows with the number of
//! distinct corrected instructions over a debug run.

use std::collections::HashMap;
use std::sync::Arc;

use livedit_protocol::ids::InstructionId;
use livedit_protocol::span::SourceSpan;

pub(crate) type CorrectionSeed = Arc<HashMap<InstructionId, SourceSpan>>;

#[derive(Debug, Default)]
pub(crate) struct ActiveStatementCorrections {
    spans: CorrectionSeed,
}

impl ActiveStatementCorrections {
    /// Cheap copy of the current table for seeding a new edit session.
    pub(crate) fn seed(&self) -> CorrectionSeed {
        Arc::clone(&self.spans)
    }

    /// Records `corrections`, each replacing any earlier span for the same
    /// instruction. Later entries in the iterator win. Returns how many
    /// entries were written.
    pub(crate) fn record(
        &mut self,
        corrections: impl IntoIterator<Item = (InstructionId, SourceSpan)>,
    ) -> usize {
        let spans = Arc::make_mut(&mut self.spans);
        let mut written = 0;
        for (instruction, span) in corrections {
            spans.insert(instruction, span);
            written += 1;
        }
        written
    }

    pub(crate) fn get(&self, instruction: &InstructionId) -> Option<SourceSpan> {
        self.spans.get(instruction).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }
}
