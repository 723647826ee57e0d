use std::collections::BTreeMap;
use std::collections::HashMap;

use livedit_protocol::active_statement::BaselineActiveStatement;
use livedit_protocol::active_statement::ReportedActiveStatement;
use livedit_protocol::ids::DocumentId;
use livedit_protocol::ids::InstructionId;
use livedit_protocol::span::SourceSpan;
use tracing::warn;

/// The active statements of one break, with carried-over corrections
/// applied. Positions index into [`BaselineActiveStatements::statements`].
#[derive(Debug, Default)]
pub(crate) struct BaselineActiveStatements {
    statements: Vec<BaselineActiveStatement>,
    by_instruction: HashMap<InstructionId, usize>,
    by_document: BTreeMap<DocumentId, Vec<usize>>,
}

impl BaselineActiveStatements {
    pub(crate) fn build(
        reported: Vec<ReportedActiveStatement>,
        corrections: &HashMap<InstructionId, SourceSpan>,
    ) -> Self {
        let mut baseline = Self::default();
        for statement in reported {
            let instruction = statement.instruction;
            if baseline.by_instruction.contains_key(&instruction) {
                warn!(%instruction, "ignoring duplicate active statement report");
                continue;
            }
            let corrected = corrections.get(&instruction).copied();
            let position = baseline.statements.len();
            baseline
                .by_document
                .entry(statement.document.clone())
                .or_default()
                .push(position);
            baseline.by_instruction.insert(instruction, position);
            baseline
                .statements
                .push(BaselineActiveStatement::from_reported(statement, corrected));
        }
        baseline
    }

    /// Looks up the statement executing `instruction` and its position.
    pub(crate) fn get(
        &self,
        instruction: &InstructionId,
    ) -> Option<(usize, &BaselineActiveStatement)> {
        let position = *self.by_instruction.get(instruction)?;
        self.statements
            .get(position)
            .map(|statement| (position, statement))
    }

    pub(crate) fn statements(&self) -> &[BaselineActiveStatement] {
        &self.statements
    }

    pub(crate) fn len(&self) -> usize {
        self.statements.len()
    }

    /// Documents that own at least one statement, with the positions of
    /// their statements in report order.
    pub(crate) fn documents(&self) -> impl Iterator<Item = (&DocumentId, &[usize])> {
        self.by_document
            .iter()
            .map(|(document, positions)| (document, positions.as_slice()))
    }

    pub(crate) fn document_statements(&self, document: &DocumentId) -> Vec<BaselineActiveStatement> {
        self.by_document
            .get(document)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|position| self.statements.get(*position).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
