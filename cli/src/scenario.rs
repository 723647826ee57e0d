//! Scenario files and the in-memory collaborators they drive.
//!
//! A scenario describes the code snapshots a host would hand over, the
//! active statements it would report at each break and the answers its
//! analyzers would give, followed by the ordered lifecycle and query steps
//! to replay.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use anyhow::Context;
use async_trait::async_trait;
use livedit_core::services::ActiveStatementSource;
use livedit_core::services::DiagnosticInvalidator;
use livedit_core::services::DocumentAnalyzer;
use livedit_core::services::ExceptionRegionAnalyzer;
use livedit_core::services::InMemorySnapshot;
use livedit_protocol::active_statement::ActiveStatementFlags;
use livedit_protocol::active_statement::BaselineActiveStatement;
use livedit_protocol::active_statement::ExceptionRegions;
use livedit_protocol::active_statement::ReportedActiveStatement;
use livedit_protocol::document::DocumentAnalysis;
use livedit_protocol::document::DocumentSnapshot;
use livedit_protocol::ids::DocumentId;
use livedit_protocol::ids::InstructionId;
use livedit_protocol::ids::ModuleId;
use livedit_protocol::ids::ProjectId;
use livedit_protocol::read_only::ProjectReadOnlyReason;
use livedit_protocol::span::SourceSpan;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Named code snapshots referenced by lifecycle steps.
    #[serde(default)]
    pub snapshots: BTreeMap<String, SnapshotSpec>,
    /// Analyses returned for specific documents. Documents not listed map
    /// every active statement to its baseline span.
    #[serde(default)]
    pub analyses: HashMap<DocumentId, DocumentAnalysis>,
    /// Documents whose analysis fails outright.
    #[serde(default)]
    pub failing_documents: Vec<DocumentId>,
    /// Exception handler spans per document, in base-snapshot coordinates.
    #[serde(default)]
    pub exception_handlers: HashMap<DocumentId, Vec<Span>>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse scenario {}", path.display()))
    }

    pub(crate) fn snapshot(&self, name: &str) -> anyhow::Result<Arc<InMemorySnapshot>> {
        let spec = self
            .snapshots
            .get(name)
            .with_context(|| format!("unknown snapshot `{name}`"))?;
        Ok(Arc::new(InMemorySnapshot::new(
            spec.version,
            spec.documents.iter().map(DocumentSpec::to_snapshot),
        )))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotSpec {
    #[serde(default)]
    pub version: u64,
    pub documents: Vec<DocumentSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentSpec {
    pub id: DocumentId,
    pub project: ProjectId,
    #[serde(default)]
    pub text: String,
}

impl DocumentSpec {
    fn to_snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot::new(
            self.id.clone(),
            self.project.clone(),
            self.id.0.as_str(),
            self.text.as_str(),
        )
    }
}

/// A source span written as `[start_line, start_column, end_line, end_column]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span(pub [u32; 4]);

impl From<Span> for SourceSpan {
    fn from(Span([start_line, start_column, end_line, end_column]): Span) -> Self {
        SourceSpan::new(start_line, start_column, end_line, end_column)
    }
}

impl From<SourceSpan> for Span {
    fn from(span: SourceSpan) -> Self {
        Span([
            span.start.line,
            span.start.column,
            span.end.line,
            span.end.column,
        ])
    }
}

/// One active statement as the host reports it at a break. Instructions are
/// referred to by name; each distinct name is one runtime identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActiveStatementSpec {
    pub instruction: String,
    pub document: DocumentId,
    pub ordinal: usize,
    pub span: Span,
    #[serde(default)]
    pub flags: ActiveStatementFlags,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionSpec {
    pub instruction: String,
    pub span: Span,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    StartDebugRun {
        snapshot: String,
    },
    StartEditSession {
        snapshot: String,
        #[serde(default)]
        projects: HashMap<ProjectId, ProjectReadOnlyReason>,
        #[serde(default)]
        stopped_at_exception: bool,
        #[serde(default)]
        active_statements: Vec<ActiveStatementSpec>,
    },
    ReportRudeEdits {
        document: DocumentId,
    },
    QueryReadOnly {
        project: ProjectId,
    },
    QueryPosition {
        instruction: String,
    },
    QueryExceptionRegion {
        instruction: String,
    },
    EndEditSession {
        #[serde(default)]
        corrections: Vec<CorrectionSpec>,
    },
    EndDebugRun,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::StartDebugRun { .. } => "start_debug_run",
            Step::StartEditSession { .. } => "start_edit_session",
            Step::ReportRudeEdits { .. } => "report_rude_edits",
            Step::QueryReadOnly { .. } => "query_read_only",
            Step::QueryPosition { .. } => "query_position",
            Step::QueryExceptionRegion { .. } => "query_exception_region",
            Step::EndEditSession { .. } => "end_edit_session",
            Step::EndDebugRun => "end_debug_run",
        }
    }
}

/// Assigns one runtime identity per instruction name, all within a single
/// module.
#[derive(Debug, Default)]
pub(crate) struct InstructionNames {
    module: ModuleId,
    ids: HashMap<String, InstructionId>,
}

impl InstructionNames {
    pub(crate) fn resolve(&mut self, name: &str) -> InstructionId {
        let next_token = 0x0600_0001 + self.ids.len() as u32;
        let module = self.module;
        *self
            .ids
            .entry(name.to_string())
            .or_insert_with(|| InstructionId::new(module, next_token, 1, 0))
    }
}

/// Active statements for the current break, replaced at each
/// `start_edit_session` step.
#[derive(Debug, Default)]
pub(crate) struct ScenarioActiveStatements {
    current: Mutex<Vec<ReportedActiveStatement>>,
}

impl ScenarioActiveStatements {
    pub(crate) fn replace(&self, statements: Vec<ReportedActiveStatement>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = statements;
    }
}

#[async_trait]
impl ActiveStatementSource for ScenarioActiveStatements {
    async fn active_statements(&self) -> anyhow::Result<Vec<ReportedActiveStatement>> {
        Ok(self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

pub(crate) struct ScenarioAnalyzer {
    analyses: HashMap<DocumentId, DocumentAnalysis>,
    failing_documents: Vec<DocumentId>,
    exception_handlers: HashMap<DocumentId, Vec<SourceSpan>>,
}

impl ScenarioAnalyzer {
    pub(crate) fn new(scenario: &Scenario) -> Self {
        Self {
            analyses: scenario.analyses.clone(),
            failing_documents: scenario.failing_documents.clone(),
            exception_handlers: scenario
                .exception_handlers
                .iter()
                .map(|(document, spans)| {
                    (
                        document.clone(),
                        spans.iter().copied().map(SourceSpan::from).collect(),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for ScenarioAnalyzer {
    async fn analyze_document(
        &self,
        document: &DocumentSnapshot,
        statements: &[BaselineActiveStatement],
    ) -> anyhow::Result<DocumentAnalysis> {
        if self.failing_documents.contains(&document.id) {
            anyhow::bail!("analysis of {} failed", document.id);
        }
        if let Some(analysis) = self.analyses.get(&document.id) {
            return Ok(analysis.clone());
        }
        let len = statements
            .iter()
            .map(|statement| statement.ordinal + 1)
            .max()
            .unwrap_or(0);
        let mut active_statements = vec![SourceSpan::default(); len];
        for statement in statements {
            if let Some(slot) = active_statements.get_mut(statement.ordinal) {
                *slot = statement.span;
            }
        }
        Ok(DocumentAnalysis::Available { active_statements })
    }
}

#[async_trait]
impl ExceptionRegionAnalyzer for ScenarioAnalyzer {
    async fn exception_regions(
        &self,
        document: &DocumentSnapshot,
        statements: &[BaselineActiveStatement],
    ) -> anyhow::Result<Vec<ExceptionRegions>> {
        let handlers = self
            .exception_handlers
            .get(&document.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(statements
            .iter()
            .map(|statement| {
                let spans: Vec<SourceSpan> = handlers
                    .iter()
                    .filter(|handler| handler.contains(&statement.span))
                    .copied()
                    .collect();
                let covered = !spans.is_empty();
                ExceptionRegions::new(spans, covered)
            })
            .collect())
    }
}

/// Diagnostics live in the host; replay only notes the request.
pub(crate) struct LoggingDiagnostics;

impl DiagnosticInvalidator for LoggingDiagnostics {
    fn invalidate_documents(&self, documents: &[DocumentId]) {
        info!(?documents, "invalidating rude-edit diagnostics");
    }
}
