//! Scriptable collaborators and builders shared by the `livedit-core`
//! integration tests.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use livedit_core::Config;
use livedit_core::SessionOrchestrator;
use livedit_core::services::ActiveStatementSource;
use livedit_core::services::CodeSnapshot;
use livedit_core::services::DiagnosticInvalidator;
use livedit_core::services::DocumentAnalyzer;
use livedit_core::services::ExceptionRegionAnalyzer;
use livedit_core::services::FaultReporter;
use livedit_core::services::InMemorySnapshot;
use livedit_core::services::Services;
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
use tokio::sync::Semaphore;

pub const PROJECT: &str = "app";

pub fn span(line: u32) -> SourceSpan {
    SourceSpan::new(line, 4, line, 20)
}

pub fn document(id: &str) -> DocumentSnapshot {
    DocumentSnapshot::new(
        DocumentId::new(id),
        ProjectId::new(PROJECT),
        id,
        format!("// {id}"),
    )
}

/// Snapshot at `version` containing the given document ids.
pub fn snapshot(version: u64, documents: &[&str]) -> Arc<dyn CodeSnapshot> {
    Arc::new(InMemorySnapshot::new(
        version,
        documents.iter().map(|id| document(id)),
    ))
}

/// Snapshot at `version` with explicit `(id, text)` documents.
pub fn snapshot_with_text(version: u64, documents: &[(&str, &str)]) -> Arc<dyn CodeSnapshot> {
    Arc::new(InMemorySnapshot::new(
        version,
        documents.iter().map(|(id, text)| {
            DocumentSnapshot::new(DocumentId::new(*id), ProjectId::new(PROJECT), *id, *text)
        }),
    ))
}

pub fn reported(
    instruction: InstructionId,
    document: &str,
    ordinal: usize,
    span: SourceSpan,
) -> ReportedActiveStatement {
    ReportedActiveStatement {
        instruction,
        document: DocumentId::new(document),
        ordinal,
        span,
        flags: ActiveStatementFlags {
            is_leaf_frame: ordinal == 0,
            method_up_to_date: true,
            ..Default::default()
        },
    }
}

/// Hands out distinct instruction ids within one module.
pub struct Instructions {
    module: ModuleId,
    next_token: AtomicUsize,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            module: ModuleId::new(),
            next_token: AtomicUsize::new(0x0600_0001),
        }
    }
}

impl Instructions {
    pub fn next(&self) -> InstructionId {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) as u32;
        InstructionId::new(self.module, token, 1, 0)
    }
}

/// Active statements read from a replaceable list.
///
/// Calls can be held back with [`FakeActiveStatements::hold`] until
/// [`FakeActiveStatements::release`] is called, or made to fail.
#[derive(Default)]
pub struct FakeActiveStatements {
    statements: Mutex<Vec<ReportedActiveStatement>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    fail: Mutex<bool>,
    calls: AtomicUsize,
}

impl FakeActiveStatements {
    pub fn set(&self, statements: Vec<ReportedActiveStatement>) {
        *self.statements.lock().unwrap() = statements;
    }

    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS);
        }
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActiveStatementSource for FakeActiveStatements {
    async fn active_statements(&self) -> anyhow::Result<Vec<ReportedActiveStatement>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await?;
        }
        if *self.fail.lock().unwrap() {
            anyhow::bail!("active statement source unavailable");
        }
        Ok(self.statements.lock().unwrap().clone())
    }
}

/// Maps each statement's baseline span forward by a per-document line delta,
/// unless an explicit analysis was scripted for the document.
#[derive(Default)]
pub struct FakeDocumentAnalyzer {
    line_deltas: Mutex<HashMap<DocumentId, i64>>,
    scripted: Mutex<HashMap<DocumentId, DocumentAnalysis>>,
    failing: Mutex<Vec<DocumentId>>,
    calls: Mutex<HashMap<DocumentId, usize>>,
}

impl FakeDocumentAnalyzer {
    pub fn shift_lines(&self, document: &str, delta: i64) {
        self.line_deltas
            .lock()
            .unwrap()
            .insert(DocumentId::new(document), delta);
    }

    pub fn script(&self, document: &str, analysis: DocumentAnalysis) {
        self.scripted
            .lock()
            .unwrap()
            .insert(DocumentId::new(document), analysis);
    }

    pub fn fail(&self, document: &str) {
        self.failing.lock().unwrap().push(DocumentId::new(document));
    }

    pub fn calls(&self, document: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&DocumentId::new(document))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentAnalyzer for FakeDocumentAnalyzer {
    async fn analyze_document(
        &self,
        document: &DocumentSnapshot,
        statements: &[BaselineActiveStatement],
    ) -> anyhow::Result<DocumentAnalysis> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(document.id.clone())
            .or_default() += 1;
        if self.failing.lock().unwrap().contains(&document.id) {
            anyhow::bail!("analyzer crashed on {}", document.id);
        }
        if let Some(analysis) = self.scripted.lock().unwrap().get(&document.id) {
            return Ok(analysis.clone());
        }

        let delta = self
            .line_deltas
            .lock()
            .unwrap()
            .get(&document.id)
            .copied()
            .unwrap_or(0);
        let len = statements.iter().map(|s| s.ordinal + 1).max().unwrap_or(0);
        let mut active_statements = vec![SourceSpan::default(); len];
        for statement in statements {
            active_statements[statement.ordinal] = shift(statement.span, delta);
        }
        Ok(DocumentAnalysis::Available { active_statements })
    }
}

fn shift(span: SourceSpan, delta: i64) -> SourceSpan {
    let line = |line: u32| (i64::from(line) + delta).max(0) as u32;
    SourceSpan::new(
        line(span.start.line),
        span.start.column,
        line(span.end.line),
        span.end.column,
    )
}

/// A handler span, optionally present only in document versions whose text
/// contains a marker.
struct Handler {
    span: SourceSpan,
    marker: Option<String>,
}

/// Reports every handler span of a document that contains the statement.
#[derive(Default)]
pub struct FakeExceptionRegions {
    handlers: Mutex<HashMap<DocumentId, Vec<Handler>>>,
    texts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeExceptionRegions {
    pub fn add_handler(&self, document: &str, span: SourceSpan) {
        self.push(document, Handler { span, marker: None });
    }

    /// Adds a handler that only exists in versions of `document` whose text
    /// contains `marker`.
    pub fn add_handler_when(&self, document: &str, marker: &str, span: SourceSpan) {
        self.push(
            document,
            Handler {
                span,
                marker: Some(marker.to_string()),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Text of every document version handed to the analyzer, in call order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    fn push(&self, document: &str, handler: Handler) {
        self.handlers
            .lock()
            .unwrap()
            .entry(DocumentId::new(document))
            .or_default()
            .push(handler);
    }
}

#[async_trait]
impl ExceptionRegionAnalyzer for FakeExceptionRegions {
    async fn exception_regions(
        &self,
        document: &DocumentSnapshot,
        statements: &[BaselineActiveStatement],
    ) -> anyhow::Result<Vec<ExceptionRegions>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(document.text.to_string());
        let handlers: Vec<SourceSpan> = self
            .handlers
            .lock()
            .unwrap()
            .get(&document.id)
            .map(|handlers| {
                handlers
                    .iter()
                    .filter(|handler| {
                        handler
                            .marker
                            .as_deref()
                            .is_none_or(|marker| document.text.contains(marker))
                    })
                    .map(|handler| handler.span)
                    .collect()
            })
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

#[derive(Default)]
pub struct RecordingDiagnostics {
    batches: Mutex<Vec<Vec<DocumentId>>>,
}

impl RecordingDiagnostics {
    pub fn batches(&self) -> Vec<Vec<DocumentId>> {
        self.batches.lock().unwrap().clone()
    }
}

impl DiagnosticInvalidator for RecordingDiagnostics {
    fn invalidate_documents(&self, documents: &[DocumentId]) {
        self.batches.lock().unwrap().push(documents.to_vec());
    }
}

#[derive(Default)]
pub struct RecordingFaults {
    faults: Mutex<Vec<(String, String)>>,
}

impl RecordingFaults {
    /// `(operation, message)` pairs in report order.
    pub fn faults(&self) -> Vec<(String, String)> {
        self.faults.lock().unwrap().clone()
    }
}

impl FaultReporter for RecordingFaults {
    fn report_fault(&self, operation: &str, fault: &anyhow::Error) {
        self.faults
            .lock()
            .unwrap()
            .push((operation.to_string(), format!("{fault:#}")));
    }
}

/// An orchestrator wired to fakes the test can script and inspect.
pub struct TestOrchestrator {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub active_statements: Arc<FakeActiveStatements>,
    pub analyzer: Arc<FakeDocumentAnalyzer>,
    pub exception_regions: Arc<FakeExceptionRegions>,
    pub diagnostics: Arc<RecordingDiagnostics>,
    pub faults: Arc<RecordingFaults>,
    pub instructions: Instructions,
}

pub struct TestOrchestratorBuilder {
    config: Config,
}

pub fn test_orchestrator() -> TestOrchestratorBuilder {
    TestOrchestratorBuilder {
        config: Config::default(),
    }
}

impl TestOrchestratorBuilder {
    pub fn with_config(mut self, mutator: impl FnOnce(&mut Config)) -> Self {
        mutator(&mut self.config);
        self
    }

    pub fn build(self) -> TestOrchestrator {
        let active_statements = Arc::new(FakeActiveStatements::default());
        let analyzer = Arc::new(FakeDocumentAnalyzer::default());
        let exception_regions = Arc::new(FakeExceptionRegions::default());
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let faults = Arc::new(RecordingFaults::default());
        let services = Services::new(
            Arc::clone(&active_statements) as Arc<dyn ActiveStatementSource>,
            Arc::clone(&analyzer) as Arc<dyn DocumentAnalyzer>,
            Arc::clone(&exception_regions) as Arc<dyn ExceptionRegionAnalyzer>,
            Arc::clone(&diagnostics) as Arc<dyn DiagnosticInvalidator>,
        )
        .with_fault_reporter(Arc::clone(&faults) as Arc<dyn FaultReporter>);
        TestOrchestrator {
            orchestrator: Arc::new(SessionOrchestrator::new(services, self.config)),
            active_statements,
            analyzer,
            exception_regions,
            diagnostics,
            faults,
            instructions: Instructions::default(),
        }
    }
}

impl TestOrchestrator {
    /// Starts a debug run and breaks into an edit session where every
    /// project in `documents` is editable.
    pub fn break_into(&self, documents: &[&str]) {
        self.orchestrator
            .start_debug_run(snapshot(0, documents))
            .expect("start debug run");
        self.break_again(1, documents);
    }

    pub fn break_again(&self, version: u64, documents: &[&str]) {
        self.orchestrator
            .start_edit_session(
                snapshot(version, documents),
                HashMap::from([(ProjectId::new(PROJECT), ProjectReadOnlyReason::None)]),
                false,
            )
            .expect("start edit session");
    }
}
