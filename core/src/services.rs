//! Collaborators the orchestrator consumes. Hosts supply implementations;
//! the service only talks to them through these traits.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use livedit_protocol::active_statement::BaselineActiveStatement;
use livedit_protocol::active_statement::ExceptionRegions;
use livedit_protocol::active_statement::ReportedActiveStatement;
use livedit_protocol::document::DocumentAnalysis;
use livedit_protocol::document::DocumentSnapshot;
use livedit_protocol::ids::DocumentId;
use tracing::error;

/// Immutable, versioned view of the code of every project in the debuggee.
pub trait CodeSnapshot: Send + Sync {
    fn version(&self) -> u64;

    fn document(&self, id: &DocumentId) -> Option<DocumentSnapshot>;
}

/// Supplies the host's live execution points at the time of the break.
#[async_trait]
pub trait ActiveStatementSource: Send + Sync {
    async fn active_statements(&self) -> anyhow::Result<Vec<ReportedActiveStatement>>;
}

/// Maps baseline active statements onto the current text of a document.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// `statements` are the baseline statements owned by `document`. An
    /// available analysis lists current spans indexed by statement ordinal.
    async fn analyze_document(
        &self,
        document: &DocumentSnapshot,
        statements: &[BaselineActiveStatement],
    ) -> anyhow::Result<DocumentAnalysis>;
}

/// Computes the exception handling regions around active statements in the
/// version of a document the debuggee is broken in, where the corrected
/// baseline spans apply.
#[async_trait]
pub trait ExceptionRegionAnalyzer: Send + Sync {
    /// Must return exactly one entry per statement, in the order given.
    async fn exception_regions(
        &self,
        document: &DocumentSnapshot,
        statements: &[BaselineActiveStatement],
    ) -> anyhow::Result<Vec<ExceptionRegions>>;
}

/// Requests that rude-edit diagnostics previously shown for documents be
/// recomputed.
pub trait DiagnosticInvalidator: Send + Sync {
    fn invalidate_documents(&self, documents: &[DocumentId]);
}

/// Records unexpected failures without interrupting the caller.
pub trait FaultReporter: Send + Sync {
    fn report_fault(&self, operation: &str, fault: &anyhow::Error);
}

/// Default [`FaultReporter`]: writes the fault to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFaultReporter;

impl FaultReporter for TracingFaultReporter {
    fn report_fault(&self, operation: &str, fault: &anyhow::Error) {
        error!(operation, "edit-and-continue query failed: {fault:#}");
    }
}

/// The full set of collaborators, shared by every session the orchestrator
/// creates.
#[derive(Clone)]
pub struct Services {
    pub active_statements: Arc<dyn ActiveStatementSource>,
    pub document_analyzer: Arc<dyn DocumentAnalyzer>,
    pub exception_regions: Arc<dyn ExceptionRegionAnalyzer>,
    pub diagnostics: Arc<dyn DiagnosticInvalidator>,
    pub faults: Arc<dyn FaultReporter>,
}

impl Services {
    pub fn new(
        active_statements: Arc<dyn ActiveStatementSource>,
        document_analyzer: Arc<dyn DocumentAnalyzer>,
        exception_regions: Arc<dyn ExceptionRegionAnalyzer>,
        diagnostics: Arc<dyn DiagnosticInvalidator>,
    ) -> Self {
        Self {
            active_statements,
            document_analyzer,
            exception_regions,
            diagnostics,
            faults: Arc::new(TracingFaultReporter),
        }
    }

    pub fn with_fault_reporter(mut self, faults: Arc<dyn FaultReporter>) -> Self {
        self.faults = faults;
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// [`CodeSnapshot`] over an in-memory set of documents.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshot {
    version: u64,
    documents: HashMap<DocumentId, DocumentSnapshot>,
}

impl InMemorySnapshot {
    pub fn new(version: u64, documents: impl IntoIterator<Item = DocumentSnapshot>) -> Self {
        Self {
            version,
            documents: documents
                .into_iter()
                .map(|document| (document.id.clone(), document))
                .collect(),
        }
    }
}

impl CodeSnapshot for InMemorySnapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn document(&self, id: &DocumentId) -> Option<DocumentSnapshot> {
        self.documents.get(id).cloned()
    }
}
