//! State of one break-to-resume cycle.
//!
//! Every expensive analysis is memoized in a single-flight cell scoped to the
//! session and keyed by computation kind (and document, for per-document
//! analysis). All cells share the session's cancellation token; once
//! [`EditSession::cancel`] fires, pending and future reads resolve to
//! `ComputeError::Cancelled` and nothing is recomputed.

mod baseline;

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;

use anyhow::Context;
use livedit_protocol::active_statement::ExceptionRegions;
use livedit_protocol::document::DocumentAnalysis;
use livedit_protocol::document::UnavailableReason;
use livedit_protocol::ids::DocumentId;
use livedit_protocol::ids::ProjectId;
use livedit_protocol::read_only::ProjectReadOnlyReason;
use livedit_utils_single_flight::ComputeResult;
use livedit_utils_single_flight::SingleFlight;
use livedit_utils_single_flight::SingleFlightMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(crate) use baseline::BaselineActiveStatements;

use crate::config::Config;
use crate::correction_map::CorrectionSeed;
use crate::debug_run::DebugRun;
use crate::services::CodeSnapshot;
use crate::services::Services;

/// What the host knows about the break when it starts an edit session.
pub(crate) struct BreakState {
    pub(crate) current_snapshot: Arc<dyn CodeSnapshot>,
    pub(crate) project_reasons: HashMap<ProjectId, ProjectReadOnlyReason>,
    pub(crate) stopped_at_exception: bool,
}

pub(crate) struct EditSession {
    ordinal: usize,
    break_state: BreakState,
    services: Services,
    corrections: CorrectionSeed,
    cancel: CancellationToken,
    baseline: SingleFlight<Arc<BaselineActiveStatements>>,
    exception_regions: SingleFlight<Arc<Vec<Option<ExceptionRegions>>>>,
    document_analyses: SingleFlightMap<DocumentId, Arc<DocumentAnalysis>>,
    documents_with_rude_edits: StdMutex<BTreeSet<DocumentId>>,
}

impl EditSession {
    pub(crate) fn new(
        debug_run: &DebugRun,
        break_state: BreakState,
        services: Services,
        corrections: CorrectionSeed,
        config: &Config,
    ) -> Self {
        let cancel = CancellationToken::new();
        let retry_failed = config.retry_failed_computations;
        Self {
            ordinal: debug_run.next_edit_session(),
            break_state,
            services,
            corrections,
            baseline: SingleFlight::new("baseline_active_statements", cancel.clone())
                .with_retry_failed(retry_failed),
            exception_regions: SingleFlight::new("baseline_exception_regions", cancel.clone())
                .with_retry_failed(retry_failed),
            document_analyses: SingleFlightMap::new("document_analysis", cancel.clone())
                .with_retry_failed(retry_failed),
            cancel,
            documents_with_rude_edits: StdMutex::new(BTreeSet::new()),
        }
    }

    pub(crate) fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub(crate) fn stopped_at_exception(&self) -> bool {
        self.break_state.stopped_at_exception
    }

    pub(crate) fn project_reasons(&self) -> &HashMap<ProjectId, ProjectReadOnlyReason> {
        &self.break_state.project_reasons
    }

    /// Active statements reported by the host, with carried-over span
    /// corrections applied.
    pub(crate) async fn baseline_active_statements(
        &self,
    ) -> ComputeResult<Arc<BaselineActiveStatements>> {
        let source = Arc::clone(&self.services.active_statements);
        let corrections = Arc::clone(&self.corrections);
        let ordinal = self.ordinal;
        self.baseline
            .get_or_compute(move || async move {
                let reported = source
                    .active_statements()
                    .await
                    .context("failed to read active statements")?;
                let baseline = BaselineActiveStatements::build(reported, &corrections);
                debug!(
                    edit_session = ordinal,
                    statements = baseline.len(),
                    "computed baseline active statements"
                );
                Ok(Arc::new(baseline))
            })
            .await
    }

    /// Exception-region coverage for every baseline statement, indexed by the
    /// statement's baseline position. Computed against the code at this break,
    /// where the corrected baseline spans are valid. `None` for statements
    /// whose document is not in that snapshot.
    pub(crate) async fn baseline_exception_regions(
        &self,
    ) -> ComputeResult<Arc<Vec<Option<ExceptionRegions>>>> {
        let baseline = self.baseline_active_statements().await?;
        let analyzer = Arc::clone(&self.services.exception_regions);
        let snapshot = Arc::clone(&self.break_state.current_snapshot);
        self.exception_regions
            .get_or_compute(move || async move {
                let mut regions = vec![None; baseline.len()];
                for (document_id, positions) in baseline.documents() {
                    let Some(document) = snapshot.document(document_id) else {
                        debug!(%document_id, "document missing from current snapshot");
                        continue;
                    };
                    let statements = baseline.document_statements(document_id);
                    let computed = analyzer
                        .exception_regions(&document, &statements)
                        .await
                        .with_context(|| {
                            format!("failed to compute exception regions for {document_id}")
                        })?;
                    if computed.len() != positions.len() {
                        anyhow::bail!(
                            "exception region analysis of {document_id} returned {} entries for {} active statements",
                            computed.len(),
                            positions.len()
                        );
                    }
                    for (position, entry) in positions.iter().zip(computed) {
                        if let Some(slot) = regions.get_mut(*position) {
                            *slot = Some(entry);
                        }
                    }
                }
                Ok(Arc::new(regions))
            })
            .await
    }

    /// Analysis of the current version of `document`, computed once per
    /// document for the life of the session.
    pub(crate) async fn document_analysis(
        &self,
        document: &DocumentId,
    ) -> ComputeResult<Arc<DocumentAnalysis>> {
        let baseline = self.baseline_active_statements().await?;
        let analyzer = Arc::clone(&self.services.document_analyzer);
        let snapshot = Arc::clone(&self.break_state.current_snapshot);
        let document_id = document.clone();
        self.document_analyses
            .get_or_compute(document, move || async move {
                let Some(document) = snapshot.document(&document_id) else {
                    return Ok(Arc::new(DocumentAnalysis::Unavailable {
                        reason: UnavailableReason::DocumentRemoved,
                    }));
                };
                let statements = baseline.document_statements(&document_id);
                let analysis = analyzer
                    .analyze_document(&document, &statements)
                    .await
                    .with_context(|| format!("failed to analyze {document_id}"))?;
                Ok(Arc::new(analysis))
            })
            .await
    }

    /// Remembers that rude-edit diagnostics were shown for `document`.
    /// Returns false when the document was already recorded.
    pub(crate) fn report_rude_edits(&self, document: DocumentId) -> bool {
        self.documents_with_rude_edits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document)
    }

    pub(crate) fn take_documents_with_rude_edits(&self) -> Vec<DocumentId> {
        let mut documents = self
            .documents_with_rude_edits
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *documents).into_iter().collect()
    }

    /// Aborts every memoized computation of this session. Must only be called
    /// once the session is no longer reachable by new callers.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
