//! The service hosts talk to: owns at most one debug run and at most one edit
//! session, drives their lifecycle and answers queries while broken.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use livedit_protocol::active_statement::BaselineActiveStatement;
use livedit_protocol::active_statement::ExceptionRegions;
use livedit_protocol::document::DocumentAnalysis;
use livedit_protocol::ids::DocumentId;
use livedit_protocol::ids::InstructionId;
use livedit_protocol::ids::ProjectId;
use livedit_protocol::read_only::ProjectReadOnlyReason;
use livedit_protocol::read_only::ReadOnlyStatus;
use livedit_protocol::span::SourceSpan;
use livedit_utils_single_flight::ComputeError;
use livedit_utils_single_flight::ComputeResult;
use serde::Serialize;
use strum_macros::Display;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::Config;
use crate::correction_map::ActiveStatementCorrections;
use crate::debug_run::DebugRun;
use crate::edit_session::BreakState;
use crate::edit_session::EditSession;
use crate::error::LifecycleError;
use crate::error::Result;
use crate::read_only::PolicyState;
use crate::read_only::project_read_only_status;
use crate::services::CodeSnapshot;
use crate::services::Services;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    /// No debug run.
    Idle,
    /// Debug run active, debuggee running.
    Running,
    /// Debug run active, debuggee broken, edit session active.
    Broken,
}

/// What [`SessionOrchestrator::end_edit_session`] did while tearing the
/// session down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditSessionSummary {
    pub invalidated_documents: Vec<DocumentId>,
    pub recorded_corrections: usize,
}

enum Lifecycle {
    Idle,
    Running {
        debug_run: Arc<DebugRun>,
    },
    Broken {
        debug_run: Arc<DebugRun>,
        edit_session: Arc<EditSession>,
    },
}

pub struct SessionOrchestrator {
    services: Services,
    config: Config,
    lifecycle: StdMutex<Lifecycle>,
    corrections: StdMutex<ActiveStatementCorrections>,
}

impl SessionOrchestrator {
    pub fn new(services: Services, config: Config) -> Self {
        Self {
            services,
            config,
            lifecycle: StdMutex::new(Lifecycle::Idle),
            corrections: StdMutex::new(ActiveStatementCorrections::default()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match &*lock(&self.lifecycle) {
            Lifecycle::Idle => LifecycleState::Idle,
            Lifecycle::Running { .. } => LifecycleState::Running,
            Lifecycle::Broken { .. } => LifecycleState::Broken,
        }
    }

    /// Starts a debug run against the code the debuggee was launched with.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::DebugRunAlreadyActive`] when a debug run is already
    /// active. The rejection is a caller bug; state is left untouched.
    #[must_use = "a rejected lifecycle transition is a caller bug and must be handled"]
    pub fn start_debug_run(&self, initial_snapshot: Arc<dyn CodeSnapshot>) -> Result<()> {
        let version = initial_snapshot.version();
        {
            let mut lifecycle = lock(&self.lifecycle);
            if !matches!(*lifecycle, Lifecycle::Idle) {
                return Err(reject("start_debug_run", LifecycleError::DebugRunAlreadyActive));
            }
            *lifecycle = Lifecycle::Running {
                debug_run: Arc::new(DebugRun::new(initial_snapshot)),
            };
        }
        info!(snapshot_version = version, "debug run started");
        Ok(())
    }

    /// Opens an edit session for the break the debuggee just stopped at.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NoDebugRun`] outside a debug run and
    /// [`LifecycleError::EditSessionAlreadyActive`] while already broken.
    #[must_use = "a rejected lifecycle transition is a caller bug and must be handled"]
    pub fn start_edit_session(
        &self,
        current_snapshot: Arc<dyn CodeSnapshot>,
        project_reasons: HashMap<ProjectId, ProjectReadOnlyReason>,
        stopped_at_exception: bool,
    ) -> Result<()> {
        let version = current_snapshot.version();
        let ordinal = {
            let mut lifecycle = lock(&self.lifecycle);
            let debug_run = match &*lifecycle {
                Lifecycle::Running { debug_run } => Arc::clone(debug_run),
                Lifecycle::Idle => {
                    return Err(reject("start_edit_session", LifecycleError::NoDebugRun));
                }
                Lifecycle::Broken { .. } => {
                    return Err(reject(
                        "start_edit_session",
                        LifecycleError::EditSessionAlreadyActive,
                    ));
                }
            };
            let seed = lock(&self.corrections).seed();
            let edit_session = Arc::new(EditSession::new(
                &debug_run,
                BreakState {
                    current_snapshot,
                    project_reasons,
                    stopped_at_exception,
                },
                self.services.clone(),
                seed,
                &self.config,
            ));
            let ordinal = edit_session.ordinal();
            *lifecycle = Lifecycle::Broken {
                debug_run,
                edit_session,
            };
            ordinal
        };
        info!(
            edit_session = ordinal,
            snapshot_version = version,
            stopped_at_exception,
            "edit session started"
        );
        Ok(())
    }

    /// Ends the active edit session and records the span corrections observed
    /// during it. Later entries for the same instruction win.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NoEditSession`] when the debuggee is not broken.
    #[must_use = "a rejected lifecycle transition is a caller bug and must be handled"]
    pub fn end_edit_session(
        &self,
        observed_corrections: impl IntoIterator<Item = (InstructionId, SourceSpan)>,
    ) -> Result<EditSessionSummary> {
        // Detach first so no new caller can reach the session once its
        // cancellation fires.
        let edit_session = {
            let mut lifecycle = lock(&self.lifecycle);
            match std::mem::replace(&mut *lifecycle, Lifecycle::Idle) {
                Lifecycle::Broken {
                    debug_run,
                    edit_session,
                } => {
                    *lifecycle = Lifecycle::Running { debug_run };
                    Some(edit_session)
                }
                other => {
                    *lifecycle = other;
                    None
                }
            }
        };
        let Some(edit_session) = edit_session else {
            return Err(reject("end_edit_session", LifecycleError::NoEditSession));
        };

        edit_session.cancel();

        let invalidated_documents = edit_session.take_documents_with_rude_edits();
        if !invalidated_documents.is_empty() {
            self.services
                .diagnostics
                .invalidate_documents(&invalidated_documents);
        }

        let recorded_corrections = lock(&self.corrections).record(observed_corrections);

        info!(
            edit_session = edit_session.ordinal(),
            invalidated_documents = invalidated_documents.len(),
            recorded_corrections,
            "edit session ended"
        );
        Ok(EditSessionSummary {
            invalidated_documents,
            recorded_corrections,
        })
    }

    /// Ends the debug run once the debuggee has resumed for good.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NoDebugRun`] outside a debug run and
    /// [`LifecycleError::EditSessionActive`] while an edit session is open.
    #[must_use = "a rejected lifecycle transition is a caller bug and must be handled"]
    pub fn end_debug_run(&self) -> Result<()> {
        let (initial_version, edit_sessions) = {
            let mut lifecycle = lock(&self.lifecycle);
            let ended = match &*lifecycle {
                Lifecycle::Running { debug_run } => {
                    (debug_run.initial_version(), debug_run.edit_session_count())
                }
                Lifecycle::Idle => {
                    return Err(reject("end_debug_run", LifecycleError::NoDebugRun));
                }
                Lifecycle::Broken { .. } => {
                    return Err(reject("end_debug_run", LifecycleError::EditSessionActive));
                }
            };
            *lifecycle = Lifecycle::Idle;
            ended
        };
        info!(
            snapshot_version = initial_version,
            edit_sessions,
            "debug run ended"
        );
        Ok(())
    }

    /// Whether `project` may be edited right now. Never blocks on analysis.
    pub fn is_project_read_only(&self, project: &ProjectId) -> ReadOnlyStatus {
        let edit_session = {
            let lifecycle = lock(&self.lifecycle);
            match &*lifecycle {
                Lifecycle::Idle => {
                    return project_read_only_status(PolicyState::NotDebugging, project);
                }
                Lifecycle::Running { .. } => {
                    return project_read_only_status(PolicyState::Running, project);
                }
                Lifecycle::Broken { edit_session, .. } => Arc::clone(edit_session),
            }
        };
        project_read_only_status(
            PolicyState::Broken {
                stopped_at_exception: edit_session.stopped_at_exception(),
                project_reasons: edit_session.project_reasons(),
            },
            project,
        )
    }

    /// Records that rude-edit diagnostics were reported for `document`, so
    /// they are invalidated when the session ends. Returns false when no edit
    /// session is active.
    pub fn report_rude_edits(&self, document: DocumentId) -> bool {
        match self.edit_session() {
            Some(edit_session) => {
                edit_session.report_rude_edits(document);
                true
            }
            None => false,
        }
    }

    /// Where `instruction` is now, accounting for edits applied since the
    /// break. `None` when not broken, when the instruction is not an active
    /// statement, when its document cannot be analyzed or on any fault.
    pub async fn get_current_active_statement_position(
        &self,
        instruction: &InstructionId,
    ) -> Option<SourceSpan> {
        let edit_session = self.edit_session()?;
        let outcome = current_active_statement_position(&edit_session, instruction).await;
        self.settle("get_current_active_statement_position", outcome)
    }

    /// Whether the active statement executing `instruction` is covered by an
    /// exception handling region in its document as of the current break.
    /// `None` when that document is not part of the break's snapshot.
    pub async fn is_active_statement_in_exception_region(
        &self,
        instruction: &InstructionId,
    ) -> Option<bool> {
        let regions = self.get_base_exception_regions(instruction).await?;
        Some(regions.is_active_statement_covered)
    }

    pub async fn get_base_exception_regions(
        &self,
        instruction: &InstructionId,
    ) -> Option<ExceptionRegions> {
        let edit_session = self.edit_session()?;
        let outcome = base_exception_regions(&edit_session, instruction).await;
        self.settle("get_base_exception_regions", outcome)
    }

    /// The corrected baseline record of `instruction` for the current break.
    pub async fn get_base_active_statement(
        &self,
        instruction: &InstructionId,
    ) -> Option<BaselineActiveStatement> {
        let edit_session = self.edit_session()?;
        let outcome = edit_session
            .baseline_active_statements()
            .await
            .map(|baseline| baseline.get(instruction).map(|(_, statement)| statement.clone()));
        self.settle("get_base_active_statement", outcome)
    }

    pub async fn get_base_active_statements(&self) -> Option<Vec<BaselineActiveStatement>> {
        let edit_session = self.edit_session()?;
        let outcome = edit_session
            .baseline_active_statements()
            .await
            .map(|baseline| Some(baseline.statements().to_vec()));
        self.settle("get_base_active_statements", outcome)
    }

    /// Number of span corrections carried between edit sessions.
    pub fn correction_count(&self) -> usize {
        lock(&self.corrections).len()
    }

    pub fn active_statement_correction(&self, instruction: &InstructionId) -> Option<SourceSpan> {
        lock(&self.corrections).get(instruction)
    }

    fn edit_session(&self) -> Option<Arc<EditSession>> {
        match &*lock(&self.lifecycle) {
            Lifecycle::Broken { edit_session, .. } => Some(Arc::clone(edit_session)),
            Lifecycle::Idle | Lifecycle::Running { .. } => None,
        }
    }

    /// Converts a query outcome into its public answer. Cancellation is not a
    /// fault and is never reported.
    fn settle<T>(&self, operation: &'static str, outcome: ComputeResult<Option<T>>) -> Option<T> {
        match outcome {
            Ok(value) => value,
            Err(ComputeError::Cancelled) => {
                debug!(operation, "query abandoned: edit session ended");
                None
            }
            Err(ComputeError::Fault(fault)) => {
                if self.config.report_faults {
                    self.services.faults.report_fault(operation, &fault);
                }
                None
            }
        }
    }
}

async fn current_active_statement_position(
    edit_session: &EditSession,
    instruction: &InstructionId,
) -> ComputeResult<Option<SourceSpan>> {
    let baseline = edit_session.baseline_active_statements().await?;
    let Some((_, statement)) = baseline.get(instruction) else {
        return Ok(None);
    };
    let analysis = edit_session.document_analysis(&statement.document).await?;
    match analysis.as_ref() {
        DocumentAnalysis::Unavailable { reason } => {
            debug!(document = %statement.document, %reason, "document analysis unavailable");
            Ok(None)
        }
        DocumentAnalysis::Available { active_statements } => active_statements
            .get(statement.ordinal)
            .copied()
            .map(Some)
            .ok_or_else(|| {
                ComputeError::fault(anyhow::anyhow!(
                    "analysis of {} has {} active statements, expected ordinal {}",
                    statement.document,
                    active_statements.len(),
                    statement.ordinal
                ))
            }),
    }
}

async fn base_exception_regions(
    edit_session: &EditSession,
    instruction: &InstructionId,
) -> ComputeResult<Option<ExceptionRegions>> {
    let baseline = edit_session.baseline_active_statements().await?;
    let Some((position, _)) = baseline.get(instruction) else {
        return Ok(None);
    };
    let regions = edit_session.baseline_exception_regions().await?;
    regions.get(position).cloned().ok_or_else(|| {
        ComputeError::fault(anyhow::anyhow!(
            "no exception regions recorded for baseline position {position}"
        ))
    })
}

fn reject(operation: &'static str, err: LifecycleError) -> LifecycleError {
    error!(operation, "edit-and-continue contract violation: {err}");
    err
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
