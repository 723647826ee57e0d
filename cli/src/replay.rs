use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use livedit_core::CONFIG_TOML_FILE;
use livedit_core::Config;
use livedit_core::LifecycleState;
use livedit_core::SessionOrchestrator;
use livedit_core::services::ActiveStatementSource;
use livedit_core::services::DocumentAnalyzer;
use livedit_core::services::ExceptionRegionAnalyzer;
use livedit_core::services::Services;
use livedit_protocol::active_statement::ReportedActiveStatement;
use livedit_protocol::ids::DocumentId;
use livedit_protocol::ids::ProjectId;
use livedit_protocol::read_only::ProjectReadOnlyReason;
use livedit_protocol::read_only::SessionReadOnlyReason;
use livedit_protocol::span::SourceSpan;
use serde::Serialize;
use tracing::debug;

use crate::scenario::InstructionNames;
use crate::scenario::LoggingDiagnostics;
use crate::scenario::Scenario;
use crate::scenario::ScenarioActiveStatements;
use crate::scenario::ScenarioAnalyzer;
use crate::scenario::Span;
use crate::scenario::Step;

/// Replay a scenario file against a fresh orchestrator, printing one JSON
/// line per step.
#[derive(Debug, Parser)]
pub struct ReplayCli {
    /// Path to the scenario JSON file.
    pub scenario: PathBuf,

    /// Configuration file. Defaults to `livedit.toml` in the working
    /// directory; a missing file means built-in defaults.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub async fn run_main(opts: ReplayCli) -> anyhow::Result<()> {
    let ReplayCli { scenario, config } = opts;
    let config_path = config.unwrap_or_else(|| PathBuf::from(CONFIG_TOML_FILE));
    let config = Config::load_from_path(&config_path)?;
    let scenario = Scenario::from_path(&scenario)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    replay(&scenario, config, &mut out).await
}

/// Outcome of one step, serialized as a single JSON line.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum StepOutcome {
    StartDebugRun {
        state: LifecycleState,
    },
    StartEditSession {
        state: LifecycleState,
    },
    ReportRudeEdits {
        document: DocumentId,
        recorded: bool,
    },
    QueryReadOnly {
        project: ProjectId,
        is_read_only: bool,
        session_reason: SessionReadOnlyReason,
        project_reason: ProjectReadOnlyReason,
    },
    QueryPosition {
        instruction: String,
        span: Option<Span>,
    },
    QueryExceptionRegion {
        instruction: String,
        covered: Option<bool>,
    },
    EndEditSession {
        state: LifecycleState,
        invalidated_documents: Vec<DocumentId>,
        recorded_corrections: usize,
    },
    EndDebugRun {
        state: LifecycleState,
    },
}

#[derive(Debug, Serialize)]
struct StepFailure {
    op: &'static str,
    error: String,
}

pub async fn replay(
    scenario: &Scenario,
    config: Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let active_statements = Arc::new(ScenarioActiveStatements::default());
    let analyzer = Arc::new(ScenarioAnalyzer::new(scenario));
    let services = Services::new(
        Arc::clone(&active_statements) as Arc<dyn ActiveStatementSource>,
        Arc::clone(&analyzer) as Arc<dyn DocumentAnalyzer>,
        analyzer as Arc<dyn ExceptionRegionAnalyzer>,
        Arc::new(LoggingDiagnostics),
    );
    let orchestrator = SessionOrchestrator::new(services, config);
    let mut names = InstructionNames::default();

    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(step = index, op = step.name(), "replaying step");
        let line = match run_step(scenario, &orchestrator, &active_statements, &mut names, step)
            .await?
        {
            Ok(outcome) => serde_json::to_string(&outcome)?,
            Err(error) => serde_json::to_string(&StepFailure {
                op: step.name(),
                error,
            })?,
        };
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

/// The outer error aborts the replay (the scenario itself is malformed); the
/// inner one is a rejected lifecycle transition that is reported and skipped.
async fn run_step(
    scenario: &Scenario,
    orchestrator: &SessionOrchestrator,
    active_statements: &ScenarioActiveStatements,
    names: &mut InstructionNames,
    step: &Step,
) -> anyhow::Result<Result<StepOutcome, String>> {
    let outcome = match step {
        Step::StartDebugRun { snapshot } => {
            let snapshot = scenario.snapshot(snapshot)?;
            orchestrator
                .start_debug_run(snapshot)
                .map(|()| StepOutcome::StartDebugRun {
                    state: orchestrator.state(),
                })
        }
        Step::StartEditSession {
            snapshot,
            projects,
            stopped_at_exception,
            active_statements: reported,
        } => {
            let snapshot = scenario.snapshot(snapshot)?;
            let result = orchestrator.start_edit_session(
                snapshot,
                projects.clone(),
                *stopped_at_exception,
            );
            if result.is_ok() {
                active_statements.replace(
                    reported
                        .iter()
                        .map(|spec| ReportedActiveStatement {
                            instruction: names.resolve(&spec.instruction),
                            document: spec.document.clone(),
                            ordinal: spec.ordinal,
                            span: spec.span.into(),
                            flags: spec.flags,
                        })
                        .collect(),
                );
            }
            result.map(|()| StepOutcome::StartEditSession {
                state: orchestrator.state(),
            })
        }
        Step::ReportRudeEdits { document } => Ok(StepOutcome::ReportRudeEdits {
            document: document.clone(),
            recorded: orchestrator.report_rude_edits(document.clone()),
        }),
        Step::QueryReadOnly { project } => {
            let status = orchestrator.is_project_read_only(project);
            Ok(StepOutcome::QueryReadOnly {
                project: project.clone(),
                is_read_only: status.is_read_only,
                session_reason: status.session_reason,
                project_reason: status.project_reason,
            })
        }
        Step::QueryPosition { instruction } => {
            let id = names.resolve(instruction);
            let span = orchestrator.get_current_active_statement_position(&id).await;
            Ok(StepOutcome::QueryPosition {
                instruction: instruction.clone(),
                span: span.map(Span::from),
            })
        }
        Step::QueryExceptionRegion { instruction } => {
            let id = names.resolve(instruction);
            let covered = orchestrator
                .is_active_statement_in_exception_region(&id)
                .await;
            Ok(StepOutcome::QueryExceptionRegion {
                instruction: instruction.clone(),
                covered,
            })
        }
        Step::EndEditSession { corrections } => {
            let corrections: Vec<_> = corrections
                .iter()
                .map(|correction| {
                    (
                        names.resolve(&correction.instruction),
                        SourceSpan::from(correction.span),
                    )
                })
                .collect();
            orchestrator
                .end_edit_session(corrections)
                .map(|summary| StepOutcome::EndEditSession {
                    state: orchestrator.state(),
                    invalidated_documents: summary.invalidated_documents,
                    recorded_corrections: summary.recorded_corrections,
                })
        }
        Step::EndDebugRun => orchestrator
            .end_debug_run()
            .map(|()| StepOutcome::EndDebugRun {
                state: orchestrator.state(),
            }),
    };
    Ok(outcome.map_err(|err| err.to_string()))
}

/// Replays a scenario given as JSON text and returns the printed lines.
pub async fn replay_str(contents: &str, config: Config) -> anyhow::Result<String> {
    let scenario: Scenario = serde_json::from_str(contents)?;
    let mut out = Vec::new();
    replay(&scenario, config, &mut out).await?;
    Ok(String::from_utf8(out)?)
}
