use assert_matches::assert_matches;
use livedit_core::LifecycleError;
use livedit_core::LifecycleState;
use livedit_test_support::snapshot;
use livedit_test_support::span;
use livedit_test_support::test_orchestrator;
use pretty_assertions::assert_eq;
use std::collections::HashMap;

#[test]
fn second_debug_run_is_rejected() {
    let test = test_orchestrator().build();
    test.orchestrator
        .start_debug_run(snapshot(0, &["a.cs"]))
        .expect("start debug run");

    assert_matches!(
        test.orchestrator.start_debug_run(snapshot(1, &["a.cs"])),
        Err(LifecycleError::DebugRunAlreadyActive)
    );
    assert_eq!(test.orchestrator.state(), LifecycleState::Running);
}

#[test]
fn edit_session_requires_debug_run() {
    let test = test_orchestrator().build();
    assert_matches!(
        test.orchestrator
            .start_edit_session(snapshot(0, &["a.cs"]), HashMap::new(), false),
        Err(LifecycleError::NoDebugRun)
    );
    assert_eq!(test.orchestrator.state(), LifecycleState::Idle);
}

#[test]
fn second_edit_session_is_rejected() {
    let test = test_orchestrator().build();
    test.break_into(&["a.cs"]);

    assert_matches!(
        test.orchestrator
            .start_edit_session(snapshot(2, &["a.cs"]), HashMap::new(), true),
        Err(LifecycleError::EditSessionAlreadyActive)
    );
    assert_eq!(test.orchestrator.state(), LifecycleState::Broken);
}

#[test]
fn debug_run_cannot_end_while_broken() {
    let test = test_orchestrator().build();
    test.break_into(&["a.cs"]);

    assert_matches!(
        test.orchestrator.end_debug_run(),
        Err(LifecycleError::EditSessionActive)
    );
    assert_eq!(test.orchestrator.state(), LifecycleState::Broken);
}

#[test]
fn ending_without_a_session_is_rejected() {
    let test = test_orchestrator().build();
    assert_matches!(
        test.orchestrator.end_debug_run(),
        Err(LifecycleError::NoDebugRun)
    );
    assert_matches!(
        test.orchestrator.end_edit_session(std::iter::empty()),
        Err(LifecycleError::NoEditSession)
    );
}

#[test]
fn end_edit_session_invalidates_documents_with_rude_edits() {
    let test = test_orchestrator().build();
    test.break_into(&["a.cs", "b.cs"]);

    assert!(test.orchestrator.report_rude_edits("b.cs".into()));
    assert!(test.orchestrator.report_rude_edits("a.cs".into()));
    assert!(test.orchestrator.report_rude_edits("b.cs".into()));

    let summary = test
        .orchestrator
        .end_edit_session(std::iter::empty())
        .expect("end edit session");

    assert_eq!(
        summary.invalidated_documents,
        vec!["a.cs".into(), "b.cs".into()]
    );
    assert_eq!(test.diagnostics.batches(), vec![summary.invalidated_documents]);
    assert!(!test.orchestrator.report_rude_edits("a.cs".into()));
}

#[test]
fn session_without_rude_edits_invalidates_nothing() {
    let test = test_orchestrator().build();
    test.break_into(&["a.cs"]);

    let summary = test
        .orchestrator
        .end_edit_session(std::iter::empty())
        .expect("end edit session");

    assert!(summary.invalidated_documents.is_empty());
    assert!(test.diagnostics.batches().is_empty());
}

#[test]
fn corrections_overwrite_by_instruction() {
    let test = test_orchestrator().build();
    let first = test.instructions.next();
    let second = test.instructions.next();
    test.break_into(&["a.cs"]);

    let summary = test
        .orchestrator
        .end_edit_session([(first, span(3)), (second, span(9))])
        .expect("end edit session");
    assert_eq!(summary.recorded_corrections, 2);

    test.break_again(2, &["a.cs"]);
    test.orchestrator
        .end_edit_session([(first, span(5))])
        .expect("end edit session");

    assert_eq!(test.orchestrator.correction_count(), 2);
    assert_eq!(
        test.orchestrator.active_statement_correction(&first),
        Some(span(5))
    );
    assert_eq!(
        test.orchestrator.active_statement_correction(&second),
        Some(span(9))
    );
}

#[test]
fn corrections_survive_the_end_of_a_debug_run() {
    let test = test_orchestrator().build();
    let instruction = test.instructions.next();
    test.break_into(&["a.cs"]);
    test.orchestrator
        .end_edit_session([(instruction, span(4))])
        .expect("end edit session");
    test.orchestrator.end_debug_run().expect("end debug run");

    assert_eq!(test.orchestrator.state(), LifecycleState::Idle);
    assert_eq!(test.orchestrator.correction_count(), 1);
}
