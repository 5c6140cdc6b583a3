mod common;

use common::{RICH_ANSWER, controller, goal, registry, run_to_end};
use elicit_core::{
    Action, ConversationContext, ConversationController, ConversationState, FallbackBank, FinalizeReason,
    InterviewSettings, Priority, ReferencePointRegistry,
};

fn completed_registry() -> ReferencePointRegistry {
    let mut reg = registry(vec![
        goal("p0", Priority::P0Critical),
        goal("p1", Priority::P1Important),
    ]);
    reg.mark_completed("p0", 1.0).unwrap();
    reg.mark_completed("p1", 1.0).unwrap();
    reg
}

fn resumed_at(reg: ReferencePointRegistry, asked: u32) -> common::Controller {
    let mut context = ConversationContext::default();
    context.questions_asked = asked;
    context.current_state = ConversationState::Exploring;
    ConversationController::resume(
        reg,
        context,
        InterviewSettings::default(),
        common::CountingSource::default(),
        FallbackBank::builtin(),
    )
}

/// Below the floor, an exhausted registry still produces a filler question.
#[test]
fn floor_blocks_finalize_at_nine() {
    let mut c = resumed_at(completed_registry(), 9);
    match c.decide_next_action(None).unwrap() {
        Action::AskQuestion(q) => assert!(q.synthetic),
        other => panic!("expected a fallback question, got {other:?}"),
    }
}

#[test]
fn satisfied_interview_finalizes_at_ten() {
    let mut c = resumed_at(completed_registry(), 10);
    assert_eq!(
        c.decide_next_action(None).unwrap(),
        Action::Finalize(FinalizeReason::Satisfied)
    );
    assert!(c.is_finalized());
}

#[test]
fn hard_cap_forces_finalize() {
    let open = registry(vec![goal("a", Priority::P0Critical), goal("b", Priority::P1Important)]);
    let mut c = resumed_at(open, 26);
    assert_eq!(
        c.decide_next_action(None).unwrap(),
        Action::Finalize(FinalizeReason::TurnCap)
    );
}

#[test]
fn at_the_cap_one_more_question_is_allowed() {
    let open = registry(vec![goal("a", Priority::P0Critical)]);
    let mut c = resumed_at(open, 25);
    assert!(matches!(c.decide_next_action(None).unwrap(), Action::AskQuestion(_)));
    assert_eq!(c.context().questions_asked, 26);
    assert_eq!(
        c.submit("").unwrap(),
        Action::Finalize(FinalizeReason::TurnCap)
    );
}

/// A user who never answers still ends the interview, at the cap.
#[test]
fn empty_answers_terminate_at_the_cap() {
    let mut c = controller(registry(vec![
        goal("a", Priority::P0Critical),
        goal("b", Priority::P1Important),
    ]));
    let (asked, reason) = run_to_end(&mut c, "");
    assert_eq!(reason, FinalizeReason::TurnCap);
    assert_eq!(asked.len(), 26);
    assert_eq!(c.context().questions_asked, 26);
    assert_eq!(c.progress().completed_goals, 0);
}

/// Two critical goals answered on the first two turns; fillers carry the
/// interview to the floor, then it ends.
#[test]
fn scenario_small_registry_pads_to_floor() {
    let mut c = controller(registry(vec![
        goal("rp_a", Priority::P0Critical),
        goal("rp_b", Priority::P0Critical),
    ]));
    let (asked, reason) = run_to_end(&mut c, RICH_ANSWER);

    assert_eq!(asked.len(), 10);
    assert_eq!(&asked[..2], ["rp_a", "rp_b"]);
    assert!(asked[2..].iter().all(|id| id.starts_with("fallback_")));
    assert_eq!(reason, FinalizeReason::Exhausted);
    assert_eq!(c.question_source().calls_for("rp_a"), 1);

    let fillers: std::collections::BTreeSet<_> = c
        .context()
        .dialogue_history
        .iter()
        .filter(|t| t.synthetic)
        .map(|t| t.question.clone())
        .collect();
    assert_eq!(fillers.len(), 8, "filler questions must not repeat");
}

#[test]
fn lowered_floor_is_respected() {
    let reg = registry(vec![goal("only", Priority::P0Critical)]);
    let settings = InterviewSettings {
        min_questions: 3,
        ..InterviewSettings::default()
    };
    let mut c = ConversationController::with_settings(
        reg,
        settings,
        common::CountingSource::default(),
        FallbackBank::builtin(),
    )
    .unwrap();
    let (asked, _) = run_to_end(&mut c, RICH_ANSWER);
    assert_eq!(asked.len(), 3);
}
