use chrono::{TimeZone, Utc};
use dreampool_agent::{DialogueOrchestrator, ModelPlan, Reply};
use dreampool_core::config::DialogueConfig;
use dreampool_core::domain::payload::FixedClock;
use dreampool_core::domain::session::{SessionState, Turn};
use dreampool_core::domain::slot::SlotName;
use dreampool_core::flows::{NextAction, RoutingContext, RoutingStrategy, ToolKind};
use rust_decimal::Decimal;

const ADDRESS: &str = "0x742d35Cc6634C0532925a3b8D4C9db96C4b4d8b6";

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid instant"))
}

fn orchestrator_with(config: &DialogueConfig) -> DialogueOrchestrator<FixedClock> {
    DialogueOrchestrator::with_clock(config, clock())
}

fn orchestrator() -> DialogueOrchestrator<FixedClock> {
    orchestrator_with(&DialogueConfig::default())
}

fn state_at_amount(orchestrator: &DialogueOrchestrator<FixedClock>) -> SessionState {
    orchestrator.start_session(Some("buy a laptop")).expect("start").state
}

fn filled(state: &SessionState) -> usize {
    SlotName::FILL_ORDER.len() - state.slots().missing().len()
}

fn tool_results(state: &SessionState) -> Vec<(ToolKind, String)> {
    state
        .transcript()
        .turns()
        .iter()
        .filter_map(|turn| match turn {
            Turn::ToolResult { tool, text } => Some((*tool, text.clone())),
            _ => None,
        })
        .collect()
}

/// Keeps asking for the same tool no matter what happened.
struct Insistent(ToolKind);

impl RoutingStrategy for Insistent {
    fn next_action(&self, _context: &RoutingContext<'_>) -> NextAction {
        NextAction::Invoke(self.0)
    }
}

#[test]
fn four_utterances_complete_a_pool() {
    let orchestrator = orchestrator();
    let mut state = orchestrator.start_session(None).expect("start").state;

    let mut replies = Vec::new();
    let script = ["buy a laptop", "2.5 ETH", "30 days", ADDRESS];
    for (turn, utterance) in script.into_iter().enumerate() {
        let outcome = orchestrator.continue_session(&state, utterance).expect("turn");
        state = outcome.state;
        replies.push(outcome.reply);

        assert_eq!(filled(&state), turn + 1, "one more slot after turn {}", turn + 1);
        if turn < 3 {
            assert!(!state.is_complete());
            assert!(state.payload().is_none());
        }
    }

    assert!(replies[0].text().contains("Great! So you want to: buy a laptop"));
    assert!(replies[1].text().contains("2,500,000,000,000,000,000 base units"));
    assert!(replies[2].text().contains("Deadline set for 30 days from now (2026-03-31)"));

    let payload = match replies.last() {
        Some(Reply::Completed { payload, confirmation }) => {
            assert!(confirmation.contains("Deadline: 30 days (2026-03-31)"));
            payload.clone()
        }
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(payload.goal_description, "buy a laptop");
    assert_eq!(payload.amount, Decimal::new(25, 1));
    assert_eq!(payload.amount_base_units, 2_500_000_000_000_000_000);
    assert_eq!(payload.deadline_days, 30);
    assert_eq!(payload.deadline_timestamp, clock().0.timestamp() + 30 * 86_400);
    assert_eq!(payload.recipient, ADDRESS);

    assert!(state.is_complete());
    assert_eq!(state.payload(), Some(&payload));
    assert!(state.check_invariants().is_ok());

    // greeting, then a user/tool/prompt triple per utterance
    let turns = state.transcript().turns();
    assert_eq!(turns.len(), 1 + 4 * 3);
    assert!(matches!(turns[0], Turn::Prompt { .. }));
    for triple in turns[1..].chunks(3) {
        assert!(matches!(triple[0], Turn::User { .. }));
        assert!(matches!(triple[1], Turn::ToolResult { .. }));
        assert!(matches!(triple[2], Turn::Prompt { .. }));
    }
}

#[test]
fn vague_deadline_is_reprompted_then_accepted() {
    let orchestrator = orchestrator();
    let mut state = state_at_amount(&orchestrator);
    state = orchestrator.continue_session(&state, "2.5 ETH").expect("turn").state;

    let vague = orchestrator.continue_session(&state, "soon").expect("turn");
    assert_eq!(vague.state.slots().deadline_days, None);
    assert_eq!(vague.state.slots().active_slot(), Some(SlotName::DeadlineDays));
    assert!(vague.reply.text().starts_with("I didn't understand the deadline."));

    let concrete = orchestrator.continue_session(&vague.state, "2 weeks").expect("turn");
    assert_eq!(concrete.state.slots().deadline_days, Some(14));
    assert_eq!(concrete.state.slots().active_slot(), Some(SlotName::Recipient));
}

#[test]
fn prior_state_is_never_mutated() {
    let orchestrator = orchestrator();
    let state = state_at_amount(&orchestrator);
    let snapshot = state.clone();

    let _ = orchestrator.continue_session(&state, "2.5 ETH").expect("turn");

    assert_eq!(state, snapshot);
}

#[test]
fn same_clock_and_script_give_the_same_result() {
    let run = || {
        let orchestrator = orchestrator();
        let mut outcome = orchestrator.start_session(Some("fund a community garden")).expect("start");
        let mut replies = vec![outcome.reply.clone()];
        for utterance in ["3 eth", "1 month", ADDRESS] {
            outcome = orchestrator.continue_session(&outcome.state, utterance).expect("turn");
            replies.push(outcome.reply.clone());
        }
        (replies, outcome.state.payload().cloned())
    };

    let (first_replies, first_payload) = run();
    let (second_replies, second_payload) = run();

    assert!(first_payload.is_some());
    assert_eq!(first_payload, second_payload);
    assert_eq!(first_replies, second_replies);
}

#[test]
fn same_prior_state_and_utterance_give_identical_outcomes() {
    let orchestrator = orchestrator();
    let mut state = orchestrator.start_session(None).expect("start").state;

    for utterance in ["fund a community garden", "3 eth", "soon", "1 month", ADDRESS] {
        let first = orchestrator.continue_session(&state, utterance).expect("turn");
        let second = orchestrator.continue_session(&state, utterance).expect("turn");

        assert_eq!(first.state, second.state);
        assert_eq!(first.reply, second.reply);
        state = first.state;
    }

    assert!(state.is_complete());
}

#[test]
fn insistent_routing_is_cut_off_by_the_tool_budget() {
    let config = DialogueConfig { max_tool_calls_per_turn: 3, ..DialogueConfig::default() };
    let orchestrator = orchestrator_with(&config);
    let state = state_at_amount(&orchestrator);

    let outcome = orchestrator
        .continue_session_with(&state, "2.5 ETH", &Insistent(ToolKind::CheckComplete))
        .expect("turn");

    assert_eq!(outcome.state.slots().amount, None);
    assert!(outcome
        .reply
        .text()
        .starts_with("I still need: funding amount, deadline, recipient address."));

    // one real call, two refused duplicates, then the budget runs out
    let results = tool_results(&outcome.state);
    let this_turn = &results[results.len() - 4..];
    assert_eq!(this_turn[0].1, "missing: amount, deadline_days, recipient");
    assert!(this_turn[1].1.contains("duplicate_tool_call"));
    assert!(this_turn[2].1.contains("duplicate_tool_call"));
    assert!(this_turn[3].1.contains("tool_budget_exhausted"));
    assert!(this_turn.iter().all(|(tool, _)| *tool == ToolKind::CheckComplete));
}

#[test]
fn off_route_model_calls_are_recorded_without_effect() {
    let orchestrator = orchestrator();
    let state = state_at_amount(&orchestrator);
    let plan = ModelPlan {
        tool_calls: vec![
            ToolKind::ExtractDeadline,
            ToolKind::ExtractGoalDescription,
            ToolKind::ExtractAmount,
        ],
        message: None,
    };

    let outcome = orchestrator
        .continue_session_with(&state, "2 ETH within 3 weeks", &plan)
        .expect("turn");

    assert_eq!(outcome.state.slots().amount, Some(Decimal::new(2, 0)));
    assert_eq!(outcome.state.slots().deadline_days, None);
    assert_eq!(outcome.state.slots().goal_description.as_deref(), Some("buy a laptop"));

    let results = tool_results(&outcome.state);
    let this_turn = &results[results.len() - 3..];
    assert_eq!(this_turn[0].0, ToolKind::ExtractDeadline);
    assert_eq!(this_turn[0].1, "deadline accepted: 21 days");
    assert!(this_turn[1].1.contains("slot_already_filled"));
    assert_eq!(this_turn[2].0, ToolKind::ExtractAmount);
}

#[test]
fn strict_policy_refuses_off_route_model_calls() {
    let config = DialogueConfig { allow_off_route_tools: false, ..DialogueConfig::default() };
    let orchestrator = orchestrator_with(&config);
    let state = state_at_amount(&orchestrator);
    let plan = ModelPlan {
        tool_calls: vec![ToolKind::ExtractDeadline, ToolKind::ExtractAmount],
        message: None,
    };

    let outcome = orchestrator
        .continue_session_with(&state, "2 ETH within 3 weeks", &plan)
        .expect("turn");

    assert_eq!(outcome.state.slots().amount, Some(Decimal::new(2, 0)));
    let results = tool_results(&outcome.state);
    let this_turn = &results[results.len() - 2..];
    assert_eq!(this_turn[0].0, ToolKind::ExtractDeadline);
    assert!(this_turn[0].1.contains("off_route_tool"));
    assert_eq!(this_turn[1].1, "funding amount accepted: 2");
}

#[test]
fn model_yield_message_prefixes_the_deferral() {
    let orchestrator = orchestrator();
    let state = state_at_amount(&orchestrator);
    let plan = ModelPlan {
        tool_calls: Vec::new(),
        message: Some("Could you tell me the amount in ETH?".to_string()),
    };

    let outcome = orchestrator.continue_session_with(&state, "hmm", &plan).expect("turn");

    let text = match &outcome.reply {
        Reply::Prompt(text) => text.as_str(),
        Reply::Completed { .. } => panic!("deferred turn cannot complete"),
    };
    assert!(text.starts_with("Could you tell me the amount in ETH?\n\nI still need: funding amount"));
    assert_eq!(outcome.state.slots(), state.slots());
    assert_eq!(outcome.state.transcript().len(), state.transcript().len() + 2);
}

#[test]
fn amounts_are_read_in_the_configured_currency() {
    let config = DialogueConfig { currency_label: "xDAI".to_string(), ..DialogueConfig::default() };
    let orchestrator = orchestrator_with(&config);
    let state = state_at_amount(&orchestrator);

    let in_eth = orchestrator.continue_session(&state, "2.5 ETH").expect("turn");
    assert_eq!(in_eth.state.slots().amount, None);
    assert!(in_eth.reply.text().contains("'2.5 xDAI'"));

    let in_xdai = orchestrator.continue_session(&in_eth.state, "2.5 xDAI").expect("turn");
    assert_eq!(in_xdai.state.slots().amount, Some(Decimal::new(25, 1)));
    assert_eq!(in_xdai.state.slots().active_slot(), Some(SlotName::DeadlineDays));
}

#[test]
fn configured_hint_and_currency_appear_in_prompts() {
    let config = DialogueConfig {
        currency_label: "xDAI".to_string(),
        recipient_hint: Some(ADDRESS.to_string()),
        ..DialogueConfig::default()
    };
    let orchestrator = orchestrator_with(&config);

    let mut state = state_at_amount(&orchestrator);
    let amount = orchestrator.continue_session(&state, "4 xDAI").expect("turn");
    assert!(amount.reply.text().contains("4 xDAI"));
    state = amount.state;

    let deadline = orchestrator.continue_session(&state, "10 days").expect("turn");
    assert!(deadline.reply.text().contains(ADDRESS));
}
