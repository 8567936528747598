use std::sync::Arc;

use lurelens::{
    CueCategory, LlmError, Orchestrator, Role, ScriptedClient, SessionState, SimulationConfig,
    SimulationError, StyleSample,
};

const OPENER: &str = "Hi! You seem really interesting, want to chat privately?";

fn orchestrator(client: ScriptedClient) -> (Orchestrator, Arc<ScriptedClient>) {
    let client = Arc::new(client);
    let orch = Orchestrator::new(client.clone(), SimulationConfig::default()).unwrap();
    (orch, client)
}

#[test_log::test(tokio::test)]
async fn test_turn_indices_contiguous_and_roles_alternate() {
    let replies: Vec<String> = (0..9).map(|i| format!("message {}", i)).collect();
    let (orch, _) = orchestrator(ScriptedClient::from_texts(replies));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(OPENER));

    for _ in 0..9 {
        orch.advance_turn(&mut session).await.unwrap();
    }

    let turns = session.turns();
    assert_eq!(turns.len(), 9);
    for (i, turn) in turns.iter().enumerate() {
        assert_eq!(turn.turn_index, i);
    }
    for pair in turns.windows(2) {
        assert_ne!(pair[0].role, pair[1].role);
    }
    assert_eq!(turns[0].role, Role::Attacker);
}

#[test_log::test(tokio::test)]
async fn test_failed_generation_leaves_transcript_unchanged() {
    let (orch, _) = orchestrator(ScriptedClient::new(vec![
        Ok("first".to_string()),
        Err(LlmError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }),
        Ok("   ".to_string()),
        Ok("second".to_string()),
    ]));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(OPENER));

    orch.advance_turn(&mut session).await.unwrap();
    let before = session.turns().to_vec();

    let err = orch.advance_turn(&mut session).await.unwrap_err();
    assert!(matches!(err, SimulationError::GenerationFailure(_)));
    assert_eq!(session.turns(), before.as_slice());

    // Blank completions count as failures too.
    let err = orch.advance_turn(&mut session).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.turns(), before.as_slice());

    let turn = orch.advance_turn(&mut session).await.unwrap();
    assert_eq!(turn.turn_index, 1);
    assert_eq!(turn.role, Role::Victim);
}

#[tokio::test]
async fn test_maybe_annotate_is_pure_and_deterministic() {
    let (orch, client) = orchestrator(ScriptedClient::from_texts(["Quick, send me money before it's too late"]));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(OPENER));
    orch.advance_turn(&mut session).await.unwrap();

    let calls_before = client.call_count();
    let first = orch.maybe_annotate(&session);
    let second = orch.maybe_annotate(&session);
    assert_eq!(first, second);
    assert!(first.is_some());
    assert_eq!(client.call_count(), calls_before);
    assert!(session.annotations().is_empty());
}

#[tokio::test]
async fn test_maybe_annotate_on_empty_transcript() {
    let (orch, _) = orchestrator(ScriptedClient::from_texts(["unused"]));
    let session = orch.start_session(Role::Victim, StyleSample::new(OPENER));
    assert!(orch.maybe_annotate(&session).is_none());
}

#[tokio::test]
async fn test_closed_session_rejects_turns() {
    let (orch, client) = orchestrator(ScriptedClient::from_texts(["hello", "hi"]));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(OPENER));
    orch.advance_turn(&mut session).await.unwrap();

    let snapshot = orch.end_session(&mut session);
    assert_eq!(snapshot.state, SessionState::Closed);
    let calls = client.call_count();

    for _ in 0..2 {
        let err = orch.advance_turn(&mut session).await.unwrap_err();
        assert_eq!(err, SimulationError::SessionClosed);
    }
    assert_eq!(session.turns(), snapshot.turns.as_slice());
    assert_eq!(client.call_count(), calls);
}

#[tokio::test]
async fn test_money_request_example() {
    let (orch, _) = orchestrator(ScriptedClient::from_texts([
        "I'm stuck at the airport, can you send me money?",
        "Who is this?",
    ]));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(OPENER));

    let turn0 = orch.advance_turn(&mut session).await.unwrap();
    assert_eq!(turn0.turn_index, 0);
    assert_eq!(turn0.role, Role::Attacker);

    let note = orch.maybe_annotate(&session).unwrap();
    assert_eq!(note.after_turn_index, 0);
    assert!(note.cues.iter().any(|c| c.category == CueCategory::MoneyRequest));
    assert!(note.cue_description.contains("financial manipulation"));

    let turn1 = orch.advance_turn(&mut session).await.unwrap();
    assert_eq!(turn1.turn_index, 1);
    assert_eq!(turn1.role, Role::Victim);
}

#[tokio::test]
async fn test_first_turn_needs_style_sample() {
    let (orch, client) = orchestrator(ScriptedClient::from_texts(["unused"]));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(""));
    let err = orch.advance_turn(&mut session).await.unwrap_err();
    assert!(matches!(err, SimulationError::InvalidConfiguration(_)));
    assert!(!err.is_retryable());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_style_sample_reaches_prompt() {
    let (orch, client) = orchestrator(ScriptedClient::from_texts(["hey"]));
    let mut session = orch.start_session(Role::Attacker, StyleSample::new(OPENER));
    orch.advance_turn(&mut session).await.unwrap();
    assert!(client.calls()[0].prompt.contains(OPENER));
}
