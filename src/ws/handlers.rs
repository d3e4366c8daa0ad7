//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::error::EngineError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{audience, host};

/// Return an UNAUTHORIZED error unless the connection is the host
macro_rules! check_host {
    ($role:expr, $action:expr) => {
        if *$role != Role::Host {
            tracing::warn!("{:?} attempted to {}", $role, $action);
            return Some(ServerMessage::error(&EngineError::Unauthorized(format!(
                "Only host can {}",
                $action
            ))));
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: &Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Register { display_name } => {
            audience::handle_register(state, display_name).await
        }

        ClientMessage::Resume { participant_token } => {
            audience::handle_resume(state, participant_token).await
        }

        ClientMessage::Vote {
            participant_token,
            question_id,
            option,
            msg_id,
        } => audience::handle_vote(state, participant_token, question_id, option, msg_id).await,

        ClientMessage::Sync { participant_token } => {
            audience::handle_sync(state, *role, participant_token).await
        }

        ClientMessage::GetLeaderboard => audience::handle_get_leaderboard(state).await,

        // Host-only commands
        ClientMessage::HostCreateQuestion { spec } => {
            check_host!(role, "create questions");
            host::handle_create_question(state, spec).await
        }

        ClientMessage::HostStartVoting { question_id } => {
            check_host!(role, "start voting");
            host::handle_start_voting(state, question_id).await
        }

        ClientMessage::HostStopVoting {
            question_id,
            correct_option,
        } => {
            check_host!(role, "stop voting");
            host::handle_stop_voting(state, question_id, correct_option).await
        }

        ClientMessage::HostShowResults { question_id } => {
            check_host!(role, "show results");
            host::handle_show_results(state, question_id).await
        }

        ClientMessage::HostClearView => {
            check_host!(role, "clear the view");
            host::handle_clear_view(state).await
        }

        ClientMessage::HostResetSession => {
            check_host!(role, "reset the session");
            host::handle_reset_session(state).await
        }

        ClientMessage::HostListQuestions => {
            check_host!(role, "list questions");
            host::handle_list_questions(state).await
        }

        ClientMessage::HostGetTally { question_id } => {
            check_host!(role, "read live tallies");
            host::handle_get_tally(state, question_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionSpec, QuestionSpec};

    fn spec(timer_seconds: Option<u32>) -> QuestionSpec {
        QuestionSpec {
            title: "Best colour?".to_string(),
            options: ["Red", "Green", "Blue"]
                .iter()
                .map(|t| OptionSpec {
                    code: None,
                    text: t.to_string(),
                })
                .collect(),
            timer_seconds,
            ..Default::default()
        }
    }

    async fn create(state: &Arc<AppState>) -> String {
        match handle_message(
            ClientMessage::HostCreateQuestion { spec: spec(Some(30)) },
            &Role::Host,
            state,
        )
        .await
        {
            Some(ServerMessage::QuestionCreated { question }) => question.id,
            other => panic!("Expected QuestionCreated, got {:?}", other),
        }
    }

    async fn register(state: &Arc<AppState>) -> String {
        match handle_message(
            ClientMessage::Register { display_name: None },
            &Role::Audience,
            state,
        )
        .await
        {
            Some(ServerMessage::Registered {
                participant_token, ..
            }) => participant_token,
            other => panic!("Expected Registered, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_host_command() {
        let state = Arc::new(AppState::new());

        for role in [Role::Audience, Role::Presenter] {
            let result = handle_message(ClientMessage::HostClearView, &role, &state).await;
            if let Some(ServerMessage::Error { code, .. }) = result {
                assert_eq!(code, "UNAUTHORIZED");
            } else {
                panic!("Expected Error message");
            }
        }
    }

    #[tokio::test]
    async fn test_create_and_list_questions() {
        let state = Arc::new(AppState::new());
        let id = create(&state).await;

        let result = handle_message(ClientMessage::HostListQuestions, &Role::Host, &state).await;
        if let Some(ServerMessage::Questions { list }) = result {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id, id);
        } else {
            panic!("Expected Questions message");
        }
    }

    #[tokio::test]
    async fn test_invalid_question_reports_code() {
        let state = Arc::new(AppState::new());
        let result = handle_message(
            ClientMessage::HostCreateQuestion { spec: spec(Some(0)) },
            &Role::Host,
            &state,
        )
        .await;
        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "INVALID_CONFIG");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_vote_acknowledged_then_duplicate() {
        let state = Arc::new(AppState::new());
        let qid = create(&state).await;
        handle_message(
            ClientMessage::HostStartVoting {
                question_id: qid.clone(),
            },
            &Role::Host,
            &state,
        )
        .await;
        let token = register(&state).await;

        let vote = |option: &str| ClientMessage::Vote {
            participant_token: token.clone(),
            question_id: qid.clone(),
            option: option.to_string(),
            msg_id: Some("m1".to_string()),
        };

        let result = handle_message(vote("a"), &Role::Audience, &state).await;
        if let Some(ServerMessage::VoteAcknowledged { question_id, msg_id }) = result {
            assert_eq!(question_id, qid);
            assert_eq!(msg_id.as_deref(), Some("m1"));
        } else {
            panic!("Expected VoteAcknowledged");
        }

        let result = handle_message(vote("b"), &Role::Audience, &state).await;
        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "DUPLICATE_VOTE");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_vote_with_unknown_token() {
        let state = Arc::new(AppState::new());
        let qid = create(&state).await;
        state.start_voting(&qid).await.unwrap();

        let result = handle_message(
            ClientMessage::Vote {
                participant_token: "stale".to_string(),
                question_id: qid,
                option: "a".to_string(),
                msg_id: None,
            },
            &Role::Audience,
            &state,
        )
        .await;
        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "NOT_FOUND");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_stop_voting_replies_with_tally() {
        let state = Arc::new(AppState::new());
        let qid = create(&state).await;
        state.start_voting(&qid).await.unwrap();

        let result = handle_message(
            ClientMessage::HostStopVoting {
                question_id: qid.clone(),
                correct_option: Some("a".to_string()),
            },
            &Role::Host,
            &state,
        )
        .await;
        if let Some(ServerMessage::Tally {
            question_id,
            tally,
            total_votes,
        }) = result
        {
            assert_eq!(question_id, qid);
            assert_eq!(tally.len(), 3);
            assert_eq!(total_votes, 0);
        } else {
            panic!("Expected Tally message");
        }
    }

    #[tokio::test]
    async fn test_start_voting_answers_via_broadcast() {
        let state = Arc::new(AppState::new());
        let qid = create(&state).await;
        let mut rx = state.broadcast.subscribe();

        let result = handle_message(
            ClientMessage::HostStartVoting { question_id: qid },
            &Role::Host,
            &state,
        )
        .await;
        assert!(result.is_none());
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::QuestionActivated { .. })
        ));
    }

    #[tokio::test]
    async fn test_sync_returns_personal_state() {
        let state = Arc::new(AppState::new());
        let qid = create(&state).await;
        state.start_voting(&qid).await.unwrap();
        let token = register(&state).await;
        handle_message(
            ClientMessage::Vote {
                participant_token: token.clone(),
                question_id: qid.clone(),
                option: "c".to_string(),
                msg_id: None,
            },
            &Role::Audience,
            &state,
        )
        .await;

        let result = handle_message(
            ClientMessage::Sync {
                participant_token: Some(token),
            },
            &Role::Audience,
            &state,
        )
        .await;
        if let Some(ServerMessage::State(snapshot)) = result {
            assert_eq!(snapshot.question.unwrap().id, qid);
            assert_eq!(snapshot.my_vote.as_deref(), Some("c"));
            assert!(snapshot.tally.is_none());
            assert!(snapshot.participant.is_some());
        } else {
            panic!("Expected State message");
        }
    }

    #[tokio::test]
    async fn test_reset_session_invalidates_tokens() {
        let state = Arc::new(AppState::new());
        let token = register(&state).await;

        let result = handle_message(ClientMessage::HostResetSession, &Role::Host, &state).await;
        assert!(result.is_none());

        let result = handle_message(
            ClientMessage::Resume {
                participant_token: token,
            },
            &Role::Audience,
            &state,
        )
        .await;
        if let Some(ServerMessage::Error { code, .. }) = result {
            assert_eq!(code, "NOT_FOUND");
        } else {
            panic!("Expected Error message");
        }
    }

    #[tokio::test]
    async fn test_get_leaderboard_any_role() {
        let state = Arc::new(AppState::new());
        register(&state).await;
        let result = handle_message(ClientMessage::GetLeaderboard, &Role::Audience, &state).await;
        if let Some(ServerMessage::Leaderboard { entries }) = result {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].rank, 1);
        } else {
            panic!("Expected Leaderboard message");
        }
    }
}
