//! Chat turn orchestration
//!
//! One turn: classify and possibly rewrite the user's input, fold it into
//! the conversation state, build the system instruction, make a single
//! model call, then commit the reply. State derived from the user's input
//! is committed even when the model call fails; state derived from the
//! reply is committed only on success.

use crate::context::{self, enrich, rules, topics, ConversationEvent, InputSignal};
use crate::error::Result;
use crate::gemini::GeminiClient;
use crate::history::{ChatHistoryStore, ChatRecord};
use crate::models::FinancialSnapshot;
use crate::profile::ProfileStore;
use crate::prompt;
use crate::session::{ChatEntry, Session, SessionStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A prior exchange replayed by the client when the server has no session
/// yet, e.g. after a restart.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousMessage {
    pub role: String,
    pub content: String,
}

/// Everything one turn needs, already resolved to concrete ids.
#[derive(Debug)]
pub struct ChatTurn {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub user_message: String,
    /// What the user actually typed, when the client pre-rewrote it
    pub original_user_message: Option<String>,
    pub previous_messages: Vec<PreviousMessage>,
    pub financial_parameters: Option<FinancialSnapshot>,
}

/// The staged user entry plus instruction context for this turn.
struct StagedTurn {
    entry: ChatEntry,
    short_response_context: Option<String>,
    is_value_response: bool,
}

pub struct ChatEngine {
    gemini: GeminiClient,
    sessions: SessionStore,
    history: Arc<ChatHistoryStore>,
    profiles: Arc<ProfileStore>,
}

impl ChatEngine {
    pub fn new(
        gemini: GeminiClient,
        sessions: SessionStore,
        history: Arc<ChatHistoryStore>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        Self {
            gemini,
            sessions,
            history,
            profiles,
        }
    }

    /// Run one full turn and return the model's response text.
    pub async fn handle_turn(&self, turn: ChatTurn) -> Result<String> {
        let snapshot = match turn.financial_parameters {
            Some(snapshot) => snapshot,
            None => self.profiles.get_or_sample(turn.user_id).await,
        };

        let session = self.sessions.get_or_create(turn.conversation_id).await;
        let mut session = session.lock().await;
        // Refresh before the model call too, so a conversation whose turns
        // keep failing upstream does not age out while in active use.
        session.touch();

        if session.history.is_empty() && !turn.previous_messages.is_empty() {
            seed_history(&mut session, &turn.previous_messages);
        }

        if let Some(params) = &snapshot.retirement_parameters {
            session.state = context::reduce(
                &session.state,
                ConversationEvent::SnapshotRetirement(params),
            );
        }

        let original = turn
            .original_user_message
            .as_deref()
            .unwrap_or(&turn.user_message);

        let staged = stage_turn(&mut session, &turn.user_message, original);
        let context_prompt = if staged.entry.text != original {
            Some(staged.entry.text.clone())
        } else {
            None
        };

        session.history.push(staged.entry);

        let instruction = prompt::build_system_instruction(
            &snapshot,
            &session.state,
            &session.topics,
            staged.short_response_context.as_deref(),
            staged.is_value_response,
        )?;

        info!(
            "Handling turn for conversation {} ({} message(s) in history)",
            turn.conversation_id,
            session.history.len()
        );

        let reply = self.gemini.generate(&session.history, &instruction).await?;

        commit_model_reply(&mut session, &reply);
        session.touch();

        self.history
            .record_best_effort(ChatRecord::new(
                turn.user_id,
                turn.conversation_id,
                original,
                reply.clone(),
                context_prompt,
            ))
            .await;

        Ok(reply)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Fold the user's input into the session and stage the history entry the
/// model will see. The classifier's signal picks the staging path:
/// fragments of three tokens or fewer merge with pending topic state,
/// other short replies get the contextual rewrite, full messages run
/// topic detection as-is.
fn stage_turn(session: &mut Session, user_message: &str, original: &str) -> StagedTurn {
    session.state = context::reduce(&session.state, ConversationEvent::UserSignals(original));

    let signal = rules::classify(original);
    if rules::is_fragment(original) {
        return stage_fragment(session, user_message, original, signal);
    }

    let staged_text = match signal {
        InputSignal::Full => user_message.to_string(),
        _ if user_message == original && rules::is_short_reply(original) => {
            let previous_user = session.last_user_text().unwrap_or("").to_string();
            let previous_model = session.last_model_text().unwrap_or("").to_string();
            enrich::process_short_response(original, &previous_user, &previous_model)
        }
        // Age/retirement statements longer than a short reply were already
        // harvested above and need no rewriting.
        _ => user_message.to_string(),
    };

    session
        .topics
        .push_recent(topics::extract_topics(&staged_text));
    session.state = context::reduce(&session.state, ConversationEvent::UserMessage(&staged_text));

    let entry = if staged_text != original {
        ChatEntry::user_rewritten(staged_text, original)
    } else {
        ChatEntry::user(staged_text)
    };

    StagedTurn {
        entry,
        short_response_context: None,
        is_value_response: false,
    }
}

fn stage_fragment(
    session: &mut Session,
    user_message: &str,
    original: &str,
    signal: InputSignal,
) -> StagedTurn {
    let last_question = session
        .last_model_text()
        .and_then(enrich::extract_last_question);
    let short_response_context = Some(enrich::short_response_instruction(
        original,
        last_question.as_deref(),
    ));

    // "go ahead" is not in the yes/no vocabulary, so the resumption check
    // spans both non-value fragment signals; whether it fires depends on
    // the pending state, not the utterance alone.
    let is_proceed = matches!(
        signal,
        InputSignal::ShortConfirmation(_) | InputSignal::ShortOther(_)
    ) && rules::is_proceed_confirmation(original)
        && session.state.pending_confirmation
        && session.state.active_topic.is_some();

    if is_proceed {
        // "yes" resumes the pending calculation
        let topic = session
            .state
            .active_topic
            .clone()
            .unwrap_or_else(|| "calculation".to_string());
        info!("Detected confirmation for pending calculation: {}", topic);
        return StagedTurn {
            entry: ChatEntry::user_rewritten(enrich::enrich_confirmation(&topic), original),
            short_response_context,
            is_value_response: false,
        };
    }

    if matches!(signal, InputSignal::ShortValue(_)) {
        session.state = context::reduce(
            &session.state,
            ConversationEvent::UserValueFragment(original),
        );

        let awaiting_value = session.state.active_topic.is_some()
            && (session.state.pending_confirmation || !session.state.pending_inputs.is_empty());
        let enriched = if awaiting_value {
            enrich::enrich_value(original, session.state.active_topic.as_deref())
        } else {
            let previous_user = session.last_user_text().unwrap_or("").to_string();
            let previous_model = session.last_model_text().unwrap_or("").to_string();
            enrich::process_short_response(original, &previous_user, &previous_model)
        };

        let entry = if enriched != original {
            ChatEntry::user_rewritten(enriched, original)
        } else {
            ChatEntry::user(enriched)
        };
        return StagedTurn {
            entry,
            short_response_context,
            is_value_response: true,
        };
    }

    // Client may have rewritten the fragment already
    let staged_text = if user_message != original {
        user_message.to_string()
    } else {
        let previous_user = session.last_user_text().unwrap_or("").to_string();
        let previous_model = session.last_model_text().unwrap_or("").to_string();
        enrich::process_short_response(original, &previous_user, &previous_model)
    };

    let entry = if staged_text != original {
        ChatEntry::user_rewritten(staged_text, original)
    } else {
        ChatEntry::user(staged_text)
    };

    StagedTurn {
        entry,
        short_response_context,
        is_value_response: false,
    }
}

/// Commit everything derived from a successful model reply.
fn commit_model_reply(session: &mut Session, reply: &str) {
    session.history.push(ChatEntry::model(reply));
    session
        .topics
        .append_unique(topics::extract_topics(reply));
    session.state = context::reduce(&session.state, ConversationEvent::ModelReply(reply));
    session.trim_history();
}

fn seed_history(session: &mut Session, previous_messages: &[PreviousMessage]) {
    for message in previous_messages {
        let entry = match message.role.as_str() {
            "assistant" | "model" => ChatEntry::model(message.content.clone()),
            _ => ChatEntry::user(message.content.clone()),
        };
        session.history.push(entry);
    }
    info!(
        "Seeded conversation from {} replayed message(s)",
        previous_messages.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExpectedInput;
    use crate::session::{ChatRole, MAX_HISTORY_LEN};

    fn session_with_reply(reply: &str) -> Session {
        let mut session = Session::new();
        session.history.push(ChatEntry::user("initial question"));
        commit_model_reply(&mut session, reply);
        session
    }

    #[test]
    fn test_bare_value_answers_last_question() {
        let mut session = session_with_reply("Thanks for the details. How old are you?");
        let staged = stage_turn(&mut session, "35", "35");

        assert_eq!(
            staged.entry.text,
            "Regarding your question \"How old are you?\", my answer is: 35"
        );
        assert_eq!(staged.entry.original_input.as_deref(), Some("35"));
        assert!(staged.is_value_response);
        assert_eq!(session.state.retirement.current_age, None);
    }

    #[test]
    fn test_client_rewritten_age_passes_through() {
        let mut session = session_with_reply("How old are you?");
        let rewritten = "My age is 35 years old. Please use this information for any retirement or financial planning calculations.";
        let staged = stage_turn(&mut session, rewritten, "I am 35");

        assert_eq!(staged.entry.text, rewritten);
        assert_eq!(staged.entry.original_input.as_deref(), Some("I am 35"));
        assert_eq!(session.state.retirement.current_age, Some(35));
    }

    #[test]
    fn test_age_then_retirement_age_builds_timeframe() {
        let mut session = session_with_reply("Let's plan your retirement.");
        stage_turn(&mut session, "I am 30 years old", "I am 30 years old");
        stage_turn(
            &mut session,
            "I want to retire at age 60",
            "I want to retire at age 60",
        );

        assert_eq!(session.state.retirement.current_age, Some(30));
        assert_eq!(session.state.retirement.target_retirement_age, Some(60));
        assert_eq!(session.state.retirement.years_until_retirement, Some(30));
    }

    #[test]
    fn test_proceed_confirmation_resumes_pending_calculation() {
        let mut session = session_with_reply("ready");
        stage_turn(
            &mut session,
            "Can I afford a house worth 800k?",
            "Can I afford a house worth 800k?",
        );
        commit_model_reply(
            &mut session,
            "Would you like me to calculate your mortgage affordability?",
        );

        let staged = stage_turn(&mut session, "yes", "yes");
        assert_eq!(
            staged.entry.text,
            "Yes, please property affordability calculation as you suggested in your previous message."
        );
        assert_eq!(staged.entry.original_input.as_deref(), Some("yes"));
    }

    #[test]
    fn test_value_fragment_merges_with_active_topic() {
        let mut session = session_with_reply("ready");
        stage_turn(
            &mut session,
            "I want to buy a property",
            "I want to buy a property",
        );
        commit_model_reply(&mut session, "What is the value of the property?");
        assert_eq!(session.state.pending_inputs, vec![ExpectedInput::PropertyValue]);

        let staged = stage_turn(&mut session, "750k", "750k");
        assert_eq!(
            staged.entry.text,
            "For the property affordability calculation you asked about, the value is 750k"
        );
        assert!(staged.is_value_response);
        assert_eq!(
            session.state.last_property_discussed.as_deref(),
            Some("750k")
        );
        assert!(staged
            .short_response_context
            .as_deref()
            .unwrap()
            .contains("What is the value of the property?"));
    }

    #[test]
    fn test_go_ahead_resumes_pending_calculation() {
        let mut session = session_with_reply("ready");
        stage_turn(
            &mut session,
            "Can I afford a house worth 800k?",
            "Can I afford a house worth 800k?",
        );
        commit_model_reply(
            &mut session,
            "Would you like me to calculate your mortgage affordability?",
        );

        // "go ahead" is outside the yes/no vocabulary but still resumes
        let staged = stage_turn(&mut session, "go ahead", "go ahead");
        assert_eq!(
            staged.entry.text,
            "Yes, please property affordability calculation as you suggested in your previous message."
        );
    }

    #[test]
    fn test_age_fragment_gets_age_rewrite() {
        let mut session = session_with_reply("How old are you?");
        let staged = stage_turn(&mut session, "I am 35", "I am 35");

        assert_eq!(
            staged.entry.text,
            "My age is 35 years old. Please use this information for any retirement or financial planning calculations."
        );
        assert!(!staged.is_value_response);
        assert_eq!(session.state.retirement.current_age, Some(35));
    }

    #[test]
    fn test_closing_reply_resets_topic() {
        let mut session = session_with_reply("ready");
        stage_turn(
            &mut session,
            "Can I afford a house?",
            "Can I afford a house?",
        );
        commit_model_reply(
            &mut session,
            "In summary, the purchase fits your budget comfortably.",
        );

        assert!(session.state.active_topic.is_none());
        assert!(!session.state.pending_confirmation);
    }

    #[test]
    fn test_full_message_extracts_topics() {
        let mut session = session_with_reply("ready");
        stage_turn(
            &mut session,
            "What would my mortgage payment be for this house?",
            "What would my mortgage payment be for this house?",
        );

        assert!(session
            .topics
            .as_slice()
            .contains(&"mortgage".to_string()));
        assert!(session.topics.as_slice().contains(&"house".to_string()));
    }

    #[test]
    fn test_history_trims_after_commit() {
        let mut session = session_with_reply("ready");
        for i in 0..20 {
            stage_turn(
                &mut session,
                &format!("Tell me more about my budget, round {}", i),
                &format!("Tell me more about my budget, round {}", i),
            );
            commit_model_reply(&mut session, "Here are the numbers.");
        }

        assert!(session.history.len() <= MAX_HISTORY_LEN);
        assert_eq!(session.history[0].text, "initial question");
    }

    #[tokio::test]
    async fn test_failed_turn_still_refreshes_last_active() {
        // No API key: the model call fails before any network traffic.
        let engine = ChatEngine::new(
            GeminiClient::new(String::new()),
            SessionStore::new(),
            Arc::new(ChatHistoryStore::in_memory()),
            Arc::new(ProfileStore::in_memory()),
        );

        let conversation_id = Uuid::new_v4();
        let stale = chrono::Utc::now() - chrono::Duration::hours(2);
        {
            let session = engine.sessions().get_or_create(conversation_id).await;
            session.lock().await.last_active = stale;
        }

        let turn = ChatTurn {
            user_id: Uuid::new_v4(),
            conversation_id,
            user_message: "Can I afford a house?".to_string(),
            original_user_message: None,
            previous_messages: Vec::new(),
            financial_parameters: Some(FinancialSnapshot::sample()),
        };
        assert!(engine.handle_turn(turn).await.is_err());

        let session = engine.sessions().get_or_create(conversation_id).await;
        assert!(session.lock().await.last_active > stale);
    }

    #[test]
    fn test_seed_history_maps_roles() {
        let mut session = Session::new();
        seed_history(
            &mut session,
            &[
                PreviousMessage {
                    role: "user".to_string(),
                    content: "hello".to_string(),
                },
                PreviousMessage {
                    role: "assistant".to_string(),
                    content: "hi there".to_string(),
                },
            ],
        );

        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].role, ChatRole::User);
        assert_eq!(session.history[1].role, ChatRole::Model);
    }
}
