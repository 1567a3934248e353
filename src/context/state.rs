//! Per-conversation heuristic state
//!
//! State transitions are pure reducers `(state, event) -> state` so a
//! conversation can be replayed deterministically from its turn log. User
//! messages and model replies are separate events; a model failure simply
//! means the reply event never happens.

use crate::context::rules;
use crate::models::RetirementParameters;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

lazy_static! {
    static ref PROPERTY_VALUE: Regex =
        Regex::new(r"(\d+(?:\.\d+)?)\s*(m|million|mio|k|thousand)?").unwrap();
    static ref INCOME_FIGURE: Regex = Regex::new(r"income.*?([\d,]+)").unwrap();
    static ref LAST_NUMBER: Regex = Regex::new(r"\d+([.,]\d+)?(\s*[kmKM])?").unwrap();
}

/// Phrases a reply closes a calculation with
const CLOSING_PHRASES: &[&str] = &[
    "In conclusion",
    "To summarize",
    "In summary",
    "Based on my analysis",
];

/// What kind of input the model's last question is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedInput {
    PropertyValue,
    Income,
    CurrentAge,
    RetirementAge,
}

/// Retirement facts accumulated over the conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetirementContext {
    pub current_age: Option<u32>,
    pub target_retirement_age: Option<u32>,
    pub target_annual_income: Option<f64>,
    /// Target minus current age; negative if the target is already past
    pub years_until_retirement: Option<i64>,
}

impl RetirementContext {
    fn recompute_timeframe(&mut self) {
        self.years_until_retirement = match (self.current_age, self.target_retirement_age) {
            (Some(current), Some(target)) => Some(i64::from(target) - i64::from(current)),
            _ => None,
        };
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Heuristic state for one conversation. Held only in process memory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    /// The calculation the user is currently interested in
    pub active_topic: Option<String>,
    pub last_question: Option<String>,
    pub pending_confirmation: bool,
    pub calculation_context: HashMap<String, String>,
    pub last_value_mentioned: Option<String>,
    pub last_property_discussed: Option<String>,
    pub last_income_discussed: Option<f64>,
    pub pending_inputs: Vec<ExpectedInput>,
    pub retirement: RetirementContext,
}

/// Events a conversation state reacts to
#[derive(Debug, Clone, Copy)]
pub enum ConversationEvent<'a> {
    /// Age/retirement/value signals present in any user input, long or short
    UserSignals(&'a str),
    /// A full user sentence; runs topic detection on top of the signals
    UserMessage(&'a str),
    /// A short bare value merged with the pending topic
    UserValueFragment(&'a str),
    /// The model's reply for this turn
    ModelReply(&'a str),
    /// Retirement parameters supplied with the financial snapshot
    SnapshotRetirement(&'a RetirementParameters),
}

/// Pure reducer: applies one event and returns the successor state.
pub fn reduce(state: &ConversationState, event: ConversationEvent) -> ConversationState {
    let mut next = state.clone();

    match event {
        ConversationEvent::UserSignals(text) => apply_user_signals(&mut next, text),
        ConversationEvent::UserMessage(text) => {
            apply_user_signals(&mut next, text);
            apply_topic_detection(&mut next, text);
        }
        ConversationEvent::UserValueFragment(value) => apply_value_fragment(&mut next, value),
        ConversationEvent::ModelReply(text) => apply_model_reply(&mut next, text),
        ConversationEvent::SnapshotRetirement(params) => apply_snapshot(&mut next, params),
    }

    next
}

fn apply_user_signals(state: &mut ConversationState, text: &str) {
    if let Some(age) = rules::extract_age(text) {
        state.retirement.current_age = Some(age);
        state.retirement.recompute_timeframe();
    }

    if let Some(target) = rules::extract_retirement_age(text) {
        state.retirement.target_retirement_age = Some(target);
        state.retirement.recompute_timeframe();
    }

    if let Some(income) = rules::extract_retirement_income(text) {
        state.retirement.target_annual_income = Some(income);
    }

    if let Some(last) = LAST_NUMBER.find_iter(text).last() {
        state.last_value_mentioned = Some(last.as_str().to_string());
    }
}

fn apply_topic_detection(state: &mut ConversationState, text: &str) {
    let lower = text.to_lowercase();

    let property_words = ["property", "mortgage", "house", "apartment", "buy", "afford"];
    if property_words.iter().any(|w| lower.contains(w)) {
        state.active_topic = Some("property affordability calculation".to_string());
        state.last_question = Some(text.to_string());
        state.pending_confirmation = text.contains('?');

        if state.pending_confirmation
            && ["price", "cost", "value", "worth"].iter().any(|w| lower.contains(w))
        {
            state.pending_inputs = vec![ExpectedInput::PropertyValue];
        }

        if let Some(captures) = PROPERTY_VALUE.captures(&lower) {
            if let Ok(mut value) = captures[1].parse::<f64>() {
                match captures.get(2).map(|m| m.as_str()) {
                    Some("m") | Some("million") | Some("mio") => value *= 1_000_000.0,
                    Some("k") | Some("thousand") => value *= 1000.0,
                    _ => {}
                }
                state.last_property_discussed = Some(format_amount(value));
            }
        }

        if lower.contains("income") {
            if let Some(captures) = INCOME_FIGURE.captures(&lower) {
                let figure = captures[1].to_string();
                state
                    .calculation_context
                    .insert("income".to_string(), figure.clone());
                if let Ok(parsed) = figure.replace(',', "").parse::<f64>() {
                    state.last_income_discussed = Some(parsed);
                }
            }
        }
    } else if lower.contains("tax") {
        state.active_topic = Some("tax optimization".to_string());
        state.last_question = Some(text.to_string());
        state.pending_confirmation = text.contains('?');
    } else if lower.contains("invest") || lower.contains("portfolio") {
        state.active_topic = Some("investment portfolio analysis".to_string());
        state.last_question = Some(text.to_string());
        state.pending_confirmation = text.contains('?');
    } else if lower.contains("retire") || lower.contains("pension") {
        state.active_topic = Some("retirement planning".to_string());
        state.last_question = Some(text.to_string());
        state.pending_confirmation = text.contains('?');
    }
}

fn apply_value_fragment(state: &mut ConversationState, value: &str) {
    state.last_value_mentioned = Some(value.to_string());

    let topic_mentions = |needle: &str| {
        state
            .active_topic
            .as_deref()
            .map(|t| t.contains(needle))
            .unwrap_or(false)
    };

    if topic_mentions("property") || topic_mentions("mortgage") || state.last_property_discussed.is_some() {
        state.last_property_discussed = Some(value.to_string());
    }

    if topic_mentions("income")
        || topic_mentions("salary")
        || state.pending_inputs.contains(&ExpectedInput::Income)
    {
        let digits: String = value
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(parsed) = digits.parse::<f64>() {
            state.last_income_discussed = Some(parsed);
        }
    }
}

fn apply_model_reply(state: &mut ConversationState, text: &str) {
    let lower = text.to_lowercase();

    if text.contains('?') {
        state.pending_confirmation = true;

        if lower.contains("property")
            && ["price", "value", "cost"].iter().any(|w| lower.contains(w))
        {
            state.pending_inputs = vec![ExpectedInput::PropertyValue];
        }

        if lower.contains("income") {
            state.pending_inputs = vec![ExpectedInput::Income];
        }

        if lower.contains("age") && !lower.contains("retirement age") {
            state.pending_inputs = vec![ExpectedInput::CurrentAge];
        }

        if lower.contains("retirement") && lower.contains("age") {
            state.pending_inputs = vec![ExpectedInput::RetirementAge];
        }
    } else {
        state.pending_confirmation = false;
    }

    if CLOSING_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        state.active_topic = None;
        state.pending_confirmation = false;
        state.pending_inputs.clear();
    }
}

fn apply_snapshot(state: &mut ConversationState, params: &RetirementParameters) {
    if let Some(age) = params.current_age {
        state.retirement.current_age = Some(age);
    }
    if let Some(target) = params.target_retirement_age {
        state.retirement.target_retirement_age = Some(target);
    }
    if let Some(income) = params.target_annual_income {
        state.retirement.target_annual_income = Some(income);
    }
    state.retirement.recompute_timeframe();
}

fn format_amount(value: f64) -> String {
    if value == value.trunc() {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_then_retirement_age_yields_timeframe() {
        let state = ConversationState::default();
        let state = reduce(&state, ConversationEvent::UserMessage("I am 30 years old"));
        assert_eq!(state.retirement.current_age, Some(30));
        assert_eq!(state.retirement.years_until_retirement, None);

        let state = reduce(
            &state,
            ConversationEvent::UserMessage("I want to retire at age 60"),
        );
        assert_eq!(state.retirement.target_retirement_age, Some(60));
        assert_eq!(state.retirement.years_until_retirement, Some(30));
    }

    #[test]
    fn test_reducer_leaves_input_state_untouched() {
        let original = ConversationState::default();
        let _ = reduce(&original, ConversationEvent::UserMessage("mortgage question?"));
        assert!(original.active_topic.is_none());
    }

    #[test]
    fn test_property_message_sets_active_topic() {
        let state = reduce(
            &ConversationState::default(),
            ConversationEvent::UserMessage("Can I afford a house worth 800k?"),
        );
        assert_eq!(
            state.active_topic.as_deref(),
            Some("property affordability calculation")
        );
        assert!(state.pending_confirmation);
        assert_eq!(state.pending_inputs, vec![ExpectedInput::PropertyValue]);
        assert_eq!(state.last_property_discussed.as_deref(), Some("800000"));
    }

    #[test]
    fn test_tax_message_without_question_mark() {
        let state = reduce(
            &ConversationState::default(),
            ConversationEvent::UserMessage("Help me with my tax deductions"),
        );
        assert_eq!(state.active_topic.as_deref(), Some("tax optimization"));
        assert!(!state.pending_confirmation);
    }

    #[test]
    fn test_model_question_sets_expected_input() {
        let state = reduce(
            &ConversationState::default(),
            ConversationEvent::ModelReply("What is the value of the property you want to buy?"),
        );
        assert!(state.pending_confirmation);
        assert_eq!(state.pending_inputs, vec![ExpectedInput::PropertyValue]);

        let state = reduce(&state, ConversationEvent::ModelReply("How old are you?"));
        assert_eq!(state.pending_inputs, vec![ExpectedInput::CurrentAge]);
    }

    #[test]
    fn test_closing_language_resets_topic() {
        let mut state = reduce(
            &ConversationState::default(),
            ConversationEvent::UserMessage("Can I afford a house?"),
        );
        state = reduce(&state, ConversationEvent::ModelReply("Would you like details?"));
        assert!(state.active_topic.is_some());
        assert!(state.pending_confirmation);

        let state = reduce(
            &state,
            ConversationEvent::ModelReply(
                "In summary, the purchase is within your budget.",
            ),
        );
        assert!(state.active_topic.is_none());
        assert!(!state.pending_confirmation);
        assert!(state.pending_inputs.is_empty());
    }

    #[test]
    fn test_value_fragment_fills_property_context() {
        let mut state = reduce(
            &ConversationState::default(),
            ConversationEvent::UserMessage("I want to buy a property"),
        );
        state = reduce(&state, ConversationEvent::UserValueFragment("750k"));

        assert_eq!(state.last_value_mentioned.as_deref(), Some("750k"));
        assert_eq!(state.last_property_discussed.as_deref(), Some("750k"));
    }

    #[test]
    fn test_income_fragment_parses_number() {
        let mut state = ConversationState::default();
        state.pending_inputs = vec![ExpectedInput::Income];

        let state = reduce(&state, ConversationEvent::UserValueFragment("11500"));
        assert_eq!(state.last_income_discussed, Some(11_500.0));
    }

    #[test]
    fn test_snapshot_retirement_merges_and_computes() {
        let params = RetirementParameters {
            current_age: Some(35),
            target_retirement_age: Some(65),
            target_annual_income: Some(80_000.0),
        };
        let state = reduce(
            &ConversationState::default(),
            ConversationEvent::SnapshotRetirement(&params),
        );
        assert_eq!(state.retirement.years_until_retirement, Some(30));
        assert_eq!(state.retirement.target_annual_income, Some(80_000.0));
    }

    #[test]
    fn test_income_mention_recorded_in_calculation_context() {
        let state = reduce(
            &ConversationState::default(),
            ConversationEvent::UserMessage(
                "Can I afford a house with my income of 11,500 per month?",
            ),
        );
        assert_eq!(
            state.calculation_context.get("income").map(String::as_str),
            Some("11,500")
        );
        assert_eq!(state.last_income_discussed, Some(11_500.0));
    }
}
