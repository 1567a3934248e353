//! Short-response enrichment
//!
//! Rewrites terse replies ("35", "500k", "yes") into self-contained
//! sentences before they reach the model, using the previous turn and the
//! conversation state for context. The original utterance is always kept
//! alongside the rewrite for history.

use crate::context::rules;

/// Topic vocabularies and the label a rewrite refers to them by
const TOPIC_CONTEXTS: &[(&[&str], &str)] = &[
    (
        &["property", "house", "apartment", "mortgage"],
        "real estate or mortgage calculation",
    ),
    (&["invest", "stock", "bond", "portfolio"], "investment planning"),
    (&["tax", "deduction", "credit"], "tax planning"),
    (&["retire", "pension", "pillar"], "retirement planning"),
    (&["budget", "spend", "save"], "budget management"),
    (&["income", "salary", "earn"], "income analysis"),
    (&["debt", "loan", "credit"], "debt management"),
    (&["age", "year", "old"], "age information"),
];

/// Rewrite a short reply into a full sentence, or return it unchanged.
///
/// Precedence: age statement, bare value answering the model's last
/// question, confirmation of the last question, topic continuity, generic
/// question linkage.
pub fn process_short_response(
    input: &str,
    previous_user_message: &str,
    previous_model_message: &str,
) -> String {
    let trimmed = input.trim();

    if !rules::is_short_reply(trimmed) {
        return trimmed.to_string();
    }

    if let Some(age) = rules::extract_age(trimmed) {
        return format!(
            "My age is {} years old. Please use this information for any retirement or financial planning calculations.",
            age
        );
    }

    if rules::is_value_shaped(trimmed) {
        if let Some(question) = extract_last_question(previous_model_message) {
            return format!(
                "Regarding your question \"{}\", my answer is: {}",
                question, trimmed
            );
        }
    }

    if rules::is_confirmation(trimmed) {
        if let Some(question) = extract_last_question(previous_model_message) {
            return format!(
                "{}, regarding your question \"{}\"",
                capitalize(trimmed),
                question
            );
        }
    }

    if rules::is_value_shaped(trimmed) {
        let user_lower = previous_user_message.to_lowercase();
        let model_lower = previous_model_message.to_lowercase();
        for (keywords, context) in TOPIC_CONTEXTS {
            let previous_about_topic = keywords
                .iter()
                .any(|k| user_lower.contains(k) || model_lower.contains(k));
            if previous_about_topic {
                return format!(
                    "For the {} we were discussing, my value is {}",
                    context, trimmed
                );
            }
        }
    }

    if previous_model_message.contains('?') {
        return format!("In response to your previous question, {}", trimmed);
    }

    trimmed.to_string()
}

/// "yes" after a pending calculation question becomes an explicit go-ahead.
pub fn enrich_confirmation(active_calculation: &str) -> String {
    format!(
        "Yes, please {} as you suggested in your previous message.",
        active_calculation
    )
}

/// A bare value merged with the calculation it answers.
pub fn enrich_value(input: &str, active_calculation: Option<&str>) -> String {
    format!(
        "For the {} you asked about, the value is {}",
        active_calculation.unwrap_or("calculation"),
        input
    )
}

/// Instruction fragment telling the model what a short reply refers to.
pub fn short_response_instruction(input: &str, last_question: Option<&str>) -> String {
    match last_question {
        Some(question) => format!(
            "The user's message \"{}\" is responding to your question: \"{}\". Process it in that context.",
            input, question
        ),
        None => format!(
            "The user has sent a short message: \"{}\". It likely refers to the most recent topic discussed.",
            input
        ),
    }
}

/// Last question sentence in a message, scanning from the end.
pub fn extract_last_question(message: &str) -> Option<String> {
    if message.is_empty() {
        return None;
    }

    split_sentences(message)
        .into_iter()
        .rev()
        .map(|s| s.trim())
        .find(|s| s.ends_with('?'))
        .map(|s| s.to_string())
}

// Sentence boundary = terminal punctuation followed by whitespace. The
// terminator stays with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if (b == b'.' || b == b'!' || b == b'?')
            && bytes.get(i + 1).map(|n| n.is_ascii_whitespace()).unwrap_or(false)
        {
            sentences.push(&text[start..=i]);
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_rewrite() {
        let rewritten = process_short_response("I am 35", "", "How old are you?");
        assert_eq!(
            rewritten,
            "My age is 35 years old. Please use this information for any retirement or financial planning calculations."
        );
    }

    #[test]
    fn test_bare_value_links_to_last_question() {
        let rewritten = process_short_response(
            "35",
            "",
            "Thanks for the details. How old are you?",
        );
        assert_eq!(
            rewritten,
            "Regarding your question \"How old are you?\", my answer is: 35"
        );
    }

    #[test]
    fn test_confirmation_links_to_last_question() {
        let rewritten = process_short_response(
            "yes",
            "",
            "Shall I calculate your mortgage payment?",
        );
        assert_eq!(
            rewritten,
            "Yes, regarding your question \"Shall I calculate your mortgage payment?\""
        );
    }

    #[test]
    fn test_topic_continuity_without_question() {
        let rewritten = process_short_response(
            "500k",
            "I want to buy a house",
            "A property purchase needs a down payment of at least 20%.",
        );
        assert_eq!(
            rewritten,
            "For the real estate or mortgage calculation we were discussing, my value is 500k"
        );
    }

    #[test]
    fn test_generic_question_fallback() {
        let rewritten = process_short_response("in Geneva", "", "Where do you want to live?");
        assert_eq!(
            rewritten,
            "In response to your previous question, in Geneva"
        );
    }

    #[test]
    fn test_long_input_unchanged() {
        let input = "I would like to understand my overall tax situation better";
        assert_eq!(process_short_response(input, "", "Anything else?"), input);
    }

    #[test]
    fn test_no_context_unchanged() {
        assert_eq!(process_short_response("hmm", "", ""), "hmm");
    }

    #[test]
    fn test_extract_last_question_picks_final_question() {
        let message = "Your savings look healthy. What is your age? Also, do you rent?";
        assert_eq!(
            extract_last_question(message),
            Some("Also, do you rent?".to_string())
        );
    }

    #[test]
    fn test_extract_last_question_none_without_question() {
        assert_eq!(extract_last_question("All done. Have a nice day."), None);
        assert_eq!(extract_last_question(""), None);
    }

    #[test]
    fn test_confirmation_and_value_merges() {
        assert_eq!(
            enrich_confirmation("property affordability calculation"),
            "Yes, please property affordability calculation as you suggested in your previous message."
        );
        assert_eq!(
            enrich_value("750k", Some("property affordability calculation")),
            "For the property affordability calculation you asked about, the value is 750k"
        );
        assert_eq!(
            enrich_value("750k", None),
            "For the calculation you asked about, the value is 750k"
        );
    }
}
