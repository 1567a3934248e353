//! Topic extraction and the bounded recent-topics list
//!
//! Keyword and phrase matching against a fixed financial vocabulary, plus
//! pseudo-tokens for money amounts and ages. The recent-topics list feeds
//! pronoun resolution in the model's system instruction.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Most recent topics retained per conversation
pub const MAX_TOPICS: usize = 10;

/// Static vocabulary — zero allocation
const FINANCIAL_TERMS: &[&str] = &[
    "mortgage", "tax", "income", "expense", "saving", "investment", "retirement",
    "property", "debt", "asset", "liability", "deduction", "credit", "rate",
    "pillar", "contribution", "bracket", "return", "portfolio", "budget",
    "apartment", "house", "buy", "rent", "afford", "payment", "loan", "salary",
    "chf", "swiss franc", "million", "thousand", "price", "value", "worth",
    "age", "year old", "years old", "retire at", "pension", "withdraw",
];

lazy_static! {
    static ref MONEY_AMOUNT: Regex =
        Regex::new(r"(\d+\.?\d*)\s*(?:chf|k|m|million|thousand|francs?)").unwrap();
    static ref AGE_TOKEN: Regex =
        Regex::new(r"\b(\d+)\s*(?:years?\s*old|yrs?\s*old|years?)\b").unwrap();
    static ref RETIRE_AGE_TOKEN: Regex =
        Regex::new(r"retire\s+(?:at\s+)?(?:age\s+)?(\d+)").unwrap();
    static ref TWO_WORD_PHRASE: Regex = Regex::new(r"[a-z]+ [a-z]+").unwrap();
}

/// Extract vocabulary hits, amount/age pseudo-tokens and two-word phrase
/// windows from a user or model turn. Deduplicated, original order.
pub fn extract_topics(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut topics: Vec<String> = Vec::new();

    let mut push_unique = |topics: &mut Vec<String>, topic: String| {
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    };

    for term in FINANCIAL_TERMS {
        if lower.contains(term) {
            push_unique(&mut topics, (*term).to_string());
        }
    }

    for captures in MONEY_AMOUNT.captures_iter(&lower) {
        push_unique(&mut topics, format!("amount_{}", &captures[1]));
    }

    if let Some(captures) = AGE_TOKEN.captures(&lower) {
        push_unique(&mut topics, format!("age_{}", &captures[1]));
    }

    if let Some(captures) = RETIRE_AGE_TOKEN.captures(&lower) {
        push_unique(&mut topics, format!("retire_age_{}", &captures[1]));
    }

    for phrase in TWO_WORD_PHRASE.find_iter(&lower) {
        let phrase = phrase.as_str();
        if FINANCIAL_TERMS.iter().any(|term| phrase.contains(term)) {
            push_unique(&mut topics, phrase.to_string());
        }
    }

    topics
}

/// Bounded, most-recent-first topic list
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicList {
    topics: Vec<String>,
}

impl TopicList {
    pub fn new() -> Self {
        Self::default()
    }

    /// New topics from a user turn go to the front; overflow drops the tail.
    pub fn push_recent(&mut self, new_topics: Vec<String>) {
        if new_topics.is_empty() {
            return;
        }
        let mut merged = new_topics;
        merged.extend(self.topics.drain(..));
        merged.truncate(MAX_TOPICS);
        self.topics = merged;
    }

    /// Topics from a model reply append behind existing ones.
    pub fn append_unique(&mut self, new_topics: Vec<String>) {
        for topic in new_topics {
            if !self.topics.contains(&topic) {
                self.topics.push(topic);
            }
        }
        self.topics.truncate(MAX_TOPICS);
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.topics
    }

    /// Comma-joined form used in the system instruction
    pub fn summary(&self) -> String {
        self.topics.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_and_phrase_hits() {
        let topics = extract_topics("What is my mortgage payment on the house?");
        assert!(topics.contains(&"mortgage".to_string()));
        assert!(topics.contains(&"house".to_string()));
        assert!(topics.contains(&"mortgage payment".to_string()));
    }

    #[test]
    fn test_amount_pseudo_tokens() {
        let topics = extract_topics("The property is worth 800000 CHF, maybe 1.2 million");
        assert!(topics.contains(&"amount_800000".to_string()));
        assert!(topics.contains(&"amount_1.2".to_string()));
    }

    #[test]
    fn test_age_and_retire_pseudo_tokens() {
        let topics = extract_topics("I am 35 years old and want to retire at 65");
        assert!(topics.contains(&"age_35".to_string()));
        assert!(topics.contains(&"retire_age_65".to_string()));
    }

    #[test]
    fn test_deduplication() {
        let topics = extract_topics("tax tax tax deduction for tax");
        let tax_count = topics.iter().filter(|t| *t == "tax").count();
        assert_eq!(tax_count, 1);
    }

    #[test]
    fn test_topic_list_bounded_most_recent_first() {
        let mut list = TopicList::new();
        for i in 0..8 {
            list.push_recent(vec![format!("topic_{}", i), format!("extra_{}", i)]);
        }

        assert_eq!(list.as_slice().len(), MAX_TOPICS);
        // Last push lands at the front
        assert_eq!(list.as_slice()[0], "topic_7");
        assert_eq!(list.as_slice()[1], "extra_7");
    }

    #[test]
    fn test_append_unique_keeps_existing_order() {
        let mut list = TopicList::new();
        list.push_recent(vec!["mortgage".to_string()]);
        list.append_unique(vec!["mortgage".to_string(), "tax".to_string()]);

        assert_eq!(list.as_slice(), &["mortgage".to_string(), "tax".to_string()]);
    }
}
