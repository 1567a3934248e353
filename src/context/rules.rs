//! Input classification rules
//!
//! An ordered list of heuristic rules over a raw user utterance. Each rule
//! returns a tagged signal or nothing; the first match wins, so precedence
//! is the order of `RULES` and nothing else. The signal tags the utterance
//! for staging; fact capture in the state reducers inspects every pattern
//! separately, since one message can carry several facts at once.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AGE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(\d+)\s*(?:years?\s*old|yrs?\s*old|years?)\b").unwrap(),
        Regex::new(r"(?i)\bam\s*(\d+)\b").unwrap(),
        Regex::new(r"(?i)\bage\s*(?:is|of|:|=)?\s*(\d+)\b").unwrap(),
    ];
    static ref RETIRE_AGE: Regex =
        Regex::new(r"(?i)retire\s+(?:at\s+)?(?:age\s+)?(\d+)").unwrap();
    static ref RETIREMENT_INCOME: Regex =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*k\s*(?:chf|per\s+year)").unwrap();

    // Value shapes a short reply can take: plain number, thousands,
    // millions, percentage
    static ref VALUE_SHAPES: Vec<Regex> = vec![
        Regex::new(r"^\d+(\.\d+)?$").unwrap(),
        Regex::new(r"^\d+(\.\d+)?[kK]$").unwrap(),
        Regex::new(r"^\d+(\.\d+)?[mM]$").unwrap(),
        Regex::new(r"^\d+(\.\d+)?%$").unwrap(),
        Regex::new(r"^[\d,.]+[kmKM]?$").unwrap(),
    ];

    static ref CONFIRMATION_WORDS: Regex =
        Regex::new(r"(?i)^(yes|no|yeah|nope|sure|ok|correct|right|exactly|confirm|agree)$")
            .unwrap();
    static ref PROCEED_WORDS: Regex =
        Regex::new(r"(?i)^(yes|yeah|sure|ok|proceed|continue|go ahead)$").unwrap();
}

/// Outcome of classifying one raw user utterance
#[derive(Debug, Clone, PartialEq)]
pub enum InputSignal {
    /// The user stated their current age
    AgeStatement(u32),
    /// "retire at age N"
    RetirementAge(u32),
    /// "Nk CHF per year" target income, already multiplied out
    RetirementIncome(f64),
    /// Short reply shaped like a bare value (number, 500k, 1m, 3.5%)
    ShortValue(String),
    /// Short yes/no style reply
    ShortConfirmation(String),
    /// Short but not value- or confirmation-shaped
    ShortOther(String),
    /// Full sentence; topic extraction applies, no rewriting
    Full,
}

/// One entry in the ordered rule list
pub struct ClassifierRule {
    pub name: &'static str,
    matcher: fn(&str) -> Option<InputSignal>,
}

/// Rules in priority order. Age and retirement statements outrank the
/// short-response shapes so "I am 35" never degrades to a bare value.
pub const RULES: &[ClassifierRule] = &[
    ClassifierRule { name: "age_statement", matcher: match_age },
    ClassifierRule { name: "retirement_age", matcher: match_retirement_age },
    ClassifierRule { name: "retirement_income", matcher: match_retirement_income },
    ClassifierRule { name: "short_value", matcher: match_short_value },
    ClassifierRule { name: "short_confirmation", matcher: match_short_confirmation },
    ClassifierRule { name: "short_other", matcher: match_short_other },
];

pub fn classify(input: &str) -> InputSignal {
    let trimmed = input.trim();
    for rule in RULES {
        if let Some(signal) = (rule.matcher)(trimmed) {
            return signal;
        }
    }
    InputSignal::Full
}

pub fn token_count(input: &str) -> usize {
    input.split_whitespace().count()
}

/// Short replies get contextual rewriting; longer input feeds topic
/// extraction instead.
pub fn is_short_reply(input: &str) -> bool {
    token_count(input) <= 5
}

/// The stricter cutoff used when merging a reply with pending topic state.
pub fn is_fragment(input: &str) -> bool {
    token_count(input) <= 3
}

/// Plain current-age extraction, range (0, 120) exclusive.
///
/// "retire at age 60" carries a retirement age, not a current age, so that
/// span is blanked out before the age patterns run.
pub fn extract_age(input: &str) -> Option<u32> {
    let scrubbed;
    let haystack = if let Some(m) = RETIRE_AGE.find(input) {
        scrubbed = format!("{}{}", &input[..m.start()], &input[m.end()..]);
        scrubbed.as_str()
    } else {
        input
    };

    for pattern in AGE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(haystack) {
            if let Ok(age) = captures[1].parse::<u32>() {
                if age > 0 && age < 120 {
                    return Some(age);
                }
            }
        }
    }
    None
}

pub fn extract_retirement_age(input: &str) -> Option<u32> {
    RETIRE_AGE
        .captures(input)
        .and_then(|c| c[1].parse::<u32>().ok())
}

pub fn extract_retirement_income(input: &str) -> Option<f64> {
    RETIREMENT_INCOME
        .captures(input)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|thousands| thousands * 1000.0)
}

pub fn is_value_shaped(input: &str) -> bool {
    let trimmed = input.trim();
    !trimmed.is_empty() && VALUE_SHAPES.iter().any(|shape| shape.is_match(trimmed))
}

pub fn is_confirmation(input: &str) -> bool {
    CONFIRMATION_WORDS.is_match(input.trim())
}

/// The narrower "go ahead" vocabulary that resumes a pending calculation.
pub fn is_proceed_confirmation(input: &str) -> bool {
    PROCEED_WORDS.is_match(input.trim())
}

fn match_age(input: &str) -> Option<InputSignal> {
    extract_age(input).map(InputSignal::AgeStatement)
}

fn match_retirement_age(input: &str) -> Option<InputSignal> {
    extract_retirement_age(input).map(InputSignal::RetirementAge)
}

fn match_retirement_income(input: &str) -> Option<InputSignal> {
    extract_retirement_income(input).map(InputSignal::RetirementIncome)
}

fn match_short_value(input: &str) -> Option<InputSignal> {
    if is_short_reply(input) && is_value_shaped(input) {
        Some(InputSignal::ShortValue(input.to_string()))
    } else {
        None
    }
}

fn match_short_confirmation(input: &str) -> Option<InputSignal> {
    if is_short_reply(input) && is_confirmation(input) {
        Some(InputSignal::ShortConfirmation(input.to_string()))
    } else {
        None
    }
}

fn match_short_other(input: &str) -> Option<InputSignal> {
    if is_short_reply(input) {
        Some(InputSignal::ShortOther(input.to_string()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_statement_variants() {
        assert_eq!(classify("I am 30 years old"), InputSignal::AgeStatement(30));
        assert_eq!(classify("I am 42"), InputSignal::AgeStatement(42));
        assert_eq!(classify("my age is 55"), InputSignal::AgeStatement(55));
        assert_eq!(classify("35 years"), InputSignal::AgeStatement(35));
    }

    #[test]
    fn test_age_range_is_exclusive() {
        assert_ne!(classify("I am 0 years old"), InputSignal::AgeStatement(0));
        assert_ne!(classify("I am 120 years old"), InputSignal::AgeStatement(120));
        assert_eq!(classify("I am 119 years old"), InputSignal::AgeStatement(119));
    }

    #[test]
    fn test_retirement_age_outranks_plain_age() {
        // "retire at age 60" also contains a bare number; the age rule does
        // not fire because no age pattern matches, and the retire rule does
        assert_eq!(
            classify("I want to retire at age 60"),
            InputSignal::RetirementAge(60)
        );
        assert_eq!(classify("retire at 65"), InputSignal::RetirementAge(65));
    }

    #[test]
    fn test_retirement_income_multiplies_thousands() {
        assert_eq!(
            classify("80k chf"),
            InputSignal::RetirementIncome(80_000.0)
        );
        assert_eq!(
            extract_retirement_income("I want 100k per year"),
            Some(100_000.0)
        );
    }

    #[test]
    fn test_short_value_shapes() {
        assert_eq!(classify("35000"), InputSignal::ShortValue("35000".to_string()));
        assert_eq!(classify("500k"), InputSignal::ShortValue("500k".to_string()));
        assert_eq!(classify("1.5m"), InputSignal::ShortValue("1.5m".to_string()));
        assert_eq!(classify("3.5%"), InputSignal::ShortValue("3.5%".to_string()));
    }

    #[test]
    fn test_short_confirmation() {
        assert_eq!(classify("yes"), InputSignal::ShortConfirmation("yes".to_string()));
        assert_eq!(classify("Sure"), InputSignal::ShortConfirmation("Sure".to_string()));
        assert!(is_proceed_confirmation("go ahead"));
        assert!(!is_proceed_confirmation("nope"));
    }

    #[test]
    fn test_full_sentence_passes_through() {
        assert_eq!(
            classify("What would my mortgage payment be for a house in Geneva?"),
            InputSignal::Full
        );
    }

    #[test]
    fn test_short_other_catches_unshaped_fragments() {
        assert_eq!(
            classify("the blue one"),
            InputSignal::ShortOther("the blue one".to_string())
        );
    }

    #[test]
    fn test_fragment_cutoff() {
        assert!(is_fragment("1m chf"));
        assert!(!is_fragment("I think around one million or so"));
        assert!(is_short_reply("maybe around 500k total"));
    }
}
