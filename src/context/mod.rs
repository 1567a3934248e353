//! Conversation context engine
//!
//! Heuristics that make a stateless model feel stateful: input
//! classification, topic tracking, short-response enrichment and a pure
//! state machine per conversation.

pub mod enrich;
pub mod rules;
pub mod state;
pub mod topics;

pub use enrich::{enrich_confirmation, enrich_value, process_short_response};
pub use rules::{classify, InputSignal};
pub use state::{reduce, ConversationEvent, ConversationState, ExpectedInput};
pub use topics::{extract_topics, TopicList, MAX_TOPICS};
