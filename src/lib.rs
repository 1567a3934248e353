//! Financial Planning Assistant
//!
//! A conversational financial assistant that:
//! - Answers planning questions with a deterministic system instruction
//! - Performs pure financial math (tax, mortgage, retirement, buy-vs-rent)
//! - Keeps per-conversation context so short replies stay meaningful
//! - Rewrites terse inputs into self-contained prompts before the model call
//! - Persists chat history and financial profiles (Postgres or in-memory)
//!
//! TURN LOOP:
//! INPUT → CLASSIFY → ENRICH → UPDATE STATE → PROMPT → MODEL → COMMIT

pub mod api;
pub mod calculator;
pub mod context;
pub mod engine;
pub mod error;
pub mod gemini;
pub mod history;
pub mod models;
pub mod profile;
pub mod prompt;
pub mod session;

pub use error::{AssistantError, Result};

// Re-export common types
pub use context::{ConversationState, InputSignal, TopicList};
pub use engine::{ChatEngine, ChatTurn};
pub use models::*;
pub use profile::UserProfile;
pub use session::{ChatEntry, ChatRole, Session, SessionStore};
