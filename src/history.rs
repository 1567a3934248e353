//! Chat history persistence
//!
//! Records each completed exchange (user message, model response and the
//! context rewrite, if any) for later review. Backed by Postgres when a
//! database URL is configured, otherwise by process memory. Persistence is
//! best-effort: a failed write never fails the chat turn that produced it.

use crate::error::{AssistantError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// One completed exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub message: String,
    pub response: String,
    /// The rewritten prompt when the raw input was enriched
    pub context_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(
        user_id: Uuid,
        conversation_id: Uuid,
        message: impl Into<String>,
        response: impl Into<String>,
        context_prompt: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            conversation_id,
            message: message.into(),
            response: response.into(),
            context_prompt,
            created_at: Utc::now(),
        }
    }
}

enum HistoryBackend {
    InMemory {
        records: Arc<RwLock<Vec<ChatRecord>>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

/// Store for completed exchanges.
pub struct ChatHistoryStore {
    backend: HistoryBackend,
}

impl ChatHistoryStore {
    /// Backend selection follows the environment: POSTGRES_URL or
    /// DATABASE_URL means Postgres, anything else means in-memory.
    pub fn from_env() -> Self {
        Self {
            backend: build_backend(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: HistoryBackend::InMemory {
                records: Arc::new(RwLock::new(Vec::new())),
            },
        }
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let HistoryBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_history (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      conversation_id UUID NOT NULL,
                      message TEXT NOT NULL,
                      response TEXT NOT NULL,
                      context_prompt TEXT,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_chat_history_scope_time
                    ON chat_history (user_id, conversation_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!(
                    "Failed to initialize chat history schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    pub async fn record(&self, record: ChatRecord) -> Result<()> {
        match &self.backend {
            HistoryBackend::InMemory { records } => {
                records.write().await.push(record);
                Ok(())
            }
            HistoryBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query(
                    r#"
                    INSERT INTO chat_history
                      (id, user_id, conversation_id, message, response, context_prompt, created_at)
                    VALUES
                      ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(record.id)
                .bind(record.user_id)
                .bind(record.conversation_id)
                .bind(&record.message)
                .bind(&record.response)
                .bind(&record.context_prompt)
                .bind(record.created_at)
                .execute(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!(
                        "Failed to insert chat history record: {}",
                        e
                    ))
                })?;

                Ok(())
            }
        }
    }

    /// Record without surfacing failures to the caller.
    pub async fn record_best_effort(&self, record: ChatRecord) {
        if let Err(error) = self.record(record).await {
            warn!(
                "Chat history save failed, response was still returned: {}",
                error
            );
        }
    }

    /// Most recent exchanges for a conversation, oldest first.
    pub async fn recent(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatRecord>> {
        match &self.backend {
            HistoryBackend::InMemory { records } => {
                let locked = records.read().await;
                let mut matched: Vec<ChatRecord> = locked
                    .iter()
                    .filter(|r| r.user_id == user_id && r.conversation_id == conversation_id)
                    .cloned()
                    .collect();
                if matched.len() > limit {
                    matched.drain(..matched.len() - limit);
                }
                Ok(matched)
            }
            HistoryBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT id, user_id, conversation_id, message, response, context_prompt, created_at
                    FROM chat_history
                    WHERE user_id = $1 AND conversation_id = $2
                    ORDER BY created_at DESC
                    LIMIT $3
                    "#,
                )
                .bind(user_id)
                .bind(conversation_id)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!(
                        "Failed to load chat history: {}",
                        e
                    ))
                })?;

                let mut records: Vec<ChatRecord> = rows
                    .into_iter()
                    .map(|row| ChatRecord {
                        id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
                        user_id: row.try_get("user_id").unwrap_or(user_id),
                        conversation_id: row
                            .try_get("conversation_id")
                            .unwrap_or(conversation_id),
                        message: row.try_get("message").unwrap_or_default(),
                        response: row.try_get("response").unwrap_or_default(),
                        context_prompt: row.try_get("context_prompt").ok(),
                        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
                    })
                    .collect();
                records.reverse();
                Ok(records)
            }
        }
    }
}

fn build_backend() -> HistoryBackend {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => {
                info!("Chat history backend: postgres");
                return HistoryBackend::Postgres {
                    pool,
                    schema_ready: Arc::new(OnceCell::new()),
                };
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres history backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Chat history backend: in-memory");
    HistoryBackend::InMemory {
        records: Arc::new(RwLock::new(Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_recent_in_memory() {
        let store = ChatHistoryStore::in_memory();
        let user_id = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();

        for i in 0..5 {
            store
                .record(ChatRecord::new(
                    user_id,
                    conversation_id,
                    format!("question {}", i),
                    format!("answer {}", i),
                    None,
                ))
                .await
                .unwrap();
        }

        let recent = store.recent(user_id, conversation_id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "question 2");
        assert_eq!(recent[2].message, "question 4");
    }

    #[tokio::test]
    async fn test_recent_scoped_by_conversation() {
        let store = ChatHistoryStore::in_memory();
        let user_id = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store
            .record(ChatRecord::new(user_id, first, "a", "b", None))
            .await
            .unwrap();
        store
            .record(ChatRecord::new(
                user_id,
                second,
                "c",
                "d",
                Some("rewritten".to_string()),
            ))
            .await
            .unwrap();

        let recent = store.recent(user_id, second, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].context_prompt.as_deref(), Some("rewritten"));
    }

    #[tokio::test]
    async fn test_best_effort_never_panics() {
        let store = ChatHistoryStore::in_memory();
        store
            .record_best_effort(ChatRecord::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "q",
                "a",
                None,
            ))
            .await;
    }
}
