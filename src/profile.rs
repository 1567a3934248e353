//! User profile and financial snapshot storage
//!
//! Two per-user records: the identity profile (plain CRUD, no business
//! logic) and the financial snapshot backing calculations when a request
//! carries none. Same backend selection as chat history: Postgres when a
//! database URL is configured, in-memory otherwise. Snapshots are stored
//! as their JSON wire form.

use crate::error::{AssistantError, Result};
use crate::models::FinancialSnapshot;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Identity record, CRUD only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

enum ProfileBackend {
    InMemory {
        profiles: Arc<RwLock<HashMap<Uuid, UserProfile>>>,
        snapshots: Arc<RwLock<HashMap<Uuid, FinancialSnapshot>>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

/// Store for per-user profiles and financial snapshots.
pub struct ProfileStore {
    backend: ProfileBackend,
}

impl ProfileStore {
    /// Backend selection follows the environment: POSTGRES_URL or
    /// DATABASE_URL means Postgres, anything else means in-memory.
    pub fn from_env() -> Self {
        Self {
            backend: build_backend(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backend: ProfileBackend::InMemory {
                profiles: Arc::new(RwLock::new(HashMap::new())),
                snapshots: Arc::new(RwLock::new(HashMap::new())),
            },
        }
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let ProfileBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS user_profiles (
                      id UUID PRIMARY KEY,
                      first_name TEXT NOT NULL,
                      last_name TEXT NOT NULL,
                      email TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS financial_profiles (
                      user_id UUID PRIMARY KEY,
                      snapshot TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::DatabaseError(format!(
                    "Failed to initialize profile schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    // =============================
    // Identity profile
    // =============================

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        match &self.backend {
            ProfileBackend::InMemory { profiles, .. } => {
                Ok(profiles.read().await.get(&user_id).cloned())
            }
            ProfileBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query(
                    "SELECT id, first_name, last_name, email FROM user_profiles WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!("Failed to load user profile: {}", e))
                })?;

                Ok(row.map(|row| UserProfile {
                    id: row.try_get("id").unwrap_or(user_id),
                    first_name: row.try_get("first_name").unwrap_or_default(),
                    last_name: row.try_get("last_name").unwrap_or_default(),
                    email: row.try_get("email").unwrap_or_default(),
                }))
            }
        }
    }

    pub async fn upsert_profile(&self, profile: UserProfile) -> Result<()> {
        match &self.backend {
            ProfileBackend::InMemory { profiles, .. } => {
                profiles.write().await.insert(profile.id, profile);
                Ok(())
            }
            ProfileBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query(
                    r#"
                    INSERT INTO user_profiles (id, first_name, last_name, email, updated_at)
                    VALUES ($1, $2, $3, $4, NOW())
                    ON CONFLICT (id)
                    DO UPDATE SET first_name = EXCLUDED.first_name,
                                  last_name = EXCLUDED.last_name,
                                  email = EXCLUDED.email,
                                  updated_at = NOW()
                    "#,
                )
                .bind(profile.id)
                .bind(&profile.first_name)
                .bind(&profile.last_name)
                .bind(&profile.email)
                .execute(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!("Failed to save user profile: {}", e))
                })?;

                Ok(())
            }
        }
    }

    // =============================
    // Financial snapshot
    // =============================

    pub async fn get_snapshot(&self, user_id: Uuid) -> Result<Option<FinancialSnapshot>> {
        match &self.backend {
            ProfileBackend::InMemory { snapshots, .. } => {
                Ok(snapshots.read().await.get(&user_id).cloned())
            }
            ProfileBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query(
                    "SELECT snapshot FROM financial_profiles WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!(
                        "Failed to load financial snapshot: {}",
                        e
                    ))
                })?;

                match row {
                    Some(row) => {
                        let raw: String = row.try_get("snapshot").map_err(|e| {
                            AssistantError::DatabaseError(format!(
                                "Failed to read financial snapshot column: {}",
                                e
                            ))
                        })?;
                        let snapshot = serde_json::from_str(&raw)?;
                        Ok(Some(snapshot))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    pub async fn upsert_snapshot(
        &self,
        user_id: Uuid,
        snapshot: FinancialSnapshot,
    ) -> Result<()> {
        match &self.backend {
            ProfileBackend::InMemory { snapshots, .. } => {
                snapshots.write().await.insert(user_id, snapshot);
                Ok(())
            }
            ProfileBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let raw = serde_json::to_string(&snapshot)?;
                sqlx::query(
                    r#"
                    INSERT INTO financial_profiles (user_id, snapshot, updated_at)
                    VALUES ($1, $2, NOW())
                    ON CONFLICT (user_id)
                    DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = NOW()
                    "#,
                )
                .bind(user_id)
                .bind(raw)
                .execute(pool)
                .await
                .map_err(|e| {
                    AssistantError::DatabaseError(format!(
                        "Failed to save financial snapshot: {}",
                        e
                    ))
                })?;

                Ok(())
            }
        }
    }

    /// Stored snapshot, or the built-in sample data when none exists.
    pub async fn get_or_sample(&self, user_id: Uuid) -> FinancialSnapshot {
        match self.get_snapshot(user_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => FinancialSnapshot::sample(),
            Err(error) => {
                warn!(
                    "Financial snapshot load failed, falling back to sample data: {}",
                    error
                );
                FinancialSnapshot::sample()
            }
        }
    }
}

fn build_backend() -> ProfileBackend {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => {
                info!("Profile backend: postgres");
                return ProfileBackend::Postgres {
                    pool,
                    schema_ready: Arc::new(OnceCell::new()),
                };
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres profile backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Profile backend: in-memory");
    ProfileBackend::InMemory {
        profiles: Arc::new(RwLock::new(HashMap::new())),
        snapshots: Arc::new(RwLock::new(HashMap::new())),
    }
}
