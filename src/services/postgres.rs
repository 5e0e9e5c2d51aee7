use crate::models::{match_id, Decision, Direction, EndReason, Match, MatchState, UndoSlot, UserId};
use crate::services::store::{InteractionStore, SaveOptions, SaveOutcome, StorageError, UndoRemoval, UndoStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Postgres(PostgresError::SqlxError(err))
    }
}

/// Unique constraint violation (SQLSTATE 23505)
fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

const DECISION_COLUMNS: &str = "id, actor_id, target_id, direction, decided_at";
const MATCH_COLUMNS: &str = "id, user_a, user_b, created_at, state, ended_at, ended_by, end_reason";

fn decision_from_row(row: &PgRow) -> Result<Decision, PostgresError> {
    let direction: String = row.try_get("direction")?;
    Ok(Decision {
        id: row.try_get("id")?,
        actor: row.try_get("actor_id")?,
        target: row.try_get("target_id")?,
        direction: parse_direction(&direction)?,
        decided_at: row.try_get("decided_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, PostgresError> {
    let state: String = row.try_get("state")?;
    let end_reason: Option<String> = row.try_get("end_reason")?;
    Ok(Match {
        id: row.try_get("id")?,
        user_a: row.try_get("user_a")?,
        user_b: row.try_get("user_b")?,
        created_at: row.try_get("created_at")?,
        state: MatchState::parse(&state)
            .ok_or_else(|| PostgresError::InvalidInput(format!("unknown match state '{}'", state)))?,
        ended_at: row.try_get("ended_at")?,
        ended_by: row.try_get("ended_by")?,
        end_reason: end_reason.as_deref().and_then(EndReason::parse),
    })
}

fn parse_direction(direction: &str) -> Result<Direction, PostgresError> {
    Direction::parse(direction)
        .ok_or_else(|| PostgresError::InvalidInput(format!("unknown direction '{}'", direction)))
}

fn slot_from_row(row: &PgRow) -> Result<UndoSlot, PostgresError> {
    let direction: String = row.try_get("direction")?;
    let actor: String = row.try_get("actor_id")?;
    let target: String = row.try_get("target_id")?;

    let previous_id: Option<Uuid> = row.try_get("previous_decision_id")?;
    let previous_direction: Option<String> = row.try_get("previous_direction")?;
    let previous_decided_at: Option<DateTime<Utc>> = row.try_get("previous_decided_at")?;
    let previous = match (previous_id, previous_direction, previous_decided_at) {
        (Some(id), Some(direction), Some(decided_at)) => Some(Decision {
            id,
            actor: actor.clone(),
            target: target.clone(),
            direction: parse_direction(&direction)?,
            decided_at,
        }),
        _ => None,
    };

    Ok(UndoSlot {
        decision: Decision {
            id: row.try_get("decision_id")?,
            actor: actor.clone(),
            target,
            direction: parse_direction(&direction)?,
            decided_at: row.try_get("decided_at")?,
        },
        actor,
        previous,
        match_id: row.try_get("match_id")?,
        expires_at: row.try_get("expires_at")?,
    })
}

/// PostgreSQL store for decisions, matches and undo slots
///
/// The engine owns these tables; profiles and blocks live in Appwrite.
/// Every check-then-act the engine relies on is a single statement or a
/// single transaction here.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    async fn fetch_decision(&self, actor: &str, target: &str) -> Result<Option<Decision>, StorageError> {
        let query = format!(
            "SELECT {} FROM decisions WHERE actor_id = $1 AND target_id = $2",
            DECISION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(actor)
            .bind(target)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(decision_from_row).transpose()?)
    }
}

#[async_trait]
impl InteractionStore for PostgresClient {
    async fn save_decision(&self, decision: &Decision, options: SaveOptions) -> Result<SaveOutcome, StorageError> {
        let mut tx = self.pool.begin().await?;

        if let (true, Some(quota)) = (decision.is_like(), options.like_quota) {
            // Likes from one actor are serialized so the count and the insert cannot interleave
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&decision.actor)
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query(
                r#"
                SELECT COUNT(*) AS likes
                FROM decisions
                WHERE actor_id = $1 AND target_id <> $2 AND direction = 'like' AND decided_at >= $3
                "#,
            )
            .bind(&decision.actor)
            .bind(&decision.target)
            .bind(quota.since)
            .fetch_one(&mut *tx)
            .await?;
            let used: i64 = row.try_get("likes")?;

            if used >= i64::from(quota.limit) {
                tx.rollback().await?;
                return Ok(SaveOutcome::QuotaExceeded {
                    used: u32::try_from(used).unwrap_or(u32::MAX),
                });
            }
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO decisions (id, actor_id, target_id, direction, decided_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (actor_id, target_id) DO NOTHING
            "#,
        )
        .bind(decision.id)
        .bind(&decision.actor)
        .bind(&decision.target)
        .bind(decision.direction.as_str())
        .bind(decision.decided_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted > 0 {
            tx.commit().await?;
            return Ok(SaveOutcome::Inserted);
        }

        let existing = sqlx::query(&format!(
            "SELECT {} FROM decisions WHERE actor_id = $1 AND target_id = $2 FOR UPDATE",
            DECISION_COLUMNS
        ))
        .bind(&decision.actor)
        .bind(&decision.target)
        .fetch_optional(&mut *tx)
        .await?
        .as_ref()
        .map(decision_from_row)
        .transpose()?;

        let Some(existing) = existing else {
            // Undone between the insert and the lock; the caller may retry
            tx.rollback().await?;
            return Err(StorageError::Unavailable(format!(
                "decision {} -> {} changed concurrently",
                decision.actor, decision.target
            )));
        };

        if !options.overwrite {
            tx.rollback().await?;
            return Ok(SaveOutcome::Rejected(existing));
        }

        if existing.is_like() && !decision.is_like() {
            let matched = sqlx::query("SELECT 1 FROM matches WHERE id = $1")
                .bind(match_id(&decision.actor, &decision.target))
                .fetch_optional(&mut *tx)
                .await?;
            if matched.is_some() {
                tx.rollback().await?;
                return Ok(SaveOutcome::Matched(existing));
            }
        }

        sqlx::query(
            r#"
            UPDATE decisions
            SET id = $1, direction = $2, decided_at = $3
            WHERE actor_id = $4 AND target_id = $5
            "#,
        )
        .bind(decision.id)
        .bind(decision.direction.as_str())
        .bind(decision.decided_at)
        .bind(&decision.actor)
        .bind(&decision.target)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SaveOutcome::Replaced(existing))
    }

    async fn get_decision(&self, actor: &str, target: &str) -> Result<Option<Decision>, StorageError> {
        self.fetch_decision(actor, target).await
    }

    async fn delete_decision(&self, decision_id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM decisions WHERE id = $1")
            .bind(decision_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mutual_like_exists(&self, a: &str, b: &str) -> Result<bool, StorageError> {
        let query = r#"
            SELECT COUNT(*) AS likes
            FROM decisions
            WHERE direction = 'like'
              AND ((actor_id = $1 AND target_id = $2) OR (actor_id = $2 AND target_id = $1))
        "#;

        let row = sqlx::query(query).bind(a).bind(b).fetch_one(&self.pool).await?;
        let likes: i64 = row.try_get("likes")?;

        Ok(likes == 2)
    }

    async fn decided_ids(&self, actor: &str) -> Result<HashSet<UserId>, StorageError> {
        let rows = sqlx::query("SELECT target_id FROM decisions WHERE actor_id = $1")
            .bind(actor)
            .fetch_all(&self.pool)
            .await?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("target_id"))
            .collect::<Result<HashSet<_>, _>>()?;

        tracing::debug!("User {} has decided on {} profiles", actor, ids.len());

        Ok(ids)
    }

    async fn likers_of(&self, target: &str) -> Result<Vec<Decision>, StorageError> {
        let query = format!(
            "SELECT {} FROM decisions WHERE target_id = $1 AND direction = 'like' ORDER BY decided_at DESC, actor_id",
            DECISION_COLUMNS
        );
        let rows = sqlx::query(&query).bind(target).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(decision_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn count_likes_since(&self, actor: &str, since: DateTime<Utc>) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS likes FROM decisions WHERE actor_id = $1 AND direction = 'like' AND decided_at >= $2",
        )
        .bind(actor)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        let likes: i64 = row.try_get("likes")?;

        Ok(u32::try_from(likes).unwrap_or(u32::MAX))
    }

    async fn create_match(&self, new_match: &Match) -> Result<bool, StorageError> {
        // FOR SHARE makes a concurrent like->pass overwrite wait for this insert, or this insert see the pass
        let result = sqlx::query(
            r#"
            INSERT INTO matches (id, user_a, user_b, created_at, state, ended_at, ended_by, end_reason)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE (
                SELECT COUNT(*) FROM (
                    SELECT 1 FROM decisions
                    WHERE direction = 'like'
                      AND ((actor_id = $2 AND target_id = $3) OR (actor_id = $3 AND target_id = $2))
                    FOR SHARE
                ) AS likes
            ) = 2
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&new_match.id)
        .bind(&new_match.user_a)
        .bind(&new_match.user_b)
        .bind(new_match.created_at)
        .bind(new_match.state.as_str())
        .bind(new_match.ended_at)
        .bind(&new_match.ended_by)
        .bind(new_match.end_reason.map(EndReason::as_str))
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(true),
            Ok(_) => {
                let exists = sqlx::query("SELECT 1 FROM matches WHERE id = $1")
                    .bind(&new_match.id)
                    .fetch_optional(&self.pool)
                    .await?;
                match exists {
                    Some(_) => Err(StorageError::DuplicateMatch(new_match.id.clone())),
                    None => Ok(false),
                }
            }
            Err(e) if is_unique_violation(&e) => Err(StorageError::DuplicateMatch(new_match.id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_match(&self, match_id: &str) -> Result<Option<Match>, StorageError> {
        let row = sqlx::query(&format!("SELECT {} FROM matches WHERE id = $1", MATCH_COLUMNS))
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(match_from_row).transpose()?)
    }

    async fn update_match(&self, updated: &Match, expected: MatchState) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE matches
            SET state = $2, ended_at = $3, ended_by = $4, end_reason = $5
            WHERE id = $1 AND state = $6
            "#,
        )
        .bind(&updated.id)
        .bind(updated.state.as_str())
        .bind(updated.ended_at)
        .bind(&updated.ended_by)
        .bind(updated.end_reason.map(EndReason::as_str))
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn matches_for(&self, user_id: &str) -> Result<Vec<Match>, StorageError> {
        let query = format!(
            "SELECT {} FROM matches WHERE user_a = $1 OR user_b = $1 ORDER BY created_at DESC, id",
            MATCH_COLUMNS
        );
        let rows = sqlx::query(&query).bind(user_id).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(match_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn undo_decision(
        &self,
        decision_id: Uuid,
        match_id: Option<&str>,
        restore: Option<&Decision>,
    ) -> Result<Option<UndoRemoval>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM decisions WHERE id = $1")
            .bind(decision_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        if let Some(previous) = restore {
            sqlx::query(
                r#"
                INSERT INTO decisions (id, actor_id, target_id, direction, decided_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (actor_id, target_id)
                DO UPDATE SET id = EXCLUDED.id, direction = EXCLUDED.direction, decided_at = EXCLUDED.decided_at
                "#,
            )
            .bind(previous.id)
            .bind(&previous.actor)
            .bind(&previous.target)
            .bind(previous.direction.as_str())
            .bind(previous.decided_at)
            .execute(&mut *tx)
            .await?;
        }

        let match_deleted = match match_id {
            Some(id) => {
                sqlx::query("DELETE FROM matches WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
                    > 0
            }
            None => false,
        };

        tx.commit().await?;

        tracing::debug!(
            "Deleted decision {} (restored: {}, match deleted: {})",
            decision_id,
            restore.is_some(),
            match_deleted
        );

        Ok(Some(UndoRemoval { match_deleted }))
    }
}

#[async_trait]
impl UndoStore for PostgresClient {
    async fn put(&self, slot: &UndoSlot) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO undo_slots (
                actor_id, decision_id, target_id, direction, decided_at, match_id, expires_at,
                previous_decision_id, previous_direction, previous_decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (actor_id)
            DO UPDATE SET
                decision_id = EXCLUDED.decision_id,
                target_id = EXCLUDED.target_id,
                direction = EXCLUDED.direction,
                decided_at = EXCLUDED.decided_at,
                match_id = EXCLUDED.match_id,
                expires_at = EXCLUDED.expires_at,
                previous_decision_id = EXCLUDED.previous_decision_id,
                previous_direction = EXCLUDED.previous_direction,
                previous_decided_at = EXCLUDED.previous_decided_at
            "#,
        )
        .bind(&slot.actor)
        .bind(slot.decision.id)
        .bind(&slot.decision.target)
        .bind(slot.decision.direction.as_str())
        .bind(slot.decision.decided_at)
        .bind(&slot.match_id)
        .bind(slot.expires_at)
        .bind(slot.previous.as_ref().map(|d| d.id))
        .bind(slot.previous.as_ref().map(|d| d.direction.as_str()))
        .bind(slot.previous.as_ref().map(|d| d.decided_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, actor: &str) -> Result<Option<UndoSlot>, StorageError> {
        let row = sqlx::query("SELECT * FROM undo_slots WHERE actor_id = $1")
            .bind(actor)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(slot_from_row).transpose()?)
    }

    async fn take(&self, actor: &str, decision_id: Uuid) -> Result<Option<UndoSlot>, StorageError> {
        let row = sqlx::query("DELETE FROM undo_slots WHERE actor_id = $1 AND decision_id = $2 RETURNING *")
            .bind(actor)
            .bind(decision_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(slot_from_row).transpose()?)
    }

    async fn delete(&self, actor: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM undo_slots WHERE actor_id = $1")
            .bind(actor)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM undo_slots WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!("Purged {} expired undo slots", result.rows_affected());
        }

        Ok(result.rows_affected())
    }
}
