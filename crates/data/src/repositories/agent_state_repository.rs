//! Agent snapshot repository.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cruise_domain::prelude::AgentStatus;
use cruise_execution::ports::AgentStateStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::debug;

/// Database record for an agent snapshot.
#[derive(Debug, Clone)]
pub struct AgentStateRecord {
    /// Agent identifier.
    pub agent_id: String,
    /// Wallet the agent trades from.
    pub wallet_id: String,
    /// Lifecycle state name, duplicated out of the snapshot for queries.
    pub state: String,
    /// Serialized [`AgentStatus`].
    pub snapshot: String,
    /// Time of the last save.
    pub updated_at: DateTime<Utc>,
}

impl AgentStateRecord {
    /// Creates an AgentStateRecord from a database row.
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            agent_id: row.try_get("agent_id")?,
            wallet_id: row.try_get("wallet_id")?,
            state: row.try_get("state")?,
            snapshot: row.try_get("snapshot")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Decodes the stored snapshot.
    ///
    /// # Errors
    /// Returns an error if the snapshot is not a valid status document.
    pub fn status(&self) -> serde_json::Result<AgentStatus> {
        serde_json::from_str(&self.snapshot)
    }
}

const SELECT_COLUMNS: &str =
    "SELECT agent_id, wallet_id, state, snapshot::text AS snapshot, updated_at FROM agent_states";

/// Postgres-backed [`AgentStateStore`].
#[derive(Clone)]
pub struct PgAgentStateRepository {
    pool: Arc<PgPool>,
}

impl PgAgentStateRepository {
    /// Creates a new PgAgentStateRepository.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds the snapshot of one agent.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_id(&self, agent_id: &str) -> Result<Option<AgentStateRecord>, sqlx::Error> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE agent_id = $1"))
            .bind(agent_id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(AgentStateRecord::from_row).transpose()
    }

    /// Finds every agent currently in `state`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_by_state(&self, state: &str) -> Result<Vec<AgentStateRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE state = $1 ORDER BY updated_at DESC"
        ))
        .bind(state)
        .fetch_all(self.pool.as_ref())
        .await?;
        rows.iter().map(AgentStateRecord::from_row).collect()
    }

    /// Finds all snapshots.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<AgentStateRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY agent_id"))
            .fetch_all(self.pool.as_ref())
            .await?;
        rows.iter().map(AgentStateRecord::from_row).collect()
    }

    /// Creates or replaces the snapshot of an agent.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn upsert(
        &self,
        agent_id: &str,
        wallet_id: &str,
        state: &str,
        snapshot: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO agent_states (agent_id, wallet_id, state, snapshot, updated_at)
            VALUES ($1, $2, $3, $4::jsonb, $5)
            ON CONFLICT (agent_id) DO UPDATE SET
                wallet_id = EXCLUDED.wallet_id,
                state = EXCLUDED.state,
                snapshot = EXCLUDED.snapshot,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(agent_id)
        .bind(wallet_id)
        .bind(state)
        .bind(snapshot)
        .bind(updated_at)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    /// Deletes the snapshot of an agent.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn remove(&self, agent_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM agent_states WHERE agent_id = $1")
            .bind(agent_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AgentStateStore for PgAgentStateRepository {
    async fn save(&self, status: &AgentStatus) -> anyhow::Result<()> {
        let snapshot = serde_json::to_string(status).context("Failed to encode agent snapshot")?;
        self.upsert(
            &status.agent_id,
            &status.config.wallet_id,
            status.state.as_str(),
            &snapshot,
            status.last_update,
        )
        .await
        .with_context(|| format!("Failed to save state of agent {}", status.agent_id))?;
        debug!(agent_id = %status.agent_id, state = %status.state.as_str(), "Agent state saved");
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> anyhow::Result<Option<AgentStatus>> {
        let Some(record) = self
            .find_by_id(agent_id)
            .await
            .with_context(|| format!("Failed to load state of agent {agent_id}"))?
        else {
            return Ok(None);
        };
        let status = record
            .status()
            .with_context(|| format!("Corrupt snapshot for agent {agent_id}"))?;
        Ok(Some(status))
    }

    async fn delete(&self, agent_id: &str) -> anyhow::Result<()> {
        self.remove(agent_id)
            .await
            .with_context(|| format!("Failed to delete state of agent {agent_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_agent_states() {
        let sql = include_str!("../../migrations/001_agent_states.sql");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS agent_states"));
        for column in ["agent_id", "wallet_id", "state", "snapshot", "updated_at"] {
            assert!(sql.contains(column), "missing column {column}");
            assert!(SELECT_COLUMNS.contains(column));
        }
    }
}
