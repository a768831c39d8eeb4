//! JSON-file agent state store.
//!
//! One `<agent_id>.json` file per agent under a state directory. Saves go
//! through a temporary file and a rename so a crash never leaves a torn
//! snapshot behind.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use cruise_domain::prelude::AgentStatus;
use cruise_execution::ports::AgentStateStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed [`AgentStateStore`].
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create state directory {}", dir.display()))?;
        info!(dir = %dir.display(), "Opened JSON state store");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, agent_id: &str) -> Result<PathBuf> {
        let valid = !agent_id.is_empty()
            && !agent_id.starts_with('.')
            && agent_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            bail!("agent id {agent_id:?} cannot be used as a file name");
        }
        Ok(self.dir.join(format!("{agent_id}.json")))
    }
}

#[async_trait]
impl AgentStateStore for JsonFileStateStore {
    async fn save(&self, status: &AgentStatus) -> Result<()> {
        let path = self.path_for(&status.agent_id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(status).context("Failed to encode agent snapshot")?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;

        debug!(agent_id = %status.agent_id, path = %path.display(), "Agent state saved");
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> Result<Option<AgentStatus>> {
        let path = self.path_for(agent_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let status = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt snapshot in {}", path.display()))?;
        Ok(Some(status))
    }

    async fn delete(&self, agent_id: &str) -> Result<()> {
        let path = self.path_for(agent_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruise_domain::prelude::*;
    use rust_decimal_macros::dec;

    fn status(agent_id: &str) -> AgentStatus {
        let mut status = AgentStatus::initializing(agent_id, AgentConfig::new(agent_id, "wallet"));
        status.state = AgentState::Running;
        status.funds = Some(FundsStatus::new(
            dec!(2.5),
            vec![PositionValue::new("pool", dec!(1), dec!(150))],
        ));
        status
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path().join("state")).await.unwrap();

        assert!(store.load("alpha").await.unwrap().is_none());

        let saved = status("alpha");
        store.save(&saved).await.unwrap();
        let loaded = store.load("alpha").await.unwrap().unwrap();
        assert_eq!(loaded.state, AgentState::Running);
        assert_eq!(loaded.funds.unwrap().total_value(), dec!(3.5));
        assert!(!store.dir().join("alpha.json.tmp").exists());

        store.delete("alpha").await.unwrap();
        assert!(store.load("alpha").await.unwrap().is_none());
        store.delete("alpha").await.unwrap();
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path()).await.unwrap();

        let mut snapshot = status("alpha");
        store.save(&snapshot).await.unwrap();
        snapshot.state = AgentState::Stopped;
        snapshot.last_error = Some("stopped by operator".into());
        store.save(&snapshot).await.unwrap();

        let loaded = store.load("alpha").await.unwrap().unwrap();
        assert_eq!(loaded.state, AgentState::Stopped);
        assert_eq!(loaded.last_error.as_deref(), Some("stopped by operator"));
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path()).await.unwrap();

        assert!(store.load("../escape").await.is_err());
        assert!(store.save(&status("a/b")).await.is_err());

        tokio::fs::write(dir.path().join("broken.json"), b"{not json")
            .await
            .unwrap();
        let err = store.load("broken").await.unwrap_err();
        assert!(format!("{err:#}").contains("Corrupt snapshot"));
    }
}
