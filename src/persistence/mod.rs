//! Durable, atomic `BotState` persistence. Writes go to a uuid-suffixed
//! `.tmp-*` sibling, get `fsync`'d, then renamed into place so a concurrent
//! reader during a save always observes either the pre- or post-image,
//! never a torn or partially-flushed file — the rename is atomic on the
//! same filesystem.

use crate::domain::BotState;
use crate::error::{BotError, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn paper(data_dir: &str) -> Self {
        Self::new(Path::new(data_dir).join("bot-state.json"))
    }

    pub fn real(data_dir: &str) -> Self {
        Self::new(Path::new(data_dir).join("real-bot-state.json"))
    }

    pub async fn load(&self, config: &crate::config::BotConfig, now: chrono::DateTime<chrono::Utc>) -> Result<BotState> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BotState::new(config.clone(), now));
            }
            Err(e) => return Err(BotError::Io(e)),
        };
        serde_json::from_str(&raw)
            .map_err(|e| BotError::StateCorruption(format!("{}: {e}", self.path.display())))
    }

    pub async fn save(&self, state: &BotState) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Err(BotError::Internal("persistence path has no parent directory".to_string()));
        };
        tokio::fs::create_dir_all(parent).await?;

        let tmp = self.path.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4()));
        let body = serde_json::to_string_pretty(state)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
