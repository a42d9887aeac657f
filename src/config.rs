use super::store::RequestStore;
use anyhow::{Context, anyhow};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
    pub watch_poll: Duration,
}

impl Config {
    /// Reads `APPROVALS_*` variables, loading a `.env` file first if present.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let db_path = lookup("APPROVALS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./approvals.db"));

        let log_filter = lookup("APPROVALS_LOG").unwrap_or_else(|| "info".to_string());

        let poll_ms = match lookup("APPROVALS_WATCH_POLL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| anyhow!("Invalid APPROVALS_WATCH_POLL_MS value: {}", raw))?,
            None => 100,
        };
        if poll_ms == 0 {
            return Err(anyhow!("APPROVALS_WATCH_POLL_MS must be greater than zero"));
        }

        Ok(Config {
            db_path,
            log_filter,
            watch_poll: Duration::from_millis(poll_ms),
        })
    }

    pub fn open_store(&self) -> anyhow::Result<RequestStore> {
        let db = sled::open(&self.db_path)
            .with_context(|| format!("failed to open database at {}", self.db_path.display()))?;
        Ok(RequestStore::new(Arc::new(db)).with_watch_poll(self.watch_poll))
    }
}
