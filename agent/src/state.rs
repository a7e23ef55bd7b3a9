//! Durable agent state: persisted weights, leverage, and volatility so a
//! restarted agent resumes without waiting for fresh history to accumulate.
//!
//! Writes are atomic (write to a temp file in the same directory, then
//! `rename` over the target) so a crash mid-write can never leave a
//! truncated or partially-written state file — a process restart always
//! sees either the old state or the new one, never a corrupt mix.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// The agent's persisted state, written after every successful rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub weights: FxHashMap<String, f64>,
    pub last_rebalance_ts: Option<DateTime<Utc>>,
    pub total_equity_cents: i64,
    pub current_leverage: f64,
    pub realized_volatility: Option<f64>,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            weights: FxHashMap::default(),
            last_rebalance_ts: None,
            total_equity_cents: 0,
            current_leverage: 1.0,
            realized_volatility: None,
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and atomically writes an [`AgentState`] to a fixed path.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path_display(&self) -> String {
        self.path.display().to_string()
    }

    /// Load the persisted state, or a fresh [`AgentState::default`] if no
    /// file exists yet — a missing file on first run is expected, not an
    /// error.
    pub fn load(&self) -> Result<AgentState> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AgentState::default()),
            Err(e) => Err(AgentError::Persistence(e)),
        }
    }

    /// Load the persisted state, falling back to [`AgentState::default`] and
    /// logging a warning on any failure — a missing file, a truncated
    /// write, or a state file from an incompatible schema version are all
    /// treated the same way: start fresh rather than refuse to start.
    pub fn load_or_default(&self) -> AgentState {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                warn!("agent state at {} could not be loaded ({e}), starting from defaults", self.path_display());
                AgentState::default()
            }
        }
    }

    /// Atomically overwrite the state file: serialize to a sibling temp
    /// file, flush and sync it, then rename over the real path.
    pub fn save(&self, state: &AgentState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("agent_state")
        ));

        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            tmp.write_all(&json)?;
            tmp.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
