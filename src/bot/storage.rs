//! Flat-file JSON stores for the ban list and per-chat conversation history.
//!
//! Every mutation rewrites the whole file; a missing or unreadable file
//! behaves as empty state. Single-writer, last-writer-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Net cap on stored turns per chat after an append.
pub const MAX_TURNS_PER_CHAT: usize = 10;

/// One recorded message in a chat's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub message: String,
    pub timestamp: String,
}

/// Rolling per-chat conversation window backed by one JSON file.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a turn, trimming the chat to the newest 9 first when it
    /// already holds 10 or more.
    pub fn append(&self, chat_id: i64, role: &str, message: &str) {
        let mut history = self.load();
        let turns = history.entry(chat_id.to_string()).or_default();

        if turns.len() >= MAX_TURNS_PER_CHAT {
            let excess = turns.len() - (MAX_TURNS_PER_CHAT - 1);
            turns.drain(..excess);
        }

        turns.push(Turn {
            role: role.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });

        self.save(&history);
    }

    /// Stored turns for a chat, oldest first. Missing chat reads as empty.
    pub fn read(&self, chat_id: i64) -> Vec<Turn> {
        self.load().remove(&chat_id.to_string()).unwrap_or_default()
    }

    /// Drop a chat's history. Returns whether anything was stored.
    pub fn clear(&self, chat_id: i64) -> bool {
        let mut history = self.load();
        let existed = history.remove(&chat_id.to_string()).is_some();
        if existed {
            self.save(&history);
        }
        existed
    }

    /// Every chat id the bot has talked to.
    pub fn chat_ids(&self) -> Vec<i64> {
        self.load().keys().filter_map(|id| id.parse().ok()).collect()
    }

    pub fn chat_count(&self) -> usize {
        self.load().len()
    }

    fn load(&self) -> HashMap<String, Vec<Turn>> {
        load_json(&self.path).unwrap_or_default()
    }

    fn save(&self, history: &HashMap<String, Vec<Turn>>) {
        save_json(&self.path, history);
    }
}

/// Banned user ids backed by one JSON array file.
pub struct BanStore {
    path: PathBuf,
}

impl BanStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Ban a user. Returns false if they were already banned.
    pub fn ban(&self, user_id: i64) -> bool {
        let mut banned = self.load();
        if banned.contains(&user_id) {
            return false;
        }
        banned.push(user_id);
        save_json(&self.path, &banned);
        true
    }

    /// Unban a user. Returns false if they were not banned.
    pub fn unban(&self, user_id: i64) -> bool {
        let mut banned = self.load();
        let before = banned.len();
        banned.retain(|id| *id != user_id);
        if banned.len() == before {
            return false;
        }
        save_json(&self.path, &banned);
        true
    }

    pub fn is_banned(&self, user_id: i64) -> bool {
        self.load().contains(&user_id)
    }

    pub fn count(&self) -> usize {
        self.load().len()
    }

    fn load(&self) -> Vec<i64> {
        load_json(&self.path).unwrap_or_default()
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let json = match std::fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to read {:?}: {e}", path);
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse {:?}: {e}", path);
            None
        }
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) {
    let json = match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize {:?}: {e}", path);
            return;
        }
    };
    if let Err(e) = std::fs::write(path, json) {
        warn!("Failed to write {:?}: {e}", path);
    }
}
