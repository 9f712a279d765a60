//! Gemini API client with credential rotation and model fallback.
//!
//! One logical `call` makes up to [`MAX_RETRIES`] network attempts. A rate
//! limit (HTTP 429) first drops to the next model in the priority list; the
//! credential is rotated only once the cheapest model is already in use.
//! Other failures are retried without touching either cursor.

use std::fmt;
use std::sync::Mutex;

use serde_json::Value;
use tracing::{info, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Total network attempts per logical call.
const MAX_RETRIES: u32 = 3;

/// Fallback chain, most capable first.
const DEFAULT_MODEL_PRIORITY: [&str; 2] = ["gemini-1.5-pro-lite", "gemini-2.0-flash"];

/// Errors surfaced by [`GeminiClient::call`].
#[derive(Debug)]
pub enum ApiError {
    /// The endpoint answered with a non-success status.
    Http { status: u16, body: String },
    /// The request failed before an HTTP status was available, or the
    /// response body was not valid JSON.
    Transport(String),
    /// The retry budget ran out without capturing a concrete error.
    Exhausted,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http { status, body } => {
                write!(f, "gemini api returned status {}: {}", status, body)
            }
            Self::Transport(msg) => write!(f, "gemini api transport error: {}", msg),
            Self::Exhausted => write!(f, "gemini api: max retries reached"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Mutable cursors and counters, kept behind one lock so concurrent chat
/// handlers sharing a client cannot race them.
struct ClientState {
    key_index: usize,
    model_index: usize,
    /// Successful calls per credential, parallel to the key pool.
    usage: Vec<u64>,
}

/// Snapshot of the pool for status reporting.
pub struct PoolStats {
    pub key_count: usize,
    pub current_model: String,
    /// Successful calls attributed to each credential, in pool order.
    pub usage: Vec<u64>,
}

pub struct GeminiClient {
    keys: Vec<String>,
    models: Vec<String>,
    state: Mutex<ClientState>,
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl GeminiClient {
    /// Build a client over the given credential pool and the default model
    /// priority list. Fails if the pool is empty.
    pub fn new(keys: Vec<String>) -> Result<Self, String> {
        let models = DEFAULT_MODEL_PRIORITY.iter().map(|m| m.to_string()).collect();
        Self::with_models(keys, models)
    }

    pub fn with_models(keys: Vec<String>, models: Vec<String>) -> Result<Self, String> {
        if keys.is_empty() {
            return Err("gemini client needs at least one api key".to_string());
        }
        if models.is_empty() {
            return Err("gemini client needs at least one model".to_string());
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        let usage = vec![0; keys.len()];
        Ok(Self {
            keys,
            models,
            state: Mutex::new(ClientState { key_index: 0, model_index: 0, usage }),
            http,
            base_url: GEMINI_API_BASE.to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Advance the credential cursor by one, wrapping around the pool.
    pub fn rotate_key(&self) {
        let mut state = self.lock_state();
        state.key_index = (state.key_index + 1) % self.keys.len();
        info!("rotated to api key index {}", state.key_index);
    }

    /// Move the model cursor to the next, less capable entry. No-op at the
    /// cheapest tier.
    pub fn downgrade_model(&self) {
        let mut state = self.lock_state();
        if state.model_index + 1 < self.models.len() {
            state.model_index += 1;
            info!("downgraded to model: {}", self.models[state.model_index]);
        }
    }

    /// Move the model cursor back toward the most capable entry. Manual
    /// operation, never invoked by the retry path.
    pub fn upgrade_model(&self) {
        let mut state = self.lock_state();
        if state.model_index > 0 {
            state.model_index -= 1;
            info!("upgraded to model: {}", self.models[state.model_index]);
        }
    }

    pub fn current_model(&self) -> String {
        let state = self.lock_state();
        self.models[state.model_index].clone()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            key_count: self.keys.len(),
            current_model: self.models[state.model_index].clone(),
            usage: state.usage.clone(),
        }
    }

    /// Perform one logical generateContent request.
    ///
    /// Returns the parsed response body of the first successful attempt. The
    /// usage counter of the credential used for that attempt is incremented.
    /// After the budget is spent, the most recently observed error is
    /// returned.
    pub async fn call(&self, payload: &Value) -> Result<Value, ApiError> {
        let mut last_error: Option<ApiError> = None;

        for attempt in 0..self.max_retries {
            let (url, key_index) = self.attempt_target();

            let response = match self.http.post(&url).json(payload).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("attempt {}: request failed: {}", attempt, e);
                    last_error = Some(ApiError::Transport(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("attempt {}: failed to read response body: {}", attempt, e);
                    last_error = Some(ApiError::Transport(e.to_string()));
                    continue;
                }
            };

            if status.as_u16() == 429 {
                warn!("rate limited on key index {}", key_index);
                self.absorb_rate_limit();
                last_error = Some(ApiError::Http { status: 429, body });
                continue;
            }

            if !status.is_success() {
                warn!("attempt {}: gemini returned status {}", attempt, status);
                last_error = Some(ApiError::Http { status: status.as_u16(), body });
                continue;
            }

            match serde_json::from_str::<Value>(&body) {
                Ok(parsed) => {
                    self.record_success(key_index);
                    return Ok(parsed);
                }
                Err(e) => {
                    warn!("attempt {}: invalid response body: {}", attempt, e);
                    last_error = Some(ApiError::Transport(format!("invalid response body: {e}")));
                }
            }
        }

        Err(last_error.unwrap_or(ApiError::Exhausted))
    }

    /// URL and credential index for the next attempt, read under one lock so
    /// the pair is consistent.
    fn attempt_target(&self) -> (String, usize) {
        let state = self.lock_state();
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.models[state.model_index], self.keys[state.key_index]
        );
        (url, state.key_index)
    }

    /// Prefer dropping to a cheaper model; rotate the credential only when
    /// already at the cheapest tier.
    fn absorb_rate_limit(&self) {
        let at_cheapest = {
            let state = self.lock_state();
            state.model_index + 1 >= self.models.len()
        };
        if at_cheapest {
            self.rotate_key();
        } else {
            self.downgrade_model();
        }
    }

    fn record_success(&self, key_index: usize) {
        let mut state = self.lock_state();
        state.usage[key_index] += 1;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state.lock().expect("client state lock poisoned")
    }

    #[cfg(test)]
    pub(crate) fn key_index(&self) -> usize {
        self.lock_state().key_index
    }

    #[cfg(test)]
    pub(crate) fn model_index(&self) -> usize {
        self.lock_state().model_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(n_keys: usize) -> GeminiClient {
        let keys = (0..n_keys).map(|i| format!("key{i}")).collect();
        GeminiClient::new(keys).unwrap()
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(GeminiClient::new(vec![]).is_err());
    }

    #[test]
    fn test_rotation_wraps_around() {
        for n in 1..=5 {
            let client = client(n);
            for _ in 0..n {
                client.rotate_key();
            }
            assert_eq!(client.key_index(), 0, "pool of {n} should wrap to start");
        }
    }

    #[test]
    fn test_downgrade_clamped_at_cheapest() {
        let client = client(1);
        client.downgrade_model();
        assert_eq!(client.model_index(), 1);
        client.downgrade_model();
        assert_eq!(client.model_index(), 1);
    }

    #[test]
    fn test_upgrade_clamped_at_top() {
        let client = client(1);
        client.upgrade_model();
        assert_eq!(client.model_index(), 0);
        client.downgrade_model();
        client.upgrade_model();
        assert_eq!(client.model_index(), 0);
    }

    #[test]
    fn test_current_model_follows_cursor() {
        let client = client(1);
        assert_eq!(client.current_model(), "gemini-1.5-pro-lite");
        client.downgrade_model();
        assert_eq!(client.current_model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_stats_snapshot() {
        let client = client(3);
        let stats = client.stats();
        assert_eq!(stats.key_count, 3);
        assert_eq!(stats.usage, vec![0, 0, 0]);
        assert_eq!(stats.current_model, "gemini-1.5-pro-lite");
    }

    #[tokio::test]
    async fn test_zero_budget_is_exhausted() {
        let client = client(1).with_max_retries(0);
        let err = client.call(&serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Exhausted));
    }
}
