use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use teloxide::types::UserId;

/// Default owner identity used when the config file does not override it.
const DEFAULT_OWNER_ID: u64 = 7996509135;

const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// A required key is absent.
    MissingKey(String),
    /// A key is present but its value does not parse.
    InvalidValue { key: String, value: String },
    /// No Gemini API key was found in the file.
    NoApiKeys,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::MissingKey(key) => write!(f, "missing required key in config: {}", key),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value for config key {}: '{}'", key, value)
            }
            Self::NoApiKeys => write!(f, "no gemini api keys found in config"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Bot configuration loaded from a flat `KEY=VALUE` text file.
pub struct Config {
    pub telegram_bot_token: String,
    /// Conversation-priming prompt sent as the first turn of every request.
    pub hinglish_prompt: String,
    /// Credential pool for the Gemini client, in file order.
    pub gemini_api_keys: Vec<String>,
    pub bot_name: String,
    pub owner_name: String,
    pub language: String,
    pub support_group: String,
    pub bot_username: String,
    /// Single numeric identity allowed to run owner commands.
    pub owner_id: UserId,
    /// Port for the liveness endpoint.
    pub health_port: u16,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;

        let values = parse_pairs(&content);

        let telegram_bot_token = require(&values, "TELEGRAM_BOT_TOKEN")?;
        let hinglish_prompt = require(&values, "HINGLISH_PROMPT")?;
        let gemini_api_keys = collect_api_keys(&values);
        if gemini_api_keys.is_empty() {
            return Err(ConfigError::NoApiKeys);
        }

        let owner_id = match values.get("OWNER_ID") {
            Some(raw) => UserId(raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OWNER_ID".into(),
                value: raw.clone(),
            })?),
            None => UserId(DEFAULT_OWNER_ID),
        };

        let health_port = match values.get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".into(),
                value: raw.clone(),
            })?,
            None => DEFAULT_HEALTH_PORT,
        };

        Ok(Self {
            telegram_bot_token,
            hinglish_prompt,
            gemini_api_keys,
            bot_name: get_or(&values, "BOT_NAME", "Chat Companion"),
            owner_name: get_or(&values, "OWNER_NAME", "Bot Owner"),
            language: get_or(&values, "LANGUAGE", "Hinglish"),
            support_group: get_or(&values, "SUPPORT_GROUP", "https://t.me/yourgroup"),
            bot_username: get_or(&values, "BOT_USERNAME", "@YourBotUsername"),
            owner_id,
            health_port,
        })
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

/// Parse `KEY=VALUE` lines. Lines without `=` are ignored, later duplicates win.
fn parse_pairs(content: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    values
}

fn require(values: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    values
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

fn get_or(values: &HashMap<String, String>, key: &str, default: &str) -> String {
    values.get(key).cloned().unwrap_or_else(|| default.to_string())
}

/// `GEMINI_API_KEY` first, then `GEMINI_API_KEY_1`, `GEMINI_API_KEY_2`, ...
/// Collection stops at the first gap in the numbered sequence.
fn collect_api_keys(values: &HashMap<String, String>) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(key) = values.get("GEMINI_API_KEY") {
        keys.push(key.clone());
    }
    let mut i = 1;
    while let Some(key) = values.get(&format!("GEMINI_API_KEY_{}", i)) {
        keys.push(key.clone());
        i += 1;
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    const MINIMAL: &str = "TELEGRAM_BOT_TOKEN=123456789:ABCdef\n\
                           HINGLISH_PROMPT=reply in hinglish\n\
                           GEMINI_API_KEY=k0\n";

    #[test]
    fn test_valid_config() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.telegram_bot_token, "123456789:ABCdef");
        assert_eq!(config.hinglish_prompt, "reply in hinglish");
        assert_eq!(config.gemini_api_keys, vec!["k0".to_string()]);
        assert_eq!(config.owner_id, UserId(DEFAULT_OWNER_ID));
        assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
    }

    #[test]
    fn test_defaults_for_identity_fields() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bot_name, "Chat Companion");
        assert_eq!(config.language, "Hinglish");
    }

    #[test]
    fn test_missing_token() {
        let file = write_config("HINGLISH_PROMPT=p\nGEMINI_API_KEY=k\n");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::MissingKey(_)));
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_missing_prompt() {
        let file = write_config("TELEGRAM_BOT_TOKEN=1:a\nGEMINI_API_KEY=k\n");
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("HINGLISH_PROMPT"));
    }

    #[test]
    fn test_no_api_keys() {
        let file = write_config("TELEGRAM_BOT_TOKEN=1:a\nHINGLISH_PROMPT=p\n");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::NoApiKeys));
    }

    #[test]
    fn test_numbered_keys_stop_at_gap() {
        let file = write_config(
            "TELEGRAM_BOT_TOKEN=1:a\nHINGLISH_PROMPT=p\n\
             GEMINI_API_KEY=k0\nGEMINI_API_KEY_1=k1\nGEMINI_API_KEY_3=k3\n",
        );
        let config = Config::load(file.path()).unwrap();
        // k3 is unreachable because _2 is missing
        assert_eq!(config.gemini_api_keys, vec!["k0".to_string(), "k1".to_string()]);
    }

    #[test]
    fn test_numbered_keys_without_base_key() {
        let file = write_config(
            "TELEGRAM_BOT_TOKEN=1:a\nHINGLISH_PROMPT=p\n\
             GEMINI_API_KEY_1=k1\nGEMINI_API_KEY_2=k2\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gemini_api_keys, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn test_duplicate_key_overwrites() {
        let file = write_config(
            "TELEGRAM_BOT_TOKEN=1:a\nHINGLISH_PROMPT=p\nGEMINI_API_KEY=k\n\
             BOT_NAME=first\nBOT_NAME=second\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.bot_name, "second");
    }

    #[test]
    fn test_lines_without_equals_ignored() {
        let file = write_config(
            "# comment line\njust words\nTELEGRAM_BOT_TOKEN=1:a\n\
             HINGLISH_PROMPT=p\nGEMINI_API_KEY=k\n",
        );
        assert!(Config::load(file.path()).is_ok());
    }

    #[test]
    fn test_values_are_trimmed() {
        let file = write_config(
            "TELEGRAM_BOT_TOKEN = 1:a \nHINGLISH_PROMPT= p\nGEMINI_API_KEY =k\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.telegram_bot_token, "1:a");
        assert_eq!(config.gemini_api_keys, vec!["k".to_string()]);
    }

    #[test]
    fn test_invalid_owner_id() {
        let file = write_config(
            "TELEGRAM_BOT_TOKEN=1:a\nHINGLISH_PROMPT=p\nGEMINI_API_KEY=k\nOWNER_ID=abc\n",
        );
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.txt"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}
