use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 5000;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    Missing(&'static str),
    /// A variable is set but its value is unusable.
    Invalid { var: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(var) => write!(f, "environment variable {} is required", var),
            Self::Invalid { var, reason } => write!(f, "invalid value for {}: {}", var, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub telegram_bot_token: String,
    pub gemini_api_key: String,
    /// Externally reachable base URL, without trailing slash.
    pub public_url: Option<String>,
    /// Users allowed to upload and delete materials.
    pub admin_ids: HashSet<i64>,
    pub port: u16,
    /// Directory for state files (logs, database).
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    /// Chat that receives forwarded log lines.
    pub log_chat_id: Option<i64>,
    pub gemini_api_url: Option<String>,
    pub telegram_api_url: Option<String>,
    /// Token Telegram must send back with every webhook call.
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_bot_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Invalid {
                var: "TELEGRAM_BOT_TOKEN",
                reason: "expected format 123456789:ABCdefGHI...".into(),
            });
        }

        let gemini_api_key = get("GEMINI_API_KEY").ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let public_url = get("PUBLIC_URL")
            .or_else(|| get("RENDER_APP_URL"))
            .map(|u| u.trim_end_matches('/').to_string());

        let admin_ids = get("ADMIN_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default();

        let port = match get("PORT") {
            Some(p) => p.parse().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                reason: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        let (data_dir, database_path) = storage_paths(&lookup);

        let log_chat_id = match get("LOG_CHAT_ID") {
            Some(id) => Some(id.parse().map_err(|e| ConfigError::Invalid {
                var: "LOG_CHAT_ID",
                reason: format!("{e}"),
            })?),
            None => None,
        };

        let webhook_secret = get("WEBHOOK_SECRET");
        if let Some(ref secret) = webhook_secret {
            if !is_valid_secret(secret) {
                return Err(ConfigError::Invalid {
                    var: "WEBHOOK_SECRET",
                    reason: "use 1-256 characters of A-Z, a-z, 0-9, '_' or '-'".into(),
                });
            }
        }

        Ok(Self {
            telegram_bot_token,
            gemini_api_key,
            public_url,
            admin_ids,
            port,
            data_dir,
            database_path,
            log_chat_id,
            gemini_api_url: get("GEMINI_API_URL"),
            telegram_api_url: get("TELEGRAM_API_URL"),
            webhook_secret,
        })
    }

    /// URL Telegram should post updates to.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url.as_ref().map(|base| format!("{base}/webhook"))
    }
}

/// Data directory and database file from `DATA_DIR` / `DATABASE_PATH`.
pub fn storage_paths<F>(lookup: F) -> (PathBuf, PathBuf)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let data_dir = get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let database_path = get("DATABASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("materials.db"));
    (data_dir, database_path)
}

/// Telegram only accepts these characters in a webhook secret token.
fn is_valid_secret(secret: &str) -> bool {
    (1..=256).contains(&secret.len())
        && secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse a comma-separated id list, skipping anything that is not a number.
pub fn parse_admin_ids(raw: &str) -> HashSet<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    const TOKEN: (&str, &str) = ("TELEGRAM_BOT_TOKEN", "123456789:ABCdefGHIjklMNOpqrsTUVwxyz");
    const GEMINI: (&str, &str) = ("GEMINI_API_KEY", "gemini-key");

    #[test]
    fn test_minimal_config() {
        let config = load(&[TOKEN, GEMINI]).expect("should load minimal config");
        assert_eq!(config.port, 5000);
        assert!(config.admin_ids.is_empty());
        assert!(config.public_url.is_none());
        assert!(config.webhook_url().is_none());
        assert_eq!(config.database_path, PathBuf::from("./materials.db"));
    }

    #[test]
    fn test_missing_token() {
        let err = assert_err(load(&[GEMINI]));
        assert!(matches!(err, ConfigError::Missing("TELEGRAM_BOT_TOKEN")));
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_blank_gemini_key_is_missing() {
        let err = assert_err(load(&[TOKEN, ("GEMINI_API_KEY", "   ")]));
        assert!(matches!(err, ConfigError::Missing("GEMINI_API_KEY")));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let err = assert_err(load(&[("TELEGRAM_BOT_TOKEN", "invalid_token_no_colon"), GEMINI]));
        assert!(matches!(err, ConfigError::Invalid { var: "TELEGRAM_BOT_TOKEN", .. }));
    }

    #[test]
    fn test_invalid_token_format_empty_secret() {
        let err = assert_err(load(&[("TELEGRAM_BOT_TOKEN", "123456789:"), GEMINI]));
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_admin_ids_skip_garbage() {
        let config = load(&[TOKEN, GEMINI, ("ADMIN_IDS", "1, 42,abc,,7")]).unwrap();
        assert_eq!(config.admin_ids.len(), 3);
        assert!(config.admin_ids.contains(&1));
        assert!(config.admin_ids.contains(&42));
        assert!(config.admin_ids.contains(&7));
        assert!(!config.admin_ids.contains(&2));
    }

    #[test]
    fn test_public_url_trailing_slash_trimmed() {
        let config = load(&[TOKEN, GEMINI, ("PUBLIC_URL", "https://bot.example.com/")]).unwrap();
        assert_eq!(config.webhook_url().as_deref(), Some("https://bot.example.com/webhook"));
    }

    #[test]
    fn test_render_url_alias() {
        let config = load(&[TOKEN, GEMINI, ("RENDER_APP_URL", "https://mu.onrender.com")]).unwrap();
        assert_eq!(config.public_url.as_deref(), Some("https://mu.onrender.com"));
    }

    #[test]
    fn test_invalid_port() {
        let err = assert_err(load(&[TOKEN, GEMINI, ("PORT", "eighty")]));
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn test_database_path_follows_data_dir() {
        let config = load(&[TOKEN, GEMINI, ("DATA_DIR", "/var/lib/bot")]).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/bot/materials.db"));
    }

    #[test]
    fn test_storage_paths_trimmed() {
        let (dir, db) = storage_paths(|key| match key {
            "DATA_DIR" => Some(" /srv/bot ".to_string()),
            "DATABASE_PATH" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(dir, PathBuf::from("/srv/bot"));
        assert_eq!(db, PathBuf::from("/srv/bot/materials.db"));
    }

    #[test]
    fn test_webhook_secret() {
        let config = load(&[TOKEN, GEMINI]).unwrap();
        assert!(config.webhook_secret.is_none());

        let config = load(&[TOKEN, GEMINI, ("WEBHOOK_SECRET", "s3cret_token-1")]).unwrap();
        assert_eq!(config.webhook_secret.as_deref(), Some("s3cret_token-1"));

        let err = assert_err(load(&[TOKEN, GEMINI, ("WEBHOOK_SECRET", "has space!")]));
        assert!(matches!(err, ConfigError::Invalid { var: "WEBHOOK_SECRET", .. }));
    }
}
