use crate::adapters::StoreOptions;
use crate::core::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::utils::error::{DeskError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub links: LinksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: String,
    pub busy_timeout_ms: u64,
    pub contention_retries: u32,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub admin_ids: Vec<i64>,
    pub dialog_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksConfig {
    pub contact_base_url: String,
    pub support_url: String,
    pub news_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "cash_desk.db".to_string(),
            busy_timeout_ms: 5000,
            contention_retries: 3,
            pool_size: 4,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            admin_ids: Vec::new(),
            dialog_timeout_seconds: 600,
        }
    }
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            contact_base_url: "https://t.me".to_string(),
            support_url: "https://t.me/your_support_username".to_string(),
            news_url: "https://t.me/placeholder_channel".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            pool_size: self.pool_size,
        }
    }
}

impl AdminConfig {
    pub fn dialog_timeout(&self) -> Duration {
        Duration::from_secs(self.dialog_timeout_seconds)
    }
}

impl DeskConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DeskError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DeskError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR_NAME}` with the variable's value; unknown variables
    /// are left as written so validation can point at them.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| DeskError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads `API_KEY` (required), `API_BASE_URL`, `API_TIMEOUT_SECONDS`,
    /// `DATABASE_PATH`, `ADMIN_IDS` (comma separated) and `ADMIN_ID`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DeskError::MissingConfigError {
                field: "API_KEY".to_string(),
            })?;

        let timeout_seconds = match lookup("API_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| DeskError::InvalidConfigValueError {
                    field: "API_TIMEOUT_SECONDS".to_string(),
                    value: raw.clone(),
                    reason: "Expected a whole number of seconds".to_string(),
                })?,
            None => default_timeout_seconds(),
        };

        let mut store = StoreConfig::default();
        if let Some(path) = lookup("DATABASE_PATH") {
            store.database_path = path;
        }

        let mut admin_ids = Vec::new();
        let raw_ids = [lookup("ADMIN_IDS"), lookup("ADMIN_ID")];
        for raw in raw_ids.iter().flatten() {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                match part.parse::<i64>() {
                    Ok(id) if !admin_ids.contains(&id) => admin_ids.push(id),
                    Ok(_) => {}
                    Err(_) => tracing::warn!("Ignoring admin id '{}': not a valid integer", part),
                }
            }
        }

        Ok(Self {
            api: ApiConfig {
                base_url: lookup("API_BASE_URL").unwrap_or_else(default_base_url),
                api_key,
                timeout_seconds,
            },
            store,
            admin: AdminConfig {
                admin_ids,
                ..AdminConfig::default()
            },
            links: LinksConfig::default(),
        })
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_url("api.base_url", &self.api.base_url)?;

        if self.api.api_key.trim().is_empty() || self.api.api_key.contains("${") {
            return Err(DeskError::MissingConfigError {
                field: "api.api_key".to_string(),
            });
        }

        validate_range("api.timeout_seconds", self.api.timeout_seconds, 1, 300)?;
        validate_path("store.database_path", &self.store.database_path)?;
        validate_range("store.pool_size", self.store.pool_size, 1, 64)?;
        validate_range("store.contention_retries", self.store.contention_retries, 0, 20)?;
        validate_range(
            "admin.dialog_timeout_seconds",
            self.admin.dialog_timeout_seconds,
            1,
            86_400,
        )?;
        validate_non_empty_string("links.contact_base_url", &self.links.contact_base_url)?;

        Ok(())
    }
}

impl Validate for DeskConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[api]
base_url = "https://api.example.com/v1/client"
api_key = "test-key"
timeout_seconds = 10

[store]
database_path = "/tmp/desk.db"
contention_retries = 5

[admin]
admin_ids = [1, 2]

[links]
support_url = "https://t.me/help"
"#;

        let config = DeskConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com/v1/client");
        assert_eq!(config.api.timeout_seconds, 10);
        assert_eq!(config.store.contention_retries, 5);
        assert_eq!(config.store.pool_size, 4);
        assert_eq!(config.admin.admin_ids, vec![1, 2]);
        assert_eq!(config.links.support_url, "https://t.me/help");
        assert_eq!(config.links.contact_base_url, "https://t.me");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_for_minimal_config() {
        let config = DeskConfig::from_toml_str("[api]\napi_key = \"k\"\n").unwrap();

        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.admin.dialog_timeout_seconds, 600);
        assert!(config.admin.admin_ids.is_empty());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("CASH_DESK_TEST_API_KEY", "from-env");

        let config =
            DeskConfig::from_toml_str("[api]\napi_key = \"${CASH_DESK_TEST_API_KEY}\"\n").unwrap();
        assert_eq!(config.api.api_key, "from-env");

        std::env::remove_var("CASH_DESK_TEST_API_KEY");
    }

    #[test]
    fn test_unresolved_api_key_fails_validation() {
        let config =
            DeskConfig::from_toml_str("[api]\napi_key = \"${CASH_DESK_UNSET_VARIABLE}\"\n")
                .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DeskError::MissingConfigError { .. }));
    }

    #[test]
    fn test_invalid_base_url_fails_validation() {
        let config = DeskConfig::from_toml_str(
            "[api]\napi_key = \"k\"\nbase_url = \"ftp://example.com\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("API_KEY", "env-key"),
            ("ADMIN_IDS", "10, 20,abc"),
            ("ADMIN_ID", "20"),
            ("DATABASE_PATH", "/data/desk.db"),
        ]);

        let config = DeskConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.api.api_key, "env-key");
        assert_eq!(config.admin.admin_ids, vec![10, 20]);
        assert_eq!(config.store.database_path, "/data/desk.db");
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_from_lookup_requires_api_key() {
        let err = DeskConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, DeskError::MissingConfigError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[api]\napi_key = \"file-key\"\n")
            .unwrap();

        let config = DeskConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.api.api_key, "file-key");
    }
}
