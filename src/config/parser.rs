use crate::config::types::Config;
use crate::config::validation::validate;
use crate::config::BEARER_TOKEN_ENV;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// The bearer token from `TIDEWATCH_BEARER_TOKEN` replaces the one in the
/// file when the variable is set and non-empty.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    if let Ok(token) = std::env::var(BEARER_TOKEN_ENV) {
        if !token.trim().is_empty() {
            config.api.bearer_token = Some(token);
        }
    }

    Ok(config)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is recorded on every session so runs can be traced back to the
/// configuration that produced them.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationDetail;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[api]
base-url = "https://api.example.com/1.1"
user-agent = "tidewatch-test"

[crawler]
session-budget-secs = 120
workers = 3
relation-detail = "profiles"

[storage]
database-path = "./frontier.db"

[export]
directory = "./export"

[frontier]
seeds = [783214, 6253282]
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.session_budget_secs, 120);
        assert_eq!(config.crawler.workers, 3);
        assert_eq!(config.crawler.relation_detail, RelationDetail::Profiles);
        assert_eq!(config.frontier.seeds, vec![783214, 6253282]);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse_config(
            r#"
[api]
base-url = "https://api.example.com/1.1"

[storage]
database-path = "./frontier.db"

[export]
directory = "./export"
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.session_budget_secs, 180);
        assert_eq!(config.crawler.max_attempts, 8);
        assert_eq!(config.crawler.quota_window_secs, 180);
        assert_eq!(config.crawler.content_page_size, 200);
        assert_eq!(config.crawler.ids_page_size, 5000);
        assert_eq!(config.crawler.relation_detail, RelationDetail::Ids);
        assert!(config.frontier.seeds.is_empty());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/tidewatch.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[api]
base-url = "https://api.example.com/1.1"

[crawler]
workers = 0

[storage]
database-path = "./frontier.db"

[export]
directory = "./export"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
