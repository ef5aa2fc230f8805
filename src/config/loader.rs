//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::WalletConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<WalletConfig, ConfigError> {
    let config: WalletConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WalletConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config = parse_config(&content)?;

    tracing::info!(
        path = %path.display(),
        chains = config.chains.len(),
        tokens = config.tokens.len(),
        "Configuration loaded"
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("does-not-exist.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_parse_error() {
        let result = parse_config("chains = 5");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_errors_are_reported_together() {
        let raw = r#"
            [[chains]]
            blockchain = "ethereum"
            rpc_url = ""
            rpc_timeout_secs = 0
        "#;
        match parse_config(raw) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_load_from_disk() {
        let path = std::env::temp_dir().join("chain_wallet_core_loader_test.toml");
        fs::write(
            &path,
            r#"
            [orchestrator]
            improved_nonce = false

            [[chains]]
            blockchain = "near"
            chain_id = "testnet"
            rpc_url = "https://rpc.testnet.near.org"
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert!(!config.orchestrator.improved_nonce);
        assert_eq!(config.chains[0].chain_id.as_str(), "testnet");

        fs::remove_file(&path).unwrap_or_default();
    }
}
