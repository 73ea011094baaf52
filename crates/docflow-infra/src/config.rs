//! Configuration loader for docflow.
//!
//! Reads a `docflow.toml` file into [`DocflowConfig`], falling back to
//! defaults when the file is missing or malformed, then applies `DOCFLOW_*`
//! environment overrides on top.

use std::path::Path;
use std::str::FromStr;

use docflow_types::config::{DocflowConfig, LogFormat};
use docflow_types::llm::ProviderKind;

/// Errors reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidOverride {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Read and parse a config file, surfacing every failure.
pub async fn read_config(path: &Path) -> Result<DocflowConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load configuration from `path`.
///
/// - Missing file: defaults.
/// - Unreadable or malformed file: a warning, then defaults.
pub async fn load_config(path: &Path) -> DocflowConfig {
    match read_config(path).await {
        Ok(config) => config,
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            DocflowConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            DocflowConfig::default()
        }
    }
}

/// [`load_config`] followed by [`apply_env_overrides`].
pub async fn load_config_with_env(path: &Path) -> Result<DocflowConfig, ConfigError> {
    let mut config = load_config(path).await;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Apply `DOCFLOW_*` variables from the process environment.
pub fn apply_env_overrides(config: &mut DocflowConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// Unset or empty variables leave the config untouched. A value that does
/// not parse is an error rather than being silently ignored.
pub fn apply_overrides_from<F>(config: &mut DocflowConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("DOCFLOW_PROVIDER") {
        config.inference.provider = parse_override::<ProviderKind>("DOCFLOW_PROVIDER", v)?;
    }
    if let Some(v) = get("DOCFLOW_MODEL_ID") {
        config.inference.model_id = v;
    }
    if let Some(v) = get("DOCFLOW_REGION") {
        config.inference.region = v;
    }
    if let Some(v) = get("DOCFLOW_RETRY_MAX_ATTEMPTS") {
        config.retry.max_attempts = parse_override("DOCFLOW_RETRY_MAX_ATTEMPTS", v)?;
    }
    if let Some(v) = get("DOCFLOW_RETRY_BASE_DELAY_MS") {
        config.retry.base_delay_ms = parse_override("DOCFLOW_RETRY_BASE_DELAY_MS", v)?;
    }
    if let Some(v) = get("DOCFLOW_RETRY_MAX_DELAY_MS") {
        config.retry.max_delay_ms = parse_override("DOCFLOW_RETRY_MAX_DELAY_MS", v)?;
    }
    if let Some(v) = get("DOCFLOW_STRICT_MODE") {
        config.validation.strict_mode = parse_override("DOCFLOW_STRICT_MODE", v)?;
    }
    if let Some(v) = get("DOCFLOW_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = get("DOCFLOW_LOG_FORMAT") {
        config.logging.format = parse_override::<LogFormat>("DOCFLOW_LOG_FORMAT", v)?;
    }
    Ok(())
}

fn parse_override<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidOverride {
            var,
            reason: e.to_string(),
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("docflow.toml")).await;
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.inference.provider, ProviderKind::Mock);
        assert!(!config.validation.strict_mode);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docflow.toml");
        tokio::fs::write(
            &path,
            r#"
[retry]
max_attempts = 5
base_delay_ms = 250

[inference]
provider = "bedrock"
region = "eu-west-1"

[validation]
strict_mode = true

[pipeline]
step_timeout_secs = 60
"#,
        )
        .await
        .unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.inference.provider, ProviderKind::Bedrock);
        assert_eq!(config.inference.region, "eu-west-1");
        assert!(config.validation.strict_mode);
        assert_eq!(config.pipeline.step_timeout_secs, Some(60));
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("docflow.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!").await.unwrap();

        let config = load_config(&path).await;
        assert_eq!(config.retry.max_attempts, 3);

        let err = read_config(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_applied() {
        let mut config = DocflowConfig::default();
        apply_overrides_from(
            &mut config,
            env(&[
                ("DOCFLOW_PROVIDER", "bedrock"),
                ("DOCFLOW_MODEL_ID", "anthropic.claude-3-haiku-20240307-v1:0"),
                ("DOCFLOW_RETRY_MAX_ATTEMPTS", "7"),
                ("DOCFLOW_RETRY_MAX_DELAY_MS", "5000"),
                ("DOCFLOW_STRICT_MODE", "true"),
                ("DOCFLOW_LOG_FORMAT", "json"),
                ("DOCFLOW_LOG_LEVEL", "debug"),
                ("DOCFLOW_REGION", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.inference.provider, ProviderKind::Bedrock);
        assert_eq!(config.inference.model_id, "anthropic.claude-3-haiku-20240307-v1:0");
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.max_delay_ms, 5000);
        assert!(config.validation.strict_mode);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "debug");
        // empty values are ignored
        assert_eq!(config.inference.region, "us-east-1");
    }

    #[test]
    fn env_override_invalid_number_is_error() {
        let mut config = DocflowConfig::default();
        let err = apply_overrides_from(&mut config, env(&[("DOCFLOW_RETRY_MAX_ATTEMPTS", "lots")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidOverride { var, value, .. } => {
                assert_eq!(var, "DOCFLOW_RETRY_MAX_ATTEMPTS");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn env_override_invalid_format_is_error() {
        let mut config = DocflowConfig::default();
        assert!(apply_overrides_from(&mut config, env(&[("DOCFLOW_LOG_FORMAT", "xml")])).is_err());
        assert!(apply_overrides_from(&mut config, env(&[("DOCFLOW_STRICT_MODE", "yes")])).is_err());
    }
}
