//! Runtime configuration.
//!
//! Every setting has a default and may be overridden from the environment:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FORGE_OUTPUT_DIR` | `./datasets` |
//! | `FORGE_DATABASE_URL` | unset (filesystem store) |
//! | `FORGE_EVAL_COMMAND` | `circuit-eval` |
//! | `FORGE_EVAL_IMAGE` | unset (local process runtime) |
//! | `FORGE_EVAL_TIMEOUT_SECS` | `120` |
//! | `FORGE_MAX_CONCURRENT_SAMPLES` | `1` |
//! | `FORGE_AUTOROUTER_SERVER_URL` | `https://registry-api.tscircuit.com` |
//! | `FORGE_AUTOROUTER_TIMEOUT_SECS` | `300` |
//! | `FORGE_TEMPLATE_CATALOG` | unset (built-in catalog) |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::autorouter::{client::DEFAULT_TIMEOUT_SECS, DEFAULT_SERVER_URL};
use crate::evaluator::{SandboxConfig, TemplateCatalog};

/// Errors that can occur while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration shared by the CLI commands.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Root directory for datasets written to the filesystem store.
    pub output_dir: PathBuf,
    /// SQLite URL; when set, artifacts go to the database instead.
    pub database_url: Option<String>,
    /// Evaluation command, entry file appended as the last argument.
    pub eval_command: Vec<String>,
    /// Docker image for evaluations; `None` runs the command locally.
    pub eval_image: Option<String>,
    pub eval_timeout: Duration,
    pub max_concurrent_samples: usize,
    pub autorouter_server_url: String,
    pub autorouter_timeout: Duration,
    /// YAML file with extra `name: import` template bindings.
    pub template_catalog: Option<PathBuf>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./datasets"),
            database_url: None,
            eval_command: vec!["circuit-eval".to_string()],
            eval_image: None,
            eval_timeout: Duration::from_secs(120),
            max_concurrent_samples: 1,
            autorouter_server_url: DEFAULT_SERVER_URL.to_string(),
            autorouter_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            template_catalog: None,
        }
    }
}

impl ForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from `FORGE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("FORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("FORGE_DATABASE_URL") {
            if !val.trim().is_empty() {
                config.database_url = Some(val);
            }
        }

        if let Some(val) = lookup("FORGE_EVAL_COMMAND") {
            config.eval_command = val.split_whitespace().map(str::to_string).collect();
        }

        if let Some(val) = lookup("FORGE_EVAL_IMAGE") {
            if !val.trim().is_empty() {
                config.eval_image = Some(val);
            }
        }

        if let Some(val) = lookup("FORGE_EVAL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_EVAL_TIMEOUT_SECS")?;
            config.eval_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FORGE_MAX_CONCURRENT_SAMPLES") {
            config.max_concurrent_samples = parse_env_value(&val, "FORGE_MAX_CONCURRENT_SAMPLES")?;
        }

        if let Some(val) = lookup("FORGE_AUTOROUTER_SERVER_URL") {
            config.autorouter_server_url = val;
        }

        if let Some(val) = lookup("FORGE_AUTOROUTER_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_AUTOROUTER_TIMEOUT_SECS")?;
            config.autorouter_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("FORGE_TEMPLATE_CATALOG") {
            if !val.trim().is_empty() {
                config.template_catalog = Some(PathBuf::from(val));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eval_command.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "eval_command cannot be empty".to_string(),
            ));
        }

        if self.eval_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "eval_timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_samples == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent_samples must be greater than 0".to_string(),
            ));
        }

        if !self.autorouter_server_url.starts_with("http://")
            && !self.autorouter_server_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationFailed(format!(
                "autorouter_server_url must be an http(s) URL, got '{}'",
                self.autorouter_server_url
            )));
        }

        if self.autorouter_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "autorouter_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Sandbox settings for the evaluator.
    pub fn sandbox_config(&self) -> SandboxConfig {
        let config = SandboxConfig::new(self.eval_command.clone()).with_timeout(self.eval_timeout);
        match &self.eval_image {
            Some(image) => config.with_docker_image(image.clone()),
            None => config,
        }
    }

    /// Built-in template catalog plus any configured overrides.
    pub fn template_catalog(&self) -> Result<TemplateCatalog, crate::error::EvaluationError> {
        let catalog = TemplateCatalog::builtin();
        match &self.template_catalog {
            Some(path) => catalog.load_overrides(path),
            None => Ok(catalog),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_eval_command(mut self, command: Vec<String>) -> Self {
        self.eval_command = command;
        self
    }

    pub fn with_eval_image(mut self, image: impl Into<String>) -> Self {
        self.eval_image = Some(image.into());
        self
    }

    pub fn with_eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_samples(mut self, max: usize) -> Self {
        self.max_concurrent_samples = max;
        self
    }

    pub fn with_autorouter_server_url(mut self, url: impl Into<String>) -> Self {
        self.autorouter_server_url = url.into();
        self
    }

    pub fn with_autorouter_timeout(mut self, timeout: Duration) -> Self {
        self.autorouter_timeout = timeout;
        self
    }

    pub fn with_template_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_catalog = Some(path.into());
        self
    }
}

fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::SandboxRuntime;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ForgeConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("./datasets"));
        assert_eq!(config.eval_timeout, Duration::from_secs(120));
        assert_eq!(config.max_concurrent_samples, 1);
        assert_eq!(config.autorouter_server_url, "https://registry-api.tscircuit.com");
        assert_eq!(config.autorouter_timeout, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ForgeConfig::from_lookup(lookup(&[
            ("FORGE_OUTPUT_DIR", "/tmp/out"),
            ("FORGE_DATABASE_URL", "sqlite://forge.db"),
            ("FORGE_EVAL_COMMAND", "bun run eval.ts"),
            ("FORGE_EVAL_IMAGE", "oven/bun:1"),
            ("FORGE_EVAL_TIMEOUT_SECS", "30"),
            ("FORGE_MAX_CONCURRENT_SAMPLES", "4"),
            ("FORGE_AUTOROUTER_SERVER_URL", "http://localhost:3000"),
        ]))
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.database_url.as_deref(), Some("sqlite://forge.db"));
        assert_eq!(config.eval_command, vec!["bun", "run", "eval.ts"]);
        assert_eq!(config.max_concurrent_samples, 4);

        let sandbox = config.sandbox_config();
        assert_eq!(sandbox.timeout, Duration::from_secs(30));
        assert_eq!(
            sandbox.runtime,
            SandboxRuntime::Docker {
                image: "oven/bun:1".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        let err = ForgeConfig::from_lookup(lookup(&[("FORGE_EVAL_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FORGE_EVAL_TIMEOUT_SECS"));

        let err = ForgeConfig::from_lookup(lookup(&[("FORGE_MAX_CONCURRENT_SAMPLES", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));

        let err = ForgeConfig::from_lookup(lookup(&[("FORGE_EVAL_COMMAND", "   ")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));

        let err = ForgeConfig::from_lookup(lookup(&[(
            "FORGE_AUTOROUTER_SERVER_URL",
            "registry-api.tscircuit.com",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }

    #[test]
    fn test_template_catalog_defaults_to_builtin() {
        let catalog = ForgeConfig::default().template_catalog().unwrap();
        assert!(catalog.resolve("keyboard").is_ok());
    }
}
