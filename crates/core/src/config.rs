//! TOML-based configuration for the merge driver.
//!
//! Credentials are never stored in the file: each backend names the
//! environment variable holding its API key (`api_key_env`), and the values
//! are resolved exactly once at start-up via
//! [`DriverConfig::resolve_env_vars`]. The resolved struct is then handed to
//! the resolver, which never touches the environment itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Default configuration written by `llmmerge init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# llmmerge configuration
# Register the driver with:
#   git config --global merge.llmmerge.driver "llmmerge %O %A %B --path %P --marker-size %L"
# and map file patterns to it in .gitattributes, e.g. `*.py merge=llmmerge`.

[driver]
log_level = "warn"
# log_file = "/tmp/llmmerge.log"
on_unresolved = "markers"
diff3_markers = false
max_concurrent_requests = 4

[prompt]
context_lines = 10
max_prompt_bytes = 48000
include_diffs = true

# Backends are tried in order until one returns a usable resolution.
[[backends]]
name = "openai"
kind = "openai_responses"
model = "o4-mini-2025-04-16"
api_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
timeout_secs = 120

# [[backends]]
# name = "local"
# kind = "chat_completions"
# model = "qwen2.5-coder"
# api_url = "http://localhost:11434/v1"
# timeout_secs = 300
"#;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level driver configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Process-level settings.
    #[serde(default)]
    pub driver: DriverSection,

    /// Prompt construction limits.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Completion backends, in the order they are tried.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver: DriverSection::default(),
            prompt: PromptConfig::default(),
            backends: default_backends(),
        }
    }
}

fn default_backends() -> Vec<BackendConfig> {
    vec![BackendConfig::default()]
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// What to do with the output file when some region stays unresolved.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Write the merge with Git-style conflict markers in unresolved regions.
    #[default]
    Markers,
    /// Leave the output file exactly as it was.
    Leave,
}

/// Process-level driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSection {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Append logs to this file instead of stderr.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub on_unresolved: UnresolvedPolicy,

    /// Include the `|||||||` base section in conflict markers.
    #[serde(default)]
    pub diff3_markers: bool,

    /// Upper bound on in-flight backend requests for one file.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

fn default_log_level() -> String {
    "warn".into()
}
fn default_max_concurrent_requests() -> usize {
    4
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            on_unresolved: UnresolvedPolicy::default(),
            diff3_markers: false,
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Limits applied when building the prompt for one conflict region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Unchanged lines of `ours` shown before and after the region.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Hard ceiling on the prompt size (system + user text) in bytes.
    #[serde(default = "default_max_prompt_bytes")]
    pub max_prompt_bytes: usize,

    /// Include unified diffs base->ours and base->theirs.
    #[serde(default = "default_true")]
    pub include_diffs: bool,
}

fn default_context_lines() -> usize {
    10
}
fn default_max_prompt_bytes() -> usize {
    48_000
}
fn default_true() -> bool {
    true
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            max_prompt_bytes: default_max_prompt_bytes(),
            include_diffs: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendKind {
    /// OpenAI Responses API (`POST /responses`).
    #[default]
    #[serde(rename = "openai_responses")]
    OpenAiResponses,
    /// OpenAI-compatible Chat Completions (`POST /chat/completions`),
    /// as served by Ollama, vLLM and friends.
    #[serde(rename = "chat_completions")]
    ChatCompletions,
}

/// One completion backend in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name used in logs.
    pub name: String,

    #[serde(default)]
    pub kind: BackendKind,

    /// Model identifier sent with every request.
    pub model: String,

    /// Base URL of the API (without the endpoint path).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Environment variable holding the API key. `None` sends no auth header.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Bound on a single request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: "openai".into(),
            kind: BackendKind::OpenAiResponses,
            model: "o4-mini-2025-04-16".into(),
            api_url: default_api_url(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl DriverConfig {
    /// Load a [`DriverConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: DriverConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(backends = config.backends.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Locate and load the configuration.
    ///
    /// An explicit path must exist. Without one, the per-user file
    /// (`<config dir>/llmmerge/config.toml`) is used when present, and the
    /// built-in defaults otherwise.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(path),
            _ => {
                debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Resolve every backend's `api_key_env` into `api_key`.
    ///
    /// A referenced variable that is unset or empty is fatal: the driver
    /// must refuse to start before touching any file.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        for (idx, backend) in self.backends.iter_mut().enumerate() {
            if let Some(ref env_name) = backend.api_key_env {
                let field = format!("backends[{idx}].api_key_env");
                backend.api_key = Some(resolve_required_env(env_name, &field)?);
            }
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backends".into(),
                detail: "at least one backend must be configured".into(),
            });
        }
        for (idx, backend) in self.backends.iter().enumerate() {
            let invalid = |name: &str, detail: &str| ConfigError::InvalidValue {
                field: format!("backends[{idx}].{name}"),
                detail: detail.into(),
            };
            if backend.name.trim().is_empty() {
                return Err(invalid("name", "backend name must not be empty"));
            }
            if backend.model.trim().is_empty() {
                return Err(invalid("model", "model must not be empty"));
            }
            if !(backend.api_url.starts_with("http://") || backend.api_url.starts_with("https://"))
            {
                return Err(invalid("api_url", "API URL must start with http:// or https://"));
            }
            if backend.timeout_secs == 0 {
                return Err(invalid("timeout_secs", "timeout must be > 0"));
            }
        }
        if self.driver.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "driver.max_concurrent_requests".into(),
                detail: "concurrency must be > 0".into(),
            });
        }
        if self.prompt.max_prompt_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "prompt.max_prompt_bytes".into(),
                detail: "prompt budget must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: discover, resolve, and validate in one call.
    pub fn load_and_resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::discover(explicit)?;
        config.validate()?;
        config.resolve_env_vars()?;
        Ok(config)
    }
}

/// Per-user configuration path, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("llmmerge").join("config.toml"))
}

/// Read an environment variable that must be present and non-empty.
fn resolve_required_env(env_name: &str, field: &str) -> Result<String, ConfigError> {
    match std::env::var(env_name) {
        Ok(val) if !val.trim().is_empty() => {
            debug!(field, env_name, "resolved env var");
            Ok(val)
        }
        _ => Err(ConfigError::EnvVarMissing {
            var: env_name.to_string(),
            field: field.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[driver]
log_level = "debug"
log_file = "/tmp/llmmerge.log"
on_unresolved = "leave"
diff3_markers = true
max_concurrent_requests = 2

[prompt]
context_lines = 5
max_prompt_bytes = 20000
include_diffs = false

[[backends]]
name = "primary"
kind = "openai_responses"
model = "o4-mini-2025-04-16"
api_key_env = "LLMMERGE_TEST_PRIMARY_KEY"
timeout_secs = 60

[[backends]]
name = "local"
kind = "chat_completions"
model = "qwen2.5-coder"
api_url = "http://localhost:11434/v1"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: DriverConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.driver.log_level, "debug");
        assert_eq!(config.driver.on_unresolved, UnresolvedPolicy::Leave);
        assert!(config.driver.diff3_markers);
        assert_eq!(config.prompt.context_lines, 5);
        assert!(!config.prompt.include_diffs);
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].api_url, "https://api.openai.com/v1");
        assert_eq!(config.backends[1].kind, BackendKind::ChatCompletions);
        assert_eq!(config.backends[1].timeout_secs, 120);
        assert!(config.backends[1].api_key_env.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = DriverConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.driver.max_concurrent_requests, 2);
    }

    #[test]
    fn test_file_not_found() {
        let result = DriverConfig::load_from_file("/nonexistent/llmmerge.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

        let result = DriverConfig::discover(Some(Path::new("/nonexistent/llmmerge.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[driver\nlog_level = ").unwrap();
        let result = DriverConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_template_matches_defaults() {
        let config: DriverConfig = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let defaults = DriverConfig::default();
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].model, defaults.backends[0].model);
        assert_eq!(config.backends[0].api_key_env, defaults.backends[0].api_key_env);
        assert_eq!(config.prompt.max_prompt_bytes, defaults.prompt.max_prompt_bytes);
        assert_eq!(config.driver.on_unresolved, UnresolvedPolicy::Markers);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config: DriverConfig = toml::from_str("").unwrap();
        assert_eq!(config.driver.log_level, "warn");
        assert_eq!(config.driver.max_concurrent_requests, 4);
        assert_eq!(config.prompt.context_lines, 10);
        assert!(config.prompt.include_diffs);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("LLMMERGE_TEST_PRIMARY_KEY", "sk-test");

        let mut config: DriverConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.backends[0].api_key.as_deref(), Some("sk-test"));
        assert!(config.backends[1].api_key.is_none());

        std::env::remove_var("LLMMERGE_TEST_PRIMARY_KEY");
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let toml_str = r#"
[[backends]]
name = "primary"
model = "m"
api_key_env = "LLMMERGE_TEST_UNSET_KEY"
"#;
        std::env::remove_var("LLMMERGE_TEST_UNSET_KEY");
        let mut config: DriverConfig = toml::from_str(toml_str).unwrap();
        let result = config.resolve_env_vars();
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarMissing { ref var, ref field })
                if var == "LLMMERGE_TEST_UNSET_KEY" && field == "backends[0].api_key_env"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_chain() {
        let config: DriverConfig = toml::from_str("backends = []").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "backends"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_backend_values() {
        let mut config = DriverConfig::default();
        config.backends[0].api_url = "api.openai.com".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "backends[0].api_url"
        ));

        let mut config = DriverConfig::default();
        config.backends[0].timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "backends[0].timeout_secs"
        ));

        let mut config = DriverConfig::default();
        config.driver.max_concurrent_requests = 0;
        assert!(config.validate().is_err());
    }
}
