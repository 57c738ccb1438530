//! Application settings.
//!
//! Settings are resolved once at startup into a plain [`Settings`] value and
//! passed explicitly to everything that needs them.
//!
//! # Precedence
//!
//! For every field, the first source that provides a value wins:
//!
//! 1. **Environment variable** (including `.env` files, which never override
//!    variables already set in the process environment).
//! 2. **Explicit value**: a flat top-level key in the YAML file
//!    (`ollama_base_url: ...`).
//! 3. **File-based override**: the legacy nested sections
//!    (`server.ollama_host`, `models.default_llm`, `models.embedding`).
//! 4. **Hardcoded default.**
//!
//! # Example `configs/app.yaml`
//!
//! ```yaml
//! ollama_base_url: http://127.0.0.1:11434
//! default_model: qwen2.5:7b-instruct
//! embedding_model: nomic-embed-text
//! api_prefix: /api
//! bind: 127.0.0.1:8000
//! pull_idle_timeout_secs: 300
//!
//! # legacy layout, still honoured below the flat keys
//! server:
//!   ollama_host: http://127.0.0.1:11434
//! models:
//!   default_llm: qwen2.5:7b-instruct
//!   embedding: nomic-embed-text
//! ```
//!
//! A missing YAML file is not an error; a malformed one is.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::pull::PullLimits;
use crate::runtime::{EndpointError, ModelSet, RuntimeEndpoint};

pub const DEFAULT_CONFIG_PATH: &str = "configs/app.yaml";
const DOTENV_PATHS: [&str; 2] = ["configs/.env", ".env"];

/// Fully resolved settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub environment: String,
    pub api_prefix: String,
    pub log_level: String,
    pub log_format: String,
    pub ollama_base_url: String,
    pub default_model: String,
    pub embedding_model: String,
    pub db_path: PathBuf,
    /// Root under which `storage/uploads`, `storage/rubrics` and
    /// `data/sources` live.
    pub storage_root: PathBuf,
    pub bind: String,
    pub ollama_executable: PathBuf,
    pub wait_timeout_secs: u64,
    pub probe_timeout_ms: u64,
    pub catalog_timeout_secs: u64,
    pub pull_idle_timeout_secs: u64,
    pub pull_deadline_secs: Option<u64>,
    /// Refuse to serve when a required model is missing after startup.
    pub strict_startup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            api_prefix: "/api".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
            default_model: "qwen2.5:7b-instruct".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            db_path: PathBuf::from("storage/app.db"),
            storage_root: PathBuf::from("."),
            bind: "127.0.0.1:8000".to_string(),
            ollama_executable: PathBuf::from("ollama"),
            wait_timeout_secs: 20,
            probe_timeout_ms: 1000,
            catalog_timeout_secs: 5,
            pull_idle_timeout_secs: 300,
            pull_deadline_secs: None,
            strict_startup: false,
        }
    }
}

/// Shape of the YAML file. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub environment: Option<String>,
    pub api_prefix: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub ollama_base_url: Option<String>,
    pub default_model: Option<String>,
    pub embedding_model: Option<String>,
    pub db_path: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub bind: Option<String>,
    pub ollama_executable: Option<PathBuf>,
    pub wait_timeout_secs: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub catalog_timeout_secs: Option<u64>,
    pub pull_idle_timeout_secs: Option<u64>,
    pub pull_deadline_secs: Option<u64>,
    pub strict_startup: Option<bool>,
    #[serde(default)]
    pub server: LegacyServerSection,
    #[serde(default)]
    pub models: LegacyModelsSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct LegacyServerSection {
    pub ollama_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LegacyModelsSection {
    pub default_llm: Option<String>,
    pub embedding: Option<String>,
}

/// Reads a variable from some environment. Empty values count as unset.
struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| (self.lookup)(*k))
            .find(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, keys: &[&str]) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(keys) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| anyhow::anyhow!("invalid value '{}' for {}: {}", raw, keys[0], e)),
            None => Ok(None),
        }
    }

    fn flag(&self, keys: &[&str]) -> Option<bool> {
        self.get(keys)
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
    }
}

fn pick<T>(env: Option<T>, explicit: Option<T>, file_override: Option<T>, default: T) -> T {
    env.or(explicit).or(file_override).unwrap_or(default)
}

impl Settings {
    /// Resolve settings from a parsed file and an environment lookup.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let d = Settings::default();

        let settings = Settings {
            environment: pick(env.get(&["ENVIRONMENT"]), file.environment, None, d.environment),
            api_prefix: pick(env.get(&["API_PREFIX"]), file.api_prefix, None, d.api_prefix),
            log_level: pick(env.get(&["LOG_LEVEL"]), file.log_level, None, d.log_level),
            log_format: pick(env.get(&["LOG_FORMAT"]), file.log_format, None, d.log_format),
            ollama_base_url: pick(
                env.get(&["OLLAMA_HOST", "OLLAMA_BASE_URL"]),
                file.ollama_base_url,
                file.server.ollama_host,
                d.ollama_base_url,
            ),
            default_model: pick(
                env.get(&["DEFAULT_MODEL"]),
                file.default_model,
                file.models.default_llm,
                d.default_model,
            ),
            embedding_model: pick(
                env.get(&["EMBED_MODEL", "EMBEDDING_MODEL"]),
                file.embedding_model,
                file.models.embedding,
                d.embedding_model,
            ),
            db_path: pick(env.get(&["DB_PATH"]).map(PathBuf::from), file.db_path, None, d.db_path),
            storage_root: pick(
                env.get(&["STORAGE_ROOT"]).map(PathBuf::from),
                file.storage_root,
                None,
                d.storage_root,
            ),
            bind: pick(env.get(&["BIND_ADDR"]), file.bind, None, d.bind),
            ollama_executable: pick(
                env.get(&["OLLAMA_BIN"]).map(PathBuf::from),
                file.ollama_executable,
                None,
                d.ollama_executable,
            ),
            wait_timeout_secs: pick(
                env.parse::<u64>(&["OLLAMA_WAIT_SECS"])?,
                file.wait_timeout_secs,
                None,
                d.wait_timeout_secs,
            ),
            probe_timeout_ms: pick(
                env.parse::<u64>(&["OLLAMA_PROBE_TIMEOUT_MS"])?,
                file.probe_timeout_ms,
                None,
                d.probe_timeout_ms,
            ),
            catalog_timeout_secs: pick(
                env.parse::<u64>(&["OLLAMA_CATALOG_TIMEOUT_SECS"])?,
                file.catalog_timeout_secs,
                None,
                d.catalog_timeout_secs,
            ),
            pull_idle_timeout_secs: pick(
                env.parse::<u64>(&["OLLAMA_PULL_IDLE_SECS"])?,
                file.pull_idle_timeout_secs,
                None,
                d.pull_idle_timeout_secs,
            ),
            pull_deadline_secs: env
                .parse::<u64>(&["OLLAMA_PULL_DEADLINE_SECS"])?
                .or(file.pull_deadline_secs),
            strict_startup: pick(
                env.flag(&["STRICT_STARTUP"]),
                file.strict_startup,
                None,
                d.strict_startup,
            ),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Err(e) = RuntimeEndpoint::parse(&self.ollama_base_url) {
            bail!("ollama_base_url: {}", e);
        }
        if !self.api_prefix.starts_with('/') {
            bail!("api_prefix must start with '/', got '{}'", self.api_prefix);
        }
        if self.default_model.trim().is_empty() || self.embedding_model.trim().is_empty() {
            bail!("default_model and embedding_model must not be empty");
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => bail!("Unknown log_format: '{}'. Must be text or json.", other),
        }
        if self.probe_timeout_ms == 0
            || self.catalog_timeout_secs == 0
            || self.pull_idle_timeout_secs == 0
        {
            bail!("runtime timeouts must be > 0");
        }
        if self.pull_deadline_secs == Some(0) {
            bail!("pull_deadline_secs must be > 0 when set");
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<RuntimeEndpoint, EndpointError> {
        RuntimeEndpoint::parse(&self.ollama_base_url)
    }

    /// The models the service needs: the chat model and the embedding model.
    pub fn required_models(&self) -> ModelSet {
        [self.default_model.as_str(), self.embedding_model.as_str()]
            .into_iter()
            .collect()
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn pull_limits(&self) -> PullLimits {
        PullLimits {
            idle_timeout: Duration::from_secs(self.pull_idle_timeout_secs),
            deadline: self.pull_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Parse a YAML settings file. Empty files yield an empty [`FileConfig`].
pub fn parse_file_config(content: &str) -> Result<FileConfig> {
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Read the YAML file at `path`, treating a missing file as empty.
pub fn read_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_file_config(&content)
}

/// Load settings from the process environment, `.env` files and the YAML
/// file at `path` (or `$APP_CONFIG_PATH`, or `configs/app.yaml`).
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    for dotenv in DOTENV_PATHS {
        let p = Path::new(dotenv);
        if p.exists() {
            dotenvy::from_path(p)
                .with_context(|| format!("Failed to load env file: {}", p.display()))?;
        }
    }

    let path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var("APP_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };
    let file = read_file_config(&path)?;
    Settings::resolve(file, |k| std::env::var(k).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    const BOTH_LAYOUTS: &str = r#"
ollama_base_url: http://flat:11434
default_model: flat-llm
server:
  ollama_host: http://nested:11434
models:
  default_llm: nested-llm
  embedding: nested-embed
"#;

    #[test]
    fn defaults_when_nothing_is_set() {
        let s = Settings::resolve(FileConfig::default(), env(&[])).unwrap();
        assert_eq!(s.ollama_base_url, "http://127.0.0.1:11434");
        assert_eq!(s.default_model, "qwen2.5:7b-instruct");
        assert_eq!(s.embedding_model, "nomic-embed-text");
        assert_eq!(s.api_prefix, "/api");
        assert_eq!(s.wait_timeout(), Duration::from_secs(20));
        assert_eq!(s.pull_limits(), PullLimits::default());
    }

    #[test]
    fn flat_keys_beat_nested_sections() {
        let file = parse_file_config(BOTH_LAYOUTS).unwrap();
        let s = Settings::resolve(file, env(&[])).unwrap();
        assert_eq!(s.ollama_base_url, "http://flat:11434");
        assert_eq!(s.default_model, "flat-llm");
        // No flat key: nested section wins over the default.
        assert_eq!(s.embedding_model, "nested-embed");
    }

    #[test]
    fn env_beats_everything() {
        let file = parse_file_config(BOTH_LAYOUTS).unwrap();
        let s = Settings::resolve(
            file,
            env(&[
                ("OLLAMA_HOST", "http://env:11434"),
                ("DEFAULT_MODEL", "env-llm"),
                ("EMBED_MODEL", "env-embed"),
            ]),
        )
        .unwrap();
        assert_eq!(s.ollama_base_url, "http://env:11434");
        assert_eq!(s.default_model, "env-llm");
        assert_eq!(s.embedding_model, "env-embed");
    }

    #[test]
    fn empty_env_value_counts_as_unset() {
        let file = parse_file_config(BOTH_LAYOUTS).unwrap();
        let s = Settings::resolve(file, env(&[("DEFAULT_MODEL", "")])).unwrap();
        assert_eq!(s.default_model, "flat-llm");
    }

    #[test]
    fn env_aliases() {
        let s = Settings::resolve(
            FileConfig::default(),
            env(&[
                ("OLLAMA_BASE_URL", "http://alias:1"),
                ("EMBEDDING_MODEL", "alias-embed"),
            ]),
        )
        .unwrap();
        assert_eq!(s.ollama_base_url, "http://alias:1");
        assert_eq!(s.embedding_model, "alias-embed");
    }

    #[test]
    fn numeric_env_values_are_validated() {
        let err = Settings::resolve(FileConfig::default(), env(&[("OLLAMA_WAIT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("OLLAMA_WAIT_SECS"));

        let s = Settings::resolve(
            FileConfig::default(),
            env(&[("OLLAMA_WAIT_SECS", "3"), ("OLLAMA_PULL_DEADLINE_SECS", "600")]),
        )
        .unwrap();
        assert_eq!(s.wait_timeout(), Duration::from_secs(3));
        assert_eq!(s.pull_limits().deadline, Some(Duration::from_secs(600)));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_url = parse_file_config("ollama_base_url: localhost:11434").unwrap();
        assert!(Settings::resolve(bad_url, env(&[])).is_err());

        let bad_prefix = parse_file_config("api_prefix: api").unwrap();
        assert!(Settings::resolve(bad_prefix, env(&[])).is_err());

        let bad_format = parse_file_config("log_format: xml").unwrap();
        assert!(Settings::resolve(bad_format, env(&[])).is_err());
    }

    #[test]
    fn unknown_keys_are_ignored_and_empty_file_is_fine() {
        assert!(parse_file_config("something_else: 1\n").is_ok());
        assert!(parse_file_config("").is_ok());
        assert!(parse_file_config("ollama_base_url: [unclosed").is_err());
    }

    #[test]
    fn missing_file_is_empty_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = read_file_config(&tmp.path().join("nope.yaml")).unwrap();
        assert!(file.ollama_base_url.is_none());
    }

    #[test]
    fn required_models_dedup() {
        let s = Settings::resolve(
            FileConfig::default(),
            env(&[("DEFAULT_MODEL", "same"), ("EMBED_MODEL", "same")]),
        )
        .unwrap();
        assert_eq!(s.required_models().len(), 1);
    }
}
