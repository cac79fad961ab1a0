//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then environment
//! variables prefixed with `SCIMESH` using `__` as the nesting separator, for example
//! `SCIMESH__PROVIDER__SCOPUS__API_KEY` or `SCIMESH__SEARCH__MAX_RESULTS_PER_PROVIDER`.
//! Nothing here runs implicitly; adapters receive their credentials through
//! [`ProviderOptions`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{OnError, ProviderOptions, SearchOptions};

/// File name looked up in the working directory
const LOCAL_CONFIG_FILE: &str = "scimesh.toml";

/// Conventional credential variables, applied when the layered config has none
const CREDENTIAL_ENV: &[(&str, &str)] = &[
    ("scopus", "SCOPUS_API_KEY"),
    ("semantic_scholar", "SEMANTIC_SCHOLAR_API_KEY"),
];

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchDefaults,

    /// Per-provider options keyed by provider id
    #[serde(default)]
    pub provider: ProvidersConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Configuration from defaults and `SCIMESH__*` environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(environment())
            .build()?;
        let mut config: Config = settings.try_deserialize()?;
        config.apply_credential_env();
        Ok(config)
    }

    /// Options for one provider; unknown ids get defaults
    pub fn provider(&self, id: &str) -> ProviderOptions {
        self.provider.get(id).cloned().unwrap_or_default()
    }

    /// Search options seeded from the configured defaults
    pub fn search_options(&self) -> SearchOptions {
        self.search.to_options()
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    fn apply_credential_env(&mut self) {
        for (id, var) in CREDENTIAL_ENV {
            let Some(options) = self.provider.get_mut(id) else {
                continue;
            };
            if options.api_key.is_none() {
                options.api_key = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            }
        }
    }
}

/// Defaults applied to every search unless the caller overrides them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    /// Providers queried when the caller names none; empty means every registered one
    pub providers: Vec<String>,
    pub max_results_per_provider: usize,
    pub total_max_results: Option<usize>,
    pub on_error: OnError,
    pub stream: bool,
    pub dedupe: bool,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        let options = SearchOptions::default();
        Self {
            providers: Vec::new(),
            max_results_per_provider: options.max_results_per_provider,
            total_max_results: options.total_max_results,
            on_error: options.on_error,
            stream: options.stream,
            dedupe: options.dedupe,
        }
    }
}

impl SearchDefaults {
    pub fn to_options(&self) -> SearchOptions {
        SearchOptions {
            max_results_per_provider: self.max_results_per_provider,
            total_max_results: self.total_max_results,
            on_error: self.on_error,
            stream: self.stream,
            dedupe: self.dedupe,
        }
    }
}

/// Options for each built-in provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub arxiv: ProviderOptions,
    pub openalex: ProviderOptions,
    pub crossref: ProviderOptions,
    pub semantic_scholar: ProviderOptions,
    pub scopus: ProviderOptions,
}

impl ProvidersConfig {
    pub fn get(&self, id: &str) -> Option<&ProviderOptions> {
        match id {
            "arxiv" => Some(&self.arxiv),
            "openalex" => Some(&self.openalex),
            "crossref" => Some(&self.crossref),
            "semantic_scholar" => Some(&self.semantic_scholar),
            "scopus" => Some(&self.scopus),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ProviderOptions> {
        match id {
            "arxiv" => Some(&mut self.arxiv),
            "openalex" => Some(&mut self.openalex),
            "crossref" => Some(&mut self.crossref),
            "semantic_scholar" => Some(&mut self.semantic_scholar),
            "scopus" => Some(&mut self.scopus),
            _ => None,
        }
    }
}

/// HTTP transport settings shared by every adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix("SCIMESH")
        .separator("__")
        .try_parsing(true)
}

/// Load configuration from a file, overlaid with `SCIMESH__*` environment variables
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::from(path))
        .add_source(environment())
        .build()?;

    let mut config: Config = settings.try_deserialize()?;
    config.apply_credential_env();
    Ok(config)
}

/// First existing config file: `./scimesh.toml`, then the user config directory
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    default_config_path().filter(|p| p.is_file())
}

/// `<config dir>/scimesh/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scimesh").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.max_results_per_provider, 100);
        assert_eq!(config.search.on_error, OnError::Warn);
        assert!(config.search.dedupe);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("scimesh/"));
        assert_eq!(config.provider("nope"), ProviderOptions::default());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[search]
providers = ["openalex", "crossref"]
max_results_per_provider = 25
on_error = "fail"

[provider.openalex]
contact = "me@example.org"
page_size = 50

[provider.scopus]
api_key = "file-key"
requests_per_second = 2.0

[http]
timeout_secs = 5
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.search.providers, vec!["openalex", "crossref"]);
        assert_eq!(config.search.max_results_per_provider, 25);
        assert_eq!(config.search.on_error, OnError::Fail);
        assert!(config.search.dedupe);
        assert_eq!(config.provider("openalex").contact.as_deref(), Some("me@example.org"));
        assert_eq!(config.provider("openalex").page_size, Some(50));
        assert_eq!(config.provider("scopus").api_key.as_deref(), Some("file-key"));
        assert_eq!(config.provider("scopus").requests_per_second, Some(2.0));
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 10);

        let options = config.search_options();
        assert_eq!(options.max_results_per_provider, 25);
        assert_eq!(options.on_error, OnError::Fail);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.provider.crossref.contact = Some("saved@example.org".to_string());
        config.search.total_max_results = Some(40);
        config.save(&path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.provider("crossref").contact.as_deref(), Some("saved@example.org"));
        assert_eq!(loaded.search.total_max_results, Some(40));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config(Path::new("/nonexistent/scimesh.toml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "invalid = toml = content").unwrap();
        assert!(load_config(&path).is_err());
    }
}
