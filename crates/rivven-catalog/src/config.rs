//! Catalog configuration
//!
//! ```yaml
//! url: ${APICURIO_URL:-http://localhost:8080}
//! group_id: payments
//! use_id: contentId
//! id_encoding: legacy
//! max_age_secs: 300
//! ```

use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use validator::Validate;

/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

/// Which registry id identifies a schema on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UseId {
    /// Content id: shared by every artifact version with identical content
    #[serde(rename = "contentId", alias = "content_id")]
    ContentId,
    /// Global id: unique per artifact version
    #[default]
    #[serde(rename = "globalId", alias = "global_id")]
    GlobalId,
}

impl UseId {
    /// JSON attribute carrying this id in artifact metadata responses
    pub fn attribute(&self) -> &'static str {
        match self {
            UseId::ContentId => "contentId",
            UseId::GlobalId => "globalId",
        }
    }
}

impl std::fmt::Display for UseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.attribute())
    }
}

/// Width of the id field in the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdEncoding {
    /// 8-byte big-endian id
    #[default]
    Default,
    /// 4-byte big-endian id
    Legacy,
}

impl std::str::FromStr for IdEncoding {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "legacy" => Ok(Self::Legacy),
            _ => Err(CatalogError::Config(format!("Unknown id encoding: {}", s))),
        }
    }
}

impl std::fmt::Display for IdEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// Configuration for an Apicurio-backed catalog
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CatalogConfig {
    /// Registry base URL
    #[validate(url)]
    pub url: String,

    /// Artifact group
    #[serde(default = "default_group_id")]
    #[validate(length(min = 1, max = 255))]
    pub group_id: String,

    /// Id used on the wire and read from metadata responses
    #[serde(default)]
    pub use_id: UseId,

    /// Envelope id width
    #[serde(default)]
    pub id_encoding: IdEncoding,

    /// How long a subject/version mapping stays fresh; also caps retry backoff
    #[serde(default = "default_max_age_secs")]
    #[validate(range(min = 1, max = 86_400))]
    pub max_age_secs: u64,

    /// First retry delay after a failed subject/version refresh
    #[serde(default = "default_retry_initial_delay_ms")]
    #[validate(range(min = 1, max = 3_600_000))]
    pub retry_initial_delay_ms: u64,

    /// Upper bound on a single registry request
    #[serde(default = "default_request_timeout_ms")]
    #[validate(range(min = 100, max = 300_000))]
    pub request_timeout_ms: u64,

    /// Entries kept in each handler-local cache
    #[serde(default = "default_cache_capacity")]
    #[validate(range(min = 1, max = 1_048_576))]
    pub cache_capacity: usize,
}

fn default_group_id() -> String {
    "default".to_string()
}

fn default_max_age_secs() -> u64 {
    300
}

fn default_retry_initial_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_cache_capacity() -> usize {
    1024
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            group_id: default_group_id(),
            use_id: UseId::default(),
            id_encoding: IdEncoding::default(),
            max_age_secs: default_max_age_secs(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl CatalogConfig {
    /// Create config for a registry URL with defaults
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_use_id(mut self, use_id: UseId) -> Self {
        self.use_id = use_id;
        self
    }

    pub fn with_id_encoding(mut self, encoding: IdEncoding) -> Self {
        self.id_encoding = encoding;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = max_age.as_secs().max(1);
        self
    }

    pub fn with_retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay_ms = u64::try_from(delay.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    /// Raised to the 100ms floor the validator enforces
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(MIN_REQUEST_TIMEOUT_MS);
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse and validate a YAML document, expanding environment variables
    pub fn from_yaml(content: &str) -> CatalogResult<Self> {
        let expanded = Self::expand_env_vars(content);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.group_id, "default");
        assert_eq!(config.use_id, UseId::GlobalId);
        assert_eq!(config.id_encoding, IdEncoding::Default);
        assert_eq!(config.max_age(), Duration::from_secs(300));
        assert_eq!(config.retry_initial_delay(), Duration::from_millis(1000));
        assert_eq!(config.cache_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
url: http://registry:8080
group_id: payments
use_id: contentId
id_encoding: legacy
max_age_secs: 60
"#;
        let config = CatalogConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.url, "http://registry:8080");
        assert_eq!(config.group_id, "payments");
        assert_eq!(config.use_id, UseId::ContentId);
        assert_eq!(config.id_encoding, IdEncoding::Legacy);
        assert_eq!(config.max_age(), Duration::from_secs(60));
        assert_eq!(config.request_timeout(), Duration::from_millis(10_000));
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("RIVVEN_CATALOG_MISSING_URL");
        let yaml = "url: ${RIVVEN_CATALOG_MISSING_URL:-http://fallback:8080}";
        let config = CatalogConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.url, "http://fallback:8080");
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("RIVVEN_CATALOG_TEST_GROUP", "orders");
        let expanded = CatalogConfig::expand_env_vars("group_id: ${RIVVEN_CATALOG_TEST_GROUP}");
        assert_eq!(expanded, "group_id: orders");
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = CatalogConfig::from_yaml("url: not-a-url");
        assert!(matches!(result, Err(CatalogError::Validation(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CatalogConfig::default().with_cache_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_clamped_to_floor() {
        let config = CatalogConfig::default().with_request_timeout(Duration::ZERO);
        assert_eq!(config.request_timeout(), Duration::from_millis(100));
        assert!(config.validate().is_ok());

        let config = CatalogConfig::default().with_request_timeout(Duration::from_millis(2500));
        assert_eq!(config.request_timeout_ms, 2500);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = CatalogConfig::default()
            .with_request_timeout(Duration::MAX)
            .with_retry_initial_delay(Duration::MAX);
        assert_eq!(config.request_timeout_ms, u64::MAX);
        assert_eq!(config.retry_initial_delay_ms, u64::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_use_id_attribute() {
        assert_eq!(UseId::ContentId.attribute(), "contentId");
        assert_eq!(UseId::GlobalId.to_string(), "globalId");
    }

    #[test]
    fn test_id_encoding_parse() {
        assert_eq!("legacy".parse::<IdEncoding>().unwrap(), IdEncoding::Legacy);
        assert_eq!("DEFAULT".parse::<IdEncoding>().unwrap(), IdEncoding::Default);
        assert!("wide".parse::<IdEncoding>().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, "url: http://localhost:8081\ngroup_id: g1\n").unwrap();

        let config = CatalogConfig::from_file(&path).unwrap();
        assert_eq!(config.url, "http://localhost:8081");
        assert_eq!(config.group_id, "g1");
    }
}
