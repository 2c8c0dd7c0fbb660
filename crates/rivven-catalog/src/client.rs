//! Registry client boundary
//!
//! The catalog needs exactly one thing from the registry: the body of a `GET`
//! that answered `200 OK`. Everything else (other statuses, transport errors,
//! timeouts) is "no result" and is handled by the caller's retry policy.

use crate::config::{CatalogConfig, UseId};
use crate::error::{CatalogError, CatalogResult};
use crate::types::SchemaId;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

const ARTIFACT_BY_GLOBAL_ID_PATH: &str = "/apis/registry/v2/ids/globalIds";
const ARTIFACT_BY_CONTENT_ID_PATH: &str = "/apis/registry/v2/ids/contentIds";
const GROUPS_PATH: &str = "/apis/registry/v2/groups";

/// Version selecting an artifact's newest version
pub const VERSION_LATEST: &str = "latest";

/// Fetches registry resources
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Body of a successful `GET` for `path`, or `None`
    async fn get(&self, path: &str) -> Option<String>;
}

/// Registry paths for a configured group and id mode
#[derive(Debug, Clone)]
pub struct RegistryPaths {
    group_id: String,
    use_id: UseId,
}

impl RegistryPaths {
    pub fn new(group_id: impl Into<String>, use_id: UseId) -> Self {
        Self {
            group_id: group_id.into(),
            use_id,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(config.group_id.clone(), config.use_id)
    }

    /// Schema content by content or global id
    pub fn schema_by_id(&self, id: SchemaId) -> String {
        match self.use_id {
            UseId::ContentId => format!("{}/{}", ARTIFACT_BY_CONTENT_ID_PATH, id),
            UseId::GlobalId => format!("{}/{}", ARTIFACT_BY_GLOBAL_ID_PATH, id),
        }
    }

    /// Artifact metadata for a subject at `version`, or its latest version
    ///
    /// Group, subject and version are percent-encoded as single path segments.
    pub fn subject_version(&self, subject: &str, version: &str) -> String {
        let encode = |s: &str| urlencoding::encode(s).into_owned();
        let group = encode(&self.group_id);
        let subject = encode(subject);
        if version == VERSION_LATEST {
            format!("{}/{}/artifacts/{}/meta", GROUPS_PATH, group, subject)
        } else {
            format!(
                "{}/{}/artifacts/{}/versions/{}/meta",
                GROUPS_PATH,
                group,
                subject,
                encode(version)
            )
        }
    }
}

/// Extract the configured id attribute from an artifact metadata body
///
/// Anything other than a JSON object holding a non-negative 32-bit integer at
/// `attribute` is a malformed response.
pub fn parse_id(body: &str, attribute: &str) -> Option<SchemaId> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let id = value.get(attribute)?.as_u64()?;
    u32::try_from(id).ok().map(SchemaId::new)
}

/// HTTP registry client
pub struct HttpRegistryClient {
    client: Client,
    base_url: Url,
}

impl HttpRegistryClient {
    pub fn new(config: &CatalogConfig) -> CatalogResult<Self> {
        let base_url = Url::parse(&config.url).map_err(|e| CatalogError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute `path` replaces the base URL's path, as URI resolution does
    fn resolve(&self, path: &str) -> Option<Url> {
        match self.base_url.join(path) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(path = %path, error = %e, "Invalid registry path");
                None
            }
        }
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get(&self, path: &str) -> Option<String> {
        let url = self.resolve(path)?;
        debug!(url = %url, "Fetching from registry");

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Registry request failed");
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!(url = %url, status = %status, "Registry returned non-OK status");
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to read registry response");
                None
            }
        }
    }
}
