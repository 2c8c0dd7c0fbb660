//! Catalog handler
//!
//! [`ApicurioCatalog`] resolves schema ids against an Apicurio registry in two
//! directions and frames records with the id envelope:
//!
//! ```text
//!   resolve_schema(id)              resolve_id(subject, version)
//!          │                                   │
//!   local LRU (permanent)           local LRU (fresh for max-age)
//!          │ miss                              │ miss / expired
//!   shared SingleFlight ────────────── shared SingleFlight
//!          │ leader only                       │ leader only, after backoff
//!          └──────────── RegistryClient ───────┘
//! ```
//!
//! The local tier belongs to one handler. The shared tier lives in a
//! [`CatalogCache`] that any number of handlers for the same catalog can hold.

use crate::cache::BoundedCache;
use crate::client::{parse_id, HttpRegistryClient, RegistryClient, RegistryPaths};
use crate::config::CatalogConfig;
use crate::envelope::{
    CodecResult, IdCodec, PayloadDecoder, PayloadEncoder, ValueSink, MAX_ENVELOPE_LEN,
};
use crate::error::CatalogResult;
use crate::event::{CatalogEvent, EventSink, TracingEventSink};
use crate::flight::SingleFlight;
use crate::key::{composite_key, SubjectVersionKey};
use crate::retry::{CachedSchema, ForwardMapping, RetryPolicy};
use crate::types::{ResolvedSchema, SchemaId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Data-plane view of a schema catalog
#[async_trait]
pub trait CatalogHandler: Send + Sync {
    /// Schema content for `id`; `None` if it cannot be fetched right now
    async fn resolve_schema(&self, id: SchemaId) -> Option<Arc<str>>;

    /// Id for `subject` at `version` (`"latest"` or a version number)
    ///
    /// May be a stale id while the registry is failing.
    async fn resolve_id(&self, subject: &str, version: &str) -> Option<SchemaId>;

    /// Id carried by the envelope at the start of `data`
    fn resolve_envelope_id(&self, data: &[u8]) -> Option<SchemaId>;

    /// Strip the envelope and decode the payload into `sink`
    fn decode(
        &self,
        trace_id: u64,
        stream_id: u64,
        data: &[u8],
        sink: &mut dyn ValueSink,
        decoder: &dyn PayloadDecoder,
    ) -> CodecResult<usize>;

    /// Write the envelope for `schema_id` and the encoded payload into `sink`
    ///
    /// Nothing reaches `sink` unless the payload encoder succeeds.
    fn encode(
        &self,
        trace_id: u64,
        stream_id: u64,
        schema_id: SchemaId,
        data: &[u8],
        sink: &mut dyn ValueSink,
        encoder: &dyn PayloadEncoder,
    ) -> CodecResult<usize>;

    /// Headroom to reserve ahead of an encoded payload
    fn encode_padding(&self) -> usize {
        MAX_ENVELOPE_LEN
    }
}

/// Resolution state shared by handlers of one catalog
#[derive(Default)]
pub struct CatalogCache {
    schemas: SingleFlight<SchemaId, CachedSchema>,
    ids: SingleFlight<SubjectVersionKey, ForwardMapping>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids with a shared entry, resolved or not
    pub fn schema_entries(&self) -> usize {
        self.schemas.len()
    }

    /// Subject/version pairs with a shared entry
    pub fn id_entries(&self) -> usize {
        self.ids.len()
    }
}

impl std::fmt::Debug for CatalogCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogCache")
            .field("schemas", &self.schemas.len())
            .field("ids", &self.ids.len())
            .finish()
    }
}

/// Apicurio-backed catalog handler
pub struct ApicurioCatalog {
    catalog_id: u64,
    config: CatalogConfig,
    client: Arc<dyn RegistryClient>,
    events: Arc<dyn EventSink>,
    cache: Arc<CatalogCache>,
    paths: RegistryPaths,
    id_codec: IdCodec,
    policy: RetryPolicy,
    request_timeout: Duration,
    schemas: BoundedCache<SchemaId, Arc<str>>,
    ids: BoundedCache<u32, (SubjectVersionKey, Arc<ForwardMapping>)>,
}

impl ApicurioCatalog {
    /// Handler talking HTTP to `config.url`, with its own shared cache
    pub fn new(config: CatalogConfig, catalog_id: u64) -> CatalogResult<Self> {
        let client = Arc::new(HttpRegistryClient::new(&config)?);
        Ok(Self::with_client(config, catalog_id, client))
    }

    /// Handler using a custom registry client
    pub fn with_client(
        config: CatalogConfig,
        catalog_id: u64,
        client: Arc<dyn RegistryClient>,
    ) -> Self {
        let paths = RegistryPaths::from_config(&config);
        let id_codec = IdCodec::new(config.id_encoding);
        let policy = RetryPolicy::new(config.retry_initial_delay(), config.max_age());
        let request_timeout = config.request_timeout();
        let schemas = BoundedCache::new(config.cache_capacity);
        let ids = BoundedCache::new(config.cache_capacity);

        Self {
            catalog_id,
            config,
            client,
            events: Arc::new(TracingEventSink),
            cache: Arc::new(CatalogCache::new()),
            paths,
            id_codec,
            policy,
            request_timeout,
            schemas,
            ids,
        }
    }

    /// Share resolution state with other handlers of the same catalog
    pub fn with_cache(mut self, cache: Arc<CatalogCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn catalog_id(&self) -> u64 {
        self.catalog_id
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    pub fn id_codec(&self) -> IdCodec {
        self.id_codec
    }

    /// Schema content for `id` together with the id
    pub async fn resolve_schema_entry(&self, id: SchemaId) -> Option<ResolvedSchema> {
        let schema = self.resolve_schema(id).await?;
        Some(ResolvedSchema { id, schema })
    }

    async fn fetch(&self, path: &str) -> Option<String> {
        match tokio::time::timeout(self.request_timeout, self.client.get(path)).await {
            Ok(body) => body,
            Err(_) => {
                let timeout_ms =
                    u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    catalog_id = self.catalog_id,
                    path = %path,
                    timeout_ms,
                    "Registry request timed out"
                );
                None
            }
        }
    }

    async fn fetch_schema(
        &self,
        id: SchemaId,
        previous: Option<Arc<CachedSchema>>,
    ) -> CachedSchema {
        let retry = previous.map(|p| p.retry).unwrap_or_default();
        let path = self.paths.schema_by_id(id);

        match self.fetch(&path).await {
            Some(body) => {
                let (retry, recovered) = retry.succeed();
                if recovered {
                    self.events.emit(CatalogEvent::RetrievedSchemaId {
                        catalog_id: self.catalog_id,
                        schema_id: id,
                    });
                }
                CachedSchema {
                    schema: Some(Arc::from(body)),
                    retry,
                }
            }
            None => {
                let (retry, first) = retry.fail();
                if first {
                    self.events.emit(CatalogEvent::UnretrievableSchemaId {
                        catalog_id: self.catalog_id,
                        schema_id: id,
                    });
                }
                CachedSchema {
                    schema: None,
                    retry,
                }
            }
        }
    }

    async fn fetch_id(
        &self,
        key: &SubjectVersionKey,
        previous: Option<Arc<ForwardMapping>>,
    ) -> ForwardMapping {
        let previous = previous.as_deref();
        let retry = previous.map(|p| p.retry).unwrap_or_default();
        let path = self.paths.subject_version(key.subject(), key.version());

        let resolved = self
            .fetch(&path)
            .await
            .and_then(|body| parse_id(&body, self.config.use_id.attribute()));
        let now = Instant::now();

        match resolved {
            Some(id) => {
                let (_, recovered) = retry.succeed();
                if recovered {
                    self.events.emit(CatalogEvent::RetrievedSubjectVersion {
                        catalog_id: self.catalog_id,
                        subject: key.subject().to_string(),
                        version: key.version().to_string(),
                    });
                }
                debug!(
                    catalog_id = self.catalog_id,
                    subject = key.subject(),
                    version = key.version(),
                    schema_id = %id,
                    "Resolved subject version"
                );
                ForwardMapping::resolved(id, now)
            }
            None => {
                let (retry, first) = retry.fail();
                if first {
                    self.events.emit(CatalogEvent::UnretrievableSubjectVersion {
                        catalog_id: self.catalog_id,
                        subject: key.subject().to_string(),
                        version: key.version().to_string(),
                    });
                    if let Some(stale) = previous.and_then(|p| p.id) {
                        self.events
                            .emit(CatalogEvent::UnretrievableSubjectVersionStaleSchema {
                                catalog_id: self.catalog_id,
                                subject: key.subject().to_string(),
                                version: key.version().to_string(),
                                schema_id: stale,
                            });
                    }
                }
                let retry_after = self
                    .policy
                    .next_delay(previous.map_or(Duration::ZERO, |p| p.retry_after));
                ForwardMapping::failed(previous, retry, retry_after, now)
            }
        }
    }
}

#[async_trait]
impl CatalogHandler for ApicurioCatalog {
    async fn resolve_schema(&self, id: SchemaId) -> Option<Arc<str>> {
        if let Some(schema) = self.schemas.get(&id) {
            return Some(schema);
        }

        let cached = self
            .cache
            .schemas
            .resolve(&id, CachedSchema::refreshable, |previous| {
                self.fetch_schema(id, previous)
            })
            .await?;

        let schema = cached.schema.clone()?;
        self.schemas.insert(id, schema.clone());
        Some(schema)
    }

    async fn resolve_id(&self, subject: &str, version: &str) -> Option<SchemaId> {
        let crc = composite_key(subject, version);
        let max_age = self.policy.max_age();

        if let Some((key, mapping)) = self.ids.get(&crc) {
            if key.matches(subject, version) && !mapping.expired(Instant::now(), max_age) {
                return mapping.id;
            }
        }

        let key = SubjectVersionKey::with_crc(crc, subject, version);
        let now = Instant::now();
        let mapping = self
            .cache
            .ids
            .resolve(
                &key,
                |existing| existing.refreshable(now, max_age),
                |previous| self.fetch_id(&key, previous),
            )
            .await?;

        let id = mapping.id?;
        if mapping.is_stale(Instant::now(), max_age) {
            debug!(
                catalog_id = self.catalog_id,
                subject = subject,
                version = version,
                schema_id = %id,
                attempts = mapping.retry.attempts(),
                "Serving stale schema id"
            );
        }
        self.ids.insert(crc, (key, mapping));
        Some(id)
    }

    fn resolve_envelope_id(&self, data: &[u8]) -> Option<SchemaId> {
        self.id_codec.resolve_id(data)
    }

    fn decode(
        &self,
        trace_id: u64,
        stream_id: u64,
        data: &[u8],
        sink: &mut dyn ValueSink,
        decoder: &dyn PayloadDecoder,
    ) -> CodecResult<usize> {
        self.id_codec.decode(trace_id, stream_id, data, sink, decoder)
    }

    fn encode(
        &self,
        trace_id: u64,
        stream_id: u64,
        schema_id: SchemaId,
        data: &[u8],
        sink: &mut dyn ValueSink,
        encoder: &dyn PayloadEncoder,
    ) -> CodecResult<usize> {
        self.id_codec
            .encode(trace_id, stream_id, schema_id, data, sink, encoder)
    }
}

impl std::fmt::Debug for ApicurioCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApicurioCatalog")
            .field("catalog_id", &self.catalog_id)
            .field("url", &self.config.url)
            .field("group_id", &self.config.group_id)
            .field("id_codec", &self.id_codec)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::PassThrough;

    struct Unreachable;

    #[async_trait]
    impl RegistryClient for Unreachable {
        async fn get(&self, _path: &str) -> Option<String> {
            None
        }
    }

    fn catalog(config: CatalogConfig) -> ApicurioCatalog {
        ApicurioCatalog::with_client(config, 1, Arc::new(Unreachable))
    }

    #[test]
    fn test_encode_padding_is_widest_envelope() {
        let legacy = catalog(
            CatalogConfig::default().with_id_encoding(crate::config::IdEncoding::Legacy),
        );
        assert_eq!(legacy.encode_padding(), 9);
        assert_eq!(legacy.id_codec().envelope_len(), 5);
    }

    #[test]
    fn test_envelope_width_follows_config() {
        let legacy = catalog(
            CatalogConfig::default().with_id_encoding(crate::config::IdEncoding::Legacy),
        );
        let mut out = Vec::new();
        let len = legacy
            .encode(0, 0, SchemaId::new(7), b"v", &mut out, &PassThrough)
            .unwrap();
        assert_eq!(len, 6);
        assert_eq!(legacy.resolve_envelope_id(&out), Some(SchemaId::new(7)));

        let wide = catalog(CatalogConfig::default());
        let mut out = Vec::new();
        let len = wide
            .encode(0, 0, SchemaId::new(7), b"v", &mut out, &PassThrough)
            .unwrap();
        assert_eq!(len, 10);

        let mut decoded = Vec::new();
        wide.decode(0, 0, &out, &mut decoded, &PassThrough).unwrap();
        assert_eq!(decoded, b"v");
    }

    #[tokio::test]
    async fn test_unreachable_registry_yields_none() {
        let catalog = catalog(CatalogConfig::default());
        assert!(catalog.resolve_schema(SchemaId::new(1)).await.is_none());
        assert!(catalog.resolve_id("orders", "latest").await.is_none());
        assert_eq!(catalog.cache().schema_entries(), 1);
        assert_eq!(catalog.cache().id_entries(), 1);
    }
}
