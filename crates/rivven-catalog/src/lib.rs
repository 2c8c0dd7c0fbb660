//! # Rivven Catalog
//!
//! Schema-identifier resolution cache and envelope codec for data-plane
//! bindings backed by an Apicurio registry.
//!
//! ## Features
//!
//! - **Two-way resolution**: schema id to content, subject/version to id
//! - **Single-flight**: concurrent callers for one key share one registry call
//! - **Permanent content**: schema content for an id is fetched once
//! - **Freshness and backoff**: subject/version mappings expire after max-age,
//!   failed refreshes back off exponentially and serve the last known id
//! - **Envelope codec**: `0x00` marker with a 4-byte or 8-byte big-endian id
//! - **Edge-triggered events**: first failure and recovery, never per retry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  CatalogHandler (trait)                  │
//! │  resolve_schema · resolve_id · decode · encode           │
//! ├──────────────────────────────────────────────────────────┤
//! │  ApicurioCatalog                                         │
//! │  ├── BoundedCache      handler-local LRU                 │
//! │  ├── CatalogCache      shared SingleFlight tables        │
//! │  ├── RetryPolicy       backoff + max-age                 │
//! │  ├── IdCodec           envelope width strategy           │
//! │  └── EventSink         transition events                 │
//! ├──────────────────────────────────────────────────────────┤
//! │  RegistryClient (trait) ── HttpRegistryClient (reqwest)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rivven_catalog::{ApicurioCatalog, CatalogConfig, CatalogHandler, PassThrough};
//!
//! let config = CatalogConfig::new("http://localhost:8080").with_group_id("payments");
//! let catalog = ApicurioCatalog::new(config, 1)?;
//!
//! if let Some(id) = catalog.resolve_id("orders", "latest").await {
//!     let mut record = Vec::new();
//!     catalog.encode(0, 0, id, b"payload", &mut record, &PassThrough)?;
//! }
//! ```
//!
//! Handlers for the same catalog can share resolution state:
//!
//! ```rust,ignore
//! let shared = Arc::new(CatalogCache::new());
//! let a = ApicurioCatalog::new(config.clone(), 1)?.with_cache(shared.clone());
//! let b = ApicurioCatalog::new(config, 1)?.with_cache(shared);
//! ```

pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod flight;
pub mod key;
pub mod retry;
pub mod types;

pub use cache::BoundedCache;
pub use catalog::{ApicurioCatalog, CatalogCache, CatalogHandler};
pub use client::{parse_id, HttpRegistryClient, RegistryClient, RegistryPaths, VERSION_LATEST};
pub use config::{CatalogConfig, IdEncoding, UseId};
pub use envelope::{
    CodecError, CodecResult, IdCodec, PassThrough, PayloadContext, PayloadDecoder,
    PayloadEncoder, ValueSink, MAGIC_BYTE, MAX_ENVELOPE_LEN,
};
pub use error::{CatalogError, CatalogResult};
pub use event::{CatalogEvent, EventSink, NoopEventSink, TracingEventSink};
pub use flight::{Claim, Flight, FlightGuard, SingleFlight};
pub use key::{composite_key, SubjectVersionKey};
pub use retry::{CachedSchema, ForwardMapping, RetryPolicy, RetryState};
pub use types::{ResolvedSchema, SchemaId};
