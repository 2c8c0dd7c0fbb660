//! Catalog events
//!
//! Emitted on edge transitions only: the first failure of a streak, the
//! recovery that ends it, and the first time a stale id is served.

use crate::types::SchemaId;
use std::sync::Arc;
use tracing::{info, warn};

/// Observable catalog transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// Schema content for an id could not be fetched
    UnretrievableSchemaId { catalog_id: u64, schema_id: SchemaId },

    /// Schema content for an id was fetched after earlier failures
    RetrievedSchemaId { catalog_id: u64, schema_id: SchemaId },

    /// Subject/version could not be resolved to an id
    UnretrievableSubjectVersion {
        catalog_id: u64,
        subject: String,
        version: String,
    },

    /// Subject/version refresh failed; a previously resolved id is served
    UnretrievableSubjectVersionStaleSchema {
        catalog_id: u64,
        subject: String,
        version: String,
        schema_id: SchemaId,
    },

    /// Subject/version resolved again after earlier failures
    RetrievedSubjectVersion {
        catalog_id: u64,
        subject: String,
        version: String,
    },
}

impl CatalogEvent {
    pub fn catalog_id(&self) -> u64 {
        match self {
            Self::UnretrievableSchemaId { catalog_id, .. }
            | Self::RetrievedSchemaId { catalog_id, .. }
            | Self::UnretrievableSubjectVersion { catalog_id, .. }
            | Self::UnretrievableSubjectVersionStaleSchema { catalog_id, .. }
            | Self::RetrievedSubjectVersion { catalog_id, .. } => *catalog_id,
        }
    }

    /// Stable event name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnretrievableSchemaId { .. } => "UNRETRIEVABLE_SCHEMA_ID",
            Self::RetrievedSchemaId { .. } => "RETRIEVED_SCHEMA_ID",
            Self::UnretrievableSubjectVersion { .. } => "UNRETRIEVABLE_SCHEMA_SUBJECT_VERSION",
            Self::UnretrievableSubjectVersionStaleSchema { .. } => {
                "UNRETRIEVABLE_SCHEMA_SUBJECT_VERSION_STALE_SCHEMA"
            }
            Self::RetrievedSubjectVersion { .. } => "RETRIEVED_SCHEMA_SUBJECT_VERSION",
        }
    }

    /// Whether this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::UnretrievableSchemaId { .. }
                | Self::UnretrievableSubjectVersion { .. }
                | Self::UnretrievableSubjectVersionStaleSchema { .. }
        )
    }
}

impl std::fmt::Display for CatalogEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnretrievableSchemaId { schema_id, .. } => {
                write!(f, "Unable to fetch schema id {}", schema_id)
            }
            Self::RetrievedSchemaId { schema_id, .. } => {
                write!(f, "Fetched schema id {} after earlier failures", schema_id)
            }
            Self::UnretrievableSubjectVersion {
                subject, version, ..
            } => write!(f, "Unable to resolve {} version {}", subject, version),
            Self::UnretrievableSubjectVersionStaleSchema {
                subject,
                version,
                schema_id,
                ..
            } => write!(
                f,
                "Unable to resolve {} version {}, using stale schema id {}",
                subject, version, schema_id
            ),
            Self::RetrievedSubjectVersion {
                subject, version, ..
            } => write!(
                f,
                "Resolved {} version {} after earlier failures",
                subject, version
            ),
        }
    }
}

/// Receives catalog events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: CatalogEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: CatalogEvent) {
        (**self).emit(event)
    }
}

/// Logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: CatalogEvent) {
        if event.is_failure() {
            warn!(catalog_id = event.catalog_id(), kind = event.kind(), "{}", event);
        } else {
            info!(catalog_id = event.catalog_id(), kind = event.kind(), "{}", event);
        }
    }
}

/// Discards events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: CatalogEvent) {}
}
