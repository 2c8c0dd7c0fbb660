//! Catalog types

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Registry-assigned schema identifier
///
/// Registry ids are non-negative; the 8-byte wire form is truncated to 32 bits
/// when read. "No id" is `Option::<SchemaId>::None`, never a reserved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaId(pub u32);

impl SchemaId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SchemaId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// A schema resolved from the registry
///
/// Registry content for an id never changes, so a resolved schema is
/// permanent and may be shared freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub id: SchemaId,
    pub schema: Arc<str>,
}

impl ResolvedSchema {
    pub fn new(id: SchemaId, schema: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            schema: schema.into(),
        }
    }
}
