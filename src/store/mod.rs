//! Store boundary.
//!
//! The backing key-value store is an external capability: execute a planned
//! [`StoreOperation`](crate::plan::StoreOperation), get back a native typed
//! result or a typed failure. Items are attribute-typed maps, the store's
//! wire shape (`{"reference": {"S": "Genesis 1:1"}}`). Timeouts are
//! enforced by the caller with a bounded `tokio::time::timeout`; a failed
//! call is never retried within one request.

pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::plan::StoreOperation;

/// Attribute-typed value, matching the store's native wire encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    S(String),
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    L(Vec<AttrValue>),
    M(BTreeMap<String, AttrValue>),
    #[serde(rename = "NULL")]
    Null(bool),
}

impl AttrValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }
}

/// One stored item: attribute name -> typed value.
pub type Item = BTreeMap<String, AttrValue>;

/// Native result of a store operation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutput {
    /// Point lookup: the item, if present.
    Item(Option<Item>),
    /// One page of a range query. `last_key` is set when the page was
    /// truncated and more items remain.
    Page { items: Vec<Item>, last_key: Option<String> },
    /// Batch lookup. Item order is unspecified.
    Batch(Vec<Item>),
}

impl StoreOutput {
    /// Native JSON shape, used verbatim for passthrough responses.
    pub fn to_json(&self) -> Value {
        match self {
            StoreOutput::Item(Some(item)) => json!({ "item": item }),
            StoreOutput::Item(None) => json!({ "item": null }),
            StoreOutput::Page { items, last_key } => json!({
                "items": items,
                "count": items.len(),
                "last_key": last_key,
            }),
            StoreOutput::Batch(items) => json!({
                "items": items,
                "count": items.len(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store throttled the request")]
    Throttled,

    #[error("malformed store request: {0}")]
    Malformed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The single seam to the external store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn execute(&self, op: &StoreOperation) -> Result<StoreOutput, StoreError>;
}
