//! In-memory store with the backing store's exact composite-key semantics:
//! sort keys ordered ascending within a partition, prefix matching,
//! exclusive-start continuation in both scan directions, secondary-index
//! ordering by a named attribute with a strict greater-than threshold, and
//! unordered batch lookup. Used for local serving and tests; read-only
//! after seeding, so `execute` takes `&self` with no locking.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::{AttrValue, Item, StoreClient, StoreError, StoreOutput};
use crate::plan::{KeyPredicate, ScanDirection, StoreOperation};

pub struct MemoryStore {
    page_size: usize,
    tables: HashMap<String, Table>,
}

#[derive(Default)]
struct Table {
    /// partition key -> sort key -> item, sorted by sort key.
    partitions: BTreeMap<String, BTreeMap<String, Item>>,
    /// index name -> attribute providing the alternate sort order.
    indexes: HashMap<String, String>,
}

/// On-disk seed shape: one table, its secondary indexes, and raw items
/// carrying their own key attributes.
#[derive(Debug, Deserialize)]
pub struct Seed {
    pub table: String,
    #[serde(default)]
    pub indexes: HashMap<String, String>,
    pub items: Vec<Item>,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self { page_size, tables: HashMap::new() }
    }

    pub fn register_index(&mut self, table: &str, index: &str, attribute: &str) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .indexes
            .insert(index.to_string(), attribute.to_string());
    }

    pub fn insert(&mut self, table: &str, partition: &str, sort: &str, item: Item) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .partitions
            .entry(partition.to_string())
            .or_default()
            .insert(sort.to_string(), item);
    }

    /// Load a seed file. Items must carry the configured partition and sort
    /// attributes as string values.
    pub fn load_seed_file(
        &mut self,
        path: impl AsRef<Path>,
        partition_attribute: &str,
        sort_attribute: &str,
    ) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let seed: Seed = serde_json::from_str(&raw)?;
        self.load_seed(seed, partition_attribute, sort_attribute)
    }

    pub fn load_seed(
        &mut self,
        seed: Seed,
        partition_attribute: &str,
        sort_attribute: &str,
    ) -> anyhow::Result<usize> {
        for (index, attribute) in &seed.indexes {
            self.register_index(&seed.table, index, attribute);
        }
        let count = seed.items.len();
        for item in seed.items {
            let partition = item
                .get(partition_attribute)
                .and_then(AttrValue::as_s)
                .ok_or_else(|| {
                    anyhow::anyhow!("seed item missing string attribute '{}'", partition_attribute)
                })?
                .to_string();
            let sort = item
                .get(sort_attribute)
                .and_then(AttrValue::as_s)
                .ok_or_else(|| {
                    anyhow::anyhow!("seed item missing string attribute '{}'", sort_attribute)
                })?
                .to_string();
            self.insert(&seed.table, &partition, &sort, item);
        }
        Ok(count)
    }

    fn table(&self, name: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::Malformed(format!("unknown table '{}'", name)))
    }

    fn query_prefix(
        &self,
        table: &Table,
        op: &StoreOperation,
        prefix: &str,
    ) -> Result<StoreOutput, StoreError> {
        let empty = BTreeMap::new();
        let partition = table.partitions.get(&op.partition).unwrap_or(&empty);
        let after = op.continuation.as_ref().map(|c| c.sort.as_str());

        let matching: Vec<(&String, &Item)> = match op.direction {
            ScanDirection::Forward => partition
                .iter()
                .filter(|(sort, _)| sort.starts_with(prefix))
                .filter(|(sort, _)| after.map_or(true, |a| sort.as_str() > a))
                .take(self.page_size + 1)
                .collect(),
            ScanDirection::Reverse => partition
                .iter()
                .rev()
                .filter(|(sort, _)| sort.starts_with(prefix))
                .filter(|(sort, _)| after.map_or(true, |a| sort.as_str() < a))
                .take(self.page_size + 1)
                .collect(),
        };

        let truncated = matching.len() > self.page_size;
        let page: Vec<(&String, &Item)> = matching.into_iter().take(self.page_size).collect();
        let last_key = if truncated {
            page.last().map(|(sort, _)| (*sort).clone())
        } else {
            None
        };
        let items = page.into_iter().map(|(_, item)| item.clone()).collect();
        Ok(StoreOutput::Page { items, last_key })
    }

    fn query_index(
        &self,
        table: &Table,
        op: &StoreOperation,
        threshold: &str,
    ) -> Result<StoreOutput, StoreError> {
        let index = op
            .index
            .as_deref()
            .ok_or_else(|| StoreError::Malformed("index query without index name".into()))?;
        let attribute = table
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::Malformed(format!("unknown index '{}'", index)))?;

        let empty = BTreeMap::new();
        let partition = table.partitions.get(&op.partition).unwrap_or(&empty);

        // Alternate ordering over the same partition: sort by the index
        // attribute, strictly above the threshold. Items without the
        // attribute are absent from the index.
        let mut matching: Vec<(&str, &Item)> = partition
            .values()
            .filter_map(|item| {
                item.get(attribute)
                    .and_then(AttrValue::as_s)
                    .map(|key| (key, item))
            })
            .filter(|(key, _)| *key > threshold)
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));

        let truncated = matching.len() > self.page_size;
        matching.truncate(self.page_size);
        let last_key = if truncated {
            matching.last().map(|(key, _)| key.to_string())
        } else {
            None
        };
        let items = matching.into_iter().map(|(_, item)| item.clone()).collect();
        Ok(StoreOutput::Page { items, last_key })
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn execute(&self, op: &StoreOperation) -> Result<StoreOutput, StoreError> {
        let table = self.table(&op.table)?;
        match &op.predicate {
            KeyPredicate::ExactSort(sort) => {
                let item = table
                    .partitions
                    .get(&op.partition)
                    .and_then(|p| p.get(sort))
                    .cloned();
                Ok(StoreOutput::Item(item))
            }
            KeyPredicate::SortPrefix(prefix) => self.query_prefix(table, op, prefix),
            KeyPredicate::SortAbove(threshold) => self.query_index(table, op, threshold),
            KeyPredicate::SortSet(sorts) => {
                let empty = BTreeMap::new();
                let partition = table.partitions.get(&op.partition).unwrap_or(&empty);
                // Missing keys are simply absent; order is unspecified.
                let items = sorts
                    .iter()
                    .filter_map(|sort| partition.get(sort))
                    .cloned()
                    .collect();
                Ok(StoreOutput::Batch(items))
            }
        }
    }
}
