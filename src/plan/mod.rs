//! Store operation planner.
//!
//! A route's request template renders the canonical store-request encoding
//! (JSON). The planner parses that text and validates it into a typed
//! [`StoreOperation`] descriptor, the only form the store boundary accepts.
//! Partition keys arrive already assembled as flat delimited strings
//! (`document|language|translation`); the planner validates shape, it does
//! not re-join key components.

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("request is not valid store-request JSON: {0}")]
    InvalidEncoding(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("missing partition key")]
    MissingPartition,

    #[error("operation '{0}' requires {1}")]
    MissingPredicate(&'static str, &'static str),

    #[error("operation '{0}' declares conflicting key predicates")]
    AmbiguousPredicate(&'static str),

    #[error("continuation key partition '{0}' does not match query partition '{1}'")]
    ContinuationMismatch(String, String),

    #[error("a sort-threshold query uses the threshold as its cursor; no continuation key allowed")]
    ThresholdWithContinuation,

    #[error("secondary-index query missing index name")]
    MissingIndex,

    #[error("batch lookup requires at least one sort key")]
    EmptyBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    PointGet,
    RangeQuery,
    BatchGet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Reverse,
}

/// Exactly one key-predicate shape is populated per operation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPredicate {
    /// Exact sort key (point lookup).
    ExactSort(String),
    /// Sort key begins with the given prefix (range query).
    SortPrefix(String),
    /// Secondary sort attribute strictly greater than the threshold
    /// (index query; the threshold itself acts as the cursor).
    SortAbove(String),
    /// Set of exact sort keys sharing one partition (batch lookup).
    SortSet(Vec<String>),
}

/// Opaque cursor marking where a previous page ended (exclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationKey {
    pub partition: String,
    pub sort: String,
}

/// The canonical intermediate form every request is planned into.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOperation {
    pub kind: OperationKind,
    pub table: String,
    pub index: Option<String>,
    pub partition: String,
    pub predicate: KeyPredicate,
    pub direction: ScanDirection,
    pub continuation: Option<ContinuationKey>,
}

/// Raw wire shape of a rendered request template.
#[derive(Debug, Deserialize)]
struct RawRequest {
    op: String,
    table: String,
    #[serde(default)]
    index: Option<String>,
    #[serde(default)]
    partition: String,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    sort_prefix: Option<String>,
    #[serde(default)]
    sort_above: Option<String>,
    #[serde(default)]
    forward: Option<bool>,
    #[serde(default)]
    start_after: Option<RawStartAfter>,
    #[serde(default)]
    sorts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawStartAfter {
    partition: String,
    sort: String,
}

/// Parse and validate rendered request text into a descriptor.
pub fn plan(rendered: &str) -> Result<StoreOperation, PlanError> {
    let raw: RawRequest =
        serde_json::from_str(rendered).map_err(|e| PlanError::InvalidEncoding(e.to_string()))?;

    if raw.partition.is_empty() {
        return Err(PlanError::MissingPartition);
    }

    match raw.op.as_str() {
        "Get" => plan_get(raw),
        "Query" => plan_query(raw),
        "BatchGet" => plan_batch(raw),
        other => Err(PlanError::UnknownOperation(other.to_string())),
    }
}

fn plan_get(raw: RawRequest) -> Result<StoreOperation, PlanError> {
    if raw.sort_prefix.is_some() || raw.sort_above.is_some() || raw.sorts.is_some() {
        return Err(PlanError::AmbiguousPredicate("Get"));
    }
    let sort = raw
        .sort
        .filter(|s| !s.is_empty())
        .ok_or(PlanError::MissingPredicate("Get", "an exact sort key"))?;
    Ok(StoreOperation {
        kind: OperationKind::PointGet,
        table: raw.table,
        index: None,
        partition: raw.partition,
        predicate: KeyPredicate::ExactSort(sort),
        direction: ScanDirection::Forward,
        continuation: None,
    })
}

fn plan_query(raw: RawRequest) -> Result<StoreOperation, PlanError> {
    if raw.sort.is_some() || raw.sorts.is_some() {
        return Err(PlanError::AmbiguousPredicate("Query"));
    }

    let direction = match raw.forward {
        Some(false) => ScanDirection::Reverse,
        _ => ScanDirection::Forward,
    };

    match (raw.sort_prefix, raw.sort_above) {
        (Some(_), Some(_)) => Err(PlanError::AmbiguousPredicate("Query")),
        (None, None) => Err(PlanError::MissingPredicate(
            "Query",
            "a sort prefix or sort threshold",
        )),
        (Some(prefix), None) => {
            let continuation = match raw.start_after {
                None => None,
                Some(start) => {
                    if start.partition != raw.partition {
                        return Err(PlanError::ContinuationMismatch(
                            start.partition,
                            raw.partition,
                        ));
                    }
                    Some(ContinuationKey { partition: start.partition, sort: start.sort })
                }
            };
            Ok(StoreOperation {
                kind: OperationKind::RangeQuery,
                table: raw.table,
                index: raw.index,
                partition: raw.partition,
                predicate: KeyPredicate::SortPrefix(prefix),
                direction,
                continuation,
            })
        }
        (None, Some(threshold)) => {
            if raw.start_after.is_some() {
                return Err(PlanError::ThresholdWithContinuation);
            }
            let index = raw.index.ok_or(PlanError::MissingIndex)?;
            Ok(StoreOperation {
                kind: OperationKind::RangeQuery,
                table: raw.table,
                index: Some(index),
                partition: raw.partition,
                predicate: KeyPredicate::SortAbove(threshold),
                direction,
                continuation: None,
            })
        }
    }
}

fn plan_batch(raw: RawRequest) -> Result<StoreOperation, PlanError> {
    if raw.sort.is_some() || raw.sort_prefix.is_some() || raw.sort_above.is_some() {
        return Err(PlanError::AmbiguousPredicate("BatchGet"));
    }
    let sorts = raw
        .sorts
        .ok_or(PlanError::MissingPredicate("BatchGet", "a set of sort keys"))?;
    if sorts.is_empty() || sorts.iter().any(|s| s.is_empty()) {
        return Err(PlanError::EmptyBatch);
    }
    Ok(StoreOperation {
        kind: OperationKind::BatchGet,
        table: raw.table,
        index: None,
        partition: raw.partition,
        predicate: KeyPredicate::SortSet(sorts),
        direction: ScanDirection::Forward,
        continuation: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plans_point_get() {
        let op = plan(r#"{"op":"Get","table":"texts","partition":"bible|en|webp","sort":"001-001-001"}"#)
            .unwrap();
        assert_eq!(op.kind, OperationKind::PointGet);
        assert_eq!(op.partition, "bible|en|webp");
        assert_eq!(op.predicate, KeyPredicate::ExactSort("001-001-001".into()));
    }

    #[test]
    fn plans_forward_prefix_query() {
        let op = plan(
            r#"{"op":"Query","table":"texts","partition":"bible|en|webp","sort_prefix":"001-001-"}"#,
        )
        .unwrap();
        assert_eq!(op.kind, OperationKind::RangeQuery);
        assert_eq!(op.direction, ScanDirection::Forward);
        assert_eq!(op.predicate, KeyPredicate::SortPrefix("001-001-".into()));
        assert!(op.continuation.is_none());
    }

    #[test]
    fn plans_reverse_prefix_query_with_continuation() {
        let op = plan(
            r#"{"op":"Query","table":"texts","partition":"bible|en|webp","sort_prefix":"001-",
                "forward":false,"start_after":{"partition":"bible|en|webp","sort":"001-001-010"}}"#,
        )
        .unwrap();
        assert_eq!(op.direction, ScanDirection::Reverse);
        let cont = op.continuation.unwrap();
        assert_eq!(cont.sort, "001-001-010");
    }

    #[test]
    fn rejects_continuation_for_foreign_partition() {
        let err = plan(
            r#"{"op":"Query","table":"texts","partition":"bible|en|webp","sort_prefix":"001-",
                "start_after":{"partition":"bible|fr|sg21","sort":"001-001-010"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::ContinuationMismatch(..)));
    }

    #[test]
    fn plans_index_threshold_query() {
        let op = plan(
            r#"{"op":"Query","table":"texts","index":"feed","partition":"bible|en|webp","sort_above":"d46e"}"#,
        )
        .unwrap();
        assert_eq!(op.index.as_deref(), Some("feed"));
        assert_eq!(op.predicate, KeyPredicate::SortAbove("d46e".into()));
    }

    #[test]
    fn threshold_query_rejects_continuation_key() {
        let err = plan(
            r#"{"op":"Query","table":"texts","index":"feed","partition":"p","sort_above":"x",
                "start_after":{"partition":"p","sort":"y"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::ThresholdWithContinuation));
    }

    #[test]
    fn threshold_query_requires_index() {
        let err = plan(r#"{"op":"Query","table":"texts","partition":"p","sort_above":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, PlanError::MissingIndex));
    }

    #[test]
    fn plans_batch_with_shared_partition() {
        let op = plan(
            r#"{"op":"BatchGet","table":"texts","partition":"bible|en|webp","sorts":["a","b","c"]}"#,
        )
        .unwrap();
        assert_eq!(op.kind, OperationKind::BatchGet);
        assert_eq!(
            op.predicate,
            KeyPredicate::SortSet(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn rejects_empty_batch() {
        let err =
            plan(r#"{"op":"BatchGet","table":"texts","partition":"p","sorts":[]}"#).unwrap_err();
        assert!(matches!(err, PlanError::EmptyBatch));
    }

    #[test]
    fn rejects_missing_partition() {
        let err = plan(r#"{"op":"Get","table":"texts","sort":"x"}"#).unwrap_err();
        assert!(matches!(err, PlanError::MissingPartition));
    }

    #[test]
    fn rejects_conflicting_predicates() {
        let err = plan(
            r#"{"op":"Query","table":"texts","partition":"p","sort_prefix":"a","sort_above":"b","index":"feed"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::AmbiguousPredicate("Query")));
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = plan(r#"{"op":"Put","table":"texts","partition":"p"}"#).unwrap_err();
        assert!(matches!(err, PlanError::UnknownOperation(_)));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(plan("not json"), Err(PlanError::InvalidEncoding(_))));
    }
}
