//! Aggregation descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reduction applied by a group-and-aggregate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceFn {
    /// Number of entities per group.
    Count,
    /// Sum of the aggregate field per group.
    Sum,
    /// Minimum of the aggregate field per group.
    Min,
    /// Maximum of the aggregate field per group.
    Max,
    /// Arithmetic mean of the aggregate field per group.
    Average,
}

/// One group of an aggregation result.
///
/// `key` is the group field's value, or `None` when no group field was
/// given and the whole filtered set reduced to a single group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedResult {
    /// The grouping key.
    pub key: Option<Value>,
    /// The reduced value.
    pub value: f64,
}

impl GroupedResult {
    /// Creates a grouped result.
    pub fn new(key: Option<Value>, value: f64) -> Self {
        Self { key, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_result_roundtrip() {
        let group = GroupedResult::new(Some(Value::from("a")), 3.5);
        let json = serde_json::to_string(&group).unwrap();
        let back: GroupedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }
}
