//! In-cache group-and-reduce evaluation.

use serde_json::Value;
use tether_types::{Entity, GroupedResult, ReduceFn};

struct Group {
    key: Option<Value>,
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    numeric: u64,
}

/// Groups `entities` by `group_field` and reduces `field` per group.
///
/// Entities are inspected through their JSON form, so any serializable
/// record works. Entities without the group field fall into a `null`-keyed
/// group; entities whose aggregate field is missing or non-numeric
/// contribute to `Count` but not to the numeric reductions. Groups are
/// ordered by key. Empty input yields an empty list.
pub fn aggregate_entities<T: Entity>(
    entities: &[T],
    reduce: ReduceFn,
    group_field: Option<&str>,
    field: &str,
) -> Vec<GroupedResult> {
    let mut groups: Vec<Group> = Vec::new();

    for entity in entities {
        let json = match serde_json::to_value(entity) {
            Ok(json) => json,
            Err(_) => continue,
        };

        let key = group_field.map(|name| json.get(name).cloned().unwrap_or(Value::Null));
        let value = json.get(field).and_then(Value::as_f64);

        let index = match groups.iter().position(|g| g.key == key) {
            Some(index) => index,
            None => {
                groups.push(Group {
                    key,
                    count: 0,
                    sum: 0.0,
                    min: None,
                    max: None,
                    numeric: 0,
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];

        group.count += 1;
        if let Some(value) = value {
            group.numeric += 1;
            group.sum += value;
            group.min = Some(group.min.map_or(value, |m| m.min(value)));
            group.max = Some(group.max.map_or(value, |m| m.max(value)));
        }
    }

    let mut results: Vec<GroupedResult> = groups
        .into_iter()
        .filter_map(|group| {
            let value = match reduce {
                ReduceFn::Count => Some(group.count as f64),
                ReduceFn::Sum => Some(group.sum),
                ReduceFn::Min => group.min,
                ReduceFn::Max => group.max,
                ReduceFn::Average if group.numeric > 0 => {
                    Some(group.sum / group.numeric as f64)
                }
                ReduceFn::Average => None,
            };
            value.map(|value| GroupedResult::new(group.key, value))
        })
        .collect();
    // Entity iteration order is an implementation detail of the cache;
    // key order makes the result deterministic.
    results.sort_by_cached_key(|group| {
        serde_json::to_string(&group.key).unwrap_or_default()
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::Document;

    fn item(category: &str, qty: i64) -> Document {
        Document::new()
            .with_entity_id(format!("{category}-{qty}"))
            .with_field("category", category)
            .with_field("qty", qty)
    }

    #[test]
    fn sum_per_group() {
        let entities = vec![item("a", 1), item("a", 2), item("b", 5)];
        let groups = aggregate_entities(&entities, ReduceFn::Sum, Some("category"), "qty");

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, Some(Value::from("a")));
        assert_eq!(groups[0].value, 3.0);
        assert_eq!(groups[1].key, Some(Value::from("b")));
        assert_eq!(groups[1].value, 5.0);
    }

    #[test]
    fn no_group_field_reduces_to_one_group() {
        let entities = vec![item("a", 1), item("b", 2)];
        let groups = aggregate_entities(&entities, ReduceFn::Max, None, "qty");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, None);
        assert_eq!(groups[0].value, 2.0);
    }

    #[test]
    fn empty_input_is_an_empty_list() {
        let groups = aggregate_entities::<Document>(&[], ReduceFn::Sum, Some("category"), "qty");
        assert!(groups.is_empty());
    }

    #[test]
    fn count_ignores_the_aggregate_field() {
        let entities = vec![
            item("a", 1),
            Document::new().with_entity_id("x").with_field("category", "a"),
        ];
        let groups = aggregate_entities(&entities, ReduceFn::Count, Some("category"), "qty");
        assert_eq!(groups[0].value, 2.0);
    }

    #[test]
    fn average_divides_by_numeric_contributions() {
        let entities = vec![item("a", 2), item("a", 4)];
        let groups = aggregate_entities(&entities, ReduceFn::Average, Some("category"), "qty");
        assert_eq!(groups[0].value, 3.0);
    }

    #[test]
    fn missing_group_field_keys_null() {
        let entities = vec![Document::new().with_entity_id("x").with_field("qty", 7)];
        let groups = aggregate_entities(&entities, ReduceFn::Sum, Some("category"), "qty");
        assert_eq!(groups[0].key, Some(Value::Null));
        assert_eq!(groups[0].value, 7.0);
    }
}
