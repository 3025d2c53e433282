//! Deterministic merging of configuration trees.
//!
//! Layering is right-biased: when two layers carry the same key, the
//! incoming (right) layer wins. Only tables merge recursively; arrays and
//! scalars replace wholesale, and an incoming [`Value::Null`] is an explicit
//! override that masks the base value rather than preserving it. Because a
//! table on one side can mask a scalar on the other, merging is not
//! associative; callers that fold many layers must fold left-to-right in
//! priority order, which [`merge_all`] does.

use crate::value::{Table, Value};

/// Merge `incoming` over `base`, returning a new table. Neither input is
/// modified.
#[must_use]
pub fn deep_merge(base: &Table, incoming: &Table) -> Table {
    let mut merged = base.clone();
    merge_in_place(&mut merged, incoming);
    merged
}

/// Merge `incoming` over `base`, mutating `base`.
///
/// This is the hot path for repeated layering: it clones only the incoming
/// side instead of rebuilding the whole base tree.
pub fn merge_in_place(base: &mut Table, incoming: &Table) {
    for (key, incoming_value) in incoming {
        match (base.get_mut(key), incoming_value) {
            (Some(Value::Table(base_table)), Value::Table(incoming_table)) => {
                merge_in_place(base_table, incoming_table);
            }
            (Some(slot), _) => {
                *slot = incoming_value.clone();
            }
            (None, _) => {
                base.insert(key.clone(), incoming_value.clone());
            }
        }
    }
}

/// Merge only the top level: every incoming key replaces the base entry
/// outright, nested tables included.
#[must_use]
pub fn shallow_merge(base: &Table, incoming: &Table) -> Table {
    let mut merged = base.clone();
    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Fold an ordered sequence of layers, lowest priority first.
#[must_use]
pub fn merge_all<'a, I>(layers: I) -> Table
where
    I: IntoIterator<Item = &'a Table>,
{
    let mut merged = Table::new();
    for layer in layers {
        merge_in_place(&mut merged, layer);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::table_from_json;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::incoming_scalar_wins(
        json!({"port": 8080}),
        json!({"port": 9090}),
        json!({"port": 9090})
    )]
    #[case::disjoint_keys_union(
        json!({"host": "a"}),
        json!({"port": 1}),
        json!({"host": "a", "port": 1})
    )]
    #[case::tables_merge_recursively(
        json!({"server": {"host": "a", "port": 1}}),
        json!({"server": {"port": 2}}),
        json!({"server": {"host": "a", "port": 2}})
    )]
    #[case::null_masks_base(
        json!({"token": "secret"}),
        json!({"token": null}),
        json!({"token": null})
    )]
    #[case::arrays_replace_wholesale(
        json!({"hosts": ["a", "b", "c"]}),
        json!({"hosts": ["d"]}),
        json!({"hosts": ["d"]})
    )]
    #[case::table_replaces_scalar(
        json!({"cache": "off"}),
        json!({"cache": {"ttl": 60}}),
        json!({"cache": {"ttl": 60}})
    )]
    #[case::scalar_replaces_table(
        json!({"cache": {"ttl": 60}}),
        json!({"cache": "off"}),
        json!({"cache": "off"})
    )]
    fn deep_merge_semantics(
        #[case] base: serde_json::Value,
        #[case] incoming: serde_json::Value,
        #[case] expected: serde_json::Value,
    ) {
        let base = table_from_json(base);
        let incoming = table_from_json(incoming);
        assert_eq!(deep_merge(&base, &incoming), table_from_json(expected));
    }

    #[test]
    fn deep_merge_leaves_inputs_untouched() {
        let base = table_from_json(json!({"a": {"x": 1}}));
        let incoming = table_from_json(json!({"a": {"y": 2}}));
        let merged = deep_merge(&base, &incoming);
        assert_eq!(base, table_from_json(json!({"a": {"x": 1}})));
        assert_eq!(incoming, table_from_json(json!({"a": {"y": 2}})));
        assert_eq!(merged, table_from_json(json!({"a": {"x": 1, "y": 2}})));
    }

    #[test]
    fn in_place_matches_pure_merge() {
        let base = table_from_json(json!({"a": {"x": 1, "z": 3}, "b": true}));
        let incoming = table_from_json(json!({"a": {"x": 10}, "c": "new"}));
        let pure = deep_merge(&base, &incoming);
        let mut mutated = base;
        merge_in_place(&mut mutated, &incoming);
        assert_eq!(mutated, pure);
    }

    #[test]
    fn shallow_merge_replaces_nested_tables() {
        let base = table_from_json(json!({"server": {"host": "a", "port": 1}}));
        let incoming = table_from_json(json!({"server": {"port": 2}}));
        let merged = shallow_merge(&base, &incoming);
        assert_eq!(merged, table_from_json(json!({"server": {"port": 2}})));
    }

    #[test]
    fn merge_is_not_associative_across_a_masking_scalar() {
        // A scalar layer wipes the table beneath it, so grouping matters:
        // fold order must stay left-to-right in priority order.
        let low = table_from_json(json!({"k": {"x": 1}}));
        let mid = table_from_json(json!({"k": "scalar"}));
        let high = table_from_json(json!({"k": {"y": 2}}));

        let left = deep_merge(&deep_merge(&low, &mid), &high);
        let right = deep_merge(&low, &deep_merge(&mid, &high));
        assert_ne!(left, right);
        assert_eq!(left, table_from_json(json!({"k": {"y": 2}})));
        assert_eq!(right, table_from_json(json!({"k": {"x": 1, "y": 2}})));
        // merge_all groups like the left fold.
        assert_eq!(merge_all([&low, &mid, &high]), left);
    }

    #[test]
    fn merge_all_folds_in_priority_order() {
        let defaults = table_from_json(json!({"port": 1, "host": "a", "tls": false}));
        let file = table_from_json(json!({"port": 2, "tls": true}));
        let env = table_from_json(json!({"port": 3}));
        let merged = merge_all([&defaults, &file, &env]);
        assert_eq!(
            merged,
            table_from_json(json!({"port": 3, "host": "a", "tls": true}))
        );
    }
}
