// Cache key property tests

use bqguard::cache::{CacheKey, QueryParams};
use proptest::prelude::*;
use std::collections::HashSet;

fn param_pairs() -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::btree_map("[a-z_]{1,12}", any::<i64>(), 0..8)
        .prop_map(|map| map.into_iter().collect())
}

proptest! {
    #[test]
    fn key_ignores_parameter_insertion_order(
        query in "SELECT [a-z ,*]{1,40}",
        pairs in param_pairs(),
    ) {
        let forward: QueryParams = pairs.iter().cloned().collect();
        let backward: QueryParams = pairs.iter().rev().cloned().collect();

        prop_assert_eq!(
            CacheKey::derive(&query, Some(&forward)),
            CacheKey::derive(&query, Some(&backward))
        );
    }

    #[test]
    fn key_is_stable_across_calls(query in ".{0,200}") {
        let first = CacheKey::derive(&query, None);
        let second = CacheKey::derive(&query, None);
        prop_assert_eq!(first.as_str().len(), 16);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn surrounding_whitespace_is_ignored(query in "[A-Za-z0-9 ]{1,60}", pad in "[ \t\n]{0,5}") {
        let padded = format!("{}{}{}", pad, query, pad);
        prop_assert_eq!(CacheKey::derive(&query, None), CacheKey::derive(&padded, None));
    }
}

#[test]
fn distinct_inputs_do_not_collide() {
    let mut keys = HashSet::new();
    let mut inputs = 0;

    for table in 0..100 {
        let sql = format!("SELECT * FROM dataset.table_{} WHERE day = @day", table);
        for day in 0..100 {
            let params = QueryParams::new().with("day", format!("2024-{:03}", day));
            keys.insert(CacheKey::derive(&sql, Some(&params)));
            inputs += 1;
        }
        keys.insert(CacheKey::derive(&sql, None));
        inputs += 1;
    }

    assert_eq!(inputs, 10_100);
    assert_eq!(keys.len(), inputs);
}
