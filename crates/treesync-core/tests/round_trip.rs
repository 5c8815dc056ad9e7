//! Generated round-trip checks over arrays of identified records.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use treesync_core::patch::apply;
use treesync_core::{diff, reverse, SyncConfig};

/// Up to six records with distinct ids, in arbitrary order.
fn arb_records() -> impl Strategy<Value = Value> {
    proptest::collection::vec((0u8..8, 0i8..4, any::<bool>()), 0..6).prop_map(|raw| {
        let mut seen = HashSet::new();
        let records = raw
            .into_iter()
            .filter(|(id, _, _)| seen.insert(*id))
            .map(|(id, v, flagged)| {
                if flagged {
                    json!({"id": format!("r{id}"), "v": v, "flag": true})
                } else {
                    json!({"id": format!("r{id}"), "v": v})
                }
            })
            .collect();
        Value::Array(records)
    })
}

proptest! {
    /// Applying a diff reaches the target; applying its reverse restores the source.
    #[test]
    fn diff_then_reverse_restores(old in arb_records(), new in arb_records()) {
        let config = SyncConfig::default();
        let ops = diff(&config, &old, &new).unwrap();

        let mut value = old.clone();
        apply(&config, &mut value, &ops).unwrap();
        prop_assert_eq!(&value, &new);

        apply(&config, &mut value, &reverse(&config, &ops)).unwrap();
        prop_assert_eq!(&value, &old);
    }

    /// Records nested under a map key behave the same way.
    #[test]
    fn nested_round_trip(old in arb_records(), new in arb_records()) {
        let config = SyncConfig::default();
        let old = json!({"id": "root", "rows": old});
        let new = json!({"id": "root", "rows": new});
        let ops = diff(&config, &old, &new).unwrap();

        let mut value = old.clone();
        apply(&config, &mut value, &ops).unwrap();
        prop_assert_eq!(&value, &new);

        apply(&config, &mut value, &reverse(&config, &ops)).unwrap();
        prop_assert_eq!(&value, &old);
    }
}
