use cep_canonical::{CanonicalRecord, CanonicalSerializer, FieldValue, SerializationProfile};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn record_from(pairs: &[(String, String)]) -> CanonicalRecord {
    let mut record = CanonicalRecord::new();
    for (key, value) in pairs {
        record.insert(key.clone(), value.clone());
    }
    record
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn insertion_order_never_changes_output(
        shuffled in prop::collection::btree_map("[a-zA-Z]{1,8}", "[ -~]{0,16}", 0..12)
            .prop_map(|m| m.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    ) {
        let mut sorted = shuffled.clone();
        sorted.sort();
        prop_assert_eq!(
            record_from(&shuffled).to_canonical_string().unwrap(),
            record_from(&sorted).to_canonical_string().unwrap()
        );
    }

    #[test]
    fn set_enumeration_order_never_changes_output(
        items in prop::collection::vec("[a-z0-9]{0,6}", 0..10).prop_shuffle()
    ) {
        let mut reversed = items.clone();
        reversed.reverse();
        let as_set = |values: &[String]| {
            let mut record = CanonicalRecord::new();
            record.insert(
                "members",
                FieldValue::Set(values.iter().map(|v| FieldValue::Text(v.clone())).collect()),
            );
            record.to_canonical_string().unwrap()
        };
        prop_assert_eq!(as_set(&items), as_set(&reversed));
    }

    #[test]
    fn json_key_order_never_changes_output(
        shuffled in prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 1..8)
            .prop_map(|m| m.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    ) {
        let serializer = CanonicalSerializer::default();
        let hints = SerializationProfile::default();
        let build = |pairs: &[(String, i32)]| {
            let mut map = Map::new();
            for (key, value) in pairs {
                map.insert(key.clone(), Value::from(*value));
            }
            serializer.serialize_json(&Value::Object(map), &hints).unwrap().text
        };
        let mut reversed = shuffled.clone();
        reversed.reverse();
        prop_assert_eq!(build(&shuffled), build(&reversed));
    }
}
