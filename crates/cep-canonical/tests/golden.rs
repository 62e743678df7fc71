use std::collections::BTreeMap;

use cep_canonical::{
    Amount, CanonicalRecord, CanonicalSerializer, CanonicalTimestamp, Canonicalizer, FieldKind,
    FieldValue, HygieneReport, HygieneStatus, HygieneWarning, ProfileId, SerializationProfile,
};
use serde_json::json;

fn canonicalizer() -> Canonicalizer {
    Canonicalizer::with_builtin_rules().unwrap()
}

fn name(raw: &str, locale: &str) -> String {
    canonicalizer()
        .canonicalize(raw, FieldKind::LegalName, locale)
        .unwrap()
}

#[test]
fn cleaned_up_marker_is_removed_in_illinois() {
    assert_eq!(name("MCDERMOTT CENTER|CLEANED-UP", "US-IL"), "mcdermott center");
}

#[test]
fn transit_authority_abbreviation_expands_in_new_york() {
    let expanded = name("Metropolitan Transportation Authority", "US-NY");
    assert_eq!(name("MTA", "US-NY"), expanded);
    assert_eq!(expanded, "metropolitan transportation authority");
    // Outside New York the token is left alone.
    assert_eq!(name("MTA", "US-CA"), "mta");
}

#[test]
fn school_district_variants_are_case_and_abbreviation_equivalent() {
    let expected = "springfield unified school district";
    assert_eq!(name("Springfield USD", "US"), expected);
    assert_eq!(name("SPRINGFIELD UNIFIED SCHOOL DISTRICT", "US"), expected);
    assert_eq!(name("  springfield   unified school district ", "US"), expected);
}

#[test]
fn agency_phrase_expansion_is_idempotent() {
    let short = name("Port Authority", "US-NY");
    let long = name("The Port Authority of New York and New Jersey", "US-NY");
    assert_eq!(short, "port authority new york new jersey");
    assert_eq!(short, long);
}

#[test]
fn quebec_names_fold_accents_and_drop_french_stop_words() {
    assert_eq!(name("STM", "CA-QC"), "societe transport montreal");
    assert_eq!(name("Société de Transport de Montréal", "CA-QC"), "societe transport montreal");
    assert_eq!(name("Tremblay Cie", "CA-QC"), name("Tremblay Compagnie", "CA-QC"));
    assert_eq!(name("Tremblay Cie", "CA-QC"), "tremblay company");
}

#[test]
fn non_latin_names_are_preserved() {
    assert_eq!(name("東京都庁", "JP"), "東京都庁");
    assert_eq!(name("МОСКОВСКИЙ  МЕТРОПОЛИТЕН", "RU"), "московский метрополитен");
}

#[test]
fn decomposed_and_composed_input_agree() {
    assert_eq!(name("Cafe\u{0301} Rouge LLC", "US"), name("Café Rouge L.L.C.", "US"));
}

#[test]
fn addresses_drop_units_and_expand_postal_terms() {
    let c = canonicalizer();
    let a = c
        .canonicalize("123 N. Main St., Suite 400", FieldKind::Address, "US")
        .unwrap();
    let b = c
        .canonicalize("123 North Main Street", FieldKind::Address, "US")
        .unwrap();
    assert_eq!(a, "123 north main street");
    assert_eq!(a, b);
}

#[test]
fn record_hash_matches_fixture() {
    let mut record = CanonicalRecord::new();
    record.insert("a", "1");
    assert_eq!(
        record.canonical_hash().unwrap().as_str(),
        "9afeb0f2b203f254312ec8ded441d0318b7c34c57f8695ede42d2215a30c0960"
    );
}

#[test]
fn typed_and_json_paths_agree_byte_for_byte() {
    let mut record = CanonicalRecord::new();
    record
        .insert("occurredTimestamp", CanonicalTimestamp::parse("2025-01-01T10:03:22Z").unwrap())
        .insert("currency", "USD")
        .insert("amount", Amount::from_i64(100));

    let expected = r#"{"amount":"100.00","currency":"USD","occurredTimestamp":"2025-01-01T10:03:22.000000Z"}"#;
    assert_eq!(record.to_canonical_string().unwrap(), expected);

    let serializer = CanonicalSerializer::default();
    let from_json = serializer
        .serialize_json(
            &json!({
                "currency": "USD",
                "occurredTimestamp": "2025-01-01T10:03:22Z",
                "amount": 100.0
            }),
            &SerializationProfile::civic_records(),
        )
        .unwrap();
    assert_eq!(from_json.text, expected);
    assert_eq!(
        record.canonical_hash().unwrap().as_str(),
        "f9ddf2668cc1bc0829872f702475a2831319f1dcda8fd63d2c82ee3c2807ad30"
    );
}

#[test]
fn multilateral_member_sets_ignore_enumeration_order() {
    let member = |id: &str, share: &str| {
        let mut m = CanonicalRecord::new();
        m.insert("entityId", id).insert("participationShare", share);
        FieldValue::Record(m)
    };
    let mut first = CanonicalRecord::new();
    first.insert(
        "members",
        FieldValue::Set(vec![member("b", "0.5000"), member("a", "0.5000")]),
    );
    let mut second = CanonicalRecord::new();
    second.insert(
        "members",
        FieldValue::Set(vec![member("a", "0.5000"), member("b", "0.5000")]),
    );
    assert_eq!(
        first.to_canonical_string().unwrap(),
        second.to_canonical_string().unwrap()
    );
}

#[test]
fn hygiene_report_matches_expected_shape() {
    let report = HygieneReport {
        status: HygieneStatus::Lossy,
        warnings: vec![HygieneWarning::new("Rounded:value.amount")],
        metrics: BTreeMap::new(),
        profile_id: ProfileId::parse("cep-canonical-v1").unwrap(),
    };

    let serialized = serde_json::to_value(&report).unwrap();
    let expected = json!({
        "status": "Lossy",
        "warnings": ["Rounded:value.amount"],
        "metrics": {},
        "profile_id": "cep-canonical-v1"
    });

    assert_eq!(serialized, expected);
}
