use cep_canonical::{Canonicalizer, Share, UriRef};
use cep_core::{
    compute_verifiable_id, resolve_identifiers, CanonicalInput, ConflictKind, EntityIdentity,
    FundingChainTag, IdentifierClaim, IdentifierScheme, IdentityIndex, ProvenanceLink,
    ResolutionConfidence, ResolveError, VerifiableId,
};
use once_cell::sync::Lazy;
use proptest::prelude::*;

static CANONICALIZER: Lazy<Canonicalizer> =
    Lazy::new(|| Canonicalizer::with_builtin_rules().unwrap());

const NAME: &str = "Springfield Unified School District";

fn make_id(name: &str) -> VerifiableId {
    let input = CanonicalInput::entity(&CANONICALIZER, &EntityIdentity::new(name, "US-IL")).unwrap();
    compute_verifiable_id(&input).unwrap()
}

fn make_claim(id: &VerifiableId, scheme: IdentifierScheme, value: &str) -> IdentifierClaim {
    IdentifierClaim::new(id.clone(), scheme, value, ResolutionConfidence::Authoritative).unwrap()
}

fn vary(name: &str, upper: &[bool], padding: usize) -> String {
    let pad = " ".repeat(padding);
    let mut out = pad.clone();
    for (i, word) in name.split(' ').enumerate() {
        if i > 0 {
            out.push_str(&pad);
            out.push(' ');
        }
        for (j, ch) in word.chars().enumerate() {
            if upper.get(i * 8 + j).copied().unwrap_or(false) {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
        }
    }
    out.push_str(&pad);
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn whitespace_and_case_never_change_the_identifier(
        upper in proptest::collection::vec(any::<bool>(), 40),
        padding in 0usize..4,
    ) {
        prop_assert_eq!(make_id(&vary(NAME, &upper, padding)), make_id(NAME));
    }

    #[test]
    fn chain_tags_concatenate_associatively(
        segments in proptest::collection::vec("[A-Z]{1,8}", 3),
    ) {
        let a = FundingChainTag::root(segments[0].clone()).unwrap();
        let b = FundingChainTag::root(segments[1].clone()).unwrap();
        let c = FundingChainTag::root(segments[2].clone()).unwrap();
        prop_assert_eq!(a.then(&b).then(&c), a.then(&b.then(&c)));
    }
}

#[test]
fn test_abbreviated_and_expanded_names_share_an_identifier() {
    assert_eq!(make_id("Springfield USD"), make_id(NAME));
    assert_ne!(make_id("Shelbyville USD"), make_id(NAME));
}

#[test]
fn test_claims_sharing_a_registry_code_merge() {
    let id = make_id(NAME);
    let claims = vec![
        make_claim(&id, IdentifierScheme::SamUei, "abcdefghjk12"),
        make_claim(&id, IdentifierScheme::Lei, "5493001KJTIIGC8Y1R12"),
        make_claim(&id, IdentifierScheme::SamUei, "ABCDEFGHJK12"),
    ];
    let set = resolve_identifiers(&claims).unwrap();
    assert_eq!(set.verifiable_id, id);
    assert_eq!(set.identifiers.len(), 2);
    assert_eq!(
        set.primary_identifier(),
        Some((&IdentifierScheme::Lei, "5493001KJTIIGC8Y1R12"))
    );
}

#[test]
fn test_shared_registry_code_for_distinct_entities_conflicts() {
    let springfield = make_id(NAME);
    let shelbyville = make_id("Shelbyville USD");
    let claims = vec![
        make_claim(&springfield, IdentifierScheme::SamUei, "ABCDEFGHJK12"),
        make_claim(&shelbyville, IdentifierScheme::SamUei, "ABCDEFGHJK12"),
    ];
    match resolve_identifiers(&claims).unwrap_err() {
        ResolveError::IdentityConflict {
            kind: ConflictKind::SharedIdentifier { scheme, value },
            verifiable_ids,
        } => {
            assert_eq!(scheme, IdentifierScheme::SamUei);
            assert_eq!(value, "ABCDEFGHJK12");
            assert_eq!(verifiable_ids.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_weakest_confidence_wins() {
    let id = make_id(NAME);
    let probabilistic = ResolutionConfidence::probabilistic(
        Share::parse("0.8").unwrap(),
        UriRef::parse("https://example.org/methods/fuzzy-name").unwrap(),
        3,
    )
    .unwrap();
    let claims = vec![
        make_claim(&id, IdentifierScheme::Lei, "5493001KJTIIGC8Y1R12"),
        IdentifierClaim::new(
            id.clone(),
            IdentifierScheme::SamUei,
            "ABCDEFGHJK12",
            probabilistic.clone(),
        )
        .unwrap(),
    ];
    let set = resolve_identifiers(&claims).unwrap();
    assert_eq!(set.confidence, probabilistic);
    assert!(!set.confidence.is_authoritative());
}

#[test]
fn test_index_rejects_reused_identifier_atomically() {
    let index = IdentityIndex::new();
    let springfield = make_id(NAME);
    let shelbyville = make_id("Shelbyville USD");

    let first = resolve_identifiers(&[make_claim(
        &springfield,
        IdentifierScheme::SamUei,
        "ABCDEFGHJK12",
    )])
    .unwrap();
    index.submit(&first).unwrap();

    let second = resolve_identifiers(&[
        make_claim(&shelbyville, IdentifierScheme::Lei, "5493001KJTIIGC8Y1R12"),
        make_claim(&shelbyville, IdentifierScheme::SamUei, "ABCDEFGHJK12"),
    ])
    .unwrap();
    assert!(matches!(
        index.submit(&second),
        Err(ResolveError::IdentityConflict { .. })
    ));
    assert_eq!(index.len(), 1);
    assert_eq!(
        index.lookup(&IdentifierScheme::SamUei, "ABCDEFGHJK12"),
        Some(springfield)
    );
    assert!(index
        .lookup(&IdentifierScheme::Lei, "5493001KJTIIGC8Y1R12")
        .is_none());
}

#[test]
fn test_funding_hops_compose_into_one_chain() {
    let federal_state = ProvenanceLink::hop("FED", "STATE").unwrap();
    let state_county = ProvenanceLink::hop("STATE", "COUNTY").unwrap();
    let county_contractor = ProvenanceLink::hop("COUNTY", "CONTRACTOR").unwrap();

    let left = federal_state
        .compose(&state_county)
        .unwrap()
        .compose(&county_contractor)
        .unwrap();
    let right = federal_state
        .compose(&state_county.compose(&county_contractor).unwrap())
        .unwrap();
    assert_eq!(left, right);
    assert_eq!(left.tag().to_string(), "FED>STATE>COUNTY>CONTRACTOR");
    assert_eq!(left.from(), "FED");
    assert_eq!(left.to(), "CONTRACTOR");
    assert!(county_contractor.compose(&federal_state).is_err());
}
