use cep_canonical::{CanonicalTimestamp, Canonicalize, Canonicalizer, UriRef};
use cep_core::{
    assemble_envelope, check_link, reconstruct_history, verify_links, ChainIntegrityError,
    CoreError, Ed25519Attestor, EntityIdentity, EntityPayload, EnvelopeDraft, RecordEnvelope,
    RecordStatus, RevisionChain, StatusCode, VerifiableId,
};

fn make_attestor() -> Ed25519Attestor {
    Ed25519Attestor::from_seed(
        "cep:attestor:registrar",
        UriRef::parse("https://keys.example.org/registrar#key-1").unwrap(),
        &[42u8; 32],
    )
}

fn make_timestamp(day: u32) -> CanonicalTimestamp {
    CanonicalTimestamp::parse(&format!("2025-01-{:02}T09:00:00Z", day)).unwrap()
}

fn make_entity() -> (VerifiableId, EntityPayload) {
    let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
    EntityPayload::from_identity(
        &canonicalizer,
        &EntityIdentity::new("Springfield USD", "US-IL").with_address("100 Main St."),
    )
    .unwrap()
}

fn make_chain(revisions: u32) -> RevisionChain<EntityPayload> {
    let attestor = make_attestor();
    let (id, payload) = make_entity();
    let genesis = assemble_envelope(
        EnvelopeDraft::new(id.clone(), payload.clone(), make_timestamp(1)),
        None,
        &attestor,
    )
    .unwrap();
    let mut chain = RevisionChain::new(genesis).unwrap();
    for n in 2..=revisions {
        let amended = payload.clone().with_naics(format!("6111{:02}", n));
        chain
            .append(
                EnvelopeDraft::new(id.clone(), amended, make_timestamp(n)),
                &attestor,
            )
            .unwrap();
    }
    chain
}

#[test]
fn test_genesis_has_null_previous_hash() {
    let chain = make_chain(1);
    let genesis = chain.head();
    assert_eq!(genesis.revision_number, 1);
    assert!(genesis.previous_record_hash.is_none());

    let json = serde_json::to_value(genesis).unwrap();
    assert!(json["previousRecordHash"].is_null());
    assert_eq!(json["recordKind"], "cep-entity");
    assert_eq!(json["firstSeenAt"], "2025-01-01T09:00:00.000000Z");
}

#[test]
fn test_revisions_link_to_prior_hash() {
    let chain = make_chain(3);
    for n in 2..=3u64 {
        let prior = chain.get(n - 1).unwrap();
        let current = chain.get(n).unwrap();
        assert_eq!(current.revision_number, n);
        assert_eq!(
            current.previous_record_hash.as_ref(),
            Some(&prior.record_hash().unwrap())
        );
        assert_eq!(current.first_seen_at, prior.first_seen_at);
    }
}

#[test]
fn test_chain_round_trip_recovers_serializations() {
    let chain = make_chain(5);
    let produced = chain.canonical_serializations().unwrap();
    let recovered = chain.verify_integrity().unwrap();
    assert_eq!(produced.len(), 5);
    assert_eq!(recovered, produced);
}

#[test]
fn test_mutating_intermediate_revision_breaks_chain_there() {
    let mut revisions = make_chain(5).into_revisions();
    revisions[2].payload.legal_name = "Springfield Unified".to_string();

    let err = verify_links(&revisions).unwrap_err();
    match err {
        ChainIntegrityError::BrokenLink { revision, .. } => assert_eq!(revision, 3),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_identical_revision_is_rejected() {
    let mut chain = make_chain(2);
    let head = chain.head().clone();
    let draft = EnvelopeDraft::new(
        head.verifiable_id.clone(),
        head.payload.clone(),
        make_timestamp(9),
    );
    let err = chain.append(draft, &make_attestor()).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Chain(ChainIntegrityError::NoSubstantiveChange { revision: 3, .. })
    ));
    assert_eq!(chain.len(), 2);
}

#[test]
fn test_revision_gap_is_rejected() {
    let mut chain = make_chain(2);
    let mut next = assemble_envelope(
        EnvelopeDraft::new(
            chain.verifiable_id().clone(),
            chain.head().payload.clone().with_naics("611199"),
            make_timestamp(3),
        ),
        Some(chain.head()),
        &make_attestor(),
    )
    .unwrap();
    next.revision_number = 4;
    assert!(matches!(
        chain.accept(next),
        Err(ChainIntegrityError::RevisionGap {
            expected: 3,
            found: 4,
            ..
        })
    ));
}

#[test]
fn test_stale_previous_hash_is_rejected() {
    let mut chain = make_chain(3);
    let stale_prior = chain.get(2).unwrap().clone();
    let mut next = assemble_envelope(
        EnvelopeDraft::new(
            chain.verifiable_id().clone(),
            stale_prior.payload.clone().with_naics("611150"),
            make_timestamp(4),
        ),
        Some(&stale_prior),
        &make_attestor(),
    )
    .unwrap();
    next.revision_number = 4;
    assert!(matches!(
        chain.accept(next),
        Err(ChainIntegrityError::PreviousHashMismatch { revision: 4, .. })
    ));
}

#[test]
fn test_revision_number_overflow_is_its_own_error() {
    let chain = make_chain(1);
    let mut exhausted = chain.head().clone();
    exhausted.revision_number = u64::MAX;

    let err = assemble_envelope(
        EnvelopeDraft::new(
            exhausted.verifiable_id.clone(),
            exhausted.payload.clone().with_naics("611110"),
            make_timestamp(2),
        ),
        Some(&exhausted),
        &make_attestor(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Chain(ChainIntegrityError::RevisionOverflow {
            revision: u64::MAX,
            ..
        })
    ));

    let mut successor = exhausted.clone();
    successor.previous_record_hash = Some(exhausted.record_hash().unwrap());
    assert!(matches!(
        check_link(Some(&exhausted), &successor),
        Err(ChainIntegrityError::RevisionOverflow { .. })
    ));
}

#[test]
fn test_revision_for_other_record_is_rejected() {
    let chain = make_chain(1);
    let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
    let (other_id, other_payload) = EntityPayload::from_identity(
        &canonicalizer,
        &EntityIdentity::new("Shelbyville USD", "US-IL"),
    )
    .unwrap();
    let err = assemble_envelope(
        EnvelopeDraft::new(other_id, other_payload, make_timestamp(2)),
        Some(chain.head()),
        &make_attestor(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Chain(ChainIntegrityError::IdentifierChanged { .. })
    ));
}

#[test]
fn test_supersession_sets_valid_to_and_keeps_history() {
    let mut chain = make_chain(2);
    let head = chain.head().clone();
    let draft = EnvelopeDraft::new(
        head.verifiable_id.clone(),
        head.payload.clone(),
        make_timestamp(20),
    )
    .superseded(make_timestamp(20));
    let superseded = chain.append(draft, &make_attestor()).unwrap().clone();

    assert_eq!(superseded.status.status_code, StatusCode::Superseded);
    assert_eq!(superseded.valid_to, Some(make_timestamp(20)));
    assert!(superseded.is_valid_at(make_timestamp(19)));
    assert!(!superseded.is_valid_at(make_timestamp(20)));
    assert_eq!(chain.len(), 3);
    assert_eq!(chain.get(1).unwrap().status, RecordStatus::active());
}

#[test]
fn test_history_is_reconstructed_from_pointers_only() {
    let chain = make_chain(4);
    let head = chain.head().clone();
    let mut pool: Vec<RecordEnvelope<EntityPayload>> = chain.revisions().to_vec();
    pool.reverse();
    pool.swap(0, 2);

    let rebuilt = reconstruct_history(&head, &pool).unwrap();
    assert_eq!(rebuilt, chain);
}

#[test]
fn test_missing_predecessor_is_reported() {
    let chain = make_chain(3);
    let head = chain.head().clone();
    let pool: Vec<_> = chain
        .revisions()
        .iter()
        .filter(|revision| revision.revision_number != 2)
        .cloned()
        .collect();
    assert!(matches!(
        reconstruct_history(&head, &pool),
        Err(ChainIntegrityError::MissingPredecessor { revision: 3, .. })
    ));
}

#[test]
fn test_envelope_json_round_trip_preserves_hash() {
    let chain = make_chain(2);
    let head = chain.head();
    let json = serde_json::to_string(head).unwrap();
    let parsed: RecordEnvelope<EntityPayload> = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed.canonical_hash().unwrap(),
        head.canonical_hash().unwrap()
    );
}
