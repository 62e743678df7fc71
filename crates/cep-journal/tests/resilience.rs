use cep_canonical::{CanonicalTimestamp, Canonicalizer, UriRef};
use cep_core::{
    ChainIntegrityError, Ed25519Attestor, EntityIdentity, EntityPayload, EnvelopeDraft,
    RecordEnvelope, RevisionChain, StaticKeyResolver, Verifier,
};
use cep_journal::frame::MAX_PAYLOAD_SIZE;
use cep_journal::{
    verify_journal, verify_journal_attestations, FrameKind, JournalError, JournalReader,
    JournalWriter, ReadMode, WriteOptions,
};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn make_method() -> UriRef {
    UriRef::parse("https://keys.example.org/registrar#key-2").unwrap()
}

fn make_attestor() -> Ed25519Attestor {
    Ed25519Attestor::from_seed("cep:attestor:registrar", make_method(), &[11u8; 32])
}

fn make_chain(name: &str, revisions: u32) -> RevisionChain<EntityPayload> {
    let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
    let (id, payload) =
        EntityPayload::from_identity(&canonicalizer, &EntityIdentity::new(name, "US-NY")).unwrap();
    let attestor = make_attestor();
    let at = |n: u32| CanonicalTimestamp::parse(&format!("2025-04-{:02}T08:30:00Z", n)).unwrap();
    let mut chain = RevisionChain::new(
        cep_core::assemble_envelope(
            EnvelopeDraft::new(id.clone(), payload.clone(), at(1)),
            None,
            &attestor,
        )
        .unwrap(),
    )
    .unwrap();
    for n in 2..=revisions {
        let amended = payload.clone().with_naics(format!("4851{:02}", n));
        chain
            .append(EnvelopeDraft::new(id.clone(), amended, at(n)), &attestor)
            .unwrap();
    }
    chain
}

fn write_revisions(path: &Path, revisions: &[RecordEnvelope<EntityPayload>]) {
    let mut writer = JournalWriter::open(path, WriteOptions::default()).unwrap();
    for revision in revisions {
        writer.append_envelope(revision).unwrap();
    }
    writer.finish().unwrap();
}

fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

fn first_frame_end(path: &Path) -> u64 {
    let mut reader = JournalReader::open(path, ReadMode::Strict).unwrap();
    reader.read_frame().unwrap().unwrap();
    reader.position()
}

#[test]
fn test_payload_size_limit() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let mut writer = JournalWriter::open(&path, WriteOptions::default()).unwrap();
    let oversized = vec![0u8; MAX_PAYLOAD_SIZE as usize + 1];

    match writer.append_raw(FrameKind::EnvelopeJson, &oversized) {
        Err(JournalError::PayloadTooLarge { size, max }) => {
            assert_eq!(size, u64::from(MAX_PAYLOAD_SIZE) + 1);
            assert_eq!(max, MAX_PAYLOAD_SIZE);
        }
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }
    assert_eq!(writer.frames_written(), 0);
}

#[test]
fn test_frame_reserved_bytes_must_be_zero() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    write_revisions(&path, make_chain("Port Authority", 1).revisions());
    overwrite(&path, 16 + 1, &[0x01]);

    let mut reader = JournalReader::open(&path, ReadMode::Permissive).unwrap();
    assert!(matches!(
        reader.read_frame(),
        Err(JournalError::InvalidFrame { offset: 16, .. })
    ));
}

#[test]
fn test_header_reserved_bytes_must_be_zero() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    write_revisions(&path, make_chain("Port Authority", 1).revisions());
    overwrite(&path, 8, &[1, 2, 3, 4, 5, 6, 7, 8]);

    assert!(matches!(
        JournalReader::open(&path, ReadMode::Strict),
        Err(JournalError::InvalidHeader(_))
    ));
    assert!(matches!(
        JournalWriter::open(&path, WriteOptions::default()),
        Err(JournalError::InvalidHeader(_))
    ));
}

#[test]
fn test_short_file_is_not_a_journal() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    fs::write(&path, b"CEP").unwrap();

    assert!(matches!(
        JournalWriter::open(&path, WriteOptions::default()),
        Err(JournalError::FileNotEmpty)
    ));
    assert!(matches!(
        JournalReader::open(&path, ReadMode::Permissive),
        Err(JournalError::InvalidHeader(_))
    ));
}

#[test]
fn test_truncated_payload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("Port Authority", 2);
    write_revisions(&path, chain.revisions());
    let cut = first_frame_end(&path) + 10;
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(cut)
        .unwrap();

    let mut strict = JournalReader::open(&path, ReadMode::Strict).unwrap();
    assert!(strict.read_envelope::<EntityPayload>().unwrap().is_some());
    assert!(matches!(
        strict.read_envelope::<EntityPayload>(),
        Err(JournalError::TruncatedFrame { .. })
    ));

    let mut permissive = JournalReader::open(&path, ReadMode::Permissive).unwrap();
    let recovered = permissive.read_all::<EntityPayload>().unwrap();
    assert_eq!(recovered, &chain.revisions()[..1]);
}

#[test]
fn test_truncated_frame_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    write_revisions(&path, make_chain("Port Authority", 2).revisions());
    let cut = first_frame_end(&path) + 3;
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(cut)
        .unwrap();

    let mut strict = JournalReader::open(&path, ReadMode::Strict).unwrap();
    strict.read_frame().unwrap();
    match strict.read_frame() {
        Err(JournalError::TruncatedFrame { offset }) => assert_eq!(offset, cut - 3),
        other => panic!("expected TruncatedFrame, got {other:?}"),
    }

    let chain = verify_journal::<EntityPayload, _>(&path, ReadMode::Permissive).unwrap();
    assert_eq!(chain.len(), 1);
}

#[test]
fn test_corrupt_payload_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    {
        let mut writer = JournalWriter::open(&path, WriteOptions::default()).unwrap();
        writer
            .append_raw(FrameKind::EnvelopeJson, &[0xff, 0xfe, 0x00])
            .unwrap();
        writer.append_raw(FrameKind::EnvelopeJson, b"{not json").unwrap();
        writer.append_raw(FrameKind::EnvelopeJson, b"{}").unwrap();
    }

    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    assert!(matches!(reader.read_json(), Err(JournalError::InvalidUtf8(_))));
    assert!(matches!(reader.read_json(), Err(JournalError::JsonParse(_))));
    assert!(matches!(
        reader.read_json(),
        Err(JournalError::NotAnEnvelope { .. })
    ));
}

#[test]
fn test_verify_journal_rebuilds_chain() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("Port Authority", 4);
    write_revisions(&path, chain.revisions());

    let rebuilt = verify_journal::<EntityPayload, _>(&path, ReadMode::Strict).unwrap();
    assert_eq!(rebuilt, chain);

    let verifier = Verifier::new(Arc::new(
        StaticKeyResolver::new().with_key(make_method(), make_attestor().verifying_key()),
    ));
    let report =
        verify_journal_attestations::<EntityPayload, _>(&path, ReadMode::Strict, &verifier)
            .unwrap();
    assert!(report.is_verified());
    assert_eq!(report.links.len(), 3);
}

#[test]
fn test_tampered_revision_breaks_the_next_link() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let mut revisions = make_chain("Port Authority", 3).into_revisions();
    revisions[1].payload.legal_name = "Port Authority of New Jersey".to_string();
    write_revisions(&path, &revisions);

    match verify_journal::<EntityPayload, _>(&path, ReadMode::Strict) {
        Err(JournalError::Chain(ChainIntegrityError::PreviousHashMismatch { revision, .. })) => {
            assert_eq!(revision, 3)
        }
        other => panic!("expected PreviousHashMismatch, got {other:?}"),
    }
}

#[test]
fn test_journal_holds_one_record() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let ours = make_chain("Port Authority", 1);
    let theirs = make_chain("Transit Authority", 1);
    write_revisions(&path, ours.revisions());
    write_revisions(&path, theirs.revisions());

    assert!(matches!(
        verify_journal::<EntityPayload, _>(&path, ReadMode::Strict),
        Err(JournalError::ForeignRecord { .. })
    ));
}

#[test]
fn test_empty_journal_has_no_chain() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    write_revisions(&path, &[]);

    assert!(matches!(
        verify_journal::<EntityPayload, _>(&path, ReadMode::Strict),
        Err(JournalError::Chain(ChainIntegrityError::EmptyChain))
    ));
}
