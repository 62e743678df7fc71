use cep_canonical::{CanonicalTimestamp, Canonicalizer, UriRef};
use cep_core::{
    Ed25519Attestor, EntityIdentity, EntityPayload, EnvelopeDraft, RecordEnvelope, RevisionChain,
};
use cep_journal::{FrameKind, JournalError, JournalReader, JournalWriter, ReadMode, WriteOptions};
use std::fs;
use tempfile::TempDir;

fn make_attestor() -> Ed25519Attestor {
    Ed25519Attestor::from_seed(
        "cep:attestor:registrar",
        UriRef::parse("https://keys.example.org/registrar#key-1").unwrap(),
        &[7u8; 32],
    )
}

fn make_chain(name: &str, revisions: u32) -> RevisionChain<EntityPayload> {
    let canonicalizer = Canonicalizer::with_builtin_rules().unwrap();
    let (id, payload) =
        EntityPayload::from_identity(&canonicalizer, &EntityIdentity::new(name, "CA-ON")).unwrap();
    let attestor = make_attestor();
    let at = |n: u32| CanonicalTimestamp::parse(&format!("2025-02-{:02}T12:00:00Z", n)).unwrap();
    let genesis = cep_core::assemble_envelope(
        EnvelopeDraft::new(id.clone(), payload.clone(), at(1)),
        None,
        &attestor,
    )
    .unwrap();
    let mut chain = RevisionChain::new(genesis).unwrap();
    for n in 2..=revisions {
        let amended = payload.clone().with_naics(format!("9211{:02}", n));
        chain
            .append(EnvelopeDraft::new(id.clone(), amended, at(n)), &attestor)
            .unwrap();
    }
    chain
}

fn write_chain(path: &std::path::Path, revisions: &[RecordEnvelope<EntityPayload>]) {
    let mut writer = JournalWriter::open(path, WriteOptions::default()).unwrap();
    for revision in revisions {
        writer.append_envelope(revision).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn test_write_read_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("City of Toronto", 3);
    write_chain(&path, chain.revisions());

    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    let read: Vec<RecordEnvelope<EntityPayload>> = reader.read_all().unwrap();
    assert_eq!(read, chain.revisions());
    assert_eq!(reader.position(), fs::metadata(&path).unwrap().len());
    assert!(reader.read_envelope::<EntityPayload>().unwrap().is_none());
}

#[test]
fn test_append_to_existing() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("City of Ottawa", 3);
    write_chain(&path, &chain.revisions()[..1]);
    write_chain(&path, &chain.revisions()[1..]);

    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    let numbers: Vec<u64> = reader
        .read_all::<EntityPayload>()
        .unwrap()
        .iter()
        .map(|revision| revision.revision_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn test_non_append_truncates_to_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("City of Ottawa", 2);
    write_chain(&path, chain.revisions());

    let writer = JournalWriter::open(
        &path,
        WriteOptions {
            append: false,
            ..WriteOptions::default()
        },
    )
    .unwrap();
    writer.finish().unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 16);
}

#[test]
fn test_empty_journal_has_only_header() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    JournalWriter::open(&path, WriteOptions::default())
        .unwrap()
        .finish()
        .unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[..4], b"CEPJ");
    assert_eq!(bytes.len(), 16);
    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    assert!(reader.read_frame().unwrap().is_none());
}

#[test]
fn test_unknown_frames_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("City of Hamilton", 2);
    {
        let mut writer = JournalWriter::open(&path, WriteOptions::default()).unwrap();
        writer.append_envelope(&chain.revisions()[0]).unwrap();
        writer.append_raw(FrameKind::Unknown(0x42), b"opaque").unwrap();
        writer.append_envelope(&chain.revisions()[1]).unwrap();
        assert_eq!(writer.frames_written(), 3);
    }

    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    assert_eq!(reader.read_all::<EntityPayload>().unwrap().len(), 2);
}

#[test]
fn test_untyped_reads_expose_addresses() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("City of Hamilton", 2);
    write_chain(&path, chain.revisions());

    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    let first = reader.read_json().unwrap().unwrap();
    let id = chain.verifiable_id().to_string();
    assert_eq!(
        cep_journal::envelope::envelope_address(&first),
        Some((id.as_str(), 1))
    );
    assert!(first["previousRecordHash"].is_null());
}

#[test]
fn test_append_json_requires_envelope_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let mut writer = JournalWriter::open(&path, WriteOptions::default()).unwrap();
    let err = writer
        .append_json(&serde_json::json!({ "recordKind": "cep-entity" }))
        .unwrap_err();
    assert!(matches!(err, JournalError::NotAnEnvelope { offset: 16, .. }));
}

#[test]
fn test_reading_wrong_payload_type_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("record.cepj");
    let chain = make_chain("City of Hamilton", 1);
    write_chain(&path, chain.revisions());

    let mut reader = JournalReader::open(&path, ReadMode::Strict).unwrap();
    let err = reader
        .read_envelope::<cep_core::ExchangePayload>()
        .unwrap_err();
    assert!(matches!(
        err,
        JournalError::KindMismatch {
            offset: 16,
            expected: cep_core::RecordKind::Exchange,
            found: cep_core::RecordKind::Entity,
        }
    ));
}
