//! Journal-per-record backend.

use crate::error::StoreError;
use crate::traits::{HistoryBackend, StoreReader};
use cep_canonical::CanonicalHash;
use cep_core::{Payload, RecordEnvelope, RecordKind, VerifiableId};
use cep_journal::{
    verify_journal, EnvelopeJson, JournalReader, JournalWriter, ReadMode, WriteOptions,
};
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of record journals.
pub const JOURNAL_EXTENSION: &str = "cepj";

/// Path of the journal holding `verifiable_id` under `dir`.
///
/// Journals are grouped by record kind (`<dir>/cep-entity/...`); the file stem
/// is the SHA-256 of the identifier string, so identifiers never need escaping.
pub fn journal_path(dir: &Path, verifiable_id: &VerifiableId) -> PathBuf {
    let stem = CanonicalHash::of(verifiable_id.to_string().as_bytes());
    kind_dir(dir, verifiable_id.kind()).join(format!("{}.{}", stem, JOURNAL_EXTENSION))
}

fn kind_dir(dir: &Path, kind: RecordKind) -> PathBuf {
    dir.join(kind.as_str())
}

fn journal_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths = Vec::new();
    if !dir.is_dir() {
        return Ok(paths);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(JOURNAL_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Stores each record's history in its own journal file.
#[derive(Debug, Clone)]
pub struct JournalBackend {
    dir: PathBuf,
    write: WriteOptions,
    read_mode: ReadMode,
}

impl JournalBackend {
    /// Backend rooted at `dir`, created if missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write: WriteOptions::default(),
            read_mode: ReadMode::Strict,
        })
    }

    /// Sets the write options used for every append.
    pub fn with_write_options(mut self, options: WriteOptions) -> Self {
        self.write = options;
        self
    }

    /// Sets how truncated journals are treated on load.
    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reader over every revision of every kind, journal by journal.
    pub fn reader(&self) -> Result<JournalDirReader, StoreError> {
        let mut paths = Vec::new();
        for kind in [RecordKind::Entity, RecordKind::Relationship, RecordKind::Exchange] {
            paths.extend(journal_files(&kind_dir(&self.dir, kind))?);
        }
        Ok(JournalDirReader {
            pending: paths.into_iter().rev().collect(),
            current: None,
            mode: self.read_mode,
        })
    }
}

impl<P: Payload> HistoryBackend<P> for JournalBackend {
    fn persist(&self, revision: &RecordEnvelope<P>) -> Result<(), StoreError> {
        let path = journal_path(&self.dir, &revision.verifiable_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = JournalWriter::open(&path, self.write.clone())?;
        writer.append_envelope(revision)?;
        writer.finish()?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<Vec<RecordEnvelope<P>>>, StoreError> {
        let mut histories = Vec::new();
        for path in journal_files(&kind_dir(&self.dir, P::KIND))? {
            let chain = verify_journal::<P, _>(&path, self.read_mode)?;
            if journal_path(&self.dir, chain.verifiable_id()) != path {
                return Err(StoreError::MisplacedJournal {
                    path,
                    verifiable_id: chain.verifiable_id().clone(),
                });
            }
            tracing::debug!(
                path = %path.display(),
                verifiable_id = %chain.verifiable_id(),
                revisions = chain.len(),
                "journal replayed"
            );
            histories.push(chain.into_revisions());
        }
        Ok(histories)
    }
}

/// Reads every journal in a directory in file-name order.
pub struct JournalDirReader {
    pending: Vec<PathBuf>,
    current: Option<JournalReader>,
    mode: ReadMode,
}

impl StoreReader for JournalDirReader {
    fn read_next(&mut self) -> Result<Option<EnvelopeJson>, StoreError> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(value) = reader.read_json()? {
                    return Ok(Some(value));
                }
                self.current = None;
            }
            match self.pending.pop() {
                Some(path) => self.current = Some(JournalReader::open(path, self.mode)?),
                None => return Ok(None),
            }
        }
    }
}
