//! Journal writer.

use crate::envelope::{missing_envelope_field, EnvelopeJson};
use crate::errors::JournalError;
use crate::frame::{FrameHeader, FrameKind, JournalHeader, HEADER_SIZE};
use cep_core::{Payload, RecordEnvelope};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::Path;

/// Options for opening a journal for writing.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// fsync after every append (default: false).
    pub sync: bool,
    /// Create the file if it does not exist (default: true).
    pub create: bool,
    /// Keep existing frames (default: true); `false` truncates to the header.
    pub append: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync: false,
            create: true,
            append: true,
        }
    }
}

/// Appends envelope revisions to a journal file.
///
/// The writer never rewrites a frame: revisions are immutable once written.
/// Chain integrity is the caller's concern; the store checks each revision
/// against the head before handing it to the writer.
///
/// # Example
///
/// ```rust,no_run
/// use cep_journal::{JournalWriter, WriteOptions};
/// # fn write<P: cep_core::Payload>(revision: &cep_core::RecordEnvelope<P>) -> Result<(), cep_journal::JournalError> {
/// let mut writer = JournalWriter::open("record.cepj", WriteOptions::default())?;
/// writer.append_envelope(revision)?;
/// writer.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct JournalWriter {
    file: File,
    sync: bool,
    frames_written: u64,
}

impl JournalWriter {
    /// Opens or creates a journal.
    ///
    /// An empty file receives a fresh header. An existing file must start with
    /// a valid header.
    ///
    /// # Errors
    ///
    /// - [`JournalError::FileNotEmpty`] if the file is shorter than a header
    /// - [`JournalError::InvalidHeader`] if the header does not validate
    /// - [`JournalError::Io`] on I/O failure
    pub fn open<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self, JournalError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(options.create)
            .read(true)
            .write(true)
            .open(path)?;
        let mut writer = Self {
            file,
            sync: options.sync,
            frames_written: 0,
        };

        let len = writer.file.metadata()?.len();
        if len == 0 {
            writer.file.write_all(&JournalHeader::current().to_bytes())?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "journal created");
        } else if len < HEADER_SIZE as u64 {
            return Err(JournalError::FileNotEmpty);
        } else {
            let mut header = [0u8; HEADER_SIZE];
            writer.file.seek(io::SeekFrom::Start(0))?;
            writer.file.read_exact(&mut header)?;
            JournalHeader::from_bytes(&header)?;
            if options.append {
                writer.file.seek(io::SeekFrom::End(0))?;
            } else {
                writer.file.set_len(HEADER_SIZE as u64)?;
                writer.file.seek(io::SeekFrom::Start(HEADER_SIZE as u64))?;
            }
            tracing::debug!(path = %path.display(), bytes = len, append = options.append, "journal opened");
        }
        Ok(writer)
    }

    /// Appends one envelope revision.
    pub fn append_envelope<P: Payload>(
        &mut self,
        envelope: &RecordEnvelope<P>,
    ) -> Result<(), JournalError> {
        let bytes = serde_json::to_vec(envelope)?;
        self.append_raw(FrameKind::EnvelopeJson, &bytes)?;
        tracing::debug!(
            verifiable_id = %envelope.verifiable_id,
            revision = envelope.revision_number,
            bytes = bytes.len(),
            "revision journaled"
        );
        Ok(())
    }

    /// Appends envelope JSON that did not come from a typed envelope.
    ///
    /// The value must carry every envelope field.
    pub fn append_json(&mut self, envelope: &EnvelopeJson) -> Result<(), JournalError> {
        if let Some(field) = missing_envelope_field(envelope) {
            return Err(JournalError::NotAnEnvelope {
                offset: self.file.stream_position()?,
                reason: format!("missing {field}"),
            });
        }
        let bytes = serde_json::to_vec(envelope)?;
        self.append_raw(FrameKind::EnvelopeJson, &bytes)
    }

    /// Appends a frame of any kind.
    pub fn append_raw(&mut self, kind: FrameKind, payload: &[u8]) -> Result<(), JournalError> {
        let frame = FrameHeader::new(kind, payload.len())?;
        self.file.write_all(&frame.to_bytes())?;
        self.file.write_all(payload)?;
        self.flush()?;
        self.frames_written += 1;
        Ok(())
    }

    /// Frames appended through this writer.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn flush(&mut self) -> Result<(), JournalError> {
        self.file.flush()?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Flushes and closes the journal.
    pub fn finish(mut self) -> Result<(), JournalError> {
        self.flush()
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        let _ = self.file.flush();
        if self.sync {
            let _ = self.file.sync_all();
        }
    }
}
