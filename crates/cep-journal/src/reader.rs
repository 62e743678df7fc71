//! Journal reader.

use crate::envelope::{missing_envelope_field, EnvelopeJson};
use crate::errors::JournalError;
use crate::frame::{FrameHeader, FrameKind, JournalHeader, FRAME_HEADER_SIZE, HEADER_SIZE};
use cep_core::{Payload, RecordEnvelope, RecordKind};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;

/// How the reader treats a frame cut short at the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// A truncated frame is an error.
    Strict,
    /// A truncated frame ends the journal; earlier frames are kept.
    Permissive,
}

/// Reads envelope revisions from a journal file, in write order.
pub struct JournalReader {
    file: File,
    len: u64,
    mode: ReadMode,
    position: u64,
}

impl JournalReader {
    /// Opens a journal and validates its header.
    pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Self, JournalError> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let mut header = [0u8; HEADER_SIZE];
        file.read_exact(&mut header).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                JournalError::InvalidHeader(format!("header too short: {} bytes", len))
            }
            _ => JournalError::Io(err),
        })?;
        JournalHeader::from_bytes(&header)?;
        Ok(Self {
            file,
            len,
            mode,
            position: HEADER_SIZE as u64,
        })
    }

    /// Byte offset of the next frame.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn truncated(&self, offset: u64) -> Result<Option<(FrameKind, Vec<u8>)>, JournalError> {
        match self.mode {
            ReadMode::Permissive => {
                tracing::warn!(offset, "truncated frame; ending journal");
                Ok(None)
            }
            ReadMode::Strict => Err(JournalError::TruncatedFrame { offset }),
        }
    }

    /// Reads the next frame of any kind.
    ///
    /// Returns `Ok(None)` at end of file, or at a truncated frame in permissive mode.
    pub fn read_frame(&mut self) -> Result<Option<(FrameKind, Vec<u8>)>, JournalError> {
        if self.position >= self.len {
            return Ok(None);
        }
        let start = self.position;
        self.file.seek(io::SeekFrom::Start(start))?;

        if self.len - start < FRAME_HEADER_SIZE as u64 {
            return self.truncated(start);
        }
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.file.read_exact(&mut header)?;
        let frame = FrameHeader::from_bytes(&header, start)?;

        let body_start = start + FRAME_HEADER_SIZE as u64;
        if self.len - body_start < u64::from(frame.len) {
            return self.truncated(body_start);
        }
        let mut payload = vec![0u8; frame.len as usize];
        self.file.read_exact(&mut payload)?;
        self.position = body_start + u64::from(frame.len);
        Ok(Some((frame.kind, payload)))
    }

    /// Reads the next envelope as untyped JSON, skipping unknown frame kinds.
    pub fn read_json(&mut self) -> Result<Option<EnvelopeJson>, JournalError> {
        loop {
            let offset = self.position;
            match self.read_frame()? {
                None => return Ok(None),
                Some((FrameKind::EnvelopeJson, payload)) => {
                    let text = std::str::from_utf8(&payload)?;
                    let value: EnvelopeJson = serde_json::from_str(text)?;
                    if let Some(field) = missing_envelope_field(&value) {
                        return Err(JournalError::NotAnEnvelope {
                            offset,
                            reason: format!("missing {field}"),
                        });
                    }
                    return Ok(Some(value));
                }
                Some((FrameKind::Unknown(kind), _)) => {
                    tracing::debug!(offset, kind, "skipping unknown frame");
                }
            }
        }
    }

    /// Reads the next envelope as a typed revision.
    ///
    /// The frame's `recordKind` must be `P::KIND`.
    pub fn read_envelope<P: Payload>(&mut self) -> Result<Option<RecordEnvelope<P>>, JournalError> {
        let offset = self.position;
        let Some(value) = self.read_json()? else {
            return Ok(None);
        };
        let kind = value
            .get("recordKind")
            .and_then(|kind| kind.as_str())
            .and_then(|kind| RecordKind::parse(kind).ok())
            .ok_or_else(|| JournalError::NotAnEnvelope {
                offset,
                reason: "unknown recordKind".to_string(),
            })?;
        if kind != P::KIND {
            return Err(JournalError::KindMismatch {
                offset,
                expected: P::KIND,
                found: kind,
            });
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Reads every remaining revision.
    pub fn read_all<P: Payload>(&mut self) -> Result<Vec<RecordEnvelope<P>>, JournalError> {
        let mut revisions = Vec::new();
        while let Some(revision) = self.read_envelope()? {
            revisions.push(revision);
        }
        Ok(revisions)
    }
}
