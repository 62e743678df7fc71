use crate::errors::JournalError;

/// Journal file magic bytes.
pub const MAGIC: &[u8; 4] = b"CEPJ";

/// Current journal format version.
pub const VERSION: u16 = 0x0001;

/// File header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload a frame may carry: 16 MiB.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Frame kind byte for an envelope revision.
pub const FRAME_KIND_ENVELOPE_JSON: u8 = 0x01;

/// Journal file header.
///
/// Layout: magic (4), version u16 LE (2), flags u16 LE (2), reserved (8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    /// Format version.
    pub version: u16,
    /// Flags; none are defined, so always 0.
    pub flags: u16,
}

impl JournalHeader {
    /// Header for the current format.
    pub fn current() -> Self {
        Self {
            version: VERSION,
            flags: 0,
        }
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes
    }

    /// Parses and validates a header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, JournalError> {
        if bytes.len() < HEADER_SIZE {
            return Err(JournalError::InvalidHeader(format!(
                "header too short: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(JournalError::InvalidHeader(format!(
                "invalid magic {:02x?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(JournalError::InvalidHeader(format!(
                "unsupported version 0x{:04x}",
                version
            )));
        }
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        if flags != 0 {
            return Err(JournalError::InvalidHeader(format!(
                "non-zero flags 0x{:04x}",
                flags
            )));
        }
        if bytes[8..HEADER_SIZE].iter().any(|b| *b != 0) {
            return Err(JournalError::InvalidHeader(
                "non-zero reserved bytes".to_string(),
            ));
        }
        Ok(Self { version, flags })
    }
}

impl Default for JournalHeader {
    fn default() -> Self {
        Self::current()
    }
}

/// Frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 JSON of one record envelope revision.
    EnvelopeJson,
    /// Kind written by a newer format; readers skip it.
    Unknown(u8),
}

impl FrameKind {
    /// Kind for a byte.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            FRAME_KIND_ENVELOPE_JSON => FrameKind::EnvelopeJson,
            other => FrameKind::Unknown(other),
        }
    }

    /// Byte for a kind.
    pub fn to_byte(self) -> u8 {
        match self {
            FrameKind::EnvelopeJson => FRAME_KIND_ENVELOPE_JSON,
            FrameKind::Unknown(byte) => byte,
        }
    }
}

/// Frame header.
///
/// Layout: kind (1), reserved (3), payload length u32 LE (4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame kind.
    pub kind: FrameKind,
    /// Payload length in bytes.
    pub len: u32,
}

impl FrameHeader {
    /// Header for a payload of `len` bytes.
    pub fn new(kind: FrameKind, len: usize) -> Result<Self, JournalError> {
        match u32::try_from(len) {
            Ok(len) if len <= MAX_PAYLOAD_SIZE => Ok(Self { kind, len }),
            _ => Err(JournalError::PayloadTooLarge {
                size: len as u64,
                max: MAX_PAYLOAD_SIZE,
            }),
        }
    }

    /// Serializes the frame header.
    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        bytes[0] = self.kind.to_byte();
        bytes[4..8].copy_from_slice(&self.len.to_le_bytes());
        bytes
    }

    /// Parses a frame header found at `offset`.
    pub fn from_bytes(bytes: &[u8; FRAME_HEADER_SIZE], offset: u64) -> Result<Self, JournalError> {
        if bytes[1..4] != [0u8; 3] {
            return Err(JournalError::InvalidFrame {
                offset,
                reason: "non-zero reserved bytes".to_string(),
            });
        }
        let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if len > MAX_PAYLOAD_SIZE {
            return Err(JournalError::InvalidFrame {
                offset,
                reason: format!("payload size {} exceeds maximum {}", len, MAX_PAYLOAD_SIZE),
            });
        }
        Ok(Self {
            kind: FrameKind::from_byte(bytes[0]),
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        let bytes = JournalHeader::current().to_bytes();
        assert_eq!(&bytes[0..4], b"CEPJ");
        assert_eq!(bytes[4..6], [0x01u8, 0x00]);
        assert_eq!(JournalHeader::from_bytes(&bytes).unwrap(), JournalHeader::current());
    }

    #[test]
    fn header_rejects_each_bad_field() {
        for (index, value, needle) in [
            (0, b'X', "magic"),
            (4, 0x02, "version"),
            (6, 0x01, "flags"),
            (12, 0x01, "reserved"),
        ] {
            let mut bytes = JournalHeader::current().to_bytes();
            bytes[index] = value;
            let err = JournalHeader::from_bytes(&bytes).unwrap_err();
            assert!(err.to_string().contains(needle), "{err}");
        }
        assert!(JournalHeader::from_bytes(&[0u8; 4]).is_err());
    }

    #[test]
    fn frame_header_reports_offset() {
        let mut bytes = FrameHeader::new(FrameKind::EnvelopeJson, 100)
            .unwrap()
            .to_bytes();
        bytes[2] = 0x01;
        match FrameHeader::from_bytes(&bytes, 4096) {
            Err(JournalError::InvalidFrame { offset, .. }) => assert_eq!(offset, 4096),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn frame_header_limits_payload() {
        assert!(FrameHeader::new(FrameKind::EnvelopeJson, MAX_PAYLOAD_SIZE as usize).is_ok());
        assert!(matches!(
            FrameHeader::new(FrameKind::EnvelopeJson, MAX_PAYLOAD_SIZE as usize + 1),
            Err(JournalError::PayloadTooLarge { .. })
        ));
        assert_eq!(FrameKind::from_byte(0x7f), FrameKind::Unknown(0x7f));
    }
}
