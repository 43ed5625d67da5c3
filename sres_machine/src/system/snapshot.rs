//! Snapshot header and format errors.
//!
//! A snapshot starts with a fixed size header:
//!
//! | field       | size |                                              |
//! |-------------|------|----------------------------------------------|
//! | signature   | 4    | [SIGNATURE]                                  |
//! | size        | 4    | total size of the snapshot including header  |
//! | version     | 16   | build that wrote it, NUL padded              |
//! | description | 512  | free text, NUL padded                        |
//! | synchronize | 1    | set for portable snapshots                   |
//! | reserved    | 1    |                                              |
//!
//! The body that follows is only meaningful to the build that wrote it, see
//! [System::serialize](crate::System::serialize).
use thiserror::Error;

use crate::common::serializer::fixed_text;
use crate::common::serializer::text_from_fixed;
use crate::common::serializer::Serializable;
use crate::common::serializer::Serializer;

/// "SRS1" read as a little-endian integer.
pub const SIGNATURE: u32 = 0x3153_5253;
pub const VERSION_SIZE: usize = 16;
pub const DESCRIPTION_SIZE: usize = 512;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("invalid snapshot signature {0:#010x}")]
    InvalidSignature(u32),

    #[error("snapshot size mismatch (expected {expected} bytes, found {found} bytes)")]
    SizeMismatch { expected: usize, found: usize },

    #[error("snapshot version mismatch (expected {expected:?}, found {found:?})")]
    VersionMismatch { expected: String, found: String },

    #[error("snapshot truncated")]
    Truncated,

    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

/// Version string written by this build.
pub fn version() -> String {
    format!("sres {}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub signature: u32,
    pub size: u32,
    pub version: [u8; VERSION_SIZE],
    pub description: [u8; DESCRIPTION_SIZE],
    pub synchronize: bool,
    pub reserved: bool,
}

impl Header {
    pub const SIZE: usize = 4 + 4 + VERSION_SIZE + DESCRIPTION_SIZE + 1 + 1;

    pub fn new(size: usize, synchronize: bool, description: &str) -> Self {
        Self {
            signature: SIGNATURE,
            size: size as u32,
            version: fixed_text(&version()),
            description: fixed_text(description),
            synchronize,
            reserved: false,
        }
    }

    /// Reads the header of `data`. Only the signature is checked.
    pub fn parse(data: &[u8]) -> Result<Self, SnapshotError> {
        let mut header = Header::new(0, false, "");
        let mut s = Serializer::load(data);
        s.object(&mut header);
        if data.len() >= 4 && header.signature != SIGNATURE {
            return Err(SnapshotError::InvalidSignature(header.signature));
        }
        if s.overrun() {
            return Err(SnapshotError::Truncated);
        }
        Ok(header)
    }

    /// Rejects snapshots written by any other build.
    pub fn check_version(&self) -> Result<(), SnapshotError> {
        let expected = version();
        if self.version != fixed_text::<VERSION_SIZE>(&expected) {
            return Err(SnapshotError::VersionMismatch {
                expected,
                found: self.version(),
            });
        }
        Ok(())
    }

    pub fn version(&self) -> String {
        text_from_fixed(&self.version)
    }

    pub fn description(&self) -> String {
        text_from_fixed(&self.description)
    }
}

impl Serializable for Header {
    fn serialize(&mut self, s: &mut Serializer) {
        s.integer(&mut self.signature);
        s.integer(&mut self.size);
        s.text(&mut self.version);
        s.text(&mut self.description);
        s.boolean(&mut self.synchronize);
        s.boolean(&mut self.reserved);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn header_bytes(header: &mut Header) -> Vec<u8> {
        let mut s = Serializer::save(Header::SIZE);
        s.object(header);
        s.into_data()
    }

    #[test]
    fn test_layout() {
        let mut header = Header::new(Header::SIZE, true, "boss fight");
        let data = header_bytes(&mut header);
        assert_eq!(data.len(), Header::SIZE);
        assert_eq!(&data[0..4], b"SRS1");
        assert_eq!(&data[4..8], &(Header::SIZE as u32).to_le_bytes());
        assert_eq!(&data[8..13], b"sres ");
        assert_eq!(&data[24..34], b"boss fight");
        assert_eq!(data[536], 1);
        assert_eq!(data[537], 0);

        let parsed = Header::parse(&data).unwrap();
        assert_eq!(parsed.description(), "boss fight");
        assert_eq!(parsed.version(), version());
        assert_eq!(parsed.check_version(), Ok(()));
    }

    #[test]
    fn test_rejects_foreign_data() {
        assert_eq!(Header::parse(&[]), Err(SnapshotError::Truncated));
        assert_eq!(
            Header::parse(b"PNG\0 and more"),
            Err(SnapshotError::InvalidSignature(0x00474E50))
        );

        let mut header = Header::new(Header::SIZE, false, "");
        let data = header_bytes(&mut header);
        assert_eq!(Header::parse(&data[..100]), Err(SnapshotError::Truncated));
    }

    #[test]
    fn test_rejects_other_builds() {
        let mut header = Header::new(Header::SIZE, false, "");
        header.version = fixed_text("sres 0.0.0-old");
        let data = header_bytes(&mut header);
        assert_eq!(
            Header::parse(&data).unwrap().check_version(),
            Err(SnapshotError::VersionMismatch {
                expected: version(),
                found: "sres 0.0.0-old".to_string(),
            })
        );
    }
}
