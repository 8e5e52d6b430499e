//! Parsing, validating, and building file headers.

use log::warn;
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::check::compute_crc;

/// The filetype marker carried by every document.
pub const MAGIC: [u8; 4] = *b".FIT";

/// Protocol version written into built headers unless overridden.
pub const DEFAULT_PROTOCOL_VERSION: u8 = 0x10;

/// Profile version written into built headers unless overridden.
pub const DEFAULT_PROFILE_VERSION: u16 = 100;

/// An error parsing or validating a file header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Too few bytes for a header.
    #[error("Too few bytes for a file header ({0}).")]
    TooShort(usize),
    /// Incorrect filetype marker.
    #[error("Incorrect file type marker.")]
    NotFitData,
    /// Unknown header length.
    #[error("Unknown header length ({0}).")]
    UnknownHeaderLength(u8),
    /// Calculated and found header CRC values do not match.
    #[error("Calculated ({calculated}) and found ({found}) header CRC values do not match.")]
    HeaderCrc { found: u16, calculated: u16 },
    /// A header field disagrees with a caller-supplied expectation.
    #[error("Header {field} is {found}, expected {expected}.")]
    Unexpected {
        field: &'static str,
        found: u32,
        expected: u32,
    },
}

/// Caller-supplied expectations for header fields.
///
/// Used both to validate a parsed header and to fill a rebuilt one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expected {
    pub header_size: Option<u8>,
    pub protocol_version: Option<u8>,
    pub profile_version: Option<u16>,
}

/// A parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Total byte length of the header, 12 or 14.
    pub header_size: u8,
    pub protocol_version: u8,
    pub profile_version: u16,
    /// Byte length of the record section, excluding header and trailer.
    pub data_size: u32,
    /// The check value of a 14 byte header, when set.
    pub crc: Option<u16>,
}

#[repr(C, packed)]
#[derive(FromBytes, IntoBytes, Immutable)]
struct RawHeader {
    header_size: u8,
    protocol_version: u8,
    profile_version: [u8; 2],
    data_size: [u8; 4],
    data_type: [u8; 4],
}

impl FileHeader {
    /// Parse a header from the start of a buffer.
    ///
    /// A 14 byte header carrying a nonzero check value is verified against
    /// the preceding bytes; under `skip_validation` a mismatch is demoted
    /// to a warning.
    pub fn parse(r: &[u8], skip_validation: bool) -> Result<Self, HeaderError> {
        let fixed: [u8; 12] = r
            .get(..12)
            .and_then(|r| r.try_into().ok())
            .ok_or(HeaderError::TooShort(r.len()))?;

        let RawHeader {
            header_size,
            protocol_version,
            profile_version,
            data_size,
            data_type,
        } = zerocopy::transmute!(fixed);

        if data_type != MAGIC {
            Err(HeaderError::NotFitData)?;
        }

        let crc = match header_size {
            12 => None,
            14 => {
                let crc: [u8; 2] = r
                    .get(12..14)
                    .and_then(|r| r.try_into().ok())
                    .ok_or(HeaderError::TooShort(r.len()))?;
                let found = u16::from_le_bytes(crc);

                if found != 0 {
                    let calculated = compute_crc(0, &r[..12]);
                    if found != calculated {
                        let err = HeaderError::HeaderCrc { found, calculated };
                        if skip_validation {
                            warn!("{err}");
                        } else {
                            Err(err)?;
                        }
                    }
                }

                Some(found)
            }
            n => Err(HeaderError::UnknownHeaderLength(n))?,
        };

        Ok(Self {
            header_size,
            protocol_version,
            profile_version: u16::from_le_bytes(profile_version),
            data_size: u32::from_le_bytes(data_size),
            crc,
        })
    }

    /// Check the header against caller-supplied expectations.
    pub fn check(&self, expected: &Expected) -> Result<(), HeaderError> {
        let checks = [
            ("size", self.header_size as u32, expected.header_size.map(u32::from)),
            ("protocol version", self.protocol_version as u32, expected.protocol_version.map(u32::from)),
            ("profile version", self.profile_version as u32, expected.profile_version.map(u32::from)),
        ];

        for (field, found, expected) in checks {
            if let Some(expected) = expected {
                if found != expected {
                    Err(HeaderError::Unexpected {
                        field,
                        found,
                        expected,
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Encode the header, recomputing the check value of a 14 byte form.
    pub fn build(&self) -> Vec<u8> {
        let raw = RawHeader {
            header_size: self.header_size,
            protocol_version: self.protocol_version,
            profile_version: self.profile_version.to_le_bytes(),
            data_size: self.data_size.to_le_bytes(),
            data_type: MAGIC,
        };

        let fixed: [u8; 12] = zerocopy::transmute!(raw);

        let mut r = fixed.to_vec();
        if self.header_size == 14 {
            let crc = compute_crc(0, &r);
            r.extend_from_slice(&crc.to_le_bytes());
        }

        r
    }
}
