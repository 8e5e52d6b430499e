//! Reassembling repaired buffers and emitting them.

use std::io::{self, Write};

use thiserror::Error;

use crate::Span;
use crate::check;
use crate::header::{
    DEFAULT_PROFILE_VERSION, DEFAULT_PROTOCOL_VERSION, Expected, FileHeader, HeaderError,
};

/// An error reassembling a buffer.
#[derive(Debug, Error)]
pub enum RebuildError {
    /// A kept span lies outside the buffer.
    #[error("Kept span {0} is out of bounds.")]
    OutOfBounds(Span),
    /// The header to be rewritten could not be parsed.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// The rebuilt buffer fails validation.
    #[error("Rebuilt buffer fails validation: {0}")]
    Invalid(#[from] crate::Error),
}

/// Directives for reassembling a buffer from its kept spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Prepend a newly built header.
    pub add_header: bool,
    /// Rewrite the existing header, recomputing its data size.
    pub fix_header: bool,
    /// Append a freshly computed trailer unconditionally.
    pub fix_checksum: bool,
    /// Check the rebuilt buffer decodes cleanly end to end.
    pub validate: bool,
    /// Field values for rebuilt headers, and expectations for validation.
    pub expected: Expected,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            add_header: false,
            fix_header: false,
            fix_checksum: false,
            validate: true,
            expected: Expected::default(),
        }
    }
}

/// Reassemble a buffer by concatenating kept spans.
///
/// A trailer is appended whenever `fix_checksum` is set or validation is
/// not suppressed, so a clean round trip reproduces its input exactly.
pub fn rebuild(r: &[u8], kept: &[Span], options: &RebuildOptions) -> Result<Vec<u8>, RebuildError> {
    let mut body = Vec::new();
    for span in kept {
        let bytes = r
            .get(span.start..span.end)
            .ok_or(RebuildError::OutOfBounds(*span))?;
        body.extend_from_slice(bytes);
    }

    let expected = &options.expected;

    let mut out = if options.add_header {
        let header = FileHeader {
            header_size: expected.header_size.unwrap_or(14),
            protocol_version: expected
                .protocol_version
                .unwrap_or(DEFAULT_PROTOCOL_VERSION),
            profile_version: expected.profile_version.unwrap_or(DEFAULT_PROFILE_VERSION),
            data_size: body.len() as u32,
            crc: None,
        };

        let mut out = header.build();
        out.append(&mut body);
        out
    } else if options.fix_header {
        let old = FileHeader::parse(&body, true)?;
        let records = &body[old.header_size as usize..];

        let header = FileHeader {
            header_size: expected.header_size.unwrap_or(old.header_size),
            protocol_version: expected.protocol_version.unwrap_or(old.protocol_version),
            profile_version: expected.profile_version.unwrap_or(old.profile_version),
            data_size: records.len() as u32,
            crc: None,
        };

        let mut out = header.build();
        out.extend_from_slice(records);
        out
    } else {
        body
    };

    if options.fix_checksum || options.validate {
        let crc = check::trailer(&out);
        out.extend_from_slice(&crc);
    }

    if options.validate {
        crate::validate(&out)?;
        FileHeader::parse(&out, true)?.check(&options.expected)?;
    }

    Ok(out)
}

/// Output encodings for a rebuilt buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// Printable hex encoding.
    Hex,
    /// Binary-exact bytes.
    Raw,
    /// No output; exercises validation only.
    Discard,
}

impl Sink {
    /// Write a rebuilt buffer to a writer in this encoding.
    pub fn write(self, r: &[u8], w: &mut dyn Write) -> io::Result<()> {
        match self {
            Self::Hex => {
                w.write_all(hex::encode(r).as_bytes())?;
                w.write_all(b"\n")
            }
            Self::Raw => w.write_all(r),
            Self::Discard => Ok(()),
        }
    }
}
