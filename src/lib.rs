//! A decoder and repair engine for Garmin's Flexible and Interoperable
//! Data Transfer protocol.
//!
//! Retrofit turns a byte buffer into structured, semantically-typed
//! records, and when the stream is corrupted (truncated, interleaved
//! garbage, torn writes) searches for the longest valid subsequence of
//! records and reassembles a byte-exact, checksummed document from it.
//!
//! Most users should begin with [`decode`] for intact documents, and
//! [`recover`] followed by [`rebuild`] for suspect ones. The underlying
//! [`token::TokenReader`] is exposed for applications needing finer
//! control over scanning. Decoding one buffer is a purely sequential
//! scan over state owned by that scan; independent buffers parallelize
//! with [`batch::map`].

use std::fmt;
use std::str::FromStr;

use log::warn;
use thiserror::Error;

pub mod base;
pub mod batch;
pub mod check;
pub mod grep;
pub mod header;
pub mod message;
pub mod profile;
pub mod recover;
pub mod token;
pub mod write;

pub use header::FileHeader;
pub use message::{DecodedMessage, FieldValue, Value};
pub use profile::{FieldDescriptor, Profile, TableProfile};
pub use recover::{RecoverOptions, Recovery, recover, recover_slices};
pub use token::Token;
pub use write::{RebuildOptions, Sink, rebuild};

/// A `[start, end)` byte range of the original buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Parse a comma-separated `A:B,C:D,...` span list.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, SpanParseError> {
        s.split(',').map(str::parse).collect()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// An error parsing a span.
#[derive(Debug, Error)]
#[error("Malformed span `{0}`, expected `start:end`.")]
pub struct SpanParseError(String);

impl FromStr for Span {
    type Err = SpanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SpanParseError(s.to_owned());

        let (start, end) = s.split_once(':').ok_or_else(malformed)?;
        let start = start.trim().parse().map_err(|_| malformed())?;
        let end = end.trim().parse().map_err(|_| malformed())?;

        Ok(Self { start, end })
    }
}

/// An error strictly decoding a document.
#[derive(Debug, Error)]
pub enum Error {
    /// The header is malformed.
    #[error(transparent)]
    Header(#[from] header::HeaderError),
    /// A record could not be scanned.
    #[error(transparent)]
    Token(#[from] token::TokenError),
    /// A record could not be decoded against its definition.
    #[error(transparent)]
    Message(#[from] message::MessageError),
    /// Calculated and found CRC values do not match.
    #[error("Calculated ({calculated}) and found ({found}) CRC values do not match.")]
    Checksum { found: u16, calculated: u16 },
    /// Document length disagrees with the header's declared data size.
    #[error("Declared sizes require a {declared} byte document, found {actual} bytes.")]
    Length { declared: usize, actual: usize },
    /// Timestamps regressed or jumped beyond the permitted delta.
    #[error("Timestamp {next} out of range of {prev} (at offset {offset}).")]
    TimeInvariant { prev: u32, next: u32, offset: usize },
}

/// Limits restricting a scan to a window of the record section, for
/// inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    /// Skip initial record bytes.
    pub after_bytes: Option<usize>,
    /// Limit the record bytes scanned.
    pub limit_bytes: Option<usize>,
    /// Skip initial records.
    pub after_records: Option<usize>,
    /// Limit the records yielded.
    pub limit_records: Option<usize>,
}

/// Options for a strict decoding pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOptions {
    /// Demote validation failures to warnings.
    pub skip_validation: bool,
    /// Maximum seconds between consecutive timestamps (and non-decreasing)
    /// when set.
    pub max_delta_t: Option<f64>,
    /// Upper bound on a single record's plausible length.
    pub max_record_len: Option<usize>,
    /// Restrict the scan to a window.
    pub window: Window,
}

/// Strictly decode a document into messages.
///
/// Validates the header, declared length, and trailing check value, then
/// scans and resolves every record. Any failure is returned with its
/// offset; for best-effort decoding of a corrupted document use
/// [`recover`] instead.
pub fn decode(
    r: &[u8],
    profile: &dyn Profile,
    options: &DecodeOptions,
) -> Result<Vec<DecodedMessage>, Error> {
    let header = FileHeader::parse(r, options.skip_validation)?;
    let (start, end) = bounds(r, &header, options)?;

    let mut reader =
        token::TokenReader::new(r, start, end).with_max_record_len(options.max_record_len);

    let mut messages = Vec::new();
    let mut seen = 0;
    let skip = options.window.after_records.unwrap_or(0);

    loop {
        let at = reader.position();
        let time_base = reader.last_timestamp();

        let Some(token) = reader.next_token() else {
            break;
        };

        if let Token::Data(data) = token? {
            check_delta(options.max_delta_t, time_base, data.timestamp, at)?;

            seen += 1;
            if seen <= skip {
                continue;
            }
            if let Some(limit) = options.window.limit_records {
                if messages.len() >= limit {
                    break;
                }
            }

            if let Some(definition) = reader.definitions().get(data.local) {
                messages.push(message::decode(&data, definition, profile)?);
            }
        }
    }

    Ok(messages)
}

/// Scan a document into its low-level tokens.
///
/// Performs the same validation as [`decode`], without resolving records
/// against a profile, so undocumented messages pass through as opaque
/// byte blobs.
pub fn tokens(r: &[u8], options: &DecodeOptions) -> Result<Vec<Token>, Error> {
    let header = FileHeader::parse(r, options.skip_validation)?;
    let (start, end) = bounds(r, &header, options)?;

    let mut reader =
        token::TokenReader::new(r, start, end).with_max_record_len(options.max_record_len);

    let mut tokens = Vec::new();
    let mut seen = 0;
    let skip = options.window.after_records.unwrap_or(0);

    loop {
        let at = reader.position();
        let time_base = reader.last_timestamp();

        let Some(token) = reader.next_token() else {
            break;
        };
        let token = token?;

        if let Token::Data(data) = &token {
            check_delta(options.max_delta_t, time_base, data.timestamp, at)?;
        }

        seen += 1;
        if seen <= skip {
            continue;
        }
        if let Some(limit) = options.window.limit_records {
            if tokens.len() >= limit {
                break;
            }
        }

        tokens.push(token);
    }

    Ok(tokens)
}

/// Check a document decodes cleanly end to end.
pub fn validate(r: &[u8]) -> Result<(), Error> {
    decode(r, &TableProfile::new(), &DecodeOptions::default()).map(|_| ())
}

/// Validate the declared length and trailing check value, and derive the
/// window bounds of the record section.
fn bounds(r: &[u8], header: &FileHeader, options: &DecodeOptions) -> Result<(usize, usize), Error> {
    let header_len = header.header_size as usize;
    let declared_end = header_len + header.data_size as usize;

    if declared_end + 2 != r.len() {
        let err = Error::Length {
            declared: declared_end + 2,
            actual: r.len(),
        };
        if options.skip_validation {
            warn!("{err}");
        } else {
            return Err(err);
        }
    }

    let body = r.get(..declared_end + 2).unwrap_or(r);
    if let Some((_, found, calculated)) = check::split(body) {
        if found != calculated {
            let err = Error::Checksum { found, calculated };
            if options.skip_validation {
                warn!("{err}");
            } else {
                return Err(err);
            }
        }
    }

    let start = header_len + options.window.after_bytes.unwrap_or(0);
    let mut end = declared_end.min(r.len().saturating_sub(2));
    if let Some(limit) = options.window.limit_bytes {
        end = end.min(start.saturating_add(limit));
    }

    Ok((start.min(end), end))
}

fn check_delta(
    max_delta_t: Option<f64>,
    prev: Option<u32>,
    next: Option<u32>,
    at: usize,
) -> Result<(), Error> {
    if let (Some(max), Some(prev), Some(next)) = (max_delta_t, prev, next) {
        let delta = next as f64 - prev as f64;
        if !(0.0..=max).contains(&delta) {
            return Err(Error::TimeInvariant {
                prev,
                next,
                offset: at,
            });
        }
    }

    Ok(())
}
