//! Decoding low-level record tokens.
//!
//! Tokens are the two record forms of the wire grammar: definitions, which
//! declare the field layout for a local message type, and data records,
//! which carry field bytes laid out per the definition active for their
//! local type. The [`TokenReader`] walks a byte cursor over the record
//! section of one buffer, carrying the active definitions and the last
//! absolute timestamp; it is cheap to clone, so a caller can checkpoint a
//! scan and resume it from an earlier state.

use either::Either::{self, Left, Right};
use tartan_bitfield::bitfield;
use thiserror::Error;
use zerocopy::FromBytes;

use crate::Span;
use crate::base::BaseType;

/// The field number carrying a record's absolute timestamp.
pub const TIMESTAMP_FIELD: u8 = 253;

/// An error advancing over a record.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Unexpectedly reached the end of the record section.
    #[error("Unexpectedly reached the end of the record section (at offset {offset}).")]
    Truncated { offset: usize },
    /// Data record with no definition for its local message type.
    #[error("No definition for local message type {local} (at offset {offset}).")]
    UnknownLocal { local: u8, offset: usize },
    /// Compressed timestamp with no preceding absolute timestamp.
    #[error("Compressed timestamp with no preceding absolute timestamp (at offset {offset}).")]
    NoTimeBase { offset: usize },
    /// Definition declares a record over the caller's plausible length.
    #[error("Definition declares a {len} byte record, over the {limit} byte limit (at offset {offset}).")]
    RecordTooLong {
        len: usize,
        limit: usize,
        offset: usize,
    },
}

/// A field layout declared by a definition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub number: u8,
    pub size: u8,
    pub base_type: BaseType,
}

/// A developer field layout declared by a definition record.
///
/// Developer fields are carried through data records opaquely; resolving
/// them would require the field description records they index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevFieldDef {
    pub number: u8,
    pub size: u8,
    pub developer_index: u8,
}

/// A definition record, declaring the layout of subsequent data records
/// sharing its local message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionToken {
    pub local: u8,
    pub global: u16,
    pub is_little_endian: bool,
    pub fields: Vec<FieldDef>,
    pub dev_fields: Vec<DevFieldDef>,
    /// Bytes of the original buffer holding this record.
    pub span: Span,
}

impl DefinitionToken {
    /// Byte length of the data payload this definition describes,
    /// excluding the record header byte.
    pub fn data_len(&self) -> usize {
        let fields: usize = self.fields.iter().map(|f| f.size as usize).sum();
        let dev_fields: usize = self.dev_fields.iter().map(|f| f.size as usize).sum();

        fields + dev_fields
    }

    /// Payload offset of the absolute timestamp field, if declared.
    pub fn timestamp_offset(&self) -> Option<usize> {
        let mut at = 0;
        for field in &self.fields {
            if field.number == TIMESTAMP_FIELD && field.size == 4 && field.base_type.width() == 4 {
                return Some(at);
            }
            at += field.size as usize;
        }

        None
    }
}

/// A data record: raw field bytes laid out per its active definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataToken {
    pub local: u8,
    pub global: u16,
    /// The time delta of a compressed timestamp header.
    pub time_offset: Option<u8>,
    /// The absolute timestamp: the declared timestamp field if present and
    /// valid, otherwise one expanded from a compressed header.
    pub timestamp: Option<u32>,
    /// Payload bytes, excluding the record header byte.
    pub bytes: Vec<u8>,
    /// Bytes of the original buffer holding this record.
    pub span: Span,
}

/// A single record scanned from the byte stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Definition(DefinitionToken),
    Data(DataToken),
}

impl Token {
    /// Bytes of the original buffer holding this record.
    pub fn span(&self) -> Span {
        match self {
            Self::Definition(token) => token.span,
            Self::Data(token) => token.span,
        }
    }
}

/// Active definitions for each local message type.
///
/// Owned by one decode attempt and discarded on resynchronization; never
/// shared between scans.
#[derive(Debug, Clone, Default)]
pub struct Definitions([Option<DefinitionToken>; 16]);

impl Definitions {
    /// Install a definition for its local message type.
    pub fn set(&mut self, definition: DefinitionToken) {
        let index = definition.local as usize & 0xF;
        self.0[index] = Some(definition);
    }

    /// Retrieve the active definition for a local message type.
    pub fn get(&self, local: u8) -> Option<&DefinitionToken> {
        self.0[local as usize & 0xF].as_ref()
    }
}

/// A cursor yielding tokens from the record section of a buffer.
#[derive(Debug, Clone)]
pub struct TokenReader<'a> {
    r: &'a [u8],
    pos: usize,
    end: usize,
    definitions: Definitions,
    last_timestamp: Option<u32>,
    max_record_len: Option<usize>,
}

impl<'a> TokenReader<'a> {
    /// Start a reader over `r` between `start` and `end`.
    pub fn new(r: &'a [u8], start: usize, end: usize) -> Self {
        Self {
            r,
            pos: start,
            end: end.min(r.len()),
            definitions: Definitions::default(),
            last_timestamp: None,
            max_record_len: None,
        }
    }

    /// Bound the plausible length of a single record.
    pub fn with_max_record_len(mut self, limit: Option<usize>) -> Self {
        self.max_record_len = limit;
        self
    }

    /// The cursor's current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The offset at which the record section ends.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Move the cursor to an offset.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Restore the cursor and time base from an earlier snapshot.
    ///
    /// A failed token decode never installs a definition, so this is
    /// enough to roll a reader back over one.
    pub fn rewind(&mut self, pos: usize, last_timestamp: Option<u32>) {
        self.pos = pos;
        self.last_timestamp = last_timestamp;
    }

    /// The active definitions of this scan.
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// The last absolute timestamp seen by this scan.
    pub fn last_timestamp(&self) -> Option<u32> {
        self.last_timestamp
    }

    /// Decode the next token, or `None` at the end of the record section.
    pub fn next_token(&mut self) -> Option<Result<Token, TokenError>> {
        if self.pos >= self.end {
            return None;
        }

        Some(self.advance())
    }

    fn advance(&mut self) -> Result<Token, TokenError> {
        let start = self.pos;
        let [header] = self.take()?;

        match classify(header) {
            Left((local, is_definition, is_developer)) => {
                if is_definition {
                    let definition = self.definition(start, local, is_developer)?;
                    Ok(Token::Definition(definition))
                } else {
                    let data = self.data(start, local, None)?;
                    Ok(Token::Data(data))
                }
            }
            Right((local, time_offset)) => {
                let data = self.data(start, local, Some(time_offset))?;
                Ok(Token::Data(data))
            }
        }
    }

    fn definition(
        &mut self,
        start: usize,
        local: u8,
        is_developer: bool,
    ) -> Result<DefinitionToken, TokenError> {
        #[repr(C, packed)]
        #[derive(FromBytes)]
        struct DefinitionMessage {
            _reserved: u8,
            architecture: u8,
            global_message: [u8; 2],
            field_count: u8,
        }

        let DefinitionMessage {
            architecture,
            global_message,
            field_count,
            ..
        } = zerocopy::transmute!(self.take::<5>()?);

        let is_little_endian = architecture == 0;
        let global = if is_little_endian {
            u16::from_le_bytes(global_message)
        } else {
            u16::from_be_bytes(global_message)
        };

        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let [number, size, base_type] = self.take()?;
            fields.push(FieldDef {
                number,
                size,
                base_type: BaseType::from_code(base_type),
            });
        }

        let mut dev_fields = Vec::new();
        if is_developer {
            let [dev_count] = self.take()?;
            dev_fields.reserve(dev_count as usize);
            for _ in 0..dev_count {
                let [number, size, developer_index] = self.take()?;
                dev_fields.push(DevFieldDef {
                    number,
                    size,
                    developer_index,
                });
            }
        }

        let definition = DefinitionToken {
            local,
            global,
            is_little_endian,
            fields,
            dev_fields,
            span: Span::new(start, self.pos),
        };

        if let Some(limit) = self.max_record_len {
            let len = definition.data_len() + 1;
            if len > limit {
                Err(TokenError::RecordTooLong {
                    len,
                    limit,
                    offset: start,
                })?;
            }
        }

        self.definitions.set(definition.clone());

        Ok(definition)
    }

    fn data(
        &mut self,
        start: usize,
        local: u8,
        time_offset: Option<u8>,
    ) -> Result<DataToken, TokenError> {
        let (global, is_little_endian, len, timestamp_offset) = {
            let definition = self
                .definitions
                .get(local)
                .ok_or(TokenError::UnknownLocal {
                    local,
                    offset: start,
                })?;

            (
                definition.global,
                definition.is_little_endian,
                definition.data_len(),
                definition.timestamp_offset(),
            )
        };

        let bytes = self.take_slice(len)?.to_vec();

        // The declared timestamp field takes precedence over an offset
        // packed into a compressed header.
        let timestamp = match timestamp_offset
            .and_then(|at| bytes.get(at..at + 4))
            .and_then(|r| decode_timestamp(r, is_little_endian))
        {
            Some(absolute) => Some(absolute),
            None => match time_offset {
                Some(offset) => Some(self.expand_time_offset(offset, start)?),
                None => None,
            },
        };

        if timestamp.is_some() {
            self.last_timestamp = timestamp;
        }

        Ok(DataToken {
            local,
            global,
            time_offset,
            timestamp,
            bytes,
            span: Span::new(start, self.pos),
        })
    }

    /// Apply a five bit time delta to the last absolute timestamp,
    /// rolling over at 32 seconds.
    fn expand_time_offset(&self, offset: u8, at: usize) -> Result<u32, TokenError> {
        let last = self
            .last_timestamp
            .ok_or(TokenError::NoTimeBase { offset: at })?;

        let mut timestamp = (last & !0x1F) | offset as u32;
        if timestamp < last {
            timestamp += 0x20;
        }

        Ok(timestamp)
    }

    /// Take an exact number of bytes from the cursor, advancing it.
    fn take<const N: usize>(&mut self) -> Result<[u8; N], TokenError> {
        Ok(self.take_slice(N)?.try_into().unwrap())
    }

    /// Take a number of bytes from the cursor, advancing it.
    fn take_slice(&mut self, n: usize) -> Result<&'a [u8], TokenError> {
        let r = self.r;
        let s = self.pos;

        self.pos = s.checked_add(n).ok_or(TokenError::Truncated { offset: s })?;
        if self.pos > self.end {
            return Err(TokenError::Truncated { offset: s });
        }

        r.get(s..self.pos).ok_or(TokenError::Truncated { offset: s })
    }
}

/// Decode an absolute timestamp field, if it does not hold its 'invalid'
/// marker value.
fn decode_timestamp(r: &[u8], is_le: bool) -> Option<u32> {
    let r = r.try_into().ok()?;

    let x = if is_le {
        u32::from_le_bytes(r)
    } else {
        u32::from_be_bytes(r)
    };

    if x != u32::MAX { Some(x) } else { None }
}

/// Split a record header byte into its normal and compressed timestamp
/// forms.
///
/// Returns the local message type with the definition and developer
/// flags, or the local message type and time delta.
fn classify(r: u8) -> Either<(u8, bool, bool), (u8, u8)> {
    bitfield! {
        struct RecordHeader(u8) {
            [7] is_compressed,
        }
    }

    let header = RecordHeader(r);

    if header.is_compressed() {
        bitfield! {
            struct CompressedHeader(u8) {
                [0..5] time_offset: u8,
                [5..7] local_message: u8,
            }
        }

        let header = CompressedHeader(r);

        Right((header.local_message(), header.time_offset()))
    } else {
        bitfield! {
            struct NormalHeader(u8) {
                [0..4] local_message: u8,
                [5] is_developer,
                [6] is_definition,
            }
        }

        let header = NormalHeader(r);

        Left((
            header.local_message(),
            header.is_definition(),
            header.is_developer(),
        ))
    }
}
