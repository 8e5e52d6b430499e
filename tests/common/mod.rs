#![allow(dead_code)]

use retrofit::FileHeader;
use retrofit::check;

/// A synthetic document builder, assembling records byte by byte and
/// finishing with a consistent header and trailer.
pub struct Doc {
    header_size: u8,
    records: Vec<u8>,
}

impl Doc {
    pub fn new() -> Self {
        Self {
            header_size: 12,
            records: Vec::new(),
        }
    }

    /// Use the 14 byte header form, with its check value set.
    pub fn extended_header(mut self) -> Self {
        self.header_size = 14;
        self
    }

    /// Offset the next record will start at in the built buffer.
    pub fn mark(&self) -> usize {
        self.header_size as usize + self.records.len()
    }

    /// Append a little-endian definition record.
    ///
    /// Fields are `(number, size, base type code)` triples.
    pub fn definition(mut self, local: u8, global: u16, fields: &[(u8, u8, u8)]) -> Self {
        self.records.push(0x40 | (local & 0x0F));
        self.records.extend([0, 0]);
        self.records.extend(global.to_le_bytes());
        self.records.push(fields.len() as u8);
        for &(number, size, base_type) in fields {
            self.records.extend([number, size, base_type]);
        }
        self
    }

    /// Append a big-endian definition record.
    pub fn definition_big_endian(
        mut self,
        local: u8,
        global: u16,
        fields: &[(u8, u8, u8)],
    ) -> Self {
        self.records.push(0x40 | (local & 0x0F));
        self.records.extend([0, 1]);
        self.records.extend(global.to_be_bytes());
        self.records.push(fields.len() as u8);
        for &(number, size, base_type) in fields {
            self.records.extend([number, size, base_type]);
        }
        self
    }

    /// Append a definition for a message carrying only an absolute
    /// timestamp.
    pub fn timestamped(self, local: u8, global: u16) -> Self {
        self.definition(local, global, &[(253, 4, 0x86)])
    }

    /// Append a data record with the given payload.
    pub fn data(mut self, local: u8, payload: &[u8]) -> Self {
        self.records.push(local & 0x0F);
        self.records.extend_from_slice(payload);
        self
    }

    /// Append a timestamp-only data record for a [`timestamped`]
    /// definition.
    ///
    /// [`timestamped`]: Doc::timestamped
    pub fn record(self, local: u8, timestamp: u32) -> Self {
        let timestamp = timestamp.to_le_bytes();
        self.data(local, &timestamp)
    }

    /// Append a data record under a compressed timestamp header.
    pub fn compressed(mut self, local: u8, offset: u8, payload: &[u8]) -> Self {
        self.records.push(0x80 | ((local & 0x3) << 5) | (offset & 0x1F));
        self.records.extend_from_slice(payload);
        self
    }

    /// Append raw bytes, corrupting the record stream.
    pub fn garbage(mut self, bytes: &[u8]) -> Self {
        self.records.extend_from_slice(bytes);
        self
    }

    /// Assemble the document: header, records, and trailer.
    pub fn build(self) -> Vec<u8> {
        let header = FileHeader {
            header_size: self.header_size,
            protocol_version: 0x10,
            profile_version: 100,
            data_size: self.records.len() as u32,
            crc: None,
        };

        let mut out = header.build();
        out.extend_from_slice(&self.records);
        let crc = check::trailer(&out);
        out.extend_from_slice(&crc);
        out
    }
}

/// Timestamps of a decoded message sequence, in stream order.
pub fn timestamps(messages: &[retrofit::DecodedMessage]) -> Vec<u32> {
    messages.iter().filter_map(|m| m.timestamp).collect()
}
