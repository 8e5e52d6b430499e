//! Decoding data tokens into semantically-typed messages.

use std::fmt;

use thiserror::Error;

use crate::base::{BaseType, Scalar};
use crate::profile::Profile;
use crate::token::{DataToken, DefinitionToken};

/// An error decoding a data token against its definition.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Declared field width does not divide into its base type.
    #[error("Field {field} declares {size} bytes for a {width} byte base type (at offset {offset}).")]
    FieldWidthMismatch {
        field: u8,
        size: u8,
        width: usize,
        offset: usize,
    },
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Unsigned(x) => Self::Unsigned(x),
            Scalar::Signed(x) => Self::Signed(x),
            Scalar::Float(x) => Self::Float(x),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(x) => write!(f, "{x}"),
            Self::Signed(x) => write!(f, "{x}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(x) => write!(f, "{x}"),
            Self::Bytes(x) => write!(f, "{}", hex::encode(x)),
            Self::Array(xs) => {
                for (i, x) in xs.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A field within a decoded message.
///
/// A field declared by the definition but holding its 'invalid' marker
/// value is surfaced with `value: None`, an explicit absence.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub number: u8,
    /// Name per the profile; `None` for undocumented fields.
    pub name: Option<String>,
    pub value: Option<Value>,
    pub units: Option<String>,
}

/// A structured record resolved against a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub global: u16,
    /// Name per the profile; `None` for undocumented messages.
    pub name: Option<String>,
    /// The absolute timestamp, for monotonicity checks upstream.
    pub timestamp: Option<u32>,
    pub fields: Vec<FieldValue>,
}

impl DecodedMessage {
    /// Retrieve a field by number.
    pub fn field(&self, number: u8) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.number == number)
    }
}

/// Decode a data token against its active definition and a profile.
pub fn decode(
    token: &DataToken,
    definition: &DefinitionToken,
    profile: &dyn Profile,
) -> Result<DecodedMessage, MessageError> {
    let mut fields = Vec::with_capacity(definition.fields.len());
    let mut at = 0;

    for field in &definition.fields {
        let size = field.size as usize;
        let r = token.bytes.get(at..at + size).unwrap_or(&[]);

        let value = decode_field(field.number, field.size, field.base_type, r, definition, token, at)?;

        let descriptor = profile.field(token.global, field.number);

        let value = match (value, descriptor) {
            (Some(value), Some(descriptor)) if descriptor.is_scaled() => {
                Some(rescale(value, descriptor.scale, descriptor.offset))
            }
            (value, _) => value,
        };

        fields.push(FieldValue {
            number: field.number,
            name: descriptor.map(|d| d.name.clone()),
            value,
            units: descriptor.and_then(|d| d.units.clone()),
        });

        at += size;
    }

    Ok(DecodedMessage {
        global: token.global,
        name: profile.message(token.global).map(str::to_owned),
        timestamp: token.timestamp,
        fields,
    })
}

fn decode_field(
    number: u8,
    size: u8,
    base_type: BaseType,
    r: &[u8],
    definition: &DefinitionToken,
    token: &DataToken,
    at: usize,
) -> Result<Option<Value>, MessageError> {
    match base_type {
        // Text accumulates up to its terminator; an empty field is absent.
        BaseType::String => {
            let text = r.split(|b| *b == 0).next().unwrap_or(&[]);
            if text.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Value::Text(
                    String::from_utf8_lossy(text).into_owned(),
                )))
            }
        }
        // Unassigned base types pass through as opaque bytes.
        BaseType::Unknown(_) => Ok(Some(Value::Bytes(r.to_vec()))),
        base_type => {
            let width = base_type.width();
            if size as usize % width != 0 {
                return Err(MessageError::FieldWidthMismatch {
                    field: number,
                    size,
                    width,
                    offset: token.span.start + 1 + at,
                });
            }

            let mut elements = r
                .chunks_exact(width)
                .map(|r| base_type.decode(r, definition.is_little_endian).map(Value::from));

            if size as usize / width == 1 {
                Ok(elements.next().flatten())
            } else {
                // Array fields keep their present elements; one holding
                // only markers is absent.
                let elements: Vec<Value> = elements.flatten().collect();
                if elements.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Value::Array(elements)))
                }
            }
        }
    }
}

/// Convert a raw integer to physical units per its descriptor.
fn rescale(value: Value, scale: f64, offset: f64) -> Value {
    match value {
        Value::Unsigned(x) => Value::Float(x as f64 / scale - offset),
        Value::Signed(x) => Value::Float(x as f64 / scale - offset),
        Value::Float(x) => Value::Float(x / scale - offset),
        Value::Array(xs) => Value::Array(xs.into_iter().map(|x| rescale(x, scale, offset)).collect()),
        value => value,
    }
}
