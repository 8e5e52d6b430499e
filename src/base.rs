//! Wire base types and their 'invalid' marker values.

/// A base type declared for a field by a definition record.
///
/// Codes not assigned by the protocol are preserved as [`Unknown`] and
/// treated as single opaque bytes, letting undocumented messages pass
/// through a scan untouched.
///
/// [`Unknown`]: BaseType::Unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    /// `enum`
    Enum,
    /// `sint8`
    Sint8,
    /// `uint8`
    Uint8,
    /// `string`
    String,
    /// `uint8z`
    Uint8z,
    /// `byte`
    Byte,
    /// `sint16`
    Sint16,
    /// `uint16`
    Uint16,
    /// `uint16z`
    Uint16z,
    /// `sint32`
    Sint32,
    /// `uint32`
    Uint32,
    /// `uint32z`
    Uint32z,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
    /// `sint64`
    Sint64,
    /// `uint64`
    Uint64,
    /// `uint64z`
    Uint64z,
    /// An unassigned base type code.
    Unknown(u8),
}

impl BaseType {
    /// Resolve a base type from its wire code.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Enum,
            0x01 => Self::Sint8,
            0x02 => Self::Uint8,
            0x07 => Self::String,
            0x0A => Self::Uint8z,
            0x0D => Self::Byte,
            0x83 => Self::Sint16,
            0x84 => Self::Uint16,
            0x8B => Self::Uint16z,
            0x85 => Self::Sint32,
            0x86 => Self::Uint32,
            0x8C => Self::Uint32z,
            0x88 => Self::Float32,
            0x89 => Self::Float64,
            0x8E => Self::Sint64,
            0x8F => Self::Uint64,
            0x90 => Self::Uint64z,
            code => Self::Unknown(code),
        }
    }

    /// The wire code of this base type.
    pub fn code(self) -> u8 {
        match self {
            Self::Enum => 0x00,
            Self::Sint8 => 0x01,
            Self::Uint8 => 0x02,
            Self::String => 0x07,
            Self::Uint8z => 0x0A,
            Self::Byte => 0x0D,
            Self::Sint16 => 0x83,
            Self::Uint16 => 0x84,
            Self::Uint16z => 0x8B,
            Self::Sint32 => 0x85,
            Self::Uint32 => 0x86,
            Self::Uint32z => 0x8C,
            Self::Float32 => 0x88,
            Self::Float64 => 0x89,
            Self::Sint64 => 0x8E,
            Self::Uint64 => 0x8F,
            Self::Uint64z => 0x90,
            Self::Unknown(code) => code,
        }
    }

    /// Byte width of a single element of this base type.
    pub fn width(self) -> usize {
        match self {
            Self::Enum | Self::Sint8 | Self::Uint8 | Self::String | Self::Uint8z | Self::Byte => 1,
            Self::Sint16 | Self::Uint16 | Self::Uint16z => 2,
            Self::Sint32 | Self::Uint32 | Self::Uint32z | Self::Float32 => 4,
            Self::Float64 | Self::Sint64 | Self::Uint64 | Self::Uint64z => 8,
            Self::Unknown(_) => 1,
        }
    }

    /// Decode a single element of this base type from exactly [`width`]
    /// bytes.
    ///
    /// Returns the element as a Rust primitive if it did not contain its
    /// 'invalid' marker value.
    ///
    /// [`width`]: BaseType::width
    pub fn decode(self, r: &[u8], is_little_endian: bool) -> Option<Scalar> {
        match self {
            Self::Enum | Self::Uint8 | Self::Byte => u8_max(r, is_little_endian).map(Scalar::from),
            Self::String | Self::Uint8z => u8_min(r, is_little_endian).map(Scalar::from),
            Self::Sint8 => i8_max(r, is_little_endian).map(Scalar::from),
            Self::Sint16 => i16_max(r, is_little_endian).map(Scalar::from),
            Self::Uint16 => u16_max(r, is_little_endian).map(Scalar::from),
            Self::Uint16z => u16_min(r, is_little_endian).map(Scalar::from),
            Self::Sint32 => i32_max(r, is_little_endian).map(Scalar::from),
            Self::Uint32 => u32_max(r, is_little_endian).map(Scalar::from),
            Self::Uint32z => u32_min(r, is_little_endian).map(Scalar::from),
            Self::Sint64 => i64_max(r, is_little_endian).map(Scalar::from),
            Self::Uint64 => u64_max(r, is_little_endian).map(Scalar::from),
            Self::Uint64z => u64_min(r, is_little_endian).map(Scalar::from),
            Self::Float32 => f32_max(r, is_little_endian).map(Scalar::from),
            Self::Float64 => f64_max(r, is_little_endian).map(Scalar::from),
            Self::Unknown(_) => None,
        }
    }
}

/// An element decoded from a field, before scale and offset are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

macro_rules! scalar_from {
    ($t:ty, $variant:ident, $via:ty) => {
        impl From<$t> for Scalar {
            fn from(x: $t) -> Self {
                Self::$variant(x as $via)
            }
        }
    };
}

scalar_from!(u8, Unsigned, u64);
scalar_from!(u16, Unsigned, u64);
scalar_from!(u32, Unsigned, u64);
scalar_from!(u64, Unsigned, u64);
scalar_from!(i8, Signed, i64);
scalar_from!(i16, Signed, i64);
scalar_from!(i32, Signed, i64);
scalar_from!(i64, Signed, i64);
scalar_from!(f32, Float, f64);
scalar_from!(f64, Float, f64);

macro_rules! primitive {
    ($name:ident, $t:ident, $invalid:ident) => {
        /// Convert bytes of a base type to the corresponding primitive, if
        /// they did not hold the 'invalid' marker value.
        fn $name(r: &[u8], is_le: bool) -> Option<$t> {
            let r = r.try_into().ok()?;

            let x = if is_le {
                $t::from_le_bytes(r)
            } else {
                $t::from_be_bytes(r)
            };

            if x != $t::$invalid { Some(x) } else { None }
        }
    };
}

primitive!(u8_max, u8, MAX);
primitive!(u8_min, u8, MIN);
primitive!(u16_max, u16, MAX);
primitive!(u16_min, u16, MIN);
primitive!(u32_max, u32, MAX);
primitive!(u32_min, u32, MIN);
primitive!(u64_max, u64, MAX);
primitive!(u64_min, u64, MIN);

primitive!(i8_max, i8, MAX);
primitive!(i16_max, i16, MAX);
primitive!(i32_max, i32, MAX);
primitive!(i64_max, i64, MAX);

primitive!(f32_max, f32, MAX);
primitive!(f64_max, f64, MAX);
