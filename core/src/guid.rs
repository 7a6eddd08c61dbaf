//! 128-bit object identifiers.
//!
//! [`Guid`] is the identity of every serialized object: scene objects,
//! prefabs and prefab objects all share the same id space. The zero value
//! ([`Guid::EMPTY`]) is reserved and means "none".
//!
//! # Text form
//!
//! Identifiers are stored as 32 lowercase hex characters with no
//! separators, e.g. `"0123456789abcdef0123456789abcdef"`. Parsing accepts
//! either case.
//!
//! ```
//! use redlilium_core::guid::Guid;
//!
//! let id = Guid::new();
//! let text = id.to_string();
//! assert_eq!(text.len(), 32);
//! assert_eq!(text.parse::<Guid>().unwrap(), id);
//! ```

use std::fmt;
use std::str::FromStr;

use bytemuck::{Pod, Zeroable};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque 128-bit identifier.
///
/// Stored as four `u32` words so the value is [`Pod`] and can be copied
/// straight into binary streams.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct Guid {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

/// Length of the textual form.
pub const GUID_TEXT_LEN: usize = 32;

impl Guid {
    /// The reserved "none" identifier.
    pub const EMPTY: Self = Self {
        a: 0,
        b: 0,
        c: 0,
        d: 0,
    };

    /// Generates a fresh random identifier.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::from_bytes(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Builds an identifier from its four words.
    pub const fn from_parts(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    /// Builds an identifier from 16 bytes (four little-endian words).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            a: word(0),
            b: word(4),
            c: word(8),
            d: word(12),
        }
    }

    /// Returns the 16-byte form (four little-endian words).
    pub fn to_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.a.to_le_bytes());
        out[4..8].copy_from_slice(&self.b.to_le_bytes());
        out[8..12].copy_from_slice(&self.c.to_le_bytes());
        out[12..16].copy_from_slice(&self.d.to_le_bytes());
        out
    }

    /// Returns `true` for any value other than [`Guid::EMPTY`].
    pub const fn is_valid(&self) -> bool {
        (self.a | self.b | self.c | self.d) != 0
    }

    /// Parses the 32-hex text form, returning `None` on any malformed input.
    pub fn parse_hex(text: &str) -> Option<Self> {
        if text.len() != GUID_TEXT_LEN || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let word = |i: usize| u32::from_str_radix(&text[i * 8..(i + 1) * 8], 16).ok();
        Some(Self {
            a: word(0)?,
            b: word(1)?,
            c: word(2)?,
            d: word(3)?,
        })
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}{:08x}{:08x}{:08x}", self.a, self.b, self.c, self.d)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

/// Error returned when parsing a malformed identifier string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGuidError {
    pub text: String,
}

impl fmt::Display for ParseGuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a 32-character hex identifier", self.text)
    }
}

impl std::error::Error for ParseGuidError {}

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s).ok_or_else(|| ParseGuidError { text: s.to_owned() })
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct GuidVisitor;

impl Visitor<'_> for GuidVisitor {
    type Value = Guid;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 32-character hex identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Guid, E> {
        Guid::parse_hex(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(GuidVisitor)
    }
}
