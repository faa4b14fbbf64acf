use serde::{Deserialize, Serialize, Serializer};
use strum::{Display, EnumString, IntoStaticStr};

use crate::config::scan::MAX_READ_LEN;
use crate::error::{Error, Result};

/// Type tag of a scan entry, selecting how many bytes are read and how they decode
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Char,
    Short,
    Int,
    /// 32-bit, as on Windows
    Long,
    #[serde(rename = "longlong")]
    #[strum(serialize = "longlong")]
    LongLong,
    Double,
    Float,
    String,
    Bytes,
}

impl ValueKind {
    pub fn needs_length(self) -> bool {
        matches!(self, Self::String | Self::Bytes)
    }

    /// Number of bytes to read for this kind
    pub fn width(self, length: Option<usize>) -> Result<usize> {
        match self {
            Self::Char => Ok(1),
            Self::Short => Ok(2),
            Self::Int | Self::Long | Self::Float => Ok(4),
            Self::LongLong | Self::Double => Ok(8),
            Self::String | Self::Bytes => match length {
                None => Err(Error::InvalidScanEntry(format!(
                    "type '{}' requires a length",
                    self
                ))),
                Some(length) if length > MAX_READ_LEN => Err(Error::InvalidScanEntry(format!(
                    "length {} exceeds the {} byte limit",
                    length, MAX_READ_LEN
                ))),
                Some(length) => Ok(length),
            },
        }
    }

    /// Decode little-endian target memory into a value
    pub fn decode(self, bytes: &[u8]) -> ScanValue {
        match self {
            Self::Char => ScanValue::Text(String::from_utf8_lossy(&bytes[..1]).into_owned()),
            Self::Short => ScanValue::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            Self::Int | Self::Long => ScanValue::Int(i32::from_le_bytes(le4(bytes)) as i64),
            Self::LongLong => ScanValue::Int(i64::from_le_bytes(le8(bytes))),
            Self::Float => ScanValue::Float(f32::from_le_bytes(le4(bytes)) as f64),
            Self::Double => ScanValue::Float(f64::from_le_bytes(le8(bytes))),
            Self::String => {
                let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                ScanValue::Text(String::from_utf8_lossy(&bytes[..len]).into_owned())
            }
            Self::Bytes => ScanValue::Bytes(bytes.to_vec()),
        }
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    buf
}

/// A value read from the target
#[derive(Debug, Clone, PartialEq)]
pub enum ScanValue {
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw buffer, compared and reported as a big-endian unsigned integer
    Bytes(Vec<u8>),
}

impl ScanValue {
    /// Value stored in `result` for entries that could not be resolved
    pub fn unresolvable() -> Self {
        Self::Int(crate::config::scan::UNRESOLVABLE)
    }

    /// Change-detection equality.
    ///
    /// Floats compare by bit pattern so a NaN that stays NaN is not a change.
    /// Byte buffers compare as big-endian unsigned integers.
    pub fn same_as(&self, other: &ScanValue) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => magnitude(a) == magnitude(b),
            _ => false,
        }
    }
}

/// Strip leading zero bytes of a big-endian integer
fn magnitude(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

impl Serialize for ScanValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Bytes(v) => {
                let digits = magnitude(v);
                if digits.len() <= 8 {
                    let value = digits.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                    serializer.serialize_u64(value)
                } else if digits.len() <= 16 {
                    let value = digits
                        .iter()
                        .fold(0u128, |acc, &b| (acc << 8) | b as u128);
                    serializer.serialize_u128(value)
                } else {
                    let hex: String = digits.iter().map(|b| format!("{:02x}", b)).collect();
                    serializer.serialize_str(&format!("0x{}", hex))
                }
            }
        }
    }
}
