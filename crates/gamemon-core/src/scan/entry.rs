use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use crate::config::scan::{MAX_READ_LEN, UNRESOLVABLE};
use crate::error::{Error, Result};
use crate::scan::{Pattern, ScanValue, ValueKind};

/// Wire tag for the anchor kind (`start_from_type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AnchorKind {
    Module,
    Variable,
    Static,
}

/// Starting point of address resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Base of a loaded module; scans are bounded by the module image
    Module(String),
    /// Address already resolved for another entry
    Variable(String),
    /// Fixed absolute address
    Static(u64),
}

impl Anchor {
    pub fn kind(&self) -> AnchorKind {
        match self {
            Self::Module(_) => AnchorKind::Module,
            Self::Variable(_) => AnchorKind::Variable,
            Self::Static(_) => AnchorKind::Static,
        }
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::Static(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution {
    /// Not attempted yet for the current process
    #[default]
    Pending,
    Resolved(u64),
    /// Anchor or pattern missing; skipped until the target changes
    Unresolvable,
}

/// A named description of where one value lives and how to decode it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScanEntry", into = "RawScanEntry")]
pub struct ScanEntry {
    pub name: String,
    pub anchor: Anchor,
    pub pattern: Option<Pattern>,
    pub offset: Option<i64>,
    pub pointers: Vec<i64>,
    pub kind: ValueKind,
    pub length: Option<usize>,
    pub resolution: Resolution,
    /// Last observed value, `None` until the first successful read
    pub result: Option<ScanValue>,
    /// Descriptor keys this crate does not interpret, echoed back unchanged
    extra: Map<String, Value>,
}

impl ScanEntry {
    pub fn new<S: Into<String>>(name: S, anchor: Anchor, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            anchor,
            pattern: None,
            offset: None,
            pointers: Vec::new(),
            kind,
            length: None,
            resolution: Resolution::Pending,
            result: None,
            extra: Map::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_pointers(mut self, pointers: Vec<i64>) -> Self {
        self.pointers = pointers;
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn address(&self) -> Option<u64> {
        match self.resolution {
            Resolution::Resolved(address) => Some(address),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.resolution == Resolution::Pending
    }

    pub fn mark_resolved(&mut self, address: u64) {
        self.resolution = Resolution::Resolved(address);
    }

    pub fn mark_unresolvable(&mut self) {
        self.resolution = Resolution::Unresolvable;
        self.result = Some(ScanValue::unresolvable());
    }

    /// Forget the resolved address and last value, e.g. after the target changed
    pub fn invalidate(&mut self) {
        self.resolution = Resolution::Pending;
        self.result = None;
    }
}

#[derive(Serialize, Deserialize)]
struct RawScanEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_from_type: Option<AnchorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_from: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aob: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pointers: Vec<i64>,
    #[serde(rename = "type")]
    kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<usize>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    result: Option<ScanValue>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn parse_static_address(value: &Value) -> Result<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    };
    parsed.ok_or_else(|| {
        Error::InvalidScanEntry(format!("static start_from must be an address, got {}", value))
    })
}

fn parse_anchor(kind: Option<AnchorKind>, value: Option<Value>) -> Result<Anchor> {
    match (kind, value) {
        (None, None) => Ok(Anchor::default()),
        (Some(AnchorKind::Static), Some(value)) => parse_static_address(&value).map(Anchor::Static),
        (Some(kind), Some(Value::String(name))) => Ok(match kind {
            AnchorKind::Module => Anchor::Module(name),
            _ => Anchor::Variable(name),
        }),
        (Some(kind), Some(other)) => Err(Error::InvalidScanEntry(format!(
            "{} start_from must be a name, got {}",
            kind, other
        ))),
        (Some(kind), None) => Err(Error::InvalidScanEntry(format!(
            "start_from_type '{}' given without start_from",
            kind
        ))),
        (None, Some(_)) => Err(Error::InvalidScanEntry(
            "start_from given without start_from_type".to_string(),
        )),
    }
}

impl TryFrom<RawScanEntry> for ScanEntry {
    type Error = Error;

    fn try_from(mut raw: RawScanEntry) -> Result<Self> {
        if raw.kind.needs_length() && raw.length.is_none() {
            return Err(Error::InvalidScanEntry(format!(
                "type '{}' requires a length",
                raw.kind
            )));
        }
        if let Some(length) = raw.length
            && length > MAX_READ_LEN
        {
            return Err(Error::InvalidScanEntry(format!(
                "length {} exceeds the {} byte limit",
                length, MAX_READ_LEN
            )));
        }

        let resolution = match raw.address {
            None => Resolution::Pending,
            Some(UNRESOLVABLE) => Resolution::Unresolvable,
            Some(address) if address >= 0 => Resolution::Resolved(address as u64),
            Some(address) => {
                return Err(Error::InvalidScanEntry(format!(
                    "invalid address {}",
                    address
                )));
            }
        };

        // Results are produced here, never trusted from the wire
        raw.extra.remove("result");

        Ok(Self {
            name: raw.name,
            anchor: parse_anchor(raw.start_from_type, raw.start_from)?,
            pattern: raw.aob,
            offset: raw.offset,
            pointers: raw.pointers,
            kind: raw.kind,
            length: raw.length,
            resolution,
            result: None,
            extra: raw.extra,
        })
    }
}

impl From<ScanEntry> for RawScanEntry {
    fn from(entry: ScanEntry) -> Self {
        let address = match entry.resolution {
            Resolution::Pending => None,
            Resolution::Resolved(address) => Some(address as i64),
            Resolution::Unresolvable => Some(UNRESOLVABLE),
        };
        let start_from = match &entry.anchor {
            Anchor::Module(name) | Anchor::Variable(name) => Value::String(name.clone()),
            Anchor::Static(address) => Value::from(*address),
        };

        Self {
            name: entry.name,
            address,
            start_from_type: Some(entry.anchor.kind()),
            start_from: Some(start_from),
            aob: entry.pattern,
            offset: entry.offset,
            pointers: entry.pointers,
            kind: entry.kind,
            length: entry.length,
            result: entry.result,
            extra: entry.extra,
        }
    }
}
