//! Array-of-bytes patterns with single-byte wildcards.
//!
//! The wire form is a hex string such as `"48 8B 05 . . . . 89"` or
//! `"488B05????????89"`: two hex digits per byte, `.` or `??` for one
//! wildcard byte, whitespace ignored.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    bytes: Vec<Option<u8>>,
}

impl Pattern {
    pub fn parse(text: &str) -> Result<Self> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut bytes = Vec::with_capacity(chars.len() / 2);
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    bytes.push(None);
                    i += 1;
                }
                '?' => {
                    // "??" and a lone "?" both mean one wildcard byte
                    i += if chars.get(i + 1) == Some(&'?') { 2 } else { 1 };
                    bytes.push(None);
                }
                _ => {
                    let pair: String = chars[i..chars.len().min(i + 2)].iter().collect();
                    if pair.len() != 2 {
                        return Err(Error::InvalidPattern(format!(
                            "Dangling hex digit '{}' in '{}'",
                            pair, text
                        )));
                    }
                    let value = u8::from_str_radix(&pair, 16).map_err(|e| {
                        Error::InvalidPattern(format!("Invalid byte '{}': {}", pair, e))
                    })?;
                    bytes.push(Some(value));
                    i += 2;
                }
            }
        }

        if bytes.is_empty() {
            return Err(Error::InvalidPattern("Pattern is empty".to_string()));
        }

        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset of the first match in `haystack`
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        if haystack.len() < self.bytes.len() {
            return None;
        }
        let last = haystack.len() - self.bytes.len();

        // Anchor on the first concrete byte so memchr can skip ahead
        let Some((anchor_pos, anchor)) = self
            .bytes
            .iter()
            .enumerate()
            .find_map(|(i, b)| b.map(|v| (i, v)))
        else {
            return Some(0);
        };

        let mut from = anchor_pos;
        while from <= last + anchor_pos {
            let hit = memchr::memchr(anchor, &haystack[from..=last + anchor_pos])?;
            let start = from + hit - anchor_pos;
            if self.matches_at(haystack, start) {
                return Some(start);
            }
            from += hit + 1;
        }

        None
    }

    fn matches_at(&self, haystack: &[u8], start: usize) -> bool {
        self.bytes
            .iter()
            .zip(&haystack[start..start + self.bytes.len()])
            .all(|(p, b)| p.is_none_or(|v| v == *b))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .bytes
            .iter()
            .map(|b| match b {
                Some(value) => format!("{:02X}", value),
                None => ".".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&text)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Pattern::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dot_wildcards() {
        let pattern = Pattern::parse("48 8B . . 05").unwrap();
        assert_eq!(pattern.len(), 5);
        assert_eq!(pattern.bytes[0], Some(0x48));
        assert_eq!(pattern.bytes[2], None);
        assert_eq!(pattern.bytes[4], Some(0x05));
    }

    #[test]
    fn test_parse_compact_and_question_marks() {
        let compact = Pattern::parse("488B..05").unwrap();
        let spaced = Pattern::parse("48 8B ?? ?? 05").unwrap();
        assert_eq!(compact, spaced);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Pattern::parse("").is_err());
        assert!(Pattern::parse("4").is_err());
        assert!(Pattern::parse("ZZ").is_err());
    }

    #[test]
    fn test_find_first_match_with_wildcards() {
        let pattern = Pattern::parse("AA . CC").unwrap();
        let haystack = [0x00, 0xAA, 0x01, 0xCD, 0xAA, 0x02, 0xCC, 0xAA, 0x03, 0xCC];
        assert_eq!(pattern.find_in(&haystack), Some(4));
    }

    #[test]
    fn test_find_with_leading_wildcard() {
        let pattern = Pattern::parse(". 2B").unwrap();
        // 0x2B is '+', which must match literally
        assert_eq!(pattern.find_in(&[0x2B, 0x00, 0x2B]), Some(1));
        assert_eq!(pattern.find_in(&[0x2B]), None);
    }

    #[test]
    fn test_find_match_at_end() {
        let pattern = Pattern::parse("01 02").unwrap();
        assert_eq!(pattern.find_in(&[0x00, 0x00, 0x01, 0x02]), Some(2));
        assert_eq!(pattern.find_in(&[0x00, 0x01]), None);
    }

    #[test]
    fn test_display_roundtrip() {
        let pattern = Pattern::parse("48 8D 0D . FF").unwrap();
        assert_eq!(pattern.to_string(), "48 8D 0D . FF");
        assert_eq!(Pattern::parse(&pattern.to_string()).unwrap(), pattern);
    }
}
