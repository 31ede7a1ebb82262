//! Untyped asset tree and the typed accessors over it.
//!
//! All tolerant coercion (numeric strings, comma decimals, yes/no booleans)
//! lives here so callers never inspect raw variants.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BlkValue {
    /// Ordered entries; keys may repeat.
    Block(Vec<(String, BlkValue)>),
    Array(Vec<BlkValue>),
    Str(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl BlkValue {
    pub fn as_block(&self) -> Option<&[(String, BlkValue)]> {
        match self {
            BlkValue::Block(entries) => Some(entries),
            _ => None,
        }
    }

    /// Entries of a block, or nothing for any other variant.
    pub fn entries(&self) -> &[(String, BlkValue)] {
        self.as_block().unwrap_or(&[])
    }

    pub fn is_block(&self) -> bool {
        matches!(self, BlkValue::Block(_))
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&BlkValue> {
        self.entries().iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Dotted-path lookup (`cockpit.zoomInFov`). A segment that lands on an
    /// array continues into its first element.
    pub fn lookup(&self, path: &str) -> Option<&BlkValue> {
        let mut cur = self;
        for segment in path.split('.') {
            if let BlkValue::Array(items) = cur {
                cur = items.first()?;
            }
            cur = cur.get(segment)?;
        }
        Some(cur)
    }

    /// Every value under `key` in source order: repeated keys, with arrays
    /// flattened one level.
    pub fn list(&self, key: &str) -> Vec<&BlkValue> {
        let mut out = Vec::new();
        for (k, v) in self.entries() {
            if k != key {
                continue;
            }
            match v {
                BlkValue::Array(items) => out.extend(items.iter()),
                other => out.push(other),
            }
        }
        out
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BlkValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[BlkValue]> {
        match self {
            BlkValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Numbers, plus numeric strings in either decimal convention.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BlkValue::Number(n) if n.is_finite() => Some(*n),
            BlkValue::Str(s) => parse_locale_number(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BlkValue::Bool(b) => Some(*b),
            BlkValue::Number(n) => Some(*n != 0.0),
            BlkValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.lookup(path).and_then(BlkValue::as_str)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.lookup(path).and_then(BlkValue::as_f64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.lookup(path).and_then(BlkValue::as_bool)
    }

    pub fn bool_or(&self, path: &str, default: bool) -> bool {
        self.get_bool(path).unwrap_or(default)
    }

    /// `[a, b]` as a numeric pair.
    pub fn as_pair(&self) -> Option<(f64, f64)> {
        match self.as_array()? {
            [a, b, ..] => Some((a.as_f64()?, b.as_f64()?)),
            _ => None,
        }
    }
}

/// Parse `1.5`, `1,5`, `1.234,5` or `1,234.5`. The last separator is the
/// decimal one.
pub fn parse_locale_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let normalized = match (t.rfind('.'), t.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => t.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => t.replace(',', ""),
        (None, Some(_)) => t.replace(',', "."),
        _ => t.to_string(),
    };
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

impl<'de> Deserialize<'de> for BlkValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(BlkVisitor)
    }
}

struct BlkVisitor;

impl<'de> Visitor<'de> for BlkVisitor {
    type Value = BlkValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a blkx value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Number(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Number(v as f64))
    }

    fn visit_f64<E>(self, v: f64) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Number(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Str(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Str(v))
    }

    fn visit_unit<E>(self) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Null)
    }

    fn visit_none<E>(self) -> Result<BlkValue, E>
    where
        E: de::Error,
    {
        Ok(BlkValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<BlkValue, D::Error>
    where
        D: Deserializer<'de>,
    {
        BlkValue::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<BlkValue, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(v) = seq.next_element::<BlkValue>()? {
            items.push(v);
        }
        Ok(BlkValue::Array(items))
    }

    // Entries are collected rather than inserted into a map so duplicates survive.
    fn visit_map<A>(self, mut map: A) -> Result<BlkValue, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((k, v)) = map.next_entry::<String, BlkValue>()? {
            entries.push((k, v));
        }
        Ok(BlkValue::Block(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> BlkValue {
        BlkValue::Block(vec![
            ("mass".to_string(), BlkValue::Str("10,2".to_string())),
            ("speed".to_string(), BlkValue::Number(773.0)),
            ("dummy".to_string(), BlkValue::Str("yes".to_string())),
            (
                "cockpit".to_string(),
                BlkValue::Array(vec![BlkValue::Block(vec![(
                    "zoomInFov".to_string(),
                    BlkValue::Number(8.0),
                )])]),
            ),
        ])
    }

    #[test]
    fn numeric_strings_coerce() {
        let t = tree();
        assert_eq!(t.get_f64("mass"), Some(10.2));
        assert_eq!(t.get_f64("speed"), Some(773.0));
    }

    #[test]
    fn missing_optional_uses_default() {
        let t = tree();
        assert_eq!(t.get_f64("Cx"), None);
        assert!(!t.bool_or("laser", false));
        assert!(t.bool_or("dummy", false));
    }

    #[test]
    fn lookup_descends_through_arrays() {
        assert_eq!(tree().get_f64("cockpit.zoomInFov"), Some(8.0));
    }

    #[test]
    fn locale_numbers() {
        assert_eq!(parse_locale_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_locale_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_locale_number(" 0,65 "), Some(0.65));
        assert_eq!(parse_locale_number("abc"), None);
        assert_eq!(parse_locale_number(""), None);
    }

    #[test]
    fn pair_from_array() {
        let v = BlkValue::Array(vec![BlkValue::Number(1500.0), BlkValue::Str("420".into())]);
        assert_eq!(v.as_pair(), Some((1500.0, 420.0)));
    }
}
