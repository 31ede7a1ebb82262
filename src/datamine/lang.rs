//! Localization table (`units.csv`): semicolon-separated, double-quoted.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
struct LangRow {
    text: String,
    raw: String,
}

#[derive(Debug, Clone, Default)]
pub struct LangTable {
    rows: HashMap<String, LangRow>,
}

impl LangTable {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes)))
    }

    /// Rows whose key or English text cannot be read are skipped; the first
    /// row for a repeated key wins. Quoted fields may span lines.
    pub fn parse(content: &str) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut rows = HashMap::new();
        for (i, record) in reader.records().enumerate() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(row = i + 1, error = %e, "language row skipped");
                    continue;
                }
            };
            let (Some(key), Some(text)) = (record.get(0), record.get(1)) else {
                continue;
            };
            if key.is_empty() || key.starts_with("<ID") {
                continue;
            }
            rows.entry(key.to_lowercase()).or_insert_with(|| LangRow {
                text: text.to_string(),
                raw: record.iter().collect::<Vec<_>>().join(";"),
            });
        }
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.rows
            .get(&key.to_lowercase())
            .map(|r| r.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn vehicle_keys(id: &str) -> [String; 3] {
        [format!("{}_shop", id), format!("{}_0", id), id.to_string()]
    }

    pub fn ammo_keys(name: &str) -> [String; 3] {
        [
            format!("{}/name/short", name),
            format!("{}/name", name),
            name.to_string(),
        ]
    }

    pub fn vehicle_name(&self, id: &str) -> Option<&str> {
        Self::vehicle_keys(id).iter().find_map(|k| self.lookup(k))
    }

    pub fn ammo_name(&self, name: &str) -> Option<&str> {
        Self::ammo_keys(name).iter().find_map(|k| self.lookup(k))
    }

    /// Stable digest of the raw rows behind `keys`; absent keys count too, so
    /// a row appearing later changes the digest.
    pub fn rows_digest<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> String {
        let mut keys: Vec<String> = keys.into_iter().map(str::to_lowercase).collect();
        keys.sort();
        keys.dedup();
        let mut buf = String::new();
        for k in &keys {
            buf.push_str(k);
            buf.push('=');
            if let Some(row) = self.rows.get(k) {
                buf.push_str(&row.raw);
            }
            buf.push('\n');
        }
        crate::util::sha256_hex(buf.as_bytes())
    }
}
