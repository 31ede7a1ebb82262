//! On-disk forms of the Data model and the ballistic tables, and their readers.
//!
//! Every writer goes through [`write_atomic`] and renders deterministically:
//! the same model always produces the same bytes.

mod legacy;

pub use legacy::{parse_legacy, render_legacy};

use crate::ballistics::ProjectileTable;
use crate::config::{EmitMode, MANIFEST_FILE_NAME, MAX_SOURCE_FILES, REPORT_FILE_NAME};
use crate::error::{Error, Result};
use crate::model::{BallisticRow, VehicleData};
use crate::parser::ParseError;
use crate::util::{file_safe_name, normalize_id, write_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const STRUCTURED_SCHEMA: u32 = 1;
pub const TABLES_FILE_NAME: &str = "tables.json";

#[derive(Debug, Serialize, Deserialize)]
struct StructuredData {
    schema: u32,
    vehicle: VehicleData,
}

/// All tables of one vehicle, including the ones that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablesDocument {
    pub schema: u32,
    pub vehicle_id: String,
    pub vehicle_name: String,
    pub tables: Vec<ProjectileTable>,
}

fn to_json<T: Serialize>(value: &T, path: &Path) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::emit(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    json.push('\n');
    Ok(json)
}

fn write(path: &Path, text: &str) -> Result<()> {
    write_atomic(path, text.as_bytes()).map_err(|e| Error::emit(path, e))
}

/// Write the Data forms selected by `mode`; returns paths relative to `out_dir`.
pub fn write_vehicle_data(out_dir: &Path, v: &VehicleData, mode: EmitMode) -> Result<Vec<String>> {
    let stem = file_safe_name(&v.id);
    let mut written = Vec::new();
    if mode.legacy() {
        let name = format!("{}.txt", stem);
        write(&out_dir.join(&name), &render_legacy(v))?;
        written.push(name);
    }
    if mode.structured() {
        let name = format!("{}.json", stem);
        let path = out_dir.join(&name);
        let doc = StructuredData {
            schema: STRUCTURED_SCHEMA,
            vehicle: v.clone(),
        };
        write(&path, &to_json(&doc, &path)?)?;
        written.push(name);
    }
    Ok(written)
}

/// Read either Data form, chosen by extension.
pub fn read_vehicle_data(path: &Path) -> Result<VehicleData> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let is_json = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        return parse_legacy(&text).map_err(|source| Error::Parse {
            file: path.to_path_buf(),
            source,
        });
    }
    let doc: StructuredData = serde_json::from_str(&text).map_err(|e| {
        if e.classify() == serde_json::error::Category::Data {
            Error::schema(path, "vehicle", e.to_string())
        } else {
            Error::Parse {
                file: path.to_path_buf(),
                source: ParseError::Syntax(e.to_string()),
            }
        }
    })?;
    if doc.schema < STRUCTURED_SCHEMA {
        return Err(Error::schema(path, "schema", format!("unsupported version {}", doc.schema)));
    }
    Ok(doc.vehicle)
}

/// A Data file found in a Data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub id: String,
    pub path: PathBuf,
}

/// Data files in `dir`, one per vehicle, sorted by identifier. The structured
/// form wins when both exist.
pub fn discover_data(dir: &Path) -> Result<Vec<DataSource>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();
    for e in entries {
        let e = e.map_err(|e| Error::io(dir, e))?;
        let path = e.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || name.starts_with('.') || name == REPORT_FILE_NAME || name == MANIFEST_FILE_NAME {
            continue;
        }
        let ext = path
            .extension()
            .and_then(|x| x.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if ext != "json" && ext != "txt" {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let id = normalize_id(stem);
        let replace = match found.get(&id) {
            Some(existing) => ext == "json" && existing.extension().map_or(true, |x| x != "json"),
            None => true,
        };
        if replace {
            found.insert(id, path);
        }
        if found.len() >= MAX_SOURCE_FILES {
            break;
        }
    }
    Ok(found
        .into_iter()
        .map(|(id, path)| DataSource { id, path })
        .collect())
}

/// `distance\ttime\tpenetration` rows, time to 3 and penetration to 1 decimal.
pub fn render_table(rows: &[BallisticRow]) -> String {
    let mut out = String::with_capacity(rows.len() * 20);
    for r in rows {
        let _ = writeln!(out, "{}\t{:.3}\t{:.1}", r.distance_m, r.time_s, r.penetration_mm);
    }
    out
}

pub fn parse_table(text: &str) -> std::result::Result<Vec<BallisticRow>, ParseError> {
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cols: Vec<f64> = line
            .split_whitespace()
            .map(|c| c.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| ParseError::Syntax(format!("line {}: non-numeric column", i + 1)))?;
        let &[distance_m, time_s, penetration_mm] = &cols[..] else {
            return Err(ParseError::Syntax(format!(
                "line {}: expected 3 columns, got {}",
                i + 1,
                cols.len()
            )));
        };
        rows.push(BallisticRow {
            distance_m,
            time_s,
            penetration_mm,
        });
    }
    Ok(rows)
}

/// Replace a vehicle's table directory wholesale. Returns paths relative to `out_dir`.
pub fn write_tables(out_dir: &Path, doc: &TablesDocument, mode: EmitMode) -> Result<Vec<String>> {
    let dir_name = file_safe_name(&doc.vehicle_id);
    let dir = out_dir.join(&dir_name);
    if dir.exists() {
        fs::remove_dir_all(&dir).map_err(|e| Error::emit(&dir, e))?;
    }
    fs::create_dir_all(&dir).map_err(|e| Error::emit(&dir, e))?;
    let mut written = Vec::new();
    if mode.legacy() {
        for t in doc.tables.iter().filter(|t| t.error.is_none()) {
            let name = format!("{}.txt", file_safe_name(&t.projectile_id));
            write(&dir.join(&name), &render_table(&t.rows))?;
            written.push(format!("{}/{}", dir_name, name));
        }
    }
    if mode.structured() {
        let path = dir.join(TABLES_FILE_NAME);
        write(&path, &to_json(doc, &path)?)?;
        written.push(format!("{}/{}", dir_name, TABLES_FILE_NAME));
    }
    Ok(written)
}

/// Digest over output files, in the given order, as they are on disk.
pub fn output_digest(out_dir: &Path, outputs: &[String]) -> Result<String> {
    let mut buf = Vec::new();
    for rel in outputs {
        let path = out_dir.join(rel);
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        buf.extend_from_slice(rel.as_bytes());
        buf.push(0);
        buf.extend_from_slice(crate::util::sha256_hex(&bytes).as_bytes());
        buf.push(b'\n');
    }
    Ok(crate::util::sha256_hex(&buf))
}
