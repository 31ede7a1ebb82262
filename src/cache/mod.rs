//! Content-hash manifest (`.fcs-cache.json`) deciding which vehicles need a rebuild.
//!
//! Per vehicle: `{fresh, stale, missing} -> computing -> cached`. The manifest
//! is read once before scheduling and written once, atomically, after the merge.

use crate::error::{Error, Result};
use crate::report::FailureRecord;
use crate::util::{mtime_secs, sha256_hex, write_atomic};
use crate::warning::Warning;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const MANIFEST_VERSION: u32 = 1;

/// Dependencies that are not files (tuning constants, language rows) carry
/// this prefix and no mtime/size.
pub const PSEUDO_PREFIXES: [&str; 2] = ["config:", "lang:"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Relative to the input root, forward slashes.
    pub path: String,
    pub sha256: String,
    pub mtime: u64,
    pub size: u64,
}

impl FileFingerprint {
    pub fn from_bytes(path: String, bytes: &[u8], meta: Option<&fs::Metadata>) -> Self {
        Self {
            path,
            sha256: sha256_hex(bytes),
            mtime: meta.map(mtime_secs).unwrap_or(0),
            size: bytes.len() as u64,
        }
    }

    pub fn pseudo(path: String, digest: String) -> Self {
        Self {
            path,
            sha256: digest,
            mtime: 0,
            size: 0,
        }
    }

    /// Hash `root/key` as it is on disk now; `None` when it cannot be read.
    pub fn of_file(root: &Path, key: &str) -> Option<Self> {
        let path = root.join(key);
        let bytes = fs::read(&path).ok()?;
        let meta = fs::metadata(&path).ok();
        Some(Self::from_bytes(key.to_string(), &bytes, meta.as_ref()))
    }

    pub fn is_pseudo(&self) -> bool {
        is_pseudo_path(&self.path)
    }
}

pub fn is_pseudo_path(path: &str) -> bool {
    PSEUDO_PREFIXES.iter().any(|p| path.starts_with(p))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub vehicle_id: String,
    pub datamine_version: String,
    pub files: Vec<FileFingerprint>,
    /// Language-table keys whose rows fed the `lang:` dependency.
    #[serde(default)]
    pub lang_keys: Vec<String>,
    /// Output files relative to the output directory.
    pub output: Vec<String>,
    #[serde(default)]
    pub output_digest: String,
    pub updated_at: String,
    /// Findings of the build that produced `output`, replayed while the
    /// entry stays fresh.
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default)]
    pub table_errors: Vec<FailureRecord>,
    #[serde(default)]
    pub projectiles: usize,
}

/// One dependency whose hash no longer matches. A missing side is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyChange {
    pub path: String,
    pub old_hash: Option<String>,
    pub new_hash: Option<String>,
}

impl std::fmt::Display for DependencyChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.path,
            self.old_hash.as_deref().map(short_hash).unwrap_or("(none)"),
            self.new_hash.as_deref().map(short_hash).unwrap_or("(none)")
        )
    }
}

fn short_hash(h: &str) -> &str {
    h.get(..12).unwrap_or(h)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CacheState {
    Fresh,
    Stale { changes: Vec<DependencyChange> },
    Missing,
}

impl CacheState {
    pub fn label(&self) -> &'static str {
        match self {
            CacheState::Fresh => "fresh",
            CacheState::Stale { .. } => "stale",
            CacheState::Missing => "missing",
        }
    }
}

impl ManifestEntry {
    /// Compare against the dependencies as they are now. `current` must list
    /// every dependency the entry would be rebuilt from; `None` hashes mark
    /// files that disappeared.
    pub fn check(&self, version: &str, current: &[(String, Option<String>)], out_dir: &Path) -> CacheState {
        let mut changes = Vec::new();
        if self.datamine_version != version {
            changes.push(DependencyChange {
                path: "version".to_string(),
                old_hash: Some(self.datamine_version.clone()),
                new_hash: Some(version.to_string()),
            });
        }
        for (path, new_hash) in current {
            let old = self.files.iter().find(|f| &f.path == path);
            let old_hash = old.map(|f| f.sha256.clone());
            if old_hash != *new_hash {
                changes.push(DependencyChange {
                    path: path.clone(),
                    old_hash,
                    new_hash: new_hash.clone(),
                });
            }
        }
        for old in &self.files {
            if !current.iter().any(|(p, _)| p == &old.path) {
                changes.push(DependencyChange {
                    path: old.path.clone(),
                    old_hash: Some(old.sha256.clone()),
                    new_hash: None,
                });
            }
        }
        for output in &self.output {
            if !out_dir.join(output).is_file() {
                changes.push(DependencyChange {
                    path: output.clone(),
                    old_hash: None,
                    new_hash: None,
                });
            }
        }
        if changes.is_empty() {
            CacheState::Fresh
        } else {
            CacheState::Stale { changes }
        }
    }

    /// Current hashes of the entry's file dependencies under `root`; pseudo
    /// dependencies are resolved by the caller.
    pub fn rehash_files(&self, root: &Path) -> Vec<(String, Option<String>)> {
        self.files
            .iter()
            .filter(|f| !f.is_pseudo())
            .map(|f| {
                let now = FileFingerprint::of_file(root, &f.path).map(|fp| fp.sha256);
                (f.path.clone(), now)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// An absent manifest is an empty one. Unreadable or foreign-version
    /// manifests are a `CacheIo` error the caller degrades to "all stale".
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let cache_err = |detail: String| Error::CacheIo {
            path: path.to_path_buf(),
            detail,
        };
        let text = fs::read_to_string(path).map_err(|e| cache_err(e.to_string()))?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| cache_err(e.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(cache_err(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let cache_err = |detail: String| Error::CacheIo {
            path: path.to_path_buf(),
            detail,
        };
        let mut json = serde_json::to_string_pretty(self).map_err(|e| cache_err(e.to_string()))?;
        json.push('\n');
        write_atomic(path, json.as_bytes()).map_err(|e| cache_err(e.to_string()))
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&ManifestEntry> {
        self.entries.get(vehicle_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(files: Vec<FileFingerprint>) -> ManifestEntry {
        ManifestEntry {
            vehicle_id: "t".to_string(),
            datamine_version: "1.0".to_string(),
            files,
            lang_keys: Vec::new(),
            output: Vec::new(),
            output_digest: String::new(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            warnings: Vec::new(),
            table_errors: Vec::new(),
            projectiles: 0,
        }
    }

    fn fp(path: &str, hash: &str) -> FileFingerprint {
        FileFingerprint::pseudo(path.to_string(), hash.to_string())
    }

    #[test]
    fn unchanged_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry(vec![fp("a.blkx", "h1")]);
        let state = e.check("1.0", &[("a.blkx".to_string(), Some("h1".to_string()))], dir.path());
        assert_eq!(state, CacheState::Fresh);
    }

    #[test]
    fn changed_file_reports_old_and_new_hash() {
        let dir = tempfile::tempdir().unwrap();
        let e = entry(vec![fp("a.blkx", "h1"), fp("w.blkx", "h2")]);
        let state = e.check(
            "1.0",
            &[
                ("a.blkx".to_string(), Some("h1".to_string())),
                ("w.blkx".to_string(), Some("h3".to_string())),
            ],
            dir.path(),
        );
        match state {
            CacheState::Stale { changes } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].path, "w.blkx");
                assert_eq!(changes[0].old_hash.as_deref(), Some("h2"));
                assert_eq!(changes[0].new_hash.as_deref(), Some("h3"));
            }
            other => panic!("expected stale, got {:?}", other),
        }
    }

    #[test]
    fn version_and_missing_output_make_stale() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = entry(vec![]);
        e.output = vec!["t.txt".to_string()];
        let state = e.check("2.0", &[], dir.path());
        let CacheState::Stale { changes } = state else {
            panic!("expected stale");
        };
        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["version", "t.txt"]);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fcs-cache.json");
        assert!(Manifest::load(&path).unwrap().entries.is_empty());
        let mut m = Manifest::default();
        m.entries.insert("t".to_string(), entry(vec![fp("a", "h")]));
        m.save(&path).unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), m);
    }

    #[test]
    fn entry_without_findings_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fcs-cache.json");
        fs::write(
            &path,
            r#"{"version":1,"entries":{"t":{"vehicle_id":"t","datamine_version":"1.0",
                "files":[],"output":["t.txt"],"updated_at":"2026-01-01T00:00:00Z"}}}"#,
        )
        .unwrap();
        let m = Manifest::load(&path).unwrap();
        let e = m.get("t").unwrap();
        assert!(e.warnings.is_empty() && e.table_errors.is_empty());
        assert_eq!(e.projectiles, 0);
    }

    #[test]
    fn corrupt_manifest_is_cache_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".fcs-cache.json");
        fs::write(&path, "{not json").unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CacheIo);
    }
}
