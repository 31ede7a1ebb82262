//! Datamine layout: locating vehicle files, resolving weapon references and
//! the language table inside an already-extracted game tree.

mod lang;

pub use lang::LangTable;

use crate::config::{MAX_SOURCE_FILES, MAX_SOURCE_FILE_BYTES};
use crate::error::{Error, Result};
use crate::util::{check_file_bounds, normalize_id};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const ACES_DIR: &str = "aces.vromfs.bin_u";
const LANG_DIR: &str = "lang.vromfs.bin_u";
const TANKMODELS_DIR: &str = "gamedata/units/tankmodels";
const LANG_CSV: &str = "lang/units.csv";
const VERSION_FILE: &str = "version";

/// An opened datamine tree.
#[derive(Debug, Clone)]
pub struct Datamine {
    /// Directory the user pointed at.
    pub root: PathBuf,
    /// `aces.vromfs.bin_u` (or the root itself when it is that directory).
    pub aces_root: PathBuf,
    pub tankmodels_dir: PathBuf,
    pub lang_path: Option<PathBuf>,
    pub version: String,
}

/// One vehicle file found under the tank models directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleSource {
    pub id: String,
    pub path: PathBuf,
}

impl Datamine {
    /// Open a datamine at `path`. `lang_override` replaces the default
    /// `lang.vromfs.bin_u/lang/units.csv` lookup.
    pub fn open(path: &Path, lang_override: Option<&Path>) -> Result<Self> {
        let root = path
            .canonicalize()
            .map_err(|e| Error::io(path, e))?;
        let aces_root = resolve_aces_root(&root);
        let tankmodels_dir = aces_root.join(TANKMODELS_DIR);
        if !tankmodels_dir.is_dir() {
            return Err(Error::io(
                &tankmodels_dir,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no gamedata/units/tankmodels under datamine root",
                ),
            ));
        }
        let lang_path = match lang_override {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default = root.join(LANG_DIR).join(LANG_CSV);
                default.is_file().then_some(default)
            }
        };
        let version = read_version(&root)
            .or_else(|| read_version(&aces_root))
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self {
            root,
            aces_root,
            tankmodels_dir,
            lang_path,
            version,
        })
    }

    /// Vehicle files whose identifier matches `selector`, sorted by identifier.
    /// When both `.blkx` and `.blk` exist for one identifier the JSON form wins.
    pub fn discover_vehicles(&self, selector: &str) -> Result<Vec<VehicleSource>> {
        let pattern = normalize_id(selector);
        let entries =
            fs::read_dir(&self.tankmodels_dir).map_err(|e| Error::io(&self.tankmodels_dir, e))?;
        let mut found: BTreeMap<String, PathBuf> = BTreeMap::new();
        for e in entries {
            let e = e.map_err(|e| Error::io(&self.tankmodels_dir, e))?;
            let path = e.path();
            if !path.is_file() {
                continue;
            }
            let ext = path
                .extension()
                .and_then(|x| x.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            if ext != "blkx" && ext != "blk" {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let id = normalize_id(stem);
            if !glob_match(&pattern, &id) {
                continue;
            }
            let prefer = match found.get(&id) {
                Some(existing) => ext == "blkx" && existing.extension().map_or(true, |x| x != "blkx"),
                None => true,
            };
            if prefer {
                found.insert(id, path);
            }
            if found.len() >= MAX_SOURCE_FILES {
                tracing::warn!(limit = MAX_SOURCE_FILES, "vehicle file limit reached");
                break;
            }
        }
        Ok(found
            .into_iter()
            .map(|(id, path)| VehicleSource { id, path })
            .collect())
    }

    /// Resolve a weapon or module reference such as
    /// `gameData/Weapons/groundModels_weapons/x.blk`. Paths are matched
    /// lowercase under the aces root, `.blkx` before `.blk`.
    pub fn resolve_reference(&self, reference: &str, from: &Path) -> Result<PathBuf> {
        let missing = || Error::MissingReference {
            id: reference.to_string(),
            file: from.to_path_buf(),
        };
        let rel = reference.trim().replace('\\', "/").to_lowercase();
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            return Err(missing());
        }
        let base = self.aces_root.join(rel);
        let mut candidates = Vec::with_capacity(2);
        match base.extension().and_then(|x| x.to_str()) {
            Some("blk") => {
                candidates.push(base.with_extension("blkx"));
                candidates.push(base.clone());
            }
            Some("blkx") => candidates.push(base.clone()),
            _ => {
                candidates.push(base.with_extension("blkx"));
                candidates.push(base.with_extension("blk"));
            }
        }
        for candidate in candidates {
            if !candidate.is_file() {
                continue;
            }
            return match check_file_bounds(&candidate, &self.aces_root, MAX_SOURCE_FILE_BYTES) {
                Ok(_) => Ok(candidate),
                Err(detail) => {
                    tracing::warn!(reference, %detail, "rejected reference");
                    Err(missing())
                }
            };
        }
        Err(missing())
    }

    /// Relative key of a file inside the datamine, used in manifests.
    pub fn key_for(&self, path: &Path) -> String {
        crate::util::relative_key(path, &self.root)
    }
}

/// Accept both the extraction root and `aces.vromfs.bin_u` itself.
fn resolve_aces_root(root: &Path) -> PathBuf {
    let aces = root.join(ACES_DIR);
    if aces.is_dir() {
        return aces;
    }
    root.to_path_buf()
}

fn read_version(dir: &Path) -> Option<String> {
    let text = fs::read_to_string(dir.join(VERSION_FILE)).ok()?;
    let line = text.lines().next()?.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Glob match with `*` (any run) and `?` (any one char).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
