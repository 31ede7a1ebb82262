//! The two stages end to end: cache check, parallel build, ordered merge,
//! emission, manifest update, report and run history.
//!
//! Workers never touch the manifest or the output directory. Everything they
//! produce is merged in identifier order on the calling thread.

use crate::ballistics::{compute_vehicle, ProjectileTable};
use crate::cache::{CacheState, FileFingerprint, Manifest, ManifestEntry};
use crate::config::{
    BallisticConfig, ConvertConfig, MANIFEST_FILE_NAME, REPORT_FILE_NAME,
    RUN_HISTORY_FILE_NAME,
};
use crate::datamine::{Datamine, LangTable, VehicleSource};
use crate::emit::{
    discover_data, output_digest, parse_table, read_vehicle_data, write_tables,
    write_vehicle_data, DataSource, TablesDocument, STRUCTURED_SCHEMA, TABLES_FILE_NAME,
};
use crate::error::{Error, Result};
use crate::golden;
use crate::model::{build_vehicle, load_vehicle_inputs, VehicleData};
use crate::report::{write_json_report, FailureRecord, OutcomeState, RunReport, VehicleOutcome};
use crate::scheduler::{run_ordered, CancelToken};
use crate::selection;
use crate::store::Store;
use crate::util::{relative_key, sha256_hex};
use crate::warning::Warning;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const CONFIG_TUNING_DEP: &str = "config:tuning";
pub const CONFIG_PHYSICS_DEP: &str = "config:physics";
/// Output form of the run; switching `--emit` rebuilds every vehicle.
pub const CONFIG_EMIT_DEP: &str = "config:emit";
pub const LANG_DEP: &str = "lang:units.csv";

/// Cache state of one vehicle as reported by `--status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleStatus {
    pub vehicle_id: String,
    pub state: CacheState,
}

impl VehicleStatus {
    /// `id<TAB>state<TAB>detail`, detail listing every changed dependency.
    pub fn line(&self) -> String {
        let detail = match &self.state {
            CacheState::Fresh => String::new(),
            CacheState::Missing => "no manifest entry".to_string(),
            CacheState::Stale { changes } => changes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        };
        format!("{}\t{}\t{}", self.vehicle_id, self.state.label(), detail)
    }
}

/// What a worker hands back to the merge step.
enum TaskResult<T> {
    Cached(ManifestEntry),
    Built(T),
    Failed(Error),
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn prepare_out_dir(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).map_err(|e| Error::emit(out_dir, e))
}

fn load_manifest(path: &Path, report: &mut RunReport) -> Manifest {
    match Manifest::load(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "cache manifest unreadable; treating every vehicle as stale");
            report.warnings.push(Warning::cache_degraded(e.to_string()));
            Manifest::default()
        }
    }
}

/// Delete outputs of a previous build that the new build did not write again.
fn remove_leftovers(out_dir: &Path, previous: Option<&ManifestEntry>, current: &[String]) {
    let Some(previous) = previous else {
        return;
    };
    let keep: HashSet<&str> = current.iter().map(String::as_str).collect();
    for old in previous.output.iter().filter(|o| !keep.contains(o.as_str())) {
        let path = out_dir.join(old);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "could not remove old output");
            }
        }
    }
}

/// Manifest save, report and history. The exit code is fixed before the
/// history row is written so both agree.
fn finish_run(
    mut report: RunReport,
    manifest: &Manifest,
    out_dir: &Path,
    strict: bool,
) -> RunReport {
    if let Err(e) = manifest.save(&out_dir.join(MANIFEST_FILE_NAME)) {
        tracing::error!(error = %e, "cache manifest not written");
        report.run_errors.push(FailureRecord::from(&e));
    }
    report.finish(strict);

    let history = Store::open(&out_dir.join(RUN_HISTORY_FILE_NAME))
        .and_then(|mut store| store.insert_run(&report));
    match history {
        Ok(id) => tracing::debug!(run = id, "run recorded"),
        Err(e) => {
            tracing::warn!(error = %e, "run history unavailable");
            report.warnings.push(Warning::history_unavailable(e));
        }
    }

    let report_path = out_dir.join(REPORT_FILE_NAME);
    if let Err(e) = write_json_report(&report, &report_path) {
        tracing::error!(error = %e, "report not written");
        report.run_errors.push(FailureRecord::from(&e));
        report.finish(strict);
    }
    report
}

// ---------------------------------------------------------------------------
// convert-datamine
// ---------------------------------------------------------------------------

struct ConvertContext<'a> {
    cfg: &'a ConvertConfig,
    dm: Datamine,
    lang: LangTable,
    tuning_digest: String,
}

impl ConvertContext<'_> {
    fn open(cfg: &ConvertConfig) -> Result<ConvertContext<'_>> {
        let dm = Datamine::open(&cfg.datamine_root, cfg.lang_path.as_deref())?;
        let lang = match &dm.lang_path {
            Some(p) => LangTable::load(p)?,
            None => LangTable::default(),
        };
        tracing::info!(
            root = %dm.root.display(),
            version = %dm.version,
            lang_rows = lang.len(),
            "datamine opened"
        );
        let tuning_json = serde_json::to_vec(&cfg.tuning).unwrap_or_default();
        Ok(ConvertContext {
            cfg,
            dm,
            lang,
            tuning_digest: sha256_hex(&tuning_json),
        })
    }

    fn lang_digest(&self, keys: &[String]) -> String {
        self.lang.rows_digest(keys.iter().map(String::as_str))
    }

    /// Dependencies of an existing entry as they are now.
    fn current_deps(&self, src: &VehicleSource, entry: &ManifestEntry) -> Vec<(String, Option<String>)> {
        let mut current = entry.rehash_files(&self.dm.root);
        let key = self.dm.key_for(&src.path);
        if !current.iter().any(|(p, _)| *p == key) {
            let hash = FileFingerprint::of_file(&self.dm.root, &key).map(|f| f.sha256);
            current.push((key, hash));
        }
        current.push((CONFIG_TUNING_DEP.to_string(), Some(self.tuning_digest.clone())));
        current.push((LANG_DEP.to_string(), Some(self.lang_digest(&entry.lang_keys))));
        current.push((CONFIG_EMIT_DEP.to_string(), Some(self.cfg.emit.label().to_string())));
        current
    }

    fn state(&self, src: &VehicleSource, manifest: &Manifest) -> CacheState {
        match manifest.get(&src.id) {
            None => CacheState::Missing,
            Some(entry) => entry.check(&self.dm.version, &self.current_deps(src, entry), &self.cfg.out_dir),
        }
    }

    fn build(&self, src: &VehicleSource) -> Result<ConvertedVehicle> {
        let tuning = &self.cfg.tuning;
        let inputs = load_vehicle_inputs(&self.dm, src, tuning)?;
        let selection = selection::select(&inputs.raw, &tuning.selection, &tuning.physics);
        let vehicle = build_vehicle(&inputs.raw, &selection, &self.lang, &tuning.physics)?;
        let mut files = inputs.files;
        files.push(FileFingerprint::pseudo(
            CONFIG_TUNING_DEP.to_string(),
            self.tuning_digest.clone(),
        ));
        files.push(FileFingerprint::pseudo(
            LANG_DEP.to_string(),
            self.lang_digest(&inputs.lang_keys),
        ));
        files.push(FileFingerprint::pseudo(
            CONFIG_EMIT_DEP.to_string(),
            self.cfg.emit.label().to_string(),
        ));
        Ok(ConvertedVehicle {
            vehicle,
            warnings: selection.warnings,
            files,
            lang_keys: inputs.lang_keys,
        })
    }
}

struct ConvertedVehicle {
    vehicle: VehicleData,
    warnings: Vec<Warning>,
    files: Vec<FileFingerprint>,
    lang_keys: Vec<String>,
}

/// Stage 1: datamine to Data files.
pub fn run_convert(cfg: &ConvertConfig, cancel: &CancelToken) -> Result<RunReport> {
    let ctx = ConvertContext::open(cfg)?;
    let sources = ctx.dm.discover_vehicles(&cfg.selector)?;
    prepare_out_dir(&cfg.out_dir)?;
    tracing::info!(vehicles = sources.len(), selector = %cfg.selector, "vehicles selected");

    let mut report = RunReport::new("convert-datamine", &ctx.dm.root, &cfg.out_dir);
    report.datamine_version = ctx.dm.version.clone();
    let manifest_path = cfg.out_dir.join(MANIFEST_FILE_NAME);
    let mut manifest = load_manifest(&manifest_path, &mut report);

    let results = run_ordered(&sources, cfg.threads, cancel, |src| {
        if !cfg.force {
            if let (Some(entry), CacheState::Fresh) = (manifest.get(&src.id), ctx.state(src, &manifest)) {
                return TaskResult::Cached(entry.clone());
            }
        }
        match ctx.build(src) {
            Ok(built) => TaskResult::Built(built),
            Err(e) => {
                tracing::warn!(vehicle = %src.id, kind = %e.kind(), error = %e, "vehicle failed");
                if cfg.strict {
                    cancel.cancel();
                }
                TaskResult::Failed(e)
            }
        }
    });

    for (src, result) in sources.iter().zip(results) {
        let outcome = match result {
            None => VehicleOutcome::new(&src.id, OutcomeState::Cancelled),
            Some(TaskResult::Cached(entry)) => cached_outcome(&src.id, &entry),
            Some(TaskResult::Failed(e)) => {
                manifest.entries.remove(&src.id);
                VehicleOutcome::failed(&src.id, &e)
            }
            Some(TaskResult::Built(built)) => {
                match emit_converted(&ctx, &src.id, built, manifest.get(&src.id)) {
                    Ok((outcome, entry)) => {
                        manifest.entries.insert(src.id.clone(), entry);
                        outcome
                    }
                    Err(e) => {
                        tracing::error!(vehicle = %src.id, error = %e, "emit failed");
                        manifest.entries.remove(&src.id);
                        VehicleOutcome::failed(&src.id, &e)
                    }
                }
            }
        };
        report.vehicles.push(outcome);
    }

    Ok(finish_run(report, &manifest, &cfg.out_dir, cfg.strict))
}

fn cached_outcome(id: &str, entry: &ManifestEntry) -> VehicleOutcome {
    tracing::debug!(vehicle = %id, "fresh; skipped");
    let mut o = VehicleOutcome::new(id, OutcomeState::Cached);
    o.outputs = entry.output.clone();
    o.output_digest = entry.output_digest.clone();
    o.projectiles = entry.projectiles;
    o.warnings = entry.warnings.clone();
    o.table_errors = entry.table_errors.clone();
    o
}

fn emit_converted(
    ctx: &ConvertContext<'_>,
    id: &str,
    built: ConvertedVehicle,
    previous: Option<&ManifestEntry>,
) -> Result<(VehicleOutcome, ManifestEntry)> {
    let out_dir = &ctx.cfg.out_dir;
    let outputs = write_vehicle_data(out_dir, &built.vehicle, ctx.cfg.emit)?;
    remove_leftovers(out_dir, previous, &outputs);
    let digest = output_digest(out_dir, &outputs)?;
    tracing::info!(vehicle = %id, projectiles = built.vehicle.projectiles.len(), "vehicle converted");

    let mut outcome = VehicleOutcome::new(id, OutcomeState::Built);
    outcome.warnings = built.warnings;
    outcome.outputs = outputs.clone();
    outcome.output_digest = digest.clone();
    outcome.projectiles = built.vehicle.projectiles.len();
    let entry = ManifestEntry {
        vehicle_id: id.to_string(),
        datamine_version: ctx.dm.version.clone(),
        files: built.files,
        lang_keys: built.lang_keys,
        output: outputs,
        output_digest: digest,
        updated_at: now_rfc3339(),
        warnings: outcome.warnings.clone(),
        table_errors: Vec::new(),
        projectiles: outcome.projectiles,
    };
    Ok((outcome, entry))
}

/// Read-only cache query for `convert-datamine --status`.
pub fn convert_status(cfg: &ConvertConfig) -> Result<Vec<VehicleStatus>> {
    let ctx = ConvertContext::open(cfg)?;
    let sources = ctx.dm.discover_vehicles(&cfg.selector)?;
    let manifest = Manifest::load(&cfg.out_dir.join(MANIFEST_FILE_NAME)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "cache manifest unreadable");
        Manifest::default()
    });
    Ok(sources
        .iter()
        .map(|src| VehicleStatus {
            vehicle_id: src.id.clone(),
            state: ctx.state(src, &manifest),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// make-ballistic
// ---------------------------------------------------------------------------

/// Cached tables are tagged with the engine version so a new release
/// recomputes them.
fn engine_version() -> String {
    format!("fcs-datamine {}", env!("CARGO_PKG_VERSION"))
}

struct BallisticContext<'a> {
    cfg: &'a BallisticConfig,
    data_dir: std::path::PathBuf,
    physics_digest: String,
    version: String,
}

impl BallisticContext<'_> {
    fn open(cfg: &BallisticConfig) -> Result<BallisticContext<'_>> {
        let data_dir = cfg
            .data_dir
            .canonicalize()
            .map_err(|e| Error::io(&cfg.data_dir, e))?;
        Ok(BallisticContext {
            cfg,
            data_dir,
            physics_digest: cfg.physics.fingerprint(),
            version: engine_version(),
        })
    }

    fn state(&self, src: &DataSource, manifest: &Manifest) -> CacheState {
        let Some(entry) = manifest.get(&src.id) else {
            return CacheState::Missing;
        };
        let mut current = entry.rehash_files(&self.data_dir);
        let key = relative_key(&src.path, &self.data_dir);
        if !current.iter().any(|(p, _)| *p == key) {
            let hash = FileFingerprint::of_file(&self.data_dir, &key).map(|f| f.sha256);
            current.push((key, hash));
        }
        current.push((CONFIG_PHYSICS_DEP.to_string(), Some(self.physics_digest.clone())));
        current.push((CONFIG_EMIT_DEP.to_string(), Some(self.cfg.emit.label().to_string())));
        entry.check(&self.version, &current, &self.cfg.out_dir)
    }

    fn build(&self, src: &DataSource) -> Result<ComputedVehicle> {
        let bytes = fs::read(&src.path).map_err(|e| Error::io(&src.path, e))?;
        let meta = fs::metadata(&src.path).ok();
        let data_fp = FileFingerprint::from_bytes(
            relative_key(&src.path, &self.data_dir),
            &bytes,
            meta.as_ref(),
        );
        let vehicle = read_vehicle_data(&src.path)?;
        if vehicle.id != src.id {
            return Err(Error::schema(
                &src.path,
                "id",
                format!("'{}' does not match file name '{}'", vehicle.id, src.id),
            ));
        }
        let tables = compute_vehicle(&vehicle, &self.cfg.physics);
        let fatal = self.cfg.strict && tables.iter().any(|t| t.error.is_some());
        Ok(ComputedVehicle {
            vehicle,
            tables,
            files: vec![
                data_fp,
                self.physics_fp(),
                FileFingerprint::pseudo(CONFIG_EMIT_DEP.to_string(), self.cfg.emit.label().to_string()),
            ],
            fatal,
        })
    }

    fn physics_fp(&self) -> FileFingerprint {
        FileFingerprint::pseudo(CONFIG_PHYSICS_DEP.to_string(), self.physics_digest.clone())
    }

    fn golden_warnings(&self, vehicle_id: &str, tables: &[ProjectileTable]) -> Vec<Warning> {
        match &self.cfg.golden_dir {
            Some(dir) => golden::check_vehicle(dir, vehicle_id, tables, self.cfg.tolerance),
            None => Vec::new(),
        }
    }
}

struct ComputedVehicle {
    vehicle: VehicleData,
    tables: Vec<ProjectileTable>,
    files: Vec<FileFingerprint>,
    /// A table failed in strict mode.
    fatal: bool,
}

/// Stage 2: Data files to ballistic tables.
pub fn run_ballistic(cfg: &BallisticConfig, cancel: &CancelToken) -> Result<RunReport> {
    let ctx = BallisticContext::open(cfg)?;
    let sources = discover_data(&ctx.data_dir)?;
    prepare_out_dir(&cfg.out_dir)?;
    tracing::info!(vehicles = sources.len(), data = %ctx.data_dir.display(), "data files found");

    let mut report = RunReport::new("make-ballistic", &ctx.data_dir, &cfg.out_dir);
    report.datamine_version = ctx.version.clone();
    let mut manifest = load_manifest(&cfg.out_dir.join(MANIFEST_FILE_NAME), &mut report);

    let results = run_ordered(&sources, cfg.threads, cancel, |src| {
        if !cfg.force {
            if let (Some(entry), CacheState::Fresh) = (manifest.get(&src.id), ctx.state(src, &manifest)) {
                return TaskResult::Cached(entry.clone());
            }
        }
        match ctx.build(src) {
            Ok(computed) => {
                if computed.fatal {
                    cancel.cancel();
                }
                TaskResult::Built(computed)
            }
            Err(e) => {
                tracing::warn!(vehicle = %src.id, kind = %e.kind(), error = %e, "vehicle failed");
                if cfg.strict {
                    cancel.cancel();
                }
                TaskResult::Failed(e)
            }
        }
    });

    for (src, result) in sources.iter().zip(results) {
        let outcome = match result {
            None => VehicleOutcome::new(&src.id, OutcomeState::Cancelled),
            Some(TaskResult::Cached(entry)) => {
                let mut o = cached_outcome(&src.id, &entry);
                if cfg.golden_dir.is_some() {
                    match read_tables(&cfg.out_dir, &entry.output) {
                        Ok(tables) => o.warnings.extend(ctx.golden_warnings(&src.id, &tables)),
                        Err(e) => tracing::warn!(vehicle = %src.id, error = %e, "cached tables unreadable"),
                    }
                }
                o
            }
            Some(TaskResult::Failed(e)) => {
                manifest.entries.remove(&src.id);
                VehicleOutcome::failed(&src.id, &e)
            }
            Some(TaskResult::Built(computed)) => match emit_tables(&ctx, &src.id, computed) {
                Ok((outcome, entry)) => {
                    manifest.entries.insert(src.id.clone(), entry);
                    outcome
                }
                Err(e) => {
                    tracing::error!(vehicle = %src.id, error = %e, "emit failed");
                    manifest.entries.remove(&src.id);
                    VehicleOutcome::failed(&src.id, &e)
                }
            },
        };
        report.vehicles.push(outcome);
    }

    Ok(finish_run(report, &manifest, &cfg.out_dir, cfg.strict))
}

fn emit_tables(
    ctx: &BallisticContext<'_>,
    id: &str,
    computed: ComputedVehicle,
) -> Result<(VehicleOutcome, ManifestEntry)> {
    let out_dir = &ctx.cfg.out_dir;
    let doc = TablesDocument {
        schema: STRUCTURED_SCHEMA,
        vehicle_id: computed.vehicle.id.clone(),
        vehicle_name: computed.vehicle.name.clone(),
        tables: computed.tables,
    };
    let outputs = write_tables(out_dir, &doc, ctx.cfg.emit)?;
    let digest = output_digest(out_dir, &outputs)?;
    tracing::info!(vehicle = %id, tables = doc.tables.len(), "tables written");

    let mut outcome = VehicleOutcome::new(id, OutcomeState::Built);
    outcome.projectiles = doc.tables.len();
    outcome.table_errors = doc
        .tables
        .iter()
        .filter_map(|t| {
            t.error.as_ref().map(|e| FailureRecord {
                kind: e.kind,
                subject: t.projectile_id.clone(),
                message: e.detail.clone(),
            })
        })
        .collect();
    outcome.warnings = ctx.golden_warnings(id, &doc.tables);
    outcome.outputs = outputs.clone();
    outcome.output_digest = digest.clone();
    let entry = ManifestEntry {
        vehicle_id: id.to_string(),
        datamine_version: ctx.version.clone(),
        files: computed.files,
        lang_keys: Vec::new(),
        output: outputs,
        output_digest: digest,
        updated_at: now_rfc3339(),
        // Golden warnings are recomputed on every run.
        warnings: Vec::new(),
        table_errors: outcome.table_errors.clone(),
        projectiles: outcome.projectiles,
    };
    Ok((outcome, entry))
}

/// Tables of a cached vehicle read back from its outputs: the structured
/// document when present, else the flat tables.
fn read_tables(out_dir: &Path, outputs: &[String]) -> Result<Vec<ProjectileTable>> {
    if let Some(rel) = outputs.iter().find(|o| o.ends_with(TABLES_FILE_NAME)) {
        let path = out_dir.join(rel);
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let doc: TablesDocument = serde_json::from_str(&text).map_err(|e| Error::Parse {
            file: path.clone(),
            source: crate::parser::ParseError::Syntax(e.to_string()),
        })?;
        return Ok(doc.tables);
    }
    let mut tables = Vec::new();
    for rel in outputs.iter().filter(|o| o.ends_with(".txt")) {
        let path = out_dir.join(rel);
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let rows = parse_table(&text).map_err(|source| Error::Parse {
            file: path.clone(),
            source,
        })?;
        let projectile_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        tables.push(ProjectileTable {
            projectile_id,
            display_name: String::new(),
            kind: String::new(),
            double_shell: false,
            rows,
            error: None,
        });
    }
    Ok(tables)
}

/// Read-only cache query for `make-ballistic --status`.
pub fn ballistic_status(cfg: &BallisticConfig) -> Result<Vec<VehicleStatus>> {
    let ctx = BallisticContext::open(cfg)?;
    let sources = discover_data(&ctx.data_dir)?;
    let manifest = Manifest::load(&cfg.out_dir.join(MANIFEST_FILE_NAME)).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "cache manifest unreadable");
        Manifest::default()
    });
    Ok(sources
        .iter()
        .map(|src| VehicleStatus {
            vehicle_id: src.id.clone(),
            state: ctx.state(src, &manifest),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_lists_changes() {
        let s = VehicleStatus {
            vehicle_id: "t".to_string(),
            state: CacheState::Stale {
                changes: vec![crate::cache::DependencyChange {
                    path: "aces.vromfs.bin_u/gamedata/weapons/gun.blkx".to_string(),
                    old_hash: Some("0123456789abcdef".to_string()),
                    new_hash: Some("fedcba9876543210".to_string()),
                }],
            },
        };
        assert_eq!(
            s.line(),
            "t\tstale\taces.vromfs.bin_u/gamedata/weapons/gun.blkx 0123456789ab -> fedcba987654"
        );
        let fresh = VehicleStatus {
            vehicle_id: "u".to_string(),
            state: CacheState::Fresh,
        };
        assert_eq!(fresh.line(), "u\tfresh\t");
    }

    #[test]
    fn leftovers_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.txt"), "x").unwrap();
        fs::write(dir.path().join("keep.json"), "x").unwrap();
        let previous = ManifestEntry {
            vehicle_id: "t".to_string(),
            datamine_version: "1".to_string(),
            files: Vec::new(),
            lang_keys: Vec::new(),
            output: vec!["old.txt".to_string(), "keep.json".to_string()],
            output_digest: String::new(),
            updated_at: String::new(),
            warnings: Vec::new(),
            table_errors: Vec::new(),
            projectiles: 0,
        };
        remove_leftovers(dir.path(), Some(&previous), &["keep.json".to_string()]);
        assert!(!dir.path().join("old.txt").exists());
        assert!(dir.path().join("keep.json").exists());
    }

    fn fixture_datamine() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join("datamine")
    }

    #[test]
    fn interrupted_run_keeps_manifest_and_writes_report() {
        let out = tempfile::tempdir().unwrap();
        let mut cfg = ConvertConfig::new(fixture_datamine(), out.path().join("Data"));
        cfg.selector = "test_ap_tank".to_string();
        let first = run_convert(&cfg, &CancelToken::new()).unwrap();
        assert_eq!(first.count(OutcomeState::Built), 1);

        cfg.selector = "test_*".to_string();
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = run_convert(&cfg, &cancel).unwrap();
        assert_eq!(report.count(OutcomeState::Cancelled), report.vehicles.len());
        assert!(!report.vehicles.is_empty());

        let manifest = Manifest::load(&cfg.out_dir.join(MANIFEST_FILE_NAME)).unwrap();
        assert!(manifest.get("test_ap_tank").is_some());
        assert_eq!(manifest.entries.len(), 1);
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(cfg.out_dir.join(REPORT_FILE_NAME)).unwrap()).unwrap();
        assert_eq!(written["vehicles"][0]["state"], "cancelled");
    }

    #[test]
    fn cached_outcome_replays_findings() {
        let entry = ManifestEntry {
            vehicle_id: "t".to_string(),
            datamine_version: "1".to_string(),
            files: Vec::new(),
            lang_keys: Vec::new(),
            output: vec!["t.txt".to_string()],
            output_digest: "abc".to_string(),
            updated_at: String::new(),
            warnings: vec![Warning::ambiguous_decorative("t", "fake_gun.blk", "fake")],
            table_errors: vec![FailureRecord::from(&Error::computation("p", "no law"))],
            projectiles: 2,
        };
        let o = cached_outcome("t", &entry);
        assert_eq!(o.state, OutcomeState::Cached);
        assert_eq!(o.warnings, entry.warnings);
        assert_eq!(o.table_errors, entry.table_errors);
        assert_eq!(o.projectiles, 2);
    }

    #[test]
    fn read_tables_from_flat_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("v")).unwrap();
        fs::write(dir.path().join("v/p.txt"), "0\t0.000\t100.0\n50\t0.063\t99.1\n").unwrap();
        let tables = read_tables(dir.path(), &["v/p.txt".to_string()]).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].projectile_id, "p");
        assert_eq!(tables[0].rows.len(), 2);
    }
}
