//! Datamine converter and ballistic table generator: command-line interface.

use clap::{Parser, Subcommand};
use fcs_datamine::config::{
    BallisticConfig, ConvertConfig, EmitMode, ToleranceMode, Tuning, DEFAULT_BALLISTIC_DIR,
    DEFAULT_DATA_DIR,
};
use fcs_datamine::error::Error;
use fcs_datamine::pipeline::{self, VehicleStatus};
use fcs_datamine::report::{RunReport, VehicleOutcome};
use fcs_datamine::scheduler::CancelToken;
use fcs_datamine::store::Store;
use fcs_datamine::util::{init_logging, LogFormat};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fcs-datamine")]
#[command(about = "Datamine converter and ballistic table generator")]
struct Cli {
    /// Log rendering on stderr.
    #[arg(long, value_enum, global = true, default_value = "json")]
    log_format: LogFormat,

    /// Log level filter; RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an extracted datamine into Data files (stage 1).
    ConvertDatamine {
        #[arg(long, value_name = "DIR")]
        datamine: PathBuf,
        #[arg(long, value_name = "GLOB", default_value = "*")]
        vehicle: String,
        #[arg(long, value_name = "CSV")]
        lang: Option<PathBuf>,
        #[arg(long, value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "both")]
        emit: EmitMode,
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Rebuild every selected vehicle regardless of the cache.
        #[arg(long)]
        force: bool,
        /// Exit nonzero on actionable warnings; stop scheduling after the first failure.
        #[arg(long)]
        strict: bool,
        /// Report cache state per vehicle and exit without writing.
        #[arg(long)]
        status: bool,
        #[arg(long, value_name = "TOML")]
        config: Option<PathBuf>,
    },
    /// Compute ballistic tables from Data files (stage 2).
    MakeBallistic {
        #[arg(long, value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
        data: PathBuf,
        #[arg(long, value_name = "DIR", default_value = DEFAULT_BALLISTIC_DIR)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "both")]
        emit: EmitMode,
        #[arg(long, value_enum, default_value = "lenient")]
        tolerance: ToleranceMode,
        /// Reference tables laid out as <DIR>/<vehicle>/<projectile>.txt.
        #[arg(long, value_name = "DIR")]
        golden: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        threads: usize,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        status: bool,
        #[arg(long, value_name = "TOML")]
        config: Option<PathBuf>,
    },
    /// Print the latest run recorded in a run history.
    History {
        #[arg(long, value_name = "FILE")]
        db: PathBuf,
    },
    /// Compare the latest runs of two histories.
    Diff {
        #[arg(long)]
        a: PathBuf,
        #[arg(long)]
        b: PathBuf,
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, &cli.log_level);

    let code = match cli.command {
        Commands::ConvertDatamine {
            datamine,
            vehicle,
            lang,
            out,
            emit,
            threads,
            force,
            strict,
            status,
            config,
        } => Tuning::load(config.as_deref()).and_then(|tuning| {
            let mut cfg = ConvertConfig::new(datamine, out);
            cfg.selector = vehicle;
            cfg.lang_path = lang;
            cfg.emit = emit;
            cfg.threads = threads;
            cfg.force = force;
            cfg.strict = strict;
            cfg.tuning = tuning;
            if status {
                pipeline::convert_status(&cfg).map(|s| print_status(&s))
            } else {
                pipeline::run_convert(&cfg, &interrupt_token()).map(|r| print_report(&r))
            }
        }),
        Commands::MakeBallistic {
            data,
            out,
            emit,
            tolerance,
            golden,
            threads,
            force,
            strict,
            status,
            config,
        } => Tuning::load(config.as_deref()).and_then(|tuning| {
            let mut cfg = BallisticConfig::new(data, out);
            cfg.emit = emit;
            cfg.tolerance = tolerance;
            cfg.golden_dir = golden;
            cfg.threads = threads;
            cfg.force = force;
            cfg.strict = strict;
            cfg.physics = tuning.physics;
            if status {
                pipeline::ballistic_status(&cfg).map(|s| print_status(&s))
            } else {
                pipeline::run_ballistic(&cfg, &interrupt_token()).map(|r| print_report(&r))
            }
        }),
        Commands::History { db } => run_history(&db).map_err(history_error),
        Commands::Diff { a, b, out } => run_diff(&a, &b, out.as_deref()).map_err(history_error),
    }
    .unwrap_or_else(|e| {
        eprintln!("error [{}] {}: {}", e.kind(), e.subject(), e);
        e.kind().exit_code()
    });
    std::process::exit(code);
}

/// Run token cancelled by Ctrl-C: no new vehicle starts, in-flight ones
/// finish and the manifest and report are still written.
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::warn!("interrupted; finishing in-flight vehicles");
        handler.cancel();
    }) {
        tracing::warn!(error = %e, "interrupt handler not installed");
    }
    cancel
}

fn history_error(detail: String) -> Error {
    Error::io(
        "run history",
        std::io::Error::new(std::io::ErrorKind::Other, detail),
    )
}

fn print_status(statuses: &[VehicleStatus]) -> i32 {
    for s in statuses {
        println!("{}", s.line());
    }
    0
}

fn print_report(report: &RunReport) -> i32 {
    for line in report.summary_lines() {
        println!("{}", line);
    }
    report.exit_code
}

fn print_outcome(v: &VehicleOutcome) {
    let kind = v.error.as_ref().map(|e| e.kind.as_str()).unwrap_or("-");
    let digest = v.output_digest.get(..12).unwrap_or(&v.output_digest);
    println!(
        "  {}\t{}\t{}\t{}\twarnings={}",
        v.vehicle_id,
        v.state.label(),
        kind,
        if digest.is_empty() { "-" } else { digest },
        v.warnings.len()
    );
}

fn run_history(db: &Path) -> Result<i32, String> {
    let store = Store::open_existing(db)?;
    let runs = store.list_runs()?;
    let Some(run) = runs.first() else {
        return Err(format!("{} has no runs", db.display()));
    };
    println!(
        "Run {}: {} {} (version {}) at {} exit={}",
        run.id, run.command, run.input_root, run.datamine_version, run.started_at, run.exit_code
    );
    for v in store.get_run_vehicles(run.id)? {
        print_outcome(&v);
    }
    Ok(0)
}

fn latest_digests(db: &Path) -> Result<BTreeMap<String, String>, String> {
    let store = Store::open_existing(db)?;
    let runs = store.list_runs()?;
    let id = runs
        .first()
        .map(|r| r.id)
        .ok_or_else(|| format!("{} has no runs", db.display()))?;
    Ok(store
        .get_run_vehicles(id)?
        .into_iter()
        .map(|v| (v.vehicle_id, v.output_digest))
        .collect())
}

fn run_diff(a: &Path, b: &Path, out: Option<&Path>) -> Result<i32, String> {
    let runs_a = latest_digests(a)?;
    let runs_b = latest_digests(b)?;
    let ids_a: BTreeSet<&str> = runs_a.keys().map(String::as_str).collect();
    let ids_b: BTreeSet<&str> = runs_b.keys().map(String::as_str).collect();
    let added: Vec<&str> = ids_b.difference(&ids_a).copied().collect();
    let removed: Vec<&str> = ids_a.difference(&ids_b).copied().collect();
    let changed: Vec<&str> = ids_a
        .intersection(&ids_b)
        .copied()
        .filter(|id| runs_a[*id] != runs_b[*id])
        .collect();

    println!("Diff: {} vs {}", a.display(), b.display());
    println!("Vehicles added: {}", added.len());
    for id in &added {
        println!("  + {}", id);
    }
    println!("Vehicles removed: {}", removed.len());
    for id in &removed {
        println!("  - {}", id);
    }
    println!("Output changed: {}", changed.len());
    for id in &changed {
        println!("  ~ {}", id);
    }

    if let Some(dir) = out {
        fs::create_dir_all(dir).map_err(|e| e.to_string())?;
        let diff_json = serde_json::json!({
            "history_a": a.to_string_lossy(),
            "history_b": b.to_string_lossy(),
            "vehicles_added": added,
            "vehicles_removed": removed,
            "output_changed": changed,
        });
        let path = dir.join("diff.json");
        let text = serde_json::to_string_pretty(&diff_json).map_err(|e| e.to_string())?;
        fs::write(&path, text).map_err(|e| e.to_string())?;
        tracing::info!("wrote {}", path.display());
    }
    Ok(0)
}
