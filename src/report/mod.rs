//! Run report: per-vehicle outcomes, warnings and the run's exit code.

use crate::error::{Error, ErrorKind, Result, EXIT_STRICT_WARNINGS};
use crate::util::write_atomic;
use crate::warning::Warning;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeState {
    /// Recomputed and emitted in this run.
    Built,
    /// Fresh in the manifest; outputs left untouched.
    Cached,
    Failed,
    /// Never started because the run was cancelled.
    Cancelled,
}

impl OutcomeState {
    pub fn label(self) -> &'static str {
        match self {
            OutcomeState::Built => "built",
            OutcomeState::Cached => "cached",
            OutcomeState::Failed => "failed",
            OutcomeState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    /// Offending file, field or identifier.
    pub subject: String,
    pub message: String,
}

impl From<&Error> for FailureRecord {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind(),
            subject: e.subject(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleOutcome {
    pub vehicle_id: String,
    pub state: OutcomeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureRecord>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    /// Output files relative to the output directory.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub output_digest: String,
    #[serde(default)]
    pub projectiles: usize,
    /// Projectiles whose table could not be computed.
    #[serde(default)]
    pub table_errors: Vec<FailureRecord>,
}

impl VehicleOutcome {
    pub fn new(vehicle_id: &str, state: OutcomeState) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            state,
            error: None,
            warnings: Vec::new(),
            outputs: Vec::new(),
            output_digest: String::new(),
            projectiles: 0,
            table_errors: Vec::new(),
        }
    }

    pub fn failed(vehicle_id: &str, error: &Error) -> Self {
        let mut o = Self::new(vehicle_id, OutcomeState::Failed);
        o.error = Some(FailureRecord::from(error));
        o
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub command: String,
    pub input_root: String,
    pub out_dir: String,
    pub datamine_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub vehicles: Vec<VehicleOutcome>,
    /// Findings not tied to one vehicle (cache, history).
    pub warnings: Vec<Warning>,
    /// Failures outside any vehicle (manifest write).
    pub run_errors: Vec<FailureRecord>,
    pub exit_code: i32,
}

impl RunReport {
    pub fn new(command: &str, input_root: &Path, out_dir: &Path) -> Self {
        Self {
            command: command.to_string(),
            input_root: input_root.display().to_string(),
            out_dir: out_dir.display().to_string(),
            datamine_version: String::new(),
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: String::new(),
            vehicles: Vec::new(),
            warnings: Vec::new(),
            run_errors: Vec::new(),
            exit_code: 0,
        }
    }

    fn all_warnings(&self) -> impl Iterator<Item = &Warning> {
        self.warnings
            .iter()
            .chain(self.vehicles.iter().flat_map(|v| v.warnings.iter()))
    }

    /// Most severe error kind seen; table errors count only in strict mode.
    pub fn worst_error(&self, strict: bool) -> Option<ErrorKind> {
        let vehicle_errors = self.vehicles.iter().filter_map(|v| v.error.as_ref());
        let table_errors = self
            .vehicles
            .iter()
            .flat_map(|v| v.table_errors.iter())
            .filter(|_| strict);
        vehicle_errors
            .chain(table_errors)
            .chain(self.run_errors.iter())
            .map(|f| f.kind)
            .max_by_key(|k| k.severity())
    }

    /// 0 on success, the worst error kind's code on failure, and
    /// [`EXIT_STRICT_WARNINGS`] for a strict run with actionable warnings.
    pub fn compute_exit_code(&self, strict: bool) -> i32 {
        if let Some(kind) = self.worst_error(strict) {
            return kind.exit_code();
        }
        if strict && self.all_warnings().any(Warning::is_actionable) {
            return EXIT_STRICT_WARNINGS;
        }
        0
    }

    pub fn finish(&mut self, strict: bool) {
        self.finished_at = chrono::Utc::now().to_rfc3339();
        self.exit_code = self.compute_exit_code(strict);
    }

    pub fn count(&self, state: OutcomeState) -> usize {
        self.vehicles.iter().filter(|v| v.state == state).count()
    }

    /// Human-readable summary for stdout.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{}: {} vehicle(s): {} built, {} cached, {} failed, {} cancelled",
            self.command,
            self.vehicles.len(),
            self.count(OutcomeState::Built),
            self.count(OutcomeState::Cached),
            self.count(OutcomeState::Failed),
            self.count(OutcomeState::Cancelled)
        )];
        for v in &self.vehicles {
            if let Some(e) = &v.error {
                lines.push(format!("  FAILED {} [{}] {}: {}", v.vehicle_id, e.kind, e.subject, e.message));
            }
            for t in &v.table_errors {
                lines.push(format!("  table {} {} [{}]: {}", v.vehicle_id, t.subject, t.kind, t.message));
            }
        }
        for w in self.all_warnings() {
            lines.push(format!("  [{}] {} {}", w.code, w.severity.label(), w.summary));
        }
        for e in &self.run_errors {
            lines.push(format!("  RUN [{}] {}: {}", e.kind, e.subject, e.message));
        }
        lines
    }
}

pub fn write_json_report(report: &RunReport, path: &Path) -> Result<()> {
    let mut json = serde_json::to_string_pretty(report)
        .map_err(|e| Error::emit(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    json.push('\n');
    write_atomic(path, json.as_bytes()).map_err(|e| Error::emit(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report() -> RunReport {
        RunReport::new("convert-datamine", Path::new("dm"), Path::new("Data"))
    }

    #[test]
    fn clean_run_exits_zero() {
        let mut r = report();
        r.vehicles.push(VehicleOutcome::new("a", OutcomeState::Built));
        r.finish(true);
        assert_eq!(r.exit_code, 0);
    }

    #[test]
    fn most_severe_kind_wins() {
        let mut r = report();
        r.vehicles.push(VehicleOutcome::failed(
            "a",
            &Error::MissingReference {
                id: "w.blk".to_string(),
                file: PathBuf::from("a.blkx"),
            },
        ));
        r.vehicles.push(VehicleOutcome::failed(
            "b",
            &Error::Parse {
                file: PathBuf::from("b.blkx"),
                source: crate::parser::ParseError::UnexpectedEof,
            },
        ));
        assert_eq!(r.compute_exit_code(false), ErrorKind::Parse.exit_code());
    }

    #[test]
    fn strict_counts_warnings_and_table_errors() {
        let mut r = report();
        let mut v = VehicleOutcome::new("a", OutcomeState::Built);
        v.warnings.push(Warning::ambiguous_decorative("a", "fake_gun.blk", "fake"));
        r.vehicles.push(v.clone());
        assert_eq!(r.compute_exit_code(false), 0);
        assert_eq!(r.compute_exit_code(true), EXIT_STRICT_WARNINGS);

        v.table_errors.push(FailureRecord::from(&Error::computation("p", "no law")));
        r.vehicles[0] = v;
        assert_eq!(r.compute_exit_code(false), 0);
        assert_eq!(r.compute_exit_code(true), ErrorKind::Computation.exit_code());
    }

    #[test]
    fn summary_names_failed_vehicle() {
        let mut r = report();
        r.vehicles.push(VehicleOutcome::failed(
            "broken",
            &Error::schema("broken.blkx", "commonWeapons.Weapon", "no weapon entries"),
        ));
        let lines = r.summary_lines();
        assert!(lines[1].contains("broken"));
        assert!(lines[1].contains("SchemaError"));
        assert!(lines[1].contains("commonWeapons.Weapon"));
    }
}
