//! SQLite run history: one row per run, one row per vehicle outcome.

use crate::report::{RunReport, VehicleOutcome};
use rusqlite::{params, Connection};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    command TEXT NOT NULL,
    input_root TEXT NOT NULL,
    datamine_version TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    exit_code INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS run_vehicles (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    vehicle_id TEXT NOT NULL,
    state TEXT NOT NULL,
    error_kind TEXT,
    output_digest TEXT NOT NULL,
    outcome_json TEXT NOT NULL,
    PRIMARY KEY (run_id, vehicle_id)
);

CREATE INDEX IF NOT EXISTS idx_run_vehicles_run ON run_vehicles(run_id);
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub command: String,
    pub input_root: String,
    pub datamine_version: String,
    pub started_at: String,
    pub exit_code: i32,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;
        Ok(Store { conn })
    }

    /// Open an existing history without creating one.
    pub fn open_existing(path: &Path) -> Result<Self, String> {
        if !path.is_file() {
            return Err(format!("no run history at {}", path.display()));
        }
        Self::open(path)
    }

    pub fn insert_run(&mut self, report: &RunReport) -> Result<i64, String> {
        let tx = self.conn.transaction().map_err(|e| e.to_string())?;
        tx.execute(
            "INSERT INTO runs (command, input_root, datamine_version, started_at, finished_at, exit_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                report.command,
                report.input_root,
                report.datamine_version,
                report.started_at,
                report.finished_at,
                report.exit_code
            ],
        )
        .map_err(|e| e.to_string())?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO run_vehicles (run_id, vehicle_id, state, error_kind, output_digest, outcome_json)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| e.to_string())?;
            for v in &report.vehicles {
                let json = serde_json::to_string(v).map_err(|e| e.to_string())?;
                let kind = v.error.as_ref().map(|e| e.kind.as_str());
                stmt.execute(params![id, v.vehicle_id, v.state.label(), kind, v.output_digest, json])
                    .map_err(|e| e.to_string())?;
            }
        }
        tx.commit().map_err(|e| e.to_string())?;
        Ok(id)
    }

    /// Newest first.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, command, input_root, datamine_version, started_at, exit_code
                 FROM runs ORDER BY id DESC",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |r| {
                Ok(RunRecord {
                    id: r.get(0)?,
                    command: r.get(1)?,
                    input_root: r.get(2)?,
                    datamine_version: r.get(3)?,
                    started_at: r.get(4)?,
                    exit_code: r.get(5)?,
                })
            })
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| e.to_string())?);
        }
        Ok(out)
    }

    pub fn get_run_vehicles(&self, run_id: i64) -> Result<Vec<VehicleOutcome>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT outcome_json FROM run_vehicles WHERE run_id = ?1 ORDER BY vehicle_id")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![run_id], |r| r.get::<_, String>(0))
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        for row in rows {
            let json: String = row.map_err(|e| e.to_string())?;
            let v: VehicleOutcome = serde_json::from_str(&json).map_err(|e| e.to_string())?;
            out.push(v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::OutcomeState;

    #[test]
    fn latest_run_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("runs.sqlite")).unwrap();
        let mut report = RunReport::new("make-ballistic", Path::new("Data"), Path::new("Ballistic"));
        let mut v = VehicleOutcome::new("b_tank", OutcomeState::Built);
        v.output_digest = "abc".to_string();
        report.vehicles.push(v);
        report.vehicles.push(VehicleOutcome::new("a_tank", OutcomeState::Cached));
        let first = store.insert_run(&report).unwrap();
        report.exit_code = 13;
        let second = store.insert_run(&report).unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[0].exit_code, 13);
        assert_eq!(runs[1].id, first);

        let vehicles = store.get_run_vehicles(second).unwrap();
        assert_eq!(vehicles[0].vehicle_id, "a_tank");
        assert_eq!(vehicles[1].output_digest, "abc");
    }

    #[test]
    fn open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Store::open_existing(&dir.path().join("none.sqlite")).is_err());
    }
}
