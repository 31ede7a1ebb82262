//! Comparison of produced tables against a reference corpus
//! (`<golden>/<vehicle>/<projectile>.txt`).

use crate::ballistics::ProjectileTable;
use crate::config::ToleranceMode;
use crate::emit::parse_table;
use crate::model::BallisticRow;
use crate::util::file_safe_name;
use crate::warning::Warning;
use std::fs;
use std::path::Path;

const RELATIVE_TOLERANCE: f64 = 0.01;
const ABSOLUTE_FLOOR: f64 = 0.05;

fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

fn within(produced: f64, reference: f64) -> bool {
    (produced - reference).abs() <= (RELATIVE_TOLERANCE * reference.abs()).max(ABSOLUTE_FLOOR)
}

/// Values are compared at the precision the table files carry.
fn row_matches(p: &BallisticRow, g: &BallisticRow, mode: ToleranceMode) -> bool {
    let time = round_to(p.time_s, 3);
    let pen = round_to(p.penetration_mm, 1);
    match mode {
        ToleranceMode::Strict => {
            p.distance_m == g.distance_m
                && (time - round_to(g.time_s, 3)).abs() < 1e-9
                && pen.round() == g.penetration_mm.round()
        }
        ToleranceMode::Lenient => {
            within(p.distance_m, g.distance_m)
                && within(time, g.time_s)
                && within(pen, g.penetration_mm)
        }
    }
}

/// Description of the first differing row, or `None` when the tables agree.
pub fn compare_rows(
    produced: &[BallisticRow],
    golden: &[BallisticRow],
    mode: ToleranceMode,
) -> Option<String> {
    if let Some((i, (p, g))) = produced
        .iter()
        .zip(golden)
        .enumerate()
        .find(|(_, (p, g))| !row_matches(p, g, mode))
    {
        return Some(format!(
            "row {}: produced ({}, {:.3}, {:.1}) vs reference ({}, {:.3}, {:.1})",
            i + 1,
            p.distance_m,
            p.time_s,
            p.penetration_mm,
            g.distance_m,
            g.time_s,
            g.penetration_mm
        ));
    }
    if produced.len() != golden.len() {
        return Some(format!(
            "row count: produced {} vs reference {}",
            produced.len(),
            golden.len()
        ));
    }
    None
}

/// Warnings for every table of one vehicle that is missing from or differs
/// from the reference corpus.
pub fn check_vehicle(
    golden_dir: &Path,
    vehicle_id: &str,
    tables: &[ProjectileTable],
    mode: ToleranceMode,
) -> Vec<Warning> {
    let dir = golden_dir.join(file_safe_name(vehicle_id));
    let mut warnings = Vec::new();
    for t in tables.iter().filter(|t| t.error.is_none()) {
        let path = dir.join(format!("{}.txt", file_safe_name(&t.projectile_id)));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                warnings.push(Warning::golden_missing(vehicle_id, &t.projectile_id));
                continue;
            }
        };
        let detail = match parse_table(&text) {
            Ok(golden) => compare_rows(&t.rows, &golden, mode),
            Err(e) => Some(format!("reference unreadable: {}", e)),
        };
        if let Some(detail) = detail {
            tracing::warn!(vehicle = %vehicle_id, projectile = %t.projectile_id, %detail, "golden mismatch");
            warnings.push(Warning::golden_mismatch(vehicle_id, &t.projectile_id, detail));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(d: f64, t: f64, p: f64) -> BallisticRow {
        BallisticRow {
            distance_m: d,
            time_s: t,
            penetration_mm: p,
        }
    }

    #[test]
    fn lenient_accepts_within_one_percent() {
        let produced = vec![row(0.0, 0.0, 100.0), row(100.0, 0.128, 99.5)];
        let golden = vec![row(0.0, 0.0, 100.9), row(100.0, 0.128, 98.6)];
        assert_eq!(compare_rows(&produced, &golden, ToleranceMode::Lenient), None);
        let off = vec![row(0.0, 0.0, 102.0), row(100.0, 0.128, 99.5)];
        let detail = compare_rows(&produced, &off, ToleranceMode::Lenient).unwrap();
        assert!(detail.starts_with("row 1"));
    }

    #[test]
    fn strict_compares_whole_millimetres() {
        let produced = vec![row(0.0, 0.0, 100.04)];
        assert_eq!(
            compare_rows(&produced, &[row(0.0, 0.0, 100.0)], ToleranceMode::Strict),
            None
        );
        assert!(compare_rows(&produced, &[row(0.0, 0.0, 101.0)], ToleranceMode::Strict).is_some());
    }

    #[test]
    fn row_count_difference_is_a_mismatch() {
        let produced = vec![row(0.0, 0.0, 100.0)];
        let golden = vec![row(0.0, 0.0, 100.0), row(50.0, 0.06, 99.0)];
        let detail = compare_rows(&produced, &golden, ToleranceMode::Lenient).unwrap();
        assert!(detail.contains("row count"));
    }

    #[test]
    fn missing_reference_is_info() {
        let dir = tempfile::tempdir().unwrap();
        let table = ProjectileTable {
            projectile_id: "p".to_string(),
            display_name: "P".to_string(),
            kind: "AP".to_string(),
            double_shell: false,
            rows: vec![row(0.0, 0.0, 1.0)],
            error: None,
        };
        let w = check_vehicle(dir.path(), "v", &[table], ToleranceMode::Strict);
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].code, "GOLDEN_MISSING");
        assert!(!w[0].is_actionable());
    }
}
