//! Ballistic engine: distance / time / penetration tables per projectile.

mod drag;
mod penetration;

pub use drag::{drag_factor, FlightModel, FlightState, QuadraticDrag, RocketBoost};
pub use penetration::{
    aphe_multiplier, apply_armor_modifiers, demarre, he_penetration, interpolate_series,
};

use crate::config::PhysicsConstants;
use crate::error::{Error, ErrorKind, Result};
use crate::model::{BallisticRow, ProjectileEntry, ProjectileKind, VehicleData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A computed table, or the reason it could not be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileTable {
    pub projectile_id: String,
    pub display_name: String,
    pub kind: String,
    pub double_shell: bool,
    pub rows: Vec<BallisticRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TableError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableError {
    pub kind: ErrorKind,
    pub detail: String,
}

/// Sample distances: dense to the near limit, coarse beyond, never past `max_range_m`.
pub fn sample_distances(max_range_m: f64, physics: &PhysicsConstants) -> Vec<f64> {
    if !max_range_m.is_finite() || physics.validate().is_err() {
        return Vec::new();
    }
    let near_step = physics.near_step_m.max(1.0);
    let far_step = physics.far_step_m.max(1.0);
    let near_limit = physics.near_limit_m.max(0.0).min(max_range_m);
    let mut out = Vec::new();
    let mut i = 0u32;
    loop {
        let d = f64::from(i) * near_step;
        if d > near_limit + 1e-9 {
            break;
        }
        out.push(d);
        i += 1;
    }
    let start = out.last().copied().unwrap_or(0.0);
    let mut j = 1u32;
    loop {
        let d = start + f64::from(j) * far_step;
        if d > max_range_m + 1e-9 {
            break;
        }
        out.push(d);
        j += 1;
    }
    out
}

pub fn max_range(entry: &ProjectileEntry, physics: &PhysicsConstants) -> f64 {
    match &entry.kind {
        ProjectileKind::Rocket(r) => r
            .max_distance_m
            .map_or(physics.max_range_m, |m| m.min(physics.max_range_m)),
        ProjectileKind::He => physics.short_range_m,
        _ if entry.velocity_mps < physics.low_velocity_mps => physics.short_range_m,
        _ => physics.max_range_m,
    }
}

pub fn flight_model(entry: &ProjectileEntry, physics: &PhysicsConstants) -> Result<Box<dyn FlightModel>> {
    if !(entry.mass_kg > 0.0) {
        return Err(Error::computation(&entry.id, "mass must be positive"));
    }
    if !(entry.caliber_mm > 0.0) {
        return Err(Error::computation(&entry.id, "caliber must be positive"));
    }
    let k = drag_factor(physics.air_density, entry.drag_cx, entry.caliber_mm, entry.mass_kg);
    let model: Box<dyn FlightModel> = match &entry.kind {
        ProjectileKind::Rocket(r) => Box::new(
            RocketBoost::new(entry.velocity_mps, r.end_speed_mps, r.burn_time_s, k)
                .map_err(|e| Error::computation(&entry.id, e))?,
        ),
        _ => Box::new(
            QuadraticDrag::new(entry.velocity_mps, k).map_err(|e| Error::computation(&entry.id, e))?,
        ),
    };
    Ok(model)
}

/// Penetration as a function of impact velocity, before armour modifiers.
fn penetration_law<'a>(
    entry: &'a ProjectileEntry,
    physics: &'a PhysicsConstants,
) -> Result<Box<dyn Fn(f64) -> f64 + 'a>> {
    Ok(match &entry.kind {
        ProjectileKind::Ap { demarre: d } | ProjectileKind::Apcr { demarre: d } => {
            Box::new(move |v| demarre(d, v))
        }
        ProjectileKind::Aphe { demarre: d } => {
            let mult = aphe_multiplier(entry.he_filler_kg.unwrap_or(0.0), entry.mass_kg, physics);
            Box::new(move |v| demarre(d, v) * mult)
        }
        ProjectileKind::Apds { armor_power } | ProjectileKind::Apfsds { armor_power } => {
            Box::new(move |v| interpolate_series(armor_power, v))
        }
        ProjectileKind::He => {
            let pen = he_penetration(entry.he_filler_kg, entry.caliber_mm, physics);
            Box::new(move |_| pen)
        }
        ProjectileKind::Heat { armor_power_mm } => {
            let pen = *armor_power_mm;
            Box::new(move |_| pen)
        }
        ProjectileKind::Rocket(r) => {
            let pen = r
                .armor_power_mm
                .unwrap_or_else(|| he_penetration(entry.he_filler_kg, entry.caliber_mm, physics));
            Box::new(move |_| pen)
        }
        ProjectileKind::Unresolved => {
            return Err(Error::computation(
                &entry.id,
                format!("no penetration law for bulletType '{}'", entry.source_type),
            ))
        }
    })
}

/// One table per projectile; pure, no shared state between calls.
pub fn compute(entry: &ProjectileEntry, physics: &PhysicsConstants) -> Result<Vec<BallisticRow>> {
    let law = penetration_law(entry, physics)?;
    let model = flight_model(entry, physics)?;
    let rows: Vec<BallisticRow> = sample_distances(max_range(entry, physics), physics)
        .into_iter()
        .map(|d| {
            let state = model.at(d);
            BallisticRow {
                distance_m: d,
                time_s: state.time_s,
                penetration_mm: apply_armor_modifiers(law(state.velocity_mps), physics),
            }
        })
        .collect();
    if rows.is_empty() {
        return Err(Error::computation(&entry.id, "empty sampling range"));
    }
    if let Some(bad) = rows
        .iter()
        .find(|r| !r.time_s.is_finite() || !r.penetration_mm.is_finite())
    {
        return Err(Error::computation(
            &entry.id,
            format!("non-finite value at {} m", bad.distance_m),
        ));
    }
    Ok(rows)
}

/// Tables for every projectile of a vehicle, in projectile order. Projectiles
/// are computed in parallel; a failure only affects its own table.
pub fn compute_vehicle(vehicle: &VehicleData, physics: &PhysicsConstants) -> Vec<ProjectileTable> {
    vehicle
        .projectiles
        .par_iter()
        .map(|p| {
            let (rows, error) = match compute(p, physics) {
                Ok(rows) => (rows, None),
                Err(e) => {
                    tracing::warn!(vehicle = %vehicle.id, projectile = %p.id, error = %e, "table failed");
                    (
                        Vec::new(),
                        Some(TableError {
                            kind: e.kind(),
                            detail: e.to_string(),
                        }),
                    )
                }
            };
            ProjectileTable {
                projectile_id: p.id.clone(),
                display_name: p.display_name.clone(),
                kind: p.kind.label().to_string(),
                double_shell: p.double_shell,
                rows,
                error,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArmorPowerSeries, DeMarreParams, RocketParams};

    fn entry(kind: ProjectileKind) -> ProjectileEntry {
        ProjectileEntry {
            id: "p".to_string(),
            display_name: "P".to_string(),
            weapon_slot: 0,
            weapon_blk: String::new(),
            source_type: "ap_tank".to_string(),
            kind,
            velocity_mps: 792.0,
            caliber_mm: 76.2,
            mass_kg: 6.3,
            drag_cx: 0.3,
            he_filler_kg: None,
            double_shell: false,
        }
    }

    fn demarre_params() -> DeMarreParams {
        DeMarreParams {
            coefficient: 1.0,
            velocity_exponent: 1.43,
            mass_exponent: 0.71,
            caliber_exponent: 1.07,
            reference_velocity_mps: 1900.0,
            reference_caliber_mm: 100.0,
            penetrator_mass_kg: 6.3,
            penetrator_caliber_mm: 76.2,
        }
    }

    #[test]
    fn sampling_grid() {
        let p = PhysicsConstants::default();
        let d = sample_distances(4000.0, &p);
        assert_eq!(d.first(), Some(&0.0));
        assert_eq!(d[1], 50.0);
        assert_eq!(d[20], 1000.0);
        assert_eq!(d[21], 1100.0);
        assert_eq!(d.last(), Some(&4000.0));
        assert_eq!(d.len(), 21 + 30);
        let short = sample_distances(700.0, &p);
        assert_eq!(short.last(), Some(&700.0));
    }

    #[test]
    fn unbounded_range_yields_computation_error() {
        let mut p = PhysicsConstants::default();
        p.max_range_m = f64::INFINITY;
        assert!(sample_distances(p.max_range_m, &p).is_empty());
        let err = compute(
            &entry(ProjectileKind::Ap {
                demarre: demarre_params(),
            }),
            &p,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Computation);
    }

    #[test]
    fn kinetic_table_is_monotonic_and_decreasing_in_penetration() {
        let rows = compute(
            &entry(ProjectileKind::Ap {
                demarre: demarre_params(),
            }),
            &PhysicsConstants::default(),
        )
        .unwrap();
        assert!(rows.windows(2).all(|w| w[0].distance_m < w[1].distance_m));
        assert!(rows.windows(2).all(|w| w[0].time_s <= w[1].time_s));
        assert!(rows.windows(2).all(|w| w[0].penetration_mm >= w[1].penetration_mm));
        assert!(rows.iter().all(|r| r.penetration_mm >= 0.0 && r.time_s >= 0.0));
        assert_eq!(rows[0].time_s, 0.0);
    }

    #[test]
    fn he_table_is_constant_and_short() {
        let mut e = entry(ProjectileKind::He);
        e.he_filler_kg = Some(0.6);
        let rows = compute(&e, &PhysicsConstants::default()).unwrap();
        let first = rows[0].penetration_mm;
        assert!(first > 0.0);
        assert!(rows.iter().all(|r| r.penetration_mm == first));
        assert_eq!(rows.last().unwrap().distance_m, 2000.0);
    }

    #[test]
    fn series_never_extrapolates() {
        let series = ArmorPowerSeries::new(vec![(100.0, 200.0), (500.0, 300.0)]).unwrap();
        let e = entry(ProjectileKind::Apfsds {
            armor_power: series,
        });
        let rows = compute(&e, &PhysicsConstants::default()).unwrap();
        // 792 m/s is above the top breakpoint, so near rows clamp to it.
        assert_eq!(rows[0].penetration_mm, 300.0);
        assert!(rows.iter().all(|r| (200.0..=300.0).contains(&r.penetration_mm)));
    }

    #[test]
    fn low_velocity_uses_short_range() {
        let mut e = entry(ProjectileKind::Ap {
            demarre: demarre_params(),
        });
        e.velocity_mps = 350.0;
        assert_eq!(max_range(&e, &PhysicsConstants::default()), 2000.0);
    }

    #[test]
    fn rocket_range_and_constant_penetration() {
        let mut e = entry(ProjectileKind::Rocket(RocketParams {
            end_speed_mps: 330.0,
            burn_time_s: 1.0,
            max_distance_m: Some(3750.0),
            armor_power_mm: Some(600.0),
        }));
        e.velocity_mps = 60.0;
        e.caliber_mm = 152.0;
        e.mass_kg = 25.0;
        let rows = compute(&e, &PhysicsConstants::default()).unwrap();
        assert_eq!(rows.last().unwrap().distance_m, 3700.0);
        assert!(rows.iter().all(|r| r.penetration_mm == 600.0));
        assert!(rows.windows(2).all(|w| w[0].time_s < w[1].time_s));
    }

    #[test]
    fn ap_rows_follow_closed_form() {
        // 76 mm BR-350B: 6.3 kg, Cx 0.32, 662 m/s, demarreK 0.9, speedK 0.9.
        // Expected values worked by hand from v0·e^(-kd) and the DeMarre law.
        let physics = PhysicsConstants::default();
        let mut e = entry(ProjectileKind::Ap {
            demarre: DeMarreParams {
                coefficient: 0.9,
                reference_velocity_mps: 1900.0 * 0.9,
                ..demarre_params()
            },
        });
        e.velocity_mps = 662.0;
        e.drag_cx = 0.32;
        let rows = compute(&e, &physics).unwrap();
        let at = |d: f64| rows.iter().find(|r| r.distance_m == d).unwrap();
        for (d, t, pen) in [
            (0.0, 0.0, 114.478_773),
            (1000.0, 1.622_985, 93.457_216),
            (4000.0, 8.132_953, 50.848_302),
        ] {
            let row = at(d);
            assert!((row.time_s - t).abs() < 1e-5, "{} m: t = {}", d, row.time_s);
            assert!((row.penetration_mm - pen).abs() < 1e-4, "{} m: pen = {}", d, row.penetration_mm);
        }
    }

    #[test]
    fn unresolved_is_computation_error() {
        let err = compute(&entry(ProjectileKind::Unresolved), &PhysicsConstants::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert_eq!(err.subject(), "p");
    }

    #[test]
    fn double_shell_tables_are_independent() {
        let mut a = entry(ProjectileKind::Ap {
            demarre: demarre_params(),
        });
        a.double_shell = true;
        let mut b = a.clone();
        b.id = "p_2".to_string();
        b.kind = ProjectileKind::He;
        b.he_filler_kg = Some(0.5);
        let vehicle = VehicleData {
            id: "v".to_string(),
            name: "V".to_string(),
            zoom_levels: vec![],
            has_laser: false,
            projectiles: vec![a, b],
        };
        let tables = compute_vehicle(&vehicle, &PhysicsConstants::default());
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].projectile_id, "p");
        assert_eq!(tables[1].projectile_id, "p_2");
        assert_ne!(tables[0].rows.len(), tables[1].rows.len());
        assert_eq!(tables[0].display_name, tables[1].display_name);
    }
}
