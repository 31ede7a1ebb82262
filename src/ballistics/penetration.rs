//! Penetration laws. All values in millimetres of rolled homogeneous armour
//! before the armour-quality and impact-angle modifiers.

use crate::config::PhysicsConstants;
use crate::model::{ArmorPowerSeries, DeMarreParams};

pub fn demarre(p: &DeMarreParams, velocity_mps: f64) -> f64 {
    if velocity_mps <= 0.0 {
        return 0.0;
    }
    p.coefficient
        * 100.0
        * (velocity_mps / p.reference_velocity_mps).powf(p.velocity_exponent)
        * p.penetrator_mass_kg.powf(p.mass_exponent)
        / (p.penetrator_caliber_mm / p.reference_caliber_mm).powf(p.caliber_exponent)
}

/// Linear interpolation between the breakpoints around `velocity_mps`;
/// outside the table the nearest endpoint is used.
pub fn interpolate_series(series: &ArmorPowerSeries, velocity_mps: f64) -> f64 {
    let pts = series.points();
    let (Some(&(v_lo, p_lo)), Some(&(v_hi, p_hi))) = (pts.first(), pts.last()) else {
        return 0.0;
    };
    if velocity_mps <= v_lo {
        return p_lo;
    }
    if velocity_mps >= v_hi {
        return p_hi;
    }
    for w in pts.windows(2) {
        let (v0, p0) = w[0];
        let (v1, p1) = w[1];
        if velocity_mps <= v1 {
            return p0 + (p1 - p0) * (velocity_mps - v0) / (v1 - v0);
        }
    }
    p_hi
}

/// Chemical penetration of an HE filler; zero below the caliber or filler gate.
pub fn he_penetration(tnt_kg: Option<f64>, caliber_mm: f64, physics: &PhysicsConstants) -> f64 {
    let tnt = tnt_kg.unwrap_or(0.0);
    if caliber_mm < physics.he_min_caliber_mm || tnt < physics.he_min_filler_kg {
        return 0.0;
    }
    physics.he_coefficient * tnt.powf(physics.he_exponent)
}

/// Share of kinetic penetration an APHE shell keeps for its filler cavity.
pub fn aphe_multiplier(tnt_kg: f64, shell_mass_kg: f64, physics: &PhysicsConstants) -> f64 {
    if shell_mass_kg <= 0.0 {
        return 1.0;
    }
    let percent = tnt_kg / shell_mass_kg * 100.0;
    physics
        .aphe_penalty_bands
        .iter()
        .find(|b| percent <= b.max_filler_percent)
        .map(|b| b.multiplier)
        .unwrap_or(physics.aphe_penalty_above)
}

/// Armour-quality divisor and impact-angle cosine, applied to every value.
pub fn apply_armor_modifiers(penetration_mm: f64, physics: &PhysicsConstants) -> f64 {
    let quality = if physics.armor_quality > 0.0 {
        physics.armor_quality
    } else {
        1.0
    };
    let angle = physics.impact_angle_deg.to_radians().cos().max(0.0);
    (penetration_mm / quality * angle).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DeMarreParams {
        DeMarreParams {
            coefficient: 1.0,
            velocity_exponent: 1.43,
            mass_exponent: 0.71,
            caliber_exponent: 1.07,
            reference_velocity_mps: 1900.0,
            reference_caliber_mm: 100.0,
            penetrator_mass_kg: 1.0,
            penetrator_caliber_mm: 100.0,
        }
    }

    #[test]
    fn demarre_reference_point() {
        assert!((demarre(&params(), 1900.0) - 100.0).abs() < 1e-9);
        assert_eq!(demarre(&params(), 0.0), 0.0);
    }

    #[test]
    fn demarre_grows_with_velocity() {
        let p = params();
        assert!(demarre(&p, 1000.0) < demarre(&p, 1200.0));
    }

    #[test]
    fn series_clamps_at_both_ends() {
        let s = ArmorPowerSeries::new(vec![(500.0, 300.0), (1500.0, 500.0)]).unwrap();
        assert_eq!(interpolate_series(&s, 2000.0), 500.0);
        assert_eq!(interpolate_series(&s, 100.0), 300.0);
        assert!((interpolate_series(&s, 1000.0) - 400.0).abs() < 1e-9);
    }

    #[test]
    fn he_gates() {
        let p = PhysicsConstants::default();
        assert_eq!(he_penetration(Some(1.0), 15.0, &p), 0.0);
        assert_eq!(he_penetration(Some(0.005), 75.0, &p), 0.0);
        assert_eq!(he_penetration(None, 75.0, &p), 0.0);
        assert!((he_penetration(Some(1.0), 75.0, &p) - 14.0).abs() < 1e-9);
    }

    #[test]
    fn aphe_bands() {
        let p = PhysicsConstants::default();
        assert_eq!(aphe_multiplier(0.03, 10.0, &p), 1.0);
        assert_eq!(aphe_multiplier(0.1, 10.0, &p), 0.93);
        assert_eq!(aphe_multiplier(0.25, 10.0, &p), 0.85);
        assert_eq!(aphe_multiplier(0.5, 10.0, &p), 0.7);
    }

    #[test]
    fn armor_modifiers() {
        let mut p = PhysicsConstants::default();
        assert_eq!(apply_armor_modifiers(100.0, &p), 100.0);
        p.armor_quality = 2.0;
        p.impact_angle_deg = 60.0;
        assert!((apply_armor_modifiers(100.0, &p) - 25.0).abs() < 1e-9);
    }
}
