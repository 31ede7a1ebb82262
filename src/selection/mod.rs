//! Armament selection: which weapon entries are real, how ammo blocks expand
//! into projectiles, and which penetration law each projectile gets.
//!
//! Rules apply in order: decorative exclusion, duplicate collapse,
//! double-shell detection, then ordering by slot and declaration.

use crate::config::{PhysicsConstants, SelectionRules};
use crate::model::{
    AmmoBlock, ArmorPowerSeries, DeMarreParams, ProjectileKind, RawShell, RawVehicle, RawWeapon,
    RocketParams,
};
use crate::warning::Warning;

/// One projectile that survived selection, still borrowing the raw records.
#[derive(Debug, Clone)]
pub struct SelectedRound<'a> {
    pub weapon: &'a RawWeapon,
    pub slot: u32,
    pub ammo: &'a AmmoBlock,
    pub shell: &'a RawShell,
    pub kind: ProjectileKind,
    pub double_shell: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    pub rounds: Vec<SelectedRound<'a>>,
    pub warnings: Vec<Warning>,
}

/// Whether a weapon entry can contribute projectiles at all. Only candidates
/// have their weapon file resolved.
pub fn is_candidate(weapon: &RawWeapon, rules: &SelectionRules) -> bool {
    if weapon.dummy {
        return false;
    }
    let group = weapon.trigger_group.as_deref().unwrap_or("").to_lowercase();
    !rules
        .excluded_trigger_groups
        .iter()
        .any(|g| g.eq_ignore_ascii_case(&group))
}

/// Entries collapse only when they share the weapon file, trigger, loadout
/// and explicit slot.
fn collapse_key(w: &RawWeapon) -> (String, String, Option<u32>, Option<u32>) {
    (
        w.blk.to_lowercase(),
        w.trigger.clone().unwrap_or_default().to_lowercase(),
        w.bullets,
        w.slot,
    )
}

pub fn select<'a>(
    vehicle: &'a RawVehicle,
    rules: &SelectionRules,
    physics: &PhysicsConstants,
) -> Selection<'a> {
    let mut warnings = Vec::new();

    let mut kept: Vec<&RawWeapon> = Vec::new();
    for w in vehicle.weapons.iter().filter(|w| is_candidate(w, rules)) {
        let lower = w.blk.to_lowercase();
        if let Some(marker) = rules
            .decorative_markers
            .iter()
            .find(|m| lower.contains(&m.to_lowercase()))
        {
            warnings.push(Warning::ambiguous_decorative(&vehicle.id, &w.blk, marker));
        }
        kept.push(w);
    }

    let mut unique: Vec<(&RawWeapon, usize)> = Vec::new();
    for w in kept {
        let key = collapse_key(w);
        match unique.iter_mut().find(|(u, _)| collapse_key(u) == key) {
            Some((_, count)) => *count += 1,
            None => unique.push((w, 1)),
        }
    }
    for (w, count) in &unique {
        if *count > 1 {
            warnings.push(Warning::duplicate_collapsed(&vehicle.id, &w.blk, *count));
        }
    }

    let mut rounds = Vec::new();
    for &(weapon, _) in &unique {
        let slot = weapon.slot.unwrap_or(weapon.index);
        for ammo in &weapon.ammo {
            for (shell, double_shell) in expand_ammo(&vehicle.id, ammo, rules, &mut warnings) {
                let kind = match classify(shell, physics) {
                    Ok(k) => k,
                    Err(reason) => {
                        let name = shell.bullet_name.as_deref().unwrap_or(&ammo.name);
                        warnings.push(Warning::unresolved_kind(&vehicle.id, name, reason));
                        ProjectileKind::Unresolved
                    }
                };
                rounds.push(SelectedRound {
                    weapon,
                    slot,
                    ammo,
                    shell,
                    kind,
                    double_shell,
                });
            }
        }
    }
    // Stable: equal slots keep declaration order.
    rounds.sort_by_key(|r| r.slot);
    Selection { rounds, warnings }
}

/// Rounds an ammo block contributes, each with its double-shell flag.
fn expand_ammo<'a>(
    vehicle_id: &str,
    ammo: &'a AmmoBlock,
    rules: &SelectionRules,
    warnings: &mut Vec<Warning>,
) -> Vec<(&'a RawShell, bool)> {
    let distinct = ammo.distinct_shells();
    let name = ammo.name.to_lowercase();
    let pattern = rules
        .double_shell_patterns
        .iter()
        .any(|p| name.contains(&p.to_lowercase()));
    match distinct.len() {
        0 => Vec::new(),
        1 => {
            if ammo.double_shell_flag {
                warnings.push(Warning::ambiguous_double_shell(
                    vehicle_id,
                    &ammo.name,
                    "doubleShell set but the block holds a single round".to_string(),
                ));
            }
            vec![(distinct[0], false)]
        }
        2 if ammo.double_shell_flag || pattern => {
            vec![(distinct[0], true), (distinct[1], true)]
        }
        2 => {
            warnings.push(Warning::ambiguous_double_shell(
                vehicle_id,
                &ammo.name,
                format!(
                    "two distinct rounds ({}, {}) with no doubleShell flag or name pattern",
                    distinct[0].bullet_name.as_deref().unwrap_or("?"),
                    distinct[1].bullet_name.as_deref().unwrap_or("?")
                ),
            ));
            vec![(distinct[0], false)]
        }
        n => {
            if ammo.double_shell_flag {
                warnings.push(Warning::ambiguous_double_shell(
                    vehicle_id,
                    &ammo.name,
                    format!("doubleShell set but the block holds {} distinct rounds", n),
                ));
            } else {
                warnings.push(Warning::belt_truncated(vehicle_id, &ammo.name, n));
            }
            vec![(distinct[0], false)]
        }
    }
}

/// Map a raw round to its penetration law. `Err` explains why none applies.
pub fn classify(shell: &RawShell, physics: &PhysicsConstants) -> Result<ProjectileKind, String> {
    let ty = shell.bullet_type.as_deref().unwrap_or("").trim().to_lowercase();

    if shell.is_rocket || ty.starts_with("atgm") || ty.contains("rocket") {
        return Ok(ProjectileKind::Rocket(RocketParams {
            end_speed_mps: shell.end_speed_mps.or(shell.speed_mps).unwrap_or(0.0),
            burn_time_s: shell.time_fire_s.unwrap_or(0.0).max(0.0),
            max_distance_m: shell.max_distance_m.filter(|d| *d > 0.0),
            armor_power_mm: shell.cumulative_armor_power.filter(|p| *p > 0.0),
        }));
    }
    if ty.starts_with("apfsds") || ty.starts_with("apds_fs") {
        return series(shell).map(|armor_power| ProjectileKind::Apfsds { armor_power });
    }
    if ty.starts_with("apds") {
        return series(shell).map(|armor_power| ProjectileKind::Apds { armor_power });
    }
    if ty.starts_with("apcr") || ty.starts_with("hvap") {
        let mass = shell.damage_mass_kg.or(shell.mass_kg);
        let caliber = shell.damage_caliber_m.or(shell.caliber_m);
        return demarre(shell, mass, caliber, physics).map(|demarre| ProjectileKind::Apcr { demarre });
    }
    if ty.starts_with("heat") {
        return shell
            .cumulative_armor_power
            .filter(|p| *p > 0.0)
            .map(|armor_power_mm| ProjectileKind::Heat { armor_power_mm })
            .ok_or_else(|| "HEAT round without cumulativeDamage.armorPower".to_string());
    }
    if ty.starts_with("he") {
        return Ok(ProjectileKind::He);
    }
    if ty.starts_with("ap") || ty.starts_with("sap") {
        let d = demarre(shell, shell.mass_kg, shell.caliber_m, physics)?;
        return Ok(if shell.tnt_filler_kg().is_some() {
            ProjectileKind::Aphe { demarre: d }
        } else {
            ProjectileKind::Ap { demarre: d }
        });
    }
    Err(format!("unknown bulletType '{}'", ty))
}

fn series(shell: &RawShell) -> Result<ArmorPowerSeries, String> {
    ArmorPowerSeries::new(shell.armor_power_series.clone())
        .map_err(|e| format!("{} (armorPowerSeries.ap)", e))
}

fn demarre(
    shell: &RawShell,
    mass_kg: Option<f64>,
    caliber_m: Option<f64>,
    physics: &PhysicsConstants,
) -> Result<DeMarreParams, String> {
    let mass = mass_kg.filter(|m| *m > 0.0).ok_or("missing mass")?;
    let caliber = caliber_m.filter(|c| *c > 0.0).ok_or("missing caliber")?;
    Ok(DeMarreParams {
        coefficient: shell.demarre_k.unwrap_or(1.0),
        velocity_exponent: physics.demarre_velocity_exponent,
        mass_exponent: physics.demarre_mass_exponent,
        caliber_exponent: physics.demarre_caliber_exponent,
        reference_velocity_mps: physics.demarre_reference_velocity_mps
            * shell.demarre_speed_k.unwrap_or(1.0),
        reference_caliber_mm: physics.demarre_reference_caliber_mm,
        penetrator_mass_kg: mass * shell.demarre_mass_k.unwrap_or(1.0),
        penetrator_caliber_mm: caliber * 1000.0 * shell.demarre_caliber_k.unwrap_or(1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(name: &str, ty: &str) -> RawShell {
        RawShell {
            bullet_name: Some(name.to_string()),
            bullet_type: Some(ty.to_string()),
            mass_kg: Some(6.8),
            caliber_m: Some(0.076),
            speed_mps: Some(792.0),
            ..Default::default()
        }
    }

    fn weapon(index: u32, blk: &str, ammo: Vec<AmmoBlock>) -> RawWeapon {
        RawWeapon {
            index,
            blk: blk.to_string(),
            trigger: Some("gunner0".to_string()),
            trigger_group: Some("primary".to_string()),
            dummy: false,
            slot: None,
            bullets: Some(60),
            ammo,
        }
    }

    fn block(name: &str, shells: Vec<RawShell>) -> AmmoBlock {
        AmmoBlock {
            name: name.to_string(),
            double_shell_flag: false,
            shells,
        }
    }

    fn vehicle(weapons: Vec<RawWeapon>) -> RawVehicle {
        RawVehicle {
            id: "test_tank".to_string(),
            weapons,
            ..Default::default()
        }
    }

    #[test]
    fn classification_table() {
        let p = PhysicsConstants::default();
        let label = |ty: &str| classify(&shell("x", ty), &p).map(|k| k.label());
        assert_eq!(label("ap_tank"), Ok("AP"));
        assert_eq!(label("apcr_tank"), Ok("APCR"));
        assert_eq!(label("he_frag_tank"), Ok("HE"));
        assert_eq!(label("hesh_tank"), Ok("HE"));
        assert_eq!(label("atgm_tank"), Ok("ROCKET"));
        assert!(label("smoke_tank").is_err());
        assert!(label("heat_tank").is_err());

        let mut aphe = shell("x", "aphe_tank");
        aphe.explosive_mass_kg = Some(0.06);
        assert_eq!(classify(&aphe, &p).unwrap().label(), "APHE");

        let mut dart = shell("x", "apds_fs_long_tank");
        dart.armor_power_series = vec![(1600.0, 500.0), (500.0, 420.0)];
        assert_eq!(classify(&dart, &p).unwrap().label(), "APFSDS");
    }

    #[test]
    fn apcr_uses_core() {
        let mut s = shell("x", "apcr_tank");
        s.damage_mass_kg = Some(1.0);
        s.damage_caliber_m = Some(0.04);
        let k = classify(&s, &PhysicsConstants::default()).unwrap();
        let d = k.demarre().unwrap();
        assert!((d.penetrator_mass_kg - 1.0).abs() < 1e-12);
        assert!((d.penetrator_caliber_mm - 40.0).abs() < 1e-9);
    }

    #[test]
    fn dummy_and_machineguns_are_not_candidates() {
        let rules = SelectionRules::default();
        let mut w = weapon(0, "gun.blk", vec![]);
        assert!(is_candidate(&w, &rules));
        w.trigger_group = Some("MachineGun".to_string());
        assert!(!is_candidate(&w, &rules));
        w.trigger_group = None;
        w.dummy = true;
        assert!(!is_candidate(&w, &rules));
    }

    #[test]
    fn duplicates_collapse_with_info() {
        let ammo = vec![block("ap", vec![shell("ap", "ap_tank")])];
        let v = vehicle(vec![
            weapon(0, "gun.blk", ammo.clone()),
            weapon(1, "gun.blk", ammo),
        ]);
        let s = select(&v, &SelectionRules::default(), &PhysicsConstants::default());
        assert_eq!(s.rounds.len(), 1);
        assert_eq!(s.warnings.len(), 1);
        assert_eq!(s.warnings[0].code, "DUPLICATE_WEAPON_COLLAPSED");
        assert!(!s.warnings[0].is_actionable());
    }

    #[test]
    fn same_gun_in_two_explicit_slots_is_kept_twice() {
        let ammo = vec![block("ap", vec![shell("ap", "ap_tank")])];
        let mut left = weapon(0, "gun.blk", ammo.clone());
        left.slot = Some(0);
        let mut right = weapon(1, "gun.blk", ammo);
        right.slot = Some(1);
        let v = vehicle(vec![left, right]);
        let s = select(&v, &SelectionRules::default(), &PhysicsConstants::default());
        let slots: Vec<u32> = s.rounds.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1]);
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn decorative_path_is_kept_and_warned() {
        let v = vehicle(vec![weapon(
            0,
            "dummy_gun.blk",
            vec![block("ap", vec![shell("ap", "ap_tank")])],
        )]);
        let s = select(&v, &SelectionRules::default(), &PhysicsConstants::default());
        assert_eq!(s.rounds.len(), 1);
        assert_eq!(s.warnings[0].code, "AMBIGUOUS_DECORATIVE");
    }

    #[test]
    fn double_shell_by_pattern() {
        let ammo = block("76mm_double", vec![shell("a", "ap_tank"), shell("b", "he_tank")]);
        let v = vehicle(vec![weapon(0, "gun.blk", vec![ammo])]);
        let s = select(&v, &SelectionRules::default(), &PhysicsConstants::default());
        assert_eq!(s.rounds.len(), 2);
        assert!(s.rounds.iter().all(|r| r.double_shell));
        assert!(s.warnings.is_empty());
    }

    #[test]
    fn two_rounds_without_marker_use_first_and_warn() {
        let ammo = block("mixed", vec![shell("a", "ap_tank"), shell("b", "he_tank")]);
        let v = vehicle(vec![weapon(0, "gun.blk", vec![ammo])]);
        let s = select(&v, &SelectionRules::default(), &PhysicsConstants::default());
        assert_eq!(s.rounds.len(), 1);
        assert_eq!(s.rounds[0].shell.bullet_name.as_deref(), Some("a"));
        assert_eq!(s.warnings[0].code, "AMBIGUOUS_DOUBLE_SHELL");
    }

    #[test]
    fn explicit_slots_order_before_declaration() {
        let mut first = weapon(0, "a.blk", vec![block("a", vec![shell("a", "ap_tank")])]);
        first.slot = Some(2);
        let mut second = weapon(1, "b.blk", vec![block("b", vec![shell("b", "ap_tank")])]);
        second.slot = Some(1);
        let v = vehicle(vec![first, second]);
        let s = select(&v, &SelectionRules::default(), &PhysicsConstants::default());
        let names: Vec<&str> = s.rounds.iter().map(|r| r.ammo.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
