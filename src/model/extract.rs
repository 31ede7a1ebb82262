//! Read vehicle files into raw records, then assemble `VehicleData` from the
//! selection decisions. No ballistic computation happens here.

use super::{ammo_blocks, AmmoBlock, ProjectileEntry, VehicleData};
use crate::cache::FileFingerprint;
use crate::config::{PhysicsConstants, Tuning};
use crate::datamine::{Datamine, LangTable, VehicleSource};
use crate::error::{Error, Result};
use crate::parser::{parse_source, BlkValue};
use crate::selection::{self, Selection};
use crate::util::{file_safe_name, normalize_id};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const LASER_MARKER: &str = "laser_rangefinder";

/// One `commonWeapons.Weapon` entry. `ammo` is only filled for candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWeapon {
    /// Position among the vehicle's weapon entries.
    pub index: u32,
    pub blk: String,
    pub trigger: Option<String>,
    pub trigger_group: Option<String>,
    pub dummy: bool,
    pub slot: Option<u32>,
    pub bullets: Option<u32>,
    pub ammo: Vec<AmmoBlock>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawVehicle {
    pub id: String,
    pub path: PathBuf,
    pub zoom_levels: Vec<f64>,
    pub has_laser: bool,
    pub weapons: Vec<RawWeapon>,
}

/// Everything read for one vehicle plus the dependencies it was read from.
#[derive(Debug, Clone)]
pub struct VehicleInputs {
    pub raw: RawVehicle,
    /// Sorted by path.
    pub files: Vec<FileFingerprint>,
    /// Language rows the built vehicle may draw names from.
    pub lang_keys: Vec<String>,
}

/// Magnification of a sight field of view, rounded to 2 decimals.
pub fn zoom_magnification(fov_deg: f64, reference_fov_deg: f64) -> Option<f64> {
    if !(fov_deg > 0.0 && fov_deg < 180.0) {
        return None;
    }
    let m = (reference_fov_deg.to_radians() / 2.0).tan() / (fov_deg.to_radians() / 2.0).tan();
    Some(round_to(m, 2))
}

fn round_to(x: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (x * f).round() / f
}

fn optional_count(v: &BlkValue, key: &str) -> Option<u32> {
    v.get_f64(key).filter(|n| *n >= 0.0).map(|n| n as u32)
}

pub fn read_vehicle(tree: &BlkValue, id: &str, path: &Path, reference_fov_deg: f64) -> RawVehicle {
    let cockpits = tree.list("cockpit");
    let mut zoom_levels = Vec::new();
    for c in &cockpits {
        for key in ["zoomOutFov", "zoomInFov"] {
            if let Some(m) = c
                .get_f64(key)
                .and_then(|fov| zoom_magnification(fov, reference_fov_deg))
            {
                zoom_levels.push(m);
            }
        }
    }
    zoom_levels.sort_by(f64::total_cmp);
    zoom_levels.dedup();

    let weapons = tree
        .list("commonWeapons")
        .into_iter()
        .flat_map(|cw| cw.list("Weapon"))
        .filter(|w| w.is_block())
        .enumerate()
        .map(|(i, w)| RawWeapon {
            index: i as u32,
            blk: w.get_str("blk").unwrap_or("").trim().to_string(),
            trigger: w.get_str("trigger").map(str::to_string),
            trigger_group: w.get_str("triggerGroup").map(str::to_string),
            dummy: w.bool_or("dummy", false),
            slot: optional_count(w, "slot"),
            bullets: optional_count(w, "bullets"),
            ammo: Vec::new(),
        })
        .collect();

    RawVehicle {
        id: id.to_string(),
        path: path.to_path_buf(),
        zoom_levels,
        has_laser: detect_laser(tree, &cockpits),
        weapons,
    }
}

fn detect_laser(tree: &BlkValue, cockpits: &[&BlkValue]) -> bool {
    let in_modifications = tree
        .list("modifications")
        .iter()
        .any(|m| m.entries().iter().any(|(k, _)| k.to_lowercase().contains(LASER_MARKER)));
    let in_sensors = tree
        .list("sensors")
        .iter()
        .flat_map(|s| s.list("sensor"))
        .any(|s| {
            s.get_str("blk")
                .is_some_and(|b| b.to_lowercase().contains(LASER_MARKER))
        });
    in_modifications || in_sensors || cockpits.iter().any(|c| c.bool_or("laserRangefinder", false))
}

fn read_fingerprinted(dm: &Datamine, path: &Path) -> Result<(BlkValue, FileFingerprint)> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let meta = fs::metadata(path).ok();
    let fp = FileFingerprint::from_bytes(dm.key_for(path), &bytes, meta.as_ref());
    let tree = parse_source(path, &bytes)?;
    Ok((tree, fp))
}

/// Read a vehicle file and every weapon file its candidate weapons reference.
pub fn load_vehicle_inputs(dm: &Datamine, src: &VehicleSource, tuning: &Tuning) -> Result<VehicleInputs> {
    let (tree, vehicle_fp) = read_fingerprinted(dm, &src.path)?;
    let mut raw = read_vehicle(&tree, &src.id, &src.path, tuning.zoom_reference_fov_deg);

    let mut files = BTreeMap::new();
    files.insert(vehicle_fp.path.clone(), vehicle_fp);
    let mut loaded: HashMap<PathBuf, Vec<AmmoBlock>> = HashMap::new();
    for w in raw.weapons.iter_mut() {
        if !selection::is_candidate(w, &tuning.selection) {
            continue;
        }
        if w.blk.is_empty() {
            return Err(Error::schema(
                &src.path,
                "commonWeapons.Weapon.blk",
                format!("weapon #{} has no blk", w.index),
            ));
        }
        let path = dm.resolve_reference(&w.blk, &src.path)?;
        if let Some(ammo) = loaded.get(&path) {
            w.ammo = ammo.clone();
            continue;
        }
        let (weapon_tree, weapon_fp) = read_fingerprinted(dm, &path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let ammo = ammo_blocks(&weapon_tree, &stem);
        tracing::debug!(vehicle = %src.id, weapon = %stem, blocks = ammo.len(), "weapon file read");
        files.insert(weapon_fp.path.clone(), weapon_fp);
        loaded.insert(path, ammo.clone());
        w.ammo = ammo;
    }

    let mut lang_keys: Vec<String> = LangTable::vehicle_keys(&raw.id).to_vec();
    for a in raw.weapons.iter().flat_map(|w| &w.ammo) {
        lang_keys.extend(LangTable::ammo_keys(&a.name));
        for name in a.shells.iter().filter_map(|s| s.bullet_name.as_deref()) {
            lang_keys.extend(LangTable::ammo_keys(name));
        }
    }
    lang_keys.sort();
    lang_keys.dedup();

    Ok(VehicleInputs {
        raw,
        files: files.into_values().collect(),
        lang_keys,
    })
}

fn unique_id(taken: &mut HashSet<String>, base: String) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", base, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Assemble the vehicle from its selected rounds. Fails only when the vehicle
/// has no identifier or nothing resolvable to fire.
pub fn build_vehicle(
    raw: &RawVehicle,
    selection: &Selection<'_>,
    lang: &LangTable,
    physics: &PhysicsConstants,
) -> Result<VehicleData> {
    if raw.id.trim().is_empty() {
        return Err(Error::schema(&raw.path, "id", "vehicle identifier is empty"));
    }
    if raw.weapons.is_empty() {
        return Err(Error::schema(&raw.path, "commonWeapons.Weapon", "no weapon entries"));
    }
    if selection.rounds.is_empty() {
        return Err(Error::schema(
            &raw.path,
            "commonWeapons.Weapon",
            "no resolvable weapon",
        ));
    }

    let mut taken = HashSet::new();
    let mut projectiles = Vec::with_capacity(selection.rounds.len());
    for r in &selection.rounds {
        let base = r.shell.bullet_name.as_deref().unwrap_or(&r.ammo.name);
        let id = unique_id(&mut taken, file_safe_name(&normalize_id(base)));
        // Both halves of a double shell show the ammo block's name.
        let own_name = r
            .shell
            .bullet_name
            .as_deref()
            .filter(|_| !r.double_shell)
            .and_then(|n| lang.ammo_name(n));
        let display_name = lang
            .ammo_name(&r.ammo.name)
            .or(own_name)
            .unwrap_or(&r.ammo.name)
            .to_string();
        let source_type = match (&r.shell.bullet_type, r.shell.is_rocket) {
            (Some(t), _) => t.clone(),
            (None, true) => "rocket".to_string(),
            (None, false) => String::new(),
        };
        projectiles.push(ProjectileEntry {
            id,
            display_name,
            weapon_slot: r.slot,
            weapon_blk: r.weapon.blk.clone(),
            source_type,
            kind: r.kind.clone(),
            velocity_mps: r.shell.speed_mps.unwrap_or(0.0),
            caliber_mm: round_to(r.shell.caliber_m.unwrap_or(0.0) * 1000.0, 3),
            mass_kg: r.shell.mass_kg.unwrap_or(0.0),
            drag_cx: r.shell.cx.filter(|c| *c >= 0.0).unwrap_or(physics.default_cx),
            he_filler_kg: r.shell.tnt_filler_kg(),
            double_shell: r.double_shell,
        });
    }

    Ok(VehicleData {
        id: raw.id.clone(),
        name: lang.vehicle_name(&raw.id).unwrap_or(&raw.id).to_string(),
        zoom_levels: raw.zoom_levels.clone(),
        has_laser: raw.has_laser,
        projectiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionRules;
    use crate::model::RawShell;
    use crate::parser::parse_blkx;

    const VEHICLE: &str = r#"{
        "cockpit": [{"zoomInFov": 8.0, "zoomOutFov": 30.0}, {"zoomInFov": 8.0, "zoomOutFov": 20.0}],
        "modifications": {"laser_rangefinder_lws": {}},
        "commonWeapons": {"Weapon": [
            {"blk": "gameData/Weapons/groundModels_weapons/gun.blk", "trigger": "gunner0", "triggerGroup": "primary", "bullets": 40},
            {"blk": "gameData/Weapons/groundModels_weapons/mg.blk", "trigger": "gunner1", "triggerGroup": "machinegun"},
            {"blk": "gameData/Weapons/dummy_weapon.blk", "dummy": true, "slot": 3}
        ]}
    }"#;

    fn raw() -> RawVehicle {
        let tree = parse_blkx(VEHICLE).unwrap();
        read_vehicle(&tree, "test_tank", Path::new("test_tank.blkx"), 75.0)
    }

    #[test]
    fn zoom_levels_from_all_cockpits() {
        let v = raw();
        assert_eq!(v.zoom_levels.len(), 3);
        assert!(v.zoom_levels.windows(2).all(|w| w[0] < w[1]));
        assert!((v.zoom_levels[2] - 10.97).abs() < 1e-9);
        assert!(v.has_laser);
    }

    #[test]
    fn weapon_entries_in_declaration_order() {
        let v = raw();
        assert_eq!(v.weapons.len(), 3);
        assert_eq!(v.weapons[0].bullets, Some(40));
        assert_eq!(v.weapons[1].trigger_group.as_deref(), Some("machinegun"));
        assert!(v.weapons[2].dummy);
        assert_eq!(v.weapons[2].slot, Some(3));
    }

    #[test]
    fn magnification_formula() {
        assert_eq!(zoom_magnification(75.0, 75.0), Some(1.0));
        assert_eq!(zoom_magnification(0.0, 75.0), None);
    }

    fn shell(name: &str) -> RawShell {
        RawShell {
            bullet_name: Some(name.to_string()),
            bullet_type: Some("ap_tank".to_string()),
            mass_kg: Some(6.8),
            caliber_m: Some(0.076),
            speed_mps: Some(792.0),
            ..Default::default()
        }
    }

    #[test]
    fn build_suffixes_colliding_ids_and_falls_back_to_identifier() {
        let mut v = raw();
        v.weapons[0].ammo = vec![
            AmmoBlock {
                name: "ap_a".to_string(),
                double_shell_flag: false,
                shells: vec![shell("76mm_ap")],
            },
            AmmoBlock {
                name: "ap_b".to_string(),
                double_shell_flag: false,
                shells: vec![RawShell {
                    speed_mps: Some(700.0),
                    ..shell("76mm_ap")
                }],
            },
        ];
        let physics = PhysicsConstants::default();
        let sel = selection::select(&v, &SelectionRules::default(), &physics);
        let lang = LangTable::parse("\"ap_b/name/short\";\"BR-350\"\n");
        let data = build_vehicle(&v, &sel, &lang, &physics).unwrap();
        assert_eq!(data.name, "test_tank");
        let ids: Vec<&str> = data.projectiles.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["76mm_ap", "76mm_ap_2"]);
        assert_eq!(data.projectiles[0].display_name, "ap_a");
        assert_eq!(data.projectiles[1].display_name, "BR-350");
        assert!((data.projectiles[0].caliber_mm - 76.0).abs() < 1e-9);
        assert!((data.projectiles[0].drag_cx - 0.3).abs() < 1e-12);
    }

    #[test]
    fn double_shell_halves_share_block_name() {
        let mut v = raw();
        v.weapons[0].ammo = vec![AmmoBlock {
            name: "30mm_mix".to_string(),
            double_shell_flag: true,
            shells: vec![
                shell("30mm_ap"),
                RawShell {
                    bullet_type: Some("he_frag_tank".to_string()),
                    ..shell("30mm_he")
                },
            ],
        }];
        let physics = PhysicsConstants::default();
        let sel = selection::select(&v, &SelectionRules::default(), &physics);
        let lang = LangTable::parse(
            "\"30mm_ap/name/short\";\"3UBR6\"\n\"30mm_he/name/short\";\"3UOF8\"\n",
        );
        let data = build_vehicle(&v, &sel, &lang, &physics).unwrap();
        let names: Vec<&str> = data.projectiles.iter().map(|p| p.display_name.as_str()).collect();
        assert_eq!(names, vec!["30mm_mix", "30mm_mix"]);
        assert!(data.projectiles.iter().all(|p| p.double_shell));
        assert_ne!(data.projectiles[0].id, data.projectiles[1].id);
    }

    #[test]
    fn no_resolvable_weapon_is_schema_error() {
        let v = raw();
        let physics = PhysicsConstants::default();
        let sel = selection::select(&v, &SelectionRules::default(), &physics);
        let err = build_vehicle(&v, &sel, &LangTable::default(), &physics).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Schema);
    }
}
