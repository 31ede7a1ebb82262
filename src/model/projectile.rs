//! Ammunition read from weapon files: ammo blocks and the raw projectile fields.
//! Values stay in source units (kg, m, m/s) until the builder converts them.

use crate::parser::BlkValue;

/// One `bullet`/`rocket` block, fields as read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawShell {
    pub bullet_name: Option<String>,
    pub bullet_type: Option<String>,
    pub is_rocket: bool,
    pub mass_kg: Option<f64>,
    pub caliber_m: Option<f64>,
    pub speed_mps: Option<f64>,
    pub cx: Option<f64>,
    pub explosive_mass_kg: Option<f64>,
    pub explosive_type: Option<String>,
    pub demarre_k: Option<f64>,
    pub demarre_speed_k: Option<f64>,
    pub demarre_mass_k: Option<f64>,
    pub demarre_caliber_k: Option<f64>,
    /// Sub-caliber core.
    pub damage_mass_kg: Option<f64>,
    pub damage_caliber_m: Option<f64>,
    pub armor_power_series: Vec<(f64, f64)>,
    pub cumulative_armor_power: Option<f64>,
    pub end_speed_mps: Option<f64>,
    pub time_fire_s: Option<f64>,
    pub max_distance_m: Option<f64>,
}

impl RawShell {
    pub fn from_blk(block: &BlkValue, is_rocket: bool) -> Self {
        let armor_power_series = block
            .lookup("armorPowerSeries")
            .map(|s| s.list("ap").into_iter().filter_map(BlkValue::as_pair).collect())
            .unwrap_or_default();
        Self {
            bullet_name: block.get_str("bulletName").map(str::to_string),
            bullet_type: block.get_str("bulletType").map(str::to_string),
            is_rocket,
            mass_kg: block.get_f64("mass"),
            caliber_m: block.get_f64("caliber"),
            speed_mps: block.get_f64("speed").or_else(|| block.get_f64("startSpeed")),
            cx: block.get_f64("Cx"),
            explosive_mass_kg: block.get_f64("explosiveMass"),
            explosive_type: block.get_str("explosiveType").map(str::to_string),
            demarre_k: block.get_f64("demarrePenetrationK"),
            demarre_speed_k: block.get_f64("demarreSpeedK"),
            demarre_mass_k: block.get_f64("demarreMassK"),
            demarre_caliber_k: block.get_f64("demarreCaliberK"),
            damage_mass_kg: block.get_f64("damageMass"),
            damage_caliber_m: block.get_f64("damageCaliber"),
            armor_power_series,
            cumulative_armor_power: block.get_f64("cumulativeDamage.armorPower"),
            end_speed_mps: block.get_f64("endSpeed"),
            time_fire_s: block.get_f64("timeFire"),
            max_distance_m: block.get_f64("maxDistance"),
        }
    }

    /// Same round for selection purposes: identical name and ballistic inputs.
    pub fn same_round(&self, other: &RawShell) -> bool {
        self.bullet_name == other.bullet_name
            && self.bullet_type == other.bullet_type
            && self.mass_kg == other.mass_kg
            && self.speed_mps == other.speed_mps
            && self.caliber_m == other.caliber_m
    }

    /// Filler as TNT equivalent, if the round carries any.
    pub fn tnt_filler_kg(&self) -> Option<f64> {
        let mass = self.explosive_mass_kg.filter(|m| *m > 0.0)?;
        Some(mass * tnt_equivalent(self.explosive_type.as_deref().unwrap_or("tnt")))
    }
}

/// A selectable loadout in a weapon file: one round or a belt of several.
#[derive(Debug, Clone, PartialEq)]
pub struct AmmoBlock {
    pub name: String,
    pub double_shell_flag: bool,
    pub shells: Vec<RawShell>,
}

impl AmmoBlock {
    /// Rounds with identical repeats removed, in belt order.
    pub fn distinct_shells(&self) -> Vec<&RawShell> {
        let mut out: Vec<&RawShell> = Vec::new();
        for s in &self.shells {
            if !out.iter().any(|o| o.same_round(s)) {
                out.push(s);
            }
        }
        out
    }
}

fn shells_of(block: &BlkValue) -> Vec<RawShell> {
    let mut out: Vec<RawShell> = block
        .list("bullet")
        .into_iter()
        .filter(|b| b.is_block())
        .map(|b| RawShell::from_blk(b, false))
        .collect();
    out.extend(
        block
            .list("rocket")
            .into_iter()
            .filter(|b| b.is_block())
            .map(|b| RawShell::from_blk(b, true)),
    );
    out
}

/// Ammo blocks of a weapon file in file order. The top-level default load is
/// listed first unless a named block already starts with the same round.
pub fn ammo_blocks(weapon: &BlkValue, weapon_name: &str) -> Vec<AmmoBlock> {
    let mut named = Vec::new();
    for (key, value) in weapon.entries() {
        if key == "bullet" || key == "rocket" || !value.is_block() {
            continue;
        }
        if !(value.has("bullet") || value.has("rocket")) {
            continue;
        }
        let shells = shells_of(value);
        if shells.is_empty() {
            continue;
        }
        named.push(AmmoBlock {
            name: key.clone(),
            double_shell_flag: value.bool_or("doubleShell", false),
            shells,
        });
    }

    let default_shells = shells_of(weapon);
    let mut out = Vec::with_capacity(named.len() + 1);
    if let Some(first) = default_shells.first() {
        let shadowed = named
            .iter()
            .any(|b| b.shells.first().is_some_and(|s| s.same_round(first)));
        if !shadowed {
            out.push(AmmoBlock {
                name: first
                    .bullet_name
                    .clone()
                    .unwrap_or_else(|| weapon_name.to_string()),
                double_shell_flag: weapon.bool_or("doubleShell", false),
                shells: default_shells,
            });
        }
    }
    out.extend(named);
    out
}

/// Relative effectiveness of an explosive against TNT. Unknown fillers count 1.0.
pub fn tnt_equivalent(explosive_type: &str) -> f64 {
    match explosive_type.trim().to_ascii_lowercase().as_str() {
        "tnt" => 1.0,
        "a_ix_1" | "a-ix-1" => 1.54,
        "a_ix_2" | "a-ix-2" => 1.35,
        "comp_a" | "composition_a" => 1.35,
        "comp_b" | "composition_b" => 1.33,
        "rdx" | "hexogen" => 1.6,
        "petn" => 1.66,
        "tetryl" => 1.25,
        "pentolite" => 1.33,
        "amatol" => 0.99,
        "ammonal" => 1.06,
        "torpex" => 1.5,
        "h6" => 1.356,
        "octol" | "ocfol" => 1.7,
        _ => 1.0,
    }
}
