//! Vehicle and projectile model: the canonical output of the conversion stage
//! and the only input of the ballistic stage.

mod extract;
mod projectile;

pub use extract::{
    build_vehicle, load_vehicle_inputs, read_vehicle, zoom_magnification, RawVehicle, RawWeapon,
    VehicleInputs,
};
pub use projectile::{ammo_blocks, tnt_equivalent, AmmoBlock, RawShell};
use serde::{Deserialize, Serialize};

/// One vehicle with its selected projectiles, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    pub id: String,
    /// Localized name, or the identifier when the language table has none.
    pub name: String,
    /// Magnification factors, ascending.
    pub zoom_levels: Vec<f64>,
    pub has_laser: bool,
    pub projectiles: Vec<ProjectileEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileEntry {
    /// Unique within the vehicle; also the table file name.
    pub id: String,
    pub display_name: String,
    pub weapon_slot: u32,
    #[serde(default)]
    pub weapon_blk: String,
    /// `bulletType` as found in the weapon file.
    pub source_type: String,
    pub kind: ProjectileKind,
    pub velocity_mps: f64,
    pub caliber_mm: f64,
    pub mass_kg: f64,
    pub drag_cx: f64,
    /// TNT-equivalent filler.
    pub he_filler_kg: Option<f64>,
    pub double_shell: bool,
}

/// Closed set of penetration laws; each variant carries only what its law needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProjectileKind {
    Ap { demarre: DeMarreParams },
    Aphe { demarre: DeMarreParams },
    Apcr { demarre: DeMarreParams },
    Apds { armor_power: ArmorPowerSeries },
    Apfsds { armor_power: ArmorPowerSeries },
    He,
    Heat { armor_power_mm: f64 },
    Rocket(RocketParams),
    Unresolved,
}

impl ProjectileKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProjectileKind::Ap { .. } => "AP",
            ProjectileKind::Aphe { .. } => "APHE",
            ProjectileKind::Apcr { .. } => "APCR",
            ProjectileKind::Apds { .. } => "APDS",
            ProjectileKind::Apfsds { .. } => "APFSDS",
            ProjectileKind::He => "HE",
            ProjectileKind::Heat { .. } => "HEAT",
            ProjectileKind::Rocket(_) => "ROCKET",
            ProjectileKind::Unresolved => "UNRESOLVED",
        }
    }

    pub fn demarre(&self) -> Option<&DeMarreParams> {
        match self {
            ProjectileKind::Ap { demarre }
            | ProjectileKind::Aphe { demarre }
            | ProjectileKind::Apcr { demarre } => Some(demarre),
            _ => None,
        }
    }

    pub fn armor_power(&self) -> Option<&ArmorPowerSeries> {
        match self {
            ProjectileKind::Apds { armor_power } | ProjectileKind::Apfsds { armor_power } => {
                Some(armor_power)
            }
            _ => None,
        }
    }
}

/// Kinetic law `K·100·(v/refV)^ve·m^me / (cal/refCal)^ce`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeMarreParams {
    pub coefficient: f64,
    pub velocity_exponent: f64,
    pub mass_exponent: f64,
    pub caliber_exponent: f64,
    pub reference_velocity_mps: f64,
    pub reference_caliber_mm: f64,
    /// Mass and caliber entering the law (the core for sub-caliber rounds).
    pub penetrator_mass_kg: f64,
    pub penetrator_caliber_mm: f64,
}

/// (velocity, penetration) breakpoints sorted by velocity, no duplicate velocities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct ArmorPowerSeries {
    points: Vec<(f64, f64)>,
}

impl ArmorPowerSeries {
    /// Sorts by velocity; for a repeated velocity the first breakpoint wins.
    pub fn new(mut points: Vec<(f64, f64)>) -> Result<Self, String> {
        if points.is_empty() {
            return Err("armor power series is empty".to_string());
        }
        if points.iter().any(|(v, p)| !v.is_finite() || !p.is_finite()) {
            return Err("armor power series has a non-finite value".to_string());
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points.dedup_by(|later, earlier| later.0 == earlier.0);
        Ok(Self { points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl TryFrom<Vec<[f64; 2]>> for ArmorPowerSeries {
    type Error = String;

    fn try_from(raw: Vec<[f64; 2]>) -> Result<Self, String> {
        Self::new(raw.into_iter().map(|[v, p]| (v, p)).collect())
    }
}

impl From<ArmorPowerSeries> for Vec<[f64; 2]> {
    fn from(s: ArmorPowerSeries) -> Self {
        s.points.into_iter().map(|(v, p)| [v, p]).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocketParams {
    pub end_speed_mps: f64,
    pub burn_time_s: f64,
    pub max_distance_m: Option<f64>,
    /// Shaped-charge penetration; falls back to the HE law on the filler.
    pub armor_power_mm: Option<f64>,
}

/// One sampled point of a ballistic table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallisticRow {
    pub distance_m: f64,
    pub time_s: f64,
    pub penetration_mm: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_sorted_and_deduplicated() {
        let s = ArmorPowerSeries::new(vec![(1500.0, 420.0), (500.0, 200.0), (1500.0, 999.0)])
            .unwrap();
        assert_eq!(s.points(), &[(500.0, 200.0), (1500.0, 420.0)]);
    }

    #[test]
    fn series_rejects_empty() {
        assert!(ArmorPowerSeries::new(vec![]).is_err());
    }

    #[test]
    fn kind_serializes_tagged() {
        let k = ProjectileKind::Heat {
            armor_power_mm: 400.0,
        };
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, r#"{"type":"heat","armor_power_mm":400.0}"#);
        let series: ProjectileKind =
            serde_json::from_str(r#"{"type":"apfsds","armor_power":[[1700,500],[500,300]]}"#)
                .unwrap();
        assert_eq!(
            series.armor_power().unwrap().points(),
            &[(500.0, 300.0), (1700.0, 500.0)]
        );
    }

    #[test]
    fn rocket_kind_roundtrips_through_json() {
        let k = ProjectileKind::Rocket(RocketParams {
            end_speed_mps: 330.0,
            burn_time_s: 1.5,
            max_distance_m: Some(3750.0),
            armor_power_mm: None,
        });
        let back: ProjectileKind = serde_json::from_str(&serde_json::to_string(&k).unwrap()).unwrap();
        assert_eq!(back, k);
        assert_eq!(back.label(), "ROCKET");
    }
}
