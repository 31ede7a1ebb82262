//! Run configuration, tuning constants and input bounds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum number of vehicle files considered in one run (bound input size).
pub const MAX_SOURCE_FILES: usize = 50_000;

/// Maximum size in bytes for a single source file.
pub const MAX_SOURCE_FILE_BYTES: usize = 8 * 1024 * 1024;

/// Cache manifest kept in every output directory.
pub const MANIFEST_FILE_NAME: &str = ".fcs-cache.json";

/// SQLite run history kept in every output directory.
pub const RUN_HISTORY_FILE_NAME: &str = "runs.sqlite";

pub const REPORT_FILE_NAME: &str = "report.json";

pub const DEFAULT_DATA_DIR: &str = "Data";
pub const DEFAULT_BALLISTIC_DIR: &str = "Ballistic";

pub const DEFAULT_MAX_RANGE_M: f64 = 4000.0;
pub const DEFAULT_SHORT_RANGE_M: f64 = 2000.0;

/// Which on-disk forms an emitter writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmitMode {
    Legacy,
    Structured,
    Both,
}

impl EmitMode {
    pub fn legacy(self) -> bool {
        matches!(self, EmitMode::Legacy | EmitMode::Both)
    }

    pub fn structured(self) -> bool {
        matches!(self, EmitMode::Structured | EmitMode::Both)
    }

    pub fn label(self) -> &'static str {
        match self {
            EmitMode::Legacy => "legacy",
            EmitMode::Structured => "structured",
            EmitMode::Both => "both",
        }
    }
}

/// Numeric comparison policy for golden tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceMode {
    /// Whole-millimetre equality.
    Strict,
    /// Within 1% relative per value.
    Lenient,
}

/// One APHE filler band: shells whose filler share is at most
/// `max_filler_percent` keep `multiplier` of their kinetic penetration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AphePenaltyBand {
    pub max_filler_percent: f64,
    pub multiplier: f64,
}

/// Constants of the penetration and flight laws. Every field has a default,
/// so a tuning file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConstants {
    pub air_density: f64,
    pub default_cx: f64,
    pub demarre_velocity_exponent: f64,
    pub demarre_mass_exponent: f64,
    pub demarre_caliber_exponent: f64,
    pub demarre_reference_velocity_mps: f64,
    pub demarre_reference_caliber_mm: f64,
    pub aphe_penalty_bands: Vec<AphePenaltyBand>,
    /// Multiplier for filler shares above the last band.
    pub aphe_penalty_above: f64,
    pub he_coefficient: f64,
    pub he_exponent: f64,
    pub he_min_caliber_mm: f64,
    pub he_min_filler_kg: f64,
    /// Penetration is divided by this (1.0 = rolled homogeneous armour).
    pub armor_quality: f64,
    pub impact_angle_deg: f64,
    pub near_step_m: f64,
    pub near_limit_m: f64,
    pub far_step_m: f64,
    pub max_range_m: f64,
    pub short_range_m: f64,
    pub low_velocity_mps: f64,
}

impl Default for PhysicsConstants {
    fn default() -> Self {
        Self {
            air_density: 1.225,
            default_cx: 0.3,
            demarre_velocity_exponent: 1.43,
            demarre_mass_exponent: 0.71,
            demarre_caliber_exponent: 1.07,
            demarre_reference_velocity_mps: 1900.0,
            demarre_reference_caliber_mm: 100.0,
            aphe_penalty_bands: vec![
                AphePenaltyBand { max_filler_percent: 0.65, multiplier: 1.0 },
                AphePenaltyBand { max_filler_percent: 1.6, multiplier: 0.93 },
                AphePenaltyBand { max_filler_percent: 2.0, multiplier: 0.9 },
                AphePenaltyBand { max_filler_percent: 3.0, multiplier: 0.85 },
                AphePenaltyBand { max_filler_percent: 4.0, multiplier: 0.75 },
            ],
            aphe_penalty_above: 0.7,
            he_coefficient: 14.0,
            he_exponent: 0.68,
            he_min_caliber_mm: 20.0,
            he_min_filler_kg: 0.01,
            armor_quality: 1.0,
            impact_angle_deg: 0.0,
            near_step_m: 50.0,
            near_limit_m: 1000.0,
            far_step_m: 100.0,
            max_range_m: DEFAULT_MAX_RANGE_M,
            short_range_m: DEFAULT_SHORT_RANGE_M,
            low_velocity_mps: 400.0,
        }
    }
}

impl PhysicsConstants {
    /// Reject values the sampling loop and the laws cannot work with. The
    /// error names the offending key.
    pub fn validate(&self) -> std::result::Result<(), (String, String)> {
        let positive = [
            ("near_step_m", self.near_step_m),
            ("far_step_m", self.far_step_m),
            ("max_range_m", self.max_range_m),
            ("short_range_m", self.short_range_m),
            ("demarre_reference_velocity_mps", self.demarre_reference_velocity_mps),
            ("demarre_reference_caliber_mm", self.demarre_reference_caliber_mm),
            ("armor_quality", self.armor_quality),
        ];
        let finite = [
            ("air_density", self.air_density),
            ("default_cx", self.default_cx),
            ("demarre_velocity_exponent", self.demarre_velocity_exponent),
            ("demarre_mass_exponent", self.demarre_mass_exponent),
            ("demarre_caliber_exponent", self.demarre_caliber_exponent),
            ("aphe_penalty_above", self.aphe_penalty_above),
            ("he_coefficient", self.he_coefficient),
            ("he_exponent", self.he_exponent),
            ("he_min_caliber_mm", self.he_min_caliber_mm),
            ("he_min_filler_kg", self.he_min_filler_kg),
            ("impact_angle_deg", self.impact_angle_deg),
            ("near_limit_m", self.near_limit_m),
            ("low_velocity_mps", self.low_velocity_mps),
        ];
        for (key, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err((key.to_string(), format!("must be finite and positive, got {}", v)));
            }
        }
        for (key, v) in finite {
            if !v.is_finite() {
                return Err((key.to_string(), format!("must be finite, got {}", v)));
            }
        }
        for (key, v) in [("air_density", self.air_density), ("near_limit_m", self.near_limit_m)] {
            if v < 0.0 {
                return Err((key.to_string(), format!("must not be negative, got {}", v)));
            }
        }
        for (i, band) in self.aphe_penalty_bands.iter().enumerate() {
            if !(band.max_filler_percent.is_finite() && band.multiplier.is_finite()) {
                return Err((format!("aphe_penalty_bands[{}]", i), "must be finite".to_string()));
            }
        }
        Ok(())
    }

    /// Content hash of the constants; a change invalidates cached tables.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        crate::util::sha256_hex(&bytes)
    }
}

/// Knobs of the armament selection heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRules {
    /// Trigger groups never treated as sight-relevant armament.
    pub excluded_trigger_groups: Vec<String>,
    /// Substrings of a weapon path that suggest a decorative entry.
    pub decorative_markers: Vec<String>,
    /// Ammo-name substrings that mark a two-round "double shell" block.
    pub double_shell_patterns: Vec<String>,
}

impl Default for SelectionRules {
    fn default() -> Self {
        Self {
            excluded_trigger_groups: vec!["machinegun".to_string(), "smoke".to_string()],
            decorative_markers: vec!["dummy".to_string(), "fake".to_string()],
            double_shell_patterns: vec!["_double".to_string(), "_2in1".to_string()],
        }
    }
}

/// Everything a `--config` TOML file may override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Field of view that counts as 1x magnification, in degrees.
    pub zoom_reference_fov_deg: f64,
    pub physics: PhysicsConstants,
    pub selection: SelectionRules,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            zoom_reference_fov_deg: 75.0,
            physics: PhysicsConstants::default(),
            selection: SelectionRules::default(),
        }
    }
}

impl Tuning {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let tuning: Tuning = toml::from_str(&text).map_err(|e| Error::Parse {
            file: path.to_path_buf(),
            source: crate::parser::ParseError::Syntax(e.to_string()),
        })?;
        tuning.validate().map_err(|(key, detail)| Error::schema(path, &key, detail))?;
        Ok(tuning)
    }

    pub fn validate(&self) -> std::result::Result<(), (String, String)> {
        let fov = self.zoom_reference_fov_deg;
        if !(fov.is_finite() && fov > 0.0 && fov < 180.0) {
            return Err((
                "zoom_reference_fov_deg".to_string(),
                format!("must lie in (0, 180), got {}", fov),
            ));
        }
        self.physics
            .validate()
            .map_err(|(key, detail)| (format!("physics.{}", key), detail))
    }
}

/// Inputs of `convert-datamine`.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub datamine_root: PathBuf,
    /// Glob over vehicle identifiers (`*`, `?`).
    pub selector: String,
    pub lang_path: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub emit: EmitMode,
    /// Worker threads; 0 lets the pool decide.
    pub threads: usize,
    pub force: bool,
    pub strict: bool,
    pub tuning: Tuning,
}

impl ConvertConfig {
    pub fn new(datamine_root: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            datamine_root,
            selector: "*".to_string(),
            lang_path: None,
            out_dir,
            emit: EmitMode::Both,
            threads: 0,
            force: false,
            strict: false,
            tuning: Tuning::default(),
        }
    }
}

/// Inputs of `make-ballistic`.
#[derive(Debug, Clone)]
pub struct BallisticConfig {
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
    pub emit: EmitMode,
    pub tolerance: ToleranceMode,
    pub golden_dir: Option<PathBuf>,
    pub threads: usize,
    pub force: bool,
    pub strict: bool,
    pub physics: PhysicsConstants,
}

impl BallisticConfig {
    pub fn new(data_dir: PathBuf, out_dir: PathBuf) -> Self {
        Self {
            data_dir,
            out_dir,
            emit: EmitMode::Both,
            tolerance: ToleranceMode::Lenient,
            golden_dir: None,
            threads: 0,
            force: false,
            strict: false,
            physics: PhysicsConstants::default(),
        }
    }
}
