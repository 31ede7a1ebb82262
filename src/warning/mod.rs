//! Non-fatal findings: selection ambiguities, golden mismatches, degraded cache.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WarningSeverity {
    Info,
    Warn,
    Crit,
}

impl WarningSeverity {
    pub fn label(self) -> &'static str {
        match self {
            WarningSeverity::Info => "INFO",
            WarningSeverity::Warn => "WARN",
            WarningSeverity::Crit => "CRIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub code: String,
    pub severity: WarningSeverity,
    /// One line for the run summary.
    pub summary: String,
    /// Detail for whoever reviews the test corpus.
    pub technical: String,
    pub vehicle_id: Option<String>,
    /// Weapons, ammo blocks or projectiles involved.
    pub subjects: Vec<String>,
}

impl Warning {
    /// Counted against a `--strict` run.
    pub fn is_actionable(&self) -> bool {
        self.severity >= WarningSeverity::Warn
    }

    pub fn ambiguous_decorative(vehicle_id: &str, blk: &str, marker: &str) -> Self {
        Self {
            code: "AMBIGUOUS_DECORATIVE".to_string(),
            severity: WarningSeverity::Warn,
            summary: format!(
                "Vehicle {}: weapon {} looks decorative but is not flagged dummy; kept.",
                vehicle_id, blk
            ),
            technical: format!("path contains '{}' without dummy:b=yes", marker),
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![blk.to_string()],
        }
    }

    pub fn duplicate_collapsed(vehicle_id: &str, blk: &str, count: usize) -> Self {
        Self {
            code: "DUPLICATE_WEAPON_COLLAPSED".to_string(),
            severity: WarningSeverity::Info,
            summary: format!(
                "Vehicle {}: {} identical entries of {} collapsed to one.",
                vehicle_id, count, blk
            ),
            technical: "same blk, trigger and bullets count (multi-barrel mount)".to_string(),
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![blk.to_string()],
        }
    }

    pub fn ambiguous_double_shell(vehicle_id: &str, ammo: &str, technical: String) -> Self {
        Self {
            code: "AMBIGUOUS_DOUBLE_SHELL".to_string(),
            severity: WarningSeverity::Warn,
            summary: format!(
                "Vehicle {}: ammo {} holds several rounds without a double-shell marker; using the first.",
                vehicle_id, ammo
            ),
            technical,
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![ammo.to_string()],
        }
    }

    pub fn belt_truncated(vehicle_id: &str, ammo: &str, rounds: usize) -> Self {
        Self {
            code: "BELT_FIRST_ROUND".to_string(),
            severity: WarningSeverity::Info,
            summary: format!(
                "Vehicle {}: belt {} has {} rounds; tabulating the first.",
                vehicle_id, ammo, rounds
            ),
            technical: String::new(),
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![ammo.to_string()],
        }
    }

    pub fn unresolved_kind(vehicle_id: &str, projectile: &str, technical: String) -> Self {
        Self {
            code: "UNRESOLVED_PROJECTILE_KIND".to_string(),
            severity: WarningSeverity::Warn,
            summary: format!(
                "Vehicle {}: projectile {} has no usable penetration law.",
                vehicle_id, projectile
            ),
            technical,
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![projectile.to_string()],
        }
    }

    pub fn golden_mismatch(vehicle_id: &str, projectile: &str, technical: String) -> Self {
        Self {
            code: "GOLDEN_MISMATCH".to_string(),
            severity: WarningSeverity::Warn,
            summary: format!(
                "Vehicle {} projectile {}: table differs from reference.",
                vehicle_id, projectile
            ),
            technical,
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![projectile.to_string()],
        }
    }

    pub fn golden_missing(vehicle_id: &str, projectile: &str) -> Self {
        Self {
            code: "GOLDEN_MISSING".to_string(),
            severity: WarningSeverity::Info,
            summary: format!(
                "Vehicle {} projectile {}: no reference table.",
                vehicle_id, projectile
            ),
            technical: String::new(),
            vehicle_id: Some(vehicle_id.to_string()),
            subjects: vec![projectile.to_string()],
        }
    }

    pub fn cache_degraded(technical: String) -> Self {
        Self {
            code: "CACHE_DEGRADED".to_string(),
            severity: WarningSeverity::Warn,
            summary: "Cache manifest unreadable; every vehicle treated as stale.".to_string(),
            technical,
            vehicle_id: None,
            subjects: Vec::new(),
        }
    }

    pub fn history_unavailable(technical: String) -> Self {
        Self {
            code: "HISTORY_UNAVAILABLE".to_string(),
            severity: WarningSeverity::Info,
            summary: "Run history could not be recorded.".to_string(),
            technical,
            vehicle_id: None,
            subjects: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_is_not_actionable() {
        assert!(!Warning::duplicate_collapsed("t", "gun.blk", 2).is_actionable());
        assert!(Warning::ambiguous_decorative("t", "dummy_gun.blk", "dummy").is_actionable());
    }

    #[test]
    fn severity_orders() {
        assert!(WarningSeverity::Crit > WarningSeverity::Warn);
        assert!(WarningSeverity::Warn > WarningSeverity::Info);
    }
}
