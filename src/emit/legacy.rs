//! Legacy flat-text Data form: one `VEHICLE` line, then one `PROJECTILE` line
//! per projectile, `;`-separated with a fixed column order.

use crate::model::{
    ArmorPowerSeries, DeMarreParams, ProjectileEntry, ProjectileKind, RocketParams, VehicleData,
};
use crate::parser::ParseError;
use std::fmt::Write as _;

const VEHICLE_FIELDS: usize = 5;
const PROJECTILE_FIELDS: usize = 13;

fn clean(s: &str) -> String {
    s.replace(';', ",").replace(['\n', '\r'], " ")
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
}

fn law(kind: &ProjectileKind) -> String {
    match kind {
        ProjectileKind::Ap { demarre: d }
        | ProjectileKind::Aphe { demarre: d }
        | ProjectileKind::Apcr { demarre: d } => format!(
            "demarre:{}:{}:{}:{}:{}:{}:{}:{}",
            d.coefficient,
            d.velocity_exponent,
            d.mass_exponent,
            d.caliber_exponent,
            d.reference_velocity_mps,
            d.reference_caliber_mm,
            d.penetrator_mass_kg,
            d.penetrator_caliber_mm
        ),
        ProjectileKind::Apds { armor_power } | ProjectileKind::Apfsds { armor_power } => {
            let pts: Vec<String> = armor_power
                .points()
                .iter()
                .map(|(v, p)| format!("{}/{}", v, p))
                .collect();
            format!("series:{}", pts.join(","))
        }
        ProjectileKind::He => "he".to_string(),
        ProjectileKind::Heat { armor_power_mm } => format!("heat:{}", armor_power_mm),
        ProjectileKind::Rocket(r) => format!(
            "rocket:{}:{}:{}:{}",
            r.end_speed_mps,
            r.burn_time_s,
            opt(r.max_distance_m),
            opt(r.armor_power_mm)
        ),
        ProjectileKind::Unresolved => "unresolved".to_string(),
    }
}

pub fn render_legacy(v: &VehicleData) -> String {
    let zooms: Vec<String> = v.zoom_levels.iter().map(f64::to_string).collect();
    let mut out = format!(
        "VEHICLE;{};{};{};{}\n",
        clean(&v.id),
        clean(&v.name),
        zooms.join(","),
        u8::from(v.has_laser)
    );
    for p in &v.projectiles {
        let _ = writeln!(
            out,
            "PROJECTILE;{};{};{};{};{};{};{};{};{};{};{};{}",
            p.weapon_slot,
            clean(&p.id),
            clean(&p.display_name),
            clean(&p.source_type),
            p.kind.label(),
            p.velocity_mps,
            p.caliber_mm,
            p.mass_kg,
            p.drag_cx,
            opt(p.he_filler_kg),
            u8::from(p.double_shell),
            law(&p.kind)
        );
    }
    out
}

fn syntax(line: usize, msg: impl std::fmt::Display) -> ParseError {
    ParseError::Syntax(format!("line {}: {}", line, msg))
}

fn num(line: usize, field: &str, s: &str) -> Result<f64, ParseError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| syntax(line, format!("{} is not a number: '{}'", field, s)))
}

fn opt_num(line: usize, field: &str, s: &str) -> Result<Option<f64>, ParseError> {
    if s.trim() == "-" {
        Ok(None)
    } else {
        num(line, field, s).map(Some)
    }
}

fn flag(line: usize, field: &str, s: &str) -> Result<bool, ParseError> {
    match s.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(syntax(line, format!("{} must be 0 or 1, got '{}'", field, other))),
    }
}

fn parse_law(line: usize, label: &str, law: &str) -> Result<ProjectileKind, ParseError> {
    let mut parts = law.split(':');
    let tag = parts.next().unwrap_or("");
    let rest: Vec<&str> = parts.collect();
    let kind = match (label, tag) {
        ("AP" | "APHE" | "APCR", "demarre") => {
            if rest.len() != 8 {
                return Err(syntax(line, "demarre law needs 8 values"));
            }
            let n = |i: usize| num(line, "demarre", rest[i]);
            let d = DeMarreParams {
                coefficient: n(0)?,
                velocity_exponent: n(1)?,
                mass_exponent: n(2)?,
                caliber_exponent: n(3)?,
                reference_velocity_mps: n(4)?,
                reference_caliber_mm: n(5)?,
                penetrator_mass_kg: n(6)?,
                penetrator_caliber_mm: n(7)?,
            };
            match label {
                "AP" => ProjectileKind::Ap { demarre: d },
                "APHE" => ProjectileKind::Aphe { demarre: d },
                _ => ProjectileKind::Apcr { demarre: d },
            }
        }
        ("APDS" | "APFSDS", "series") => {
            let joined = rest.join(":");
            let mut points = Vec::new();
            for pair in joined.split(',').filter(|s| !s.is_empty()) {
                let (v, p) = pair
                    .split_once('/')
                    .ok_or_else(|| syntax(line, format!("bad series point '{}'", pair)))?;
                points.push((num(line, "series", v)?, num(line, "series", p)?));
            }
            let armor_power = ArmorPowerSeries::new(points).map_err(|e| syntax(line, e))?;
            if label == "APDS" {
                ProjectileKind::Apds { armor_power }
            } else {
                ProjectileKind::Apfsds { armor_power }
            }
        }
        ("HE", "he") => ProjectileKind::He,
        ("HEAT", "heat") => ProjectileKind::Heat {
            armor_power_mm: num(line, "heat", rest.first().copied().unwrap_or(""))?,
        },
        ("ROCKET", "rocket") => {
            if rest.len() != 4 {
                return Err(syntax(line, "rocket law needs 4 values"));
            }
            ProjectileKind::Rocket(RocketParams {
                end_speed_mps: num(line, "rocket end speed", rest[0])?,
                burn_time_s: num(line, "rocket burn time", rest[1])?,
                max_distance_m: opt_num(line, "rocket max distance", rest[2])?,
                armor_power_mm: opt_num(line, "rocket armor power", rest[3])?,
            })
        }
        ("UNRESOLVED", "unresolved") => ProjectileKind::Unresolved,
        _ => {
            return Err(syntax(
                line,
                format!("law '{}' does not match kind '{}'", tag, label),
            ))
        }
    };
    Ok(kind)
}

pub fn parse_legacy(text: &str) -> Result<VehicleData, ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let (n, header) = lines.next().ok_or(ParseError::UnexpectedEof)?;
    let f: Vec<&str> = header.split(';').collect();
    if f.len() != VEHICLE_FIELDS || f[0] != "VEHICLE" {
        return Err(syntax(n, "expected VEHICLE;id;name;zooms;laser"));
    }
    let zoom_levels = f[3]
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| num(n, "zoom", s))
        .collect::<Result<Vec<_>, _>>()?;
    let mut vehicle = VehicleData {
        id: f[1].to_string(),
        name: f[2].to_string(),
        zoom_levels,
        has_laser: flag(n, "laser", f[4])?,
        projectiles: Vec::new(),
    };

    for (n, line) in lines {
        let f: Vec<&str> = line.split(';').collect();
        if f.len() != PROJECTILE_FIELDS || f[0] != "PROJECTILE" {
            return Err(syntax(n, format!("expected {} PROJECTILE fields", PROJECTILE_FIELDS)));
        }
        let weapon_slot = f[1]
            .trim()
            .parse::<u32>()
            .map_err(|_| syntax(n, format!("slot is not an integer: '{}'", f[1])))?;
        vehicle.projectiles.push(ProjectileEntry {
            id: f[2].to_string(),
            display_name: f[3].to_string(),
            weapon_slot,
            weapon_blk: String::new(),
            source_type: f[4].to_string(),
            kind: parse_law(n, f[5], f[12])?,
            velocity_mps: num(n, "velocity", f[6])?,
            caliber_mm: num(n, "caliber", f[7])?,
            mass_kg: num(n, "mass", f[8])?,
            drag_cx: num(n, "cx", f[9])?,
            he_filler_kg: opt_num(n, "filler", f[10])?,
            double_shell: flag(n, "double", f[11])?,
        });
    }
    Ok(vehicle)
}
