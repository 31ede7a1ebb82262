//! Flight models: velocity and time of flight as functions of distance.
//!
//! Both are closed forms of `dv/dt = -k v²`, so the same sample distance
//! always yields the same state regardless of sampling density.

/// Projectile state at a given distance from the muzzle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightState {
    pub velocity_mps: f64,
    pub time_s: f64,
}

pub trait FlightModel: Send + Sync {
    fn at(&self, distance_m: f64) -> FlightState;
}

/// `k = ρ·Cx·A / (2m)` with `A` the caliber cross-section.
pub fn drag_factor(air_density: f64, cx: f64, caliber_mm: f64, mass_kg: f64) -> f64 {
    let radius_m = caliber_mm / 2000.0;
    let area = std::f64::consts::PI * radius_m * radius_m;
    air_density * cx * area / (2.0 * mass_kg)
}

/// Unpowered flight: `v(d) = v0·e^(-kd)`, `t(d) = (e^(kd) - 1) / (k·v0)`.
#[derive(Debug, Clone, Copy)]
pub struct QuadraticDrag {
    v0: f64,
    k: f64,
}

impl QuadraticDrag {
    pub fn new(v0: f64, k: f64) -> Result<Self, String> {
        if !(v0 > 0.0 && v0.is_finite()) {
            return Err(format!("initial velocity must be positive, got {}", v0));
        }
        if !(k >= 0.0 && k.is_finite()) {
            return Err(format!("drag factor must be finite and non-negative, got {}", k));
        }
        Ok(Self { v0, k })
    }
}

impl FlightModel for QuadraticDrag {
    fn at(&self, distance_m: f64) -> FlightState {
        let kd = self.k * distance_m;
        let time_s = if self.k == 0.0 {
            distance_m / self.v0
        } else {
            kd.exp_m1() / (self.k * self.v0)
        };
        FlightState {
            velocity_mps: self.v0 * (-kd).exp(),
            time_s,
        }
    }
}

/// Rocket: speed changes linearly from launch to end speed over the burn,
/// then coasts under the same drag as a shell.
#[derive(Debug, Clone, Copy)]
pub struct RocketBoost {
    launch_mps: f64,
    burn_s: f64,
    accel: f64,
    boost_distance_m: f64,
    coast: QuadraticDrag,
}

impl RocketBoost {
    pub fn new(launch_mps: f64, end_mps: f64, burn_s: f64, k: f64) -> Result<Self, String> {
        let coast = QuadraticDrag::new(end_mps, k)
            .map_err(|e| format!("rocket end speed: {}", e))?;
        let launch_mps = launch_mps.max(0.0);
        let burn_s = if burn_s.is_finite() { burn_s.max(0.0) } else { 0.0 };
        let (accel, boost_distance_m) = if burn_s > 0.0 {
            ((end_mps - launch_mps) / burn_s, (launch_mps + end_mps) / 2.0 * burn_s)
        } else {
            (0.0, 0.0)
        };
        Ok(Self {
            launch_mps,
            burn_s,
            accel,
            boost_distance_m,
            coast,
        })
    }
}

impl FlightModel for RocketBoost {
    fn at(&self, distance_m: f64) -> FlightState {
        if self.burn_s > 0.0 && distance_m <= self.boost_distance_m {
            let v0 = self.launch_mps;
            let a = self.accel;
            let t = if a.abs() < 1e-9 {
                distance_m / v0
            } else {
                (-v0 + (v0 * v0 + 2.0 * a * distance_m).max(0.0).sqrt()) / a
            };
            return FlightState {
                velocity_mps: v0 + a * t,
                time_s: t,
            };
        }
        let coast = self.coast.at(distance_m - self.boost_distance_m);
        FlightState {
            velocity_mps: coast.velocity_mps,
            time_s: self.burn_s + coast.time_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_drag_is_constant_speed() {
        let m = QuadraticDrag::new(800.0, 0.0).unwrap();
        let s = m.at(1600.0);
        assert!((s.velocity_mps - 800.0).abs() < 1e-12);
        assert!((s.time_s - 2.0).abs() < 1e-12);
    }

    #[test]
    fn drag_decays_velocity() {
        let k = drag_factor(1.225, 0.3, 76.2, 6.3);
        let m = QuadraticDrag::new(792.0, k).unwrap();
        let near = m.at(500.0);
        let far = m.at(1000.0);
        assert!(far.velocity_mps < near.velocity_mps);
        assert!(far.time_s > near.time_s);
        assert!((far.velocity_mps - 792.0 * (-k * 1000.0).exp()).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_velocity() {
        assert!(QuadraticDrag::new(0.0, 0.001).is_err());
    }

    #[test]
    fn rocket_boost_then_coast() {
        let r = RocketBoost::new(100.0, 300.0, 2.0, 0.0).unwrap();
        // Boost covers (100 + 300) / 2 * 2 = 400 m.
        let end = r.at(400.0);
        assert!((end.time_s - 2.0).abs() < 1e-9);
        assert!((end.velocity_mps - 300.0).abs() < 1e-9);
        let later = r.at(700.0);
        assert!((later.time_s - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rocket_without_burn_starts_at_end_speed() {
        let r = RocketBoost::new(0.0, 250.0, 0.0, 0.0).unwrap();
        assert!((r.at(500.0).time_s - 2.0).abs() < 1e-12);
    }
}
