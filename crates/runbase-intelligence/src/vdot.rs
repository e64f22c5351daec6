// ABOUTME: VDOT (VO2max running) calculation with Daniels and Riegel methods plus training zones
// ABOUTME: Derives per-zone training paces, zone boundaries, and pace classification from a VDOT value
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use runbase_core::errors::{AppError, AppResult};
use runbase_core::models::PaceZone;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// VDOT calculation algorithm selection
///
/// - `Daniels`: Daniels–Gilbert oxygen cost and drop-dead curves
/// - `Riegel`: Power-law model (T2 = T1 x (D2/D1)^1.06), anchored on a 10K equivalent
///
/// # Scientific References
///
/// - Daniels, J. & Gilbert, J. (1979). "Oxygen Power: Performance Tables for Distance Runners."
/// - Riegel, P.S. (1981). "Athletic records and human endurance." *American Scientist*, 69(3), 285-290.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VdotAlgorithm {
    /// Daniels–Gilbert formula
    ///
    /// VO2 = -4.60 + 0.182258 x v + 0.000104 x v², divided by the fraction of
    /// VO2max sustainable for the race duration:
    /// 0.8 + 0.1894393 x e^(-0.012778 t) + 0.2989558 x e^(-0.1932605 t)
    #[default]
    Daniels,

    /// Riegel power-law formula
    Riegel {
        /// Exponent for power-law (default 1.06, can vary by athlete: 1.03-1.08)
        exponent: f64,
    },
}

/// Minimum velocity for VDOT calculation (m/min)
const MIN_VELOCITY: f64 = 100.0;

/// Maximum velocity for VDOT calculation (m/min)
const MAX_VELOCITY: f64 = 500.0;

/// Daniels' VO2 formula coefficient for velocity squared term
const DANIELS_A: f64 = 0.000_104;

/// Daniels' VO2 formula coefficient for velocity term
const DANIELS_B: f64 = 0.182_258;

/// Daniels' VO2 formula constant term
const DANIELS_C: f64 = -4.60;

/// Plausible VDOT range accepted for zone derivation
const MIN_VDOT: f64 = 10.0;
const MAX_VDOT: f64 = 100.0;

/// Reference distance for Riegel conversions
const REFERENCE_DISTANCE_M: f64 = 10_000.0;

impl VdotAlgorithm {
    /// Calculate VDOT from race performance
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if:
    /// - Time or distance is non-positive
    /// - Velocity is outside valid range (100-500 m/min)
    pub fn calculate_vdot(&self, distance_meters: f64, time_seconds: f64) -> AppResult<f64> {
        if time_seconds <= 0.0 {
            return Err(AppError::invalid_input("Time must be positive"));
        }

        if distance_meters <= 0.0 {
            return Err(AppError::invalid_input("Distance must be positive"));
        }

        match self {
            Self::Daniels => Self::calculate_daniels(distance_meters, time_seconds),
            Self::Riegel { exponent } => {
                let equivalent =
                    time_seconds * (REFERENCE_DISTANCE_M / distance_meters).powf(*exponent);
                Self::calculate_daniels(REFERENCE_DISTANCE_M, equivalent)
            }
        }
    }

    /// Predict race time for target distance given VDOT
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if VDOT is outside the plausible range or the
    /// distance is non-positive
    pub fn predict_time(&self, vdot: f64, target_distance_meters: f64) -> AppResult<f64> {
        validate_vdot(vdot)?;
        if target_distance_meters <= 0.0 {
            return Err(AppError::invalid_input("Distance must be positive"));
        }

        match self {
            Self::Daniels => Ok(Self::predict_time_daniels(vdot, target_distance_meters)),
            Self::Riegel { exponent } => {
                let reference = Self::predict_time_daniels(vdot, REFERENCE_DISTANCE_M);
                Ok(reference * (target_distance_meters / REFERENCE_DISTANCE_M).powf(*exponent))
            }
        }
    }

    /// Calculate VDOT using Daniels formula
    fn calculate_daniels(distance_meters: f64, time_seconds: f64) -> AppResult<f64> {
        let time_minutes = time_seconds / 60.0;
        let velocity = distance_meters / time_minutes;

        if !(MIN_VELOCITY..=MAX_VELOCITY).contains(&velocity) {
            return Err(AppError::invalid_input(format!(
                "Velocity {velocity:.1} m/min is outside valid range ({MIN_VELOCITY}-{MAX_VELOCITY})"
            )));
        }

        Ok(oxygen_cost(velocity) / fraction_sustainable(time_minutes))
    }

    /// Predict race time by bisection on the monotone time → VDOT curve
    fn predict_time_daniels(vdot: f64, distance_meters: f64) -> f64 {
        // VDOT falls as time grows, so the root is bracketed by these velocities
        let mut fast = distance_meters / MAX_VELOCITY * 60.0;
        let mut slow = distance_meters / MIN_VELOCITY * 60.0;
        for _ in 0..80 {
            let mid = (fast + slow) / 2.0;
            let minutes = mid / 60.0;
            let estimate = oxygen_cost(distance_meters / minutes) / fraction_sustainable(minutes);
            if estimate > vdot {
                fast = mid;
            } else {
                slow = mid;
            }
        }
        (fast + slow) / 2.0
    }
}

impl FromStr for VdotAlgorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daniels" => Ok(Self::Daniels),
            "riegel" => Ok(Self::Riegel { exponent: 1.06 }),
            other => Err(AppError::invalid_input(format!(
                "Unknown VDOT algorithm: {other}. Valid options: daniels, riegel"
            ))),
        }
    }
}

/// Oxygen cost of running at `velocity` m/min
fn oxygen_cost(velocity: f64) -> f64 {
    (DANIELS_A * velocity).mul_add(velocity, DANIELS_B.mul_add(velocity, DANIELS_C))
}

/// Fraction of VO2max sustainable for `time_minutes`
fn fraction_sustainable(time_minutes: f64) -> f64 {
    0.298_955_8f64.mul_add(
        (-0.193_260_5 * time_minutes).exp(),
        0.189_439_3f64.mul_add((-0.012_778 * time_minutes).exp(), 0.8),
    )
}

/// Velocity (m/min) at which oxygen cost equals `vo2`
fn velocity_for_vo2(vo2: f64) -> AppResult<f64> {
    let c = -(vo2 - DANIELS_C);
    let discriminant = DANIELS_B.mul_add(DANIELS_B, -(4.0 * DANIELS_A * c));
    if discriminant < 0.0 {
        return Err(AppError::internal("Invalid VDOT calculation"));
    }
    Ok((-DANIELS_B + discriminant.sqrt()) / (2.0 * DANIELS_A))
}

/// Pace in seconds per kilometer for a velocity in m/min
fn pace_for_velocity(velocity: f64) -> f64 {
    60_000.0 / velocity
}

fn validate_vdot(vdot: f64) -> AppResult<()> {
    if !(MIN_VDOT..=MAX_VDOT).contains(&vdot) || !vdot.is_finite() {
        return Err(AppError::out_of_range(format!(
            "VDOT {vdot:.1} is outside plausible range ({MIN_VDOT}-{MAX_VDOT})"
        )));
    }
    Ok(())
}

fn pace_at_fraction(vdot: f64, fraction: f64) -> AppResult<f64> {
    velocity_for_vo2(vdot * fraction).map(pace_for_velocity)
}

/// Fraction of VO2max for each training pace
mod zone_fraction {
    pub const EASY: f64 = 0.70;
    pub const MARATHON: f64 = 0.82;
    pub const THRESHOLD: f64 = 0.88;
    // ~97.5-98.1% across VDOTs, not 100%
    pub const INTERVAL: f64 = 0.98;
    pub const REPETITION: f64 = 1.075;
    pub const FAST_REPETITION: f64 = 1.15;

    pub const EASY_MARATHON: f64 = 0.76;
    pub const MARATHON_THRESHOLD: f64 = 0.85;
    pub const THRESHOLD_INTERVAL: f64 = 0.93;
}

/// Target training paces in seconds per kilometer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingPaces {
    /// Easy pace
    pub easy: f64,
    /// Marathon pace
    pub marathon: f64,
    /// Threshold pace
    pub threshold: f64,
    /// Interval pace
    pub interval: f64,
    /// Repetition pace
    pub repetition: f64,
    /// Fast repetition pace
    pub fast_repetition: f64,
}

impl TrainingPaces {
    /// Derive training paces from a VDOT value
    ///
    /// # Errors
    ///
    /// Returns an error if the VDOT is outside the plausible range
    pub fn from_vdot(vdot: f64) -> AppResult<Self> {
        validate_vdot(vdot)?;
        Ok(Self {
            easy: pace_at_fraction(vdot, zone_fraction::EASY)?,
            marathon: pace_at_fraction(vdot, zone_fraction::MARATHON)?,
            threshold: pace_at_fraction(vdot, zone_fraction::THRESHOLD)?,
            interval: pace_at_fraction(vdot, zone_fraction::INTERVAL)?,
            repetition: pace_at_fraction(vdot, zone_fraction::REPETITION)?,
            fast_repetition: pace_at_fraction(vdot, zone_fraction::FAST_REPETITION)?,
        })
    }
}

/// Pace boundaries between adjacent zones (seconds per kilometer)
///
/// A pace at or slower than a boundary belongs to the slower zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBoundaries {
    /// Walking threshold
    pub walk: f64,
    /// Easy / marathon boundary
    pub easy_marathon: f64,
    /// Marathon / threshold boundary
    pub marathon_threshold: f64,
    /// Threshold / interval boundary
    pub threshold_interval: f64,
    /// Interval / repetition boundary
    pub interval_repetition: f64,
    /// Repetition / fast repetition boundary
    pub repetition_fast: f64,
}

impl ZoneBoundaries {
    /// Derive zone boundaries from a VDOT and a walking threshold
    ///
    /// # Errors
    ///
    /// Returns an error if the VDOT is outside the plausible range
    pub fn from_vdot(vdot: f64, walking_threshold_s_per_km: f64) -> AppResult<Self> {
        let paces = TrainingPaces::from_vdot(vdot)?;
        Ok(Self {
            walk: walking_threshold_s_per_km,
            easy_marathon: pace_at_fraction(vdot, zone_fraction::EASY_MARATHON)?,
            marathon_threshold: pace_at_fraction(vdot, zone_fraction::MARATHON_THRESHOLD)?,
            threshold_interval: pace_at_fraction(vdot, zone_fraction::THRESHOLD_INTERVAL)?,
            interval_repetition: (paces.interval + paces.repetition) / 2.0,
            repetition_fast: (paces.repetition + paces.fast_repetition) / 2.0,
        })
    }

    /// Classify a pace into a training zone
    #[must_use]
    pub fn classify(&self, pace_s_per_km: f64) -> PaceZone {
        if pace_s_per_km >= self.walk {
            PaceZone::Walk
        } else if pace_s_per_km >= self.easy_marathon {
            PaceZone::Easy
        } else if pace_s_per_km >= self.marathon_threshold {
            PaceZone::Marathon
        } else if pace_s_per_km >= self.threshold_interval {
            PaceZone::Threshold
        } else if pace_s_per_km >= self.interval_repetition {
            PaceZone::Interval
        } else if pace_s_per_km >= self.repetition_fast {
            PaceZone::Repetition
        } else {
            PaceZone::FastRepetition
        }
    }
}

/// Format a pace as `m:ss /km`
#[must_use]
pub fn format_pace(seconds_per_km: f64) -> String {
    let total = seconds_per_km.round() as u64;
    format!("{}:{:02} /km", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daniels_5k_twenty_minutes() {
        let vdot = VdotAlgorithm::Daniels.calculate_vdot(5_000.0, 1_200.0).unwrap();
        assert!((vdot - 49.8).abs() < 0.1, "vdot was {vdot}");
    }

    #[test]
    fn test_predict_inverts_calculate() {
        let algo = VdotAlgorithm::Daniels;
        let time = algo.predict_time(49.81, 5_000.0).unwrap();
        assert!((time - 1_200.0).abs() < 2.0, "time was {time}");
    }

    #[test]
    fn test_riegel_longer_race_is_slower() {
        let algo = VdotAlgorithm::Riegel { exponent: 1.06 };
        let ten_k = algo.predict_time(50.0, 10_000.0).unwrap();
        let half = algo.predict_time(50.0, 21_097.5).unwrap();
        assert!(half > ten_k * 2.0);
    }

    #[test]
    fn test_rejects_implausible_velocity() {
        assert!(VdotAlgorithm::Daniels.calculate_vdot(100.0, 1.0).is_err());
        assert!(VdotAlgorithm::Daniels.calculate_vdot(5_000.0, 0.0).is_err());
    }

    #[test]
    fn test_training_paces_are_ordered() {
        let paces = TrainingPaces::from_vdot(50.0).unwrap();
        assert!(paces.easy > paces.marathon);
        assert!(paces.marathon > paces.threshold);
        assert!(paces.threshold > paces.interval);
        assert!(paces.interval > paces.repetition);
        assert!(paces.repetition > paces.fast_repetition);
        // Daniels' tables list threshold for VDOT 50 at roughly 4:15 /km
        assert!((paces.threshold - 255.0).abs() < 6.0, "T pace {}", paces.threshold);
    }

    #[test]
    fn test_classify_pace() {
        let b = ZoneBoundaries::from_vdot(50.0, 410.0).unwrap();
        assert_eq!(b.classify(420.0), PaceZone::Walk);
        assert_eq!(b.classify(330.0), PaceZone::Easy);
        assert_eq!(b.classify(255.0), PaceZone::Threshold);
        assert_eq!(b.classify(215.0), PaceZone::Repetition);
        assert_eq!(b.classify(150.0), PaceZone::FastRepetition);
    }

    #[test]
    fn test_format_pace() {
        assert_eq!(format_pace(255.4), "4:15 /km");
    }
}
