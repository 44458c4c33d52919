//! Pass Tracker
//!
//! Keeps one predicted pass for the selected satellite and throws it away
//! as soon as it no longer describes the sky: the station moved, the
//! satellite rose or set unexpectedly, or the next AOS drifted.

use chrono::{DateTime, Duration, Utc};
use orbital_mechanics::{GroundLocation, Pass, Predictor};
use tracing::{debug, info};

use crate::angle::{flip, unwrap_into};
use crate::config::{AzimuthType, RotatorLimits};
use crate::{AzEl, TargetState};

/// Station movement that invalidates a predicted pass
pub const GROUND_DRIFT_KM: f64 = 1.0;

/// Prediction horizon for the next pass
pub const PASS_SEARCH_DAYS: f64 = 3.0;

/// Outcome of a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassChange {
    Kept,
    /// Same pass geometry recomputed; smoothing memory still valid
    Recomputed,
    /// A different pass replaced the cached one; smoothing memory is stale
    Restarted,
}

#[derive(Debug, Default)]
pub struct PassTracker {
    pass: Option<Pass>,
    flipped: bool,
}

impl PassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&self) -> Option<&Pass> {
        self.pass.as_ref()
    }

    pub fn flipped(&self) -> bool {
        self.flipped
    }

    pub fn clear(&mut self) {
        self.pass = None;
        self.flipped = false;
    }

    /// Replace the pass for a freshly selected satellite
    pub fn reset<P: Predictor + ?Sized>(
        &mut self,
        predictor: &P,
        target: &TargetState,
        ground: &GroundLocation,
        t: DateTime<Utc>,
        az_type: AzimuthType,
        az_stop_pos: f64,
    ) {
        let pass = if target.elevation_deg > 0.0 {
            predictor.current_pass(target.norad_id, ground, t)
        } else {
            predictor.next_pass(target.norad_id, ground, t, PASS_SEARCH_DAYS)
        };
        self.install(pass, az_type, az_stop_pos);
    }

    /// Re-evaluate the cached pass against the latest telemetry
    #[allow(clippy::too_many_arguments)]
    pub fn refresh<P: Predictor + ?Sized>(
        &mut self,
        predictor: &P,
        target: &TargetState,
        ground: &GroundLocation,
        t: DateTime<Utc>,
        cycle_ms: u64,
        az_type: AzimuthType,
        az_stop_pos: f64,
    ) -> PassChange {
        let id = target.norad_id;
        let mut change = PassChange::Kept;

        if let Some(pass) = &self.pass {
            if ground.small_distance_km(&pass.ground) > GROUND_DRIFT_KM {
                info!("Ground location moved, recomputing pass for {}", id);
                let pass = predictor.next_pass(id, ground, t, PASS_SEARCH_DAYS);
                self.install(pass, az_type, az_stop_pos);
                change = PassChange::Recomputed;
            }
        }

        let Some(pass) = &self.pass else {
            self.reset(predictor, target, ground, t, az_type, az_stop_pos);
            return PassChange::Recomputed;
        };

        let replacement = if !pass.contains(t) {
            if target.elevation_deg >= 0.0 {
                // Up outside the predicted window, e.g. below the minimum
                // elevation the predictor used
                debug!("{} is up outside its predicted pass", id);
                Some(predictor.current_pass(id, ground, t))
            } else {
                let drift_guard = Duration::milliseconds((cycle_ms / 4) as i64);
                match target.aos {
                    Some(aos) if aos - pass.aos > drift_guard => {
                        debug!("Next AOS of {} moved to {}", id, aos);
                        Some(predictor.next_pass(id, ground, t, PASS_SEARCH_DAYS))
                    }
                    _ => None,
                }
            }
        } else if target.elevation_deg < 0.0 {
            debug!("{} set inside its predicted pass", id);
            Some(predictor.next_pass(id, ground, t, PASS_SEARCH_DAYS))
        } else {
            None
        };

        if let Some(pass) = replacement {
            self.install(pass, az_type, az_stop_pos);
            change = PassChange::Restarted;
        }
        change
    }

    /// Recompute `flipped` after the rotator changed
    pub fn update_flipped(&mut self, az_type: AzimuthType, az_stop_pos: f64) {
        self.flipped = self
            .pass
            .as_ref()
            .map(|p| is_flipped(p, az_type, az_stop_pos))
            .unwrap_or(false);
    }

    /// Where the antenna should look now, before flip correction.
    ///
    /// Below the horizon the path parks at the AOS or LOS azimuth on the
    /// horizon, depending on which side of the pass `t` is. `None` when the
    /// satellite is down and no pass bounds apply.
    pub fn path_point(&self, target: &TargetState, t: DateTime<Utc>) -> Option<AzEl> {
        if target.elevation_deg >= 0.0 {
            return Some(target.position());
        }
        let pass = self.pass.as_ref()?;
        if t < pass.aos {
            Some(AzEl::new(pass.aos_az, 0.0))
        } else if t > pass.los {
            Some(AzEl::new(pass.los_az, 0.0))
        } else {
            None
        }
    }

    /// Path point with the over-the-top correction applied when the pass
    /// is flipped and the rotator can reach it
    pub fn corrected_path_point(
        &self,
        target: &TargetState,
        t: DateTime<Utc>,
        limits: &RotatorLimits,
    ) -> Option<AzEl> {
        let point = self.path_point(target, t)?;
        if self.flipped && limits.supports_flip() {
            Some(flip(point))
        } else {
            Some(point)
        }
    }

    fn install(&mut self, pass: Option<Pass>, az_type: AzimuthType, az_stop_pos: f64) {
        self.pass = pass;
        self.update_flipped(az_type, az_stop_pos);
    }
}

/// A pass is flipped when, folded onto the rotator's azimuth range, two
/// consecutive samples are more than 180° apart: following it would run
/// through the mechanical stop.
pub fn is_flipped(pass: &Pass, az_type: AzimuthType, az_stop_pos: f64) -> bool {
    let (min, max) = az_type.base_range();
    let offset = az_stop_pos - min;
    let (min, max) = (min + offset, max + offset);

    let mut flipped = false;
    let mut last = unwrap_into(pass.aos_az, min, max);

    let n = pass.details.len();
    if n > 1 {
        for detail in &pass.details[1..n - 1] {
            let az = unwrap_into(detail.azimuth_deg, min, max);
            if (az - last).abs() > 180.0 {
                flipped = true;
            }
            last = az;
        }
    }

    let los = unwrap_into(pass.los_az, min, max);
    if (los - last).abs() > 180.0 {
        flipped = true;
    }
    flipped
}
