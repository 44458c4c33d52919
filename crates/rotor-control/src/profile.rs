//! Path Profiler
//!
//! Picks the whole-turn azimuth offset that lets the rest of the pass run
//! inside the rotator's travel without unwinding mid-pass, staying as close
//! to 0° as the limits allow.

use chrono::{DateTime, Utc};
use orbital_mechanics::Pass;
use tracing::{debug, warn};

use crate::angle::{smooth, turns_down_to, turns_up_to};
use crate::config::RotatorLimits;

const CANDIDATE_OFFSETS: [f64; 3] = [-360.0, 0.0, 360.0];

#[derive(Debug, Default)]
pub struct PathProfiler {
    /// Pass already reported as not fitting, keyed by satellite and AOS
    unfit_pass: Option<(u32, DateTime<Utc>)>,
}

impl PathProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset to add to `sample_az` so the whole pass fits the limits.
    /// Zero when there is no pass or no candidate fits.
    pub fn offset(&mut self, pass: Option<&Pass>, sample_az: f64, limits: &RotatorLimits) -> f64 {
        let Some(pass) = pass else {
            return 0.0;
        };
        let Some((min_env, max_env)) = envelope(pass) else {
            return 0.0;
        };
        if !sample_az.is_finite() {
            return 0.0;
        }
        let (min_env, max_env) = straddle(min_env, max_env, sample_az);

        match choose_offset(min_env, max_env, limits) {
            Some(offset) => {
                debug!(
                    "Path profiled: envelope [{:.1}, {:.1}] offset {}",
                    min_env + offset,
                    max_env + offset,
                    offset
                );
                offset
            }
            None => {
                let key = (pass.norad_id, pass.aos);
                if self.unfit_pass != Some(key) {
                    warn!(
                        "Pass envelope [{:.1}, {:.1}] does not fit azimuth limits [{}, {}]",
                        min_env, max_env, limits.min_az, limits.max_az
                    );
                    self.unfit_pass = Some(key);
                }
                0.0
            }
        }
    }
}

/// Continuous azimuth span of the pass details, each sample smoothed
/// against its predecessor
fn envelope(pass: &Pass) -> Option<(f64, f64)> {
    let first = pass.details.first()?.azimuth_deg;
    let mut last = first;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for detail in &pass.details {
        let az = smooth(last, detail.azimuth_deg);
        min = min.min(az);
        max = max.max(az);
        last = az;
    }
    Some((min, max))
}

/// Shift the envelope by whole turns until it covers `sample_az`
fn straddle(min: f64, max: f64, sample_az: f64) -> (f64, f64) {
    let shifted = turns_down_to(min, sample_az);
    let (min, max) = (shifted, max + (shifted - min));
    let shifted = turns_up_to(max, sample_az);
    (min + (shifted - max), shifted)
}

/// Candidate with the smallest excursion from 0° whose shifted envelope is
/// strictly inside the limits
fn choose_offset(min_env: f64, max_env: f64, limits: &RotatorLimits) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for offset in CANDIDATE_OFFSETS {
        let low = min_env + offset;
        let high = max_env + offset;
        if low > limits.min_az && high < limits.max_az {
            let stretch = low.abs().max(high.abs());
            if best.map_or(true, |(s, _)| stretch < s) {
                best = Some((stretch, offset));
            }
        }
    }
    best.map(|(_, offset)| offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{synthetic_pass, t0};
    use chrono::Duration;

    fn limits(min_az: f64, max_az: f64) -> RotatorLimits {
        RotatorLimits {
            min_az,
            max_az,
            min_el: 0.0,
            max_el: 90.0,
        }
    }

    fn pass(azimuths: &[f64]) -> Pass {
        synthetic_pass(t0(), t0() + Duration::minutes(10), azimuths)
    }

    #[test]
    fn test_envelope_smooths_north_crossing() {
        let p = pass(&[300.0, 330.0, 0.0, 30.0]);
        assert_eq!(envelope(&p), Some((300.0, 390.0)));
    }

    #[test]
    fn test_only_positive_turn_fits() {
        // Envelope [-350, -10] around the sample; only +360 gives [10, 350]
        let p = pass(&[10.0, 90.0, 180.0, 270.0, 350.0]);
        let mut profiler = PathProfiler::new();
        assert_eq!(profiler.offset(Some(&p), -100.0, &limits(0.0, 360.0)), 360.0);
    }

    #[test]
    fn test_prefers_smallest_excursion() {
        // Both [-60, 30] and [300, 390] fit; the one nearer 0° wins
        let p = pass(&[300.0, 330.0, 0.0, 30.0]);
        let mut profiler = PathProfiler::new();
        assert_eq!(profiler.offset(Some(&p), 320.0, &limits(-270.0, 450.0)), -360.0);
    }

    #[test]
    fn test_no_fit_defaults_to_zero() {
        let p = pass(&[300.0, 330.0, 0.0, 30.0]);
        let mut profiler = PathProfiler::new();
        assert_eq!(profiler.offset(Some(&p), 320.0, &limits(0.0, 360.0)), 0.0);
        assert_eq!(profiler.unfit_pass, Some((p.norad_id, p.aos)));
    }

    #[test]
    fn test_limits_are_strict() {
        // [0, 90] touches min_az = 0 and is rejected
        let p = pass(&[0.0, 45.0, 90.0]);
        let mut profiler = PathProfiler::new();
        assert_eq!(profiler.offset(Some(&p), 45.0, &limits(0.0, 360.0)), 0.0);
        assert!(profiler.unfit_pass.is_some());
    }

    #[test]
    fn test_straddle_far_from_envelope() {
        assert_eq!(straddle(10.0, 350.0, -100.0), (-350.0, -10.0));
        assert_eq!(straddle(10.0, 350.0, 1090.0), (1090.0, 1430.0));

        let p = pass(&[10.0, 90.0, 180.0, 270.0, 350.0]);
        let mut profiler = PathProfiler::new();
        assert_eq!(profiler.offset(Some(&p), 1e17, &limits(0.0, 360.0)), 0.0);
    }

    #[test]
    fn test_without_pass() {
        let mut profiler = PathProfiler::new();
        assert_eq!(profiler.offset(None, 123.0, &limits(0.0, 360.0)), 0.0);
    }
}
