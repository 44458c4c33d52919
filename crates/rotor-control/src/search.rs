//! Future Target Search
//!
//! Bisection along the satellite's future track for the furthest point that
//! is still inside the threshold disk around the current path point. Driving
//! there keeps the rotor ahead of the satellite without overshooting.

use chrono::{DateTime, Duration, Utc};
use orbital_mechanics::{GroundLocation, Predictor};
use tracing::trace;

use crate::angle::{flip, within_threshold};
use crate::AzEl;

/// Look-ahead when no pass bounds the search
const DEFAULT_HORIZON_SECS: f64 = 20.0 * 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub threshold_deg: f64,
    pub cycle_ms: u64,
    /// Apply the over-the-top transform to propagated points
    pub flip: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    pub target: AzEl,
    pub halvings: u32,
    /// Accepted look-ahead in seconds
    pub elapsed: f64,
}

/// Search the track of `norad_id` after `t` for the next rotor target.
///
/// `los` bounds the horizon when a pass is known. Points outside
/// `0..=180°` elevation are never accepted. Without any accepted point the
/// path point itself is returned.
#[allow(clippy::too_many_arguments)]
pub fn future_target<P: Predictor + ?Sized>(
    predictor: &P,
    norad_id: u32,
    ground: &GroundLocation,
    t: DateTime<Utc>,
    los: Option<DateTime<Utc>>,
    path: AzEl,
    params: &SearchParams,
) -> SearchOutcome {
    let tick_secs = params.cycle_ms as f64 / 1000.0;

    let horizon = match los {
        Some(los) => (los - t).num_milliseconds() as f64 / 1000.0,
        None => DEFAULT_HORIZON_SECS,
    };
    let mut step = (horizon / 2.0).max(tick_secs / 2.0);
    let min_step = tick_secs / 4.0;

    let mut elapsed = 0.0;
    let mut best = None;
    let mut halvings = 0;

    while step > min_step {
        let at = t + Duration::microseconds(((elapsed + step) * 1e6) as i64);
        let Some(angles) = predictor.look_angles(norad_id, ground, at) else {
            break;
        };
        let mut point = AzEl::new(angles.azimuth_deg, angles.elevation_deg);
        if params.flip {
            point = flip(point);
        }

        if (0.0..=180.0).contains(&point.elevation_deg)
            && within_threshold(path, point, params.threshold_deg)
        {
            elapsed += step;
            best = Some(point);
        }
        step /= 2.0;
        halvings += 1;
    }

    trace!(
        "Future target for {}: {:.1}s ahead after {} halvings",
        norad_id,
        elapsed,
        halvings
    );

    SearchOutcome {
        target: best.unwrap_or(path),
        halvings,
        elapsed,
    }
}
