//! Angle Ring Math
//!
//! Pure helpers for a 360° periodic azimuth scale. Smoothed azimuths may
//! leave [0, 360) on purpose so that a pass crossing due north stays
//! continuous; only the display projection folds them back.

use crate::config::AzimuthType;
use crate::AzEl;

/// Smoothing window: a jump larger than this is taken as a seam crossing
const SMOOTH_WINDOW_DEG: f64 = 170.0;

/// Shortest distance between two angles on a 360° ring, in [0, 180]
pub fn ring_abs_diff(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Keep `value` within reach of `reference` across the 0°/360° seam.
///
/// `smooth(350, 5) == 365` and `smooth(5, 350) == -10`.
pub fn smooth(reference: f64, value: f64) -> f64 {
    if reference + SMOOTH_WINDOW_DEG < value {
        value - 360.0
    } else if reference - SMOOTH_WINDOW_DEG > value {
        value + 360.0
    } else {
        value
    }
}

/// Add turns until non-negative. The upper bound is left alone.
pub fn normalize_positive(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    turns_up_to(angle, 0.0)
}

/// Fold a position into the configured azimuth convention for display.
///
/// Cosmetic only, never fed back into control decisions.
pub fn project_for_display(pos: AzEl, az_type: AzimuthType) -> AzEl {
    let mut az = pos.azimuth_deg;
    if az.is_finite() {
        az = match az_type {
            AzimuthType::Raw => az,
            AzimuthType::ZeroTo360 => turns_down_to(turns_up_to(az, 0.0), 360.0),
            AzimuthType::PlusMinus180 => turns_down_to(turns_up_to(az, -180.0), 180.0),
        };
    }
    AzEl::new(az, pos.elevation_deg)
}

/// Combined az/el distance test, sum of squared ring distances
pub fn within_threshold(a: AzEl, b: AzEl, threshold_deg: f64) -> bool {
    let d_az = ring_abs_diff(a.azimuth_deg, b.azimuth_deg);
    let d_el = ring_abs_diff(a.elevation_deg, b.elevation_deg);
    d_az * d_az + d_el * d_el < threshold_deg * threshold_deg
}

/// Over-the-top pointing: azimuth turned by 180°, elevation mirrored
/// through the zenith.
pub fn flip(pos: AzEl) -> AzEl {
    let az = if pos.azimuth_deg > 180.0 {
        pos.azimuth_deg - 180.0
    } else {
        pos.azimuth_deg + 180.0
    };
    AzEl::new(az, 180.0 - pos.elevation_deg)
}

/// Bring `az` into `[min, max]` by whole turns, assuming the range spans
/// at least 360°.
pub(crate) fn unwrap_into(az: f64, min: f64, max: f64) -> f64 {
    turns_up_to(turns_down_to(az, max), min)
}

/// Fewest whole turns added to `az` to reach at least `min`
pub(crate) fn turns_up_to(az: f64, min: f64) -> f64 {
    if az < min {
        min + (az - min).rem_euclid(360.0)
    } else {
        az
    }
}

/// Fewest whole turns taken from `az` to get down to at most `max`
pub(crate) fn turns_down_to(az: f64, max: f64) -> f64 {
    if az > max {
        max - (max - az).rem_euclid(360.0)
    } else {
        az
    }
}
