//! Pass Prediction
//!
//! Finds AOS/LOS windows for a satellite over a ground location and samples
//! the az/el track in between. The `Predictor` trait is the seam the rotor
//! controller consumes; `Sgp4Predictor` is the SGP4-backed implementation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::{propagation, transforms, GroundLocation, LookAngles, Result, Satellite};

/// Coarse step when scanning for horizon crossings
const SCAN_STEP_SECS: i64 = 60;

/// Crossing times are refined to this resolution
const REFINE_RESOLUTION_MS: i64 = 100;

/// Target spacing of pass detail samples
const DETAIL_SPACING_SECS: i64 = 20;

const MIN_DETAIL_SAMPLES: i64 = 10;

/// One sample of a predicted pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassDetail {
    pub time: DateTime<Utc>,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

/// A predicted satellite pass (AOS to LOS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pass {
    pub norad_id: u32,
    pub aos: DateTime<Utc>,
    pub los: DateTime<Utc>,
    pub tca: DateTime<Utc>, // Time of Closest Approach
    pub aos_az: f64,
    pub los_az: f64,
    pub max_el: f64,
    /// Time-ordered samples from AOS to LOS
    pub details: Vec<PassDetail>,
    /// Ground location the pass was computed for
    pub ground: GroundLocation,
}

impl Pass {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.aos <= t && t <= self.los
    }

    pub fn duration(&self) -> Duration {
        self.los - self.aos
    }
}

/// Orbit prediction collaborator
pub trait Predictor {
    /// Look angles of a satellite at `t`, `None` if unknown or not propagatable
    fn look_angles(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<LookAngles>;

    /// The pass in progress at `t`, or the next one if the satellite is down
    fn current_pass(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<Pass>;

    /// The first pass starting after `t` within `days_ahead`
    fn next_pass(
        &self,
        norad_id: u32,
        ground: &GroundLocation,
        t: DateTime<Utc>,
        days_ahead: f64,
    ) -> Option<Pass>;
}

struct Tracked {
    satellite: Satellite,
    constants: sgp4::Constants,
    epoch: DateTime<Utc>,
}

/// SGP4 predictor over a small satellite catalog
pub struct Sgp4Predictor {
    catalog: HashMap<u32, Tracked>,
}

impl Sgp4Predictor {
    pub fn new() -> Self {
        Self {
            catalog: HashMap::new(),
        }
    }

    pub fn with_satellites(satellites: impl IntoIterator<Item = Satellite>) -> Result<Self> {
        let mut predictor = Self::new();
        for sat in satellites {
            predictor.insert(sat)?;
        }
        Ok(predictor)
    }

    pub fn insert(&mut self, satellite: Satellite) -> Result<()> {
        let elements = sgp4::Elements::from_tle(
            Some(satellite.name.clone()),
            satellite.tle_line1.as_bytes(),
            satellite.tle_line2.as_bytes(),
        )
        .map_err(|e| crate::OrbitalError::InvalidTle(format!("{:?}", e)))?;
        let constants = sgp4::Constants::from_elements(&elements)
            .map_err(|e| crate::OrbitalError::PropagationFailed(format!("{:?}", e)))?;
        let epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

        self.catalog.insert(
            satellite.norad_id,
            Tracked {
                satellite,
                constants,
                epoch,
            },
        );
        Ok(())
    }

    pub fn satellite(&self, norad_id: u32) -> Option<&Satellite> {
        self.catalog.get(&norad_id).map(|t| &t.satellite)
    }

    /// Catalog numbers sorted by satellite name
    pub fn catalog_numbers(&self) -> Vec<u32> {
        let mut sats: Vec<&Satellite> = self.catalog.values().map(|t| &t.satellite).collect();
        sats.sort_by(|a, b| a.name.cmp(&b.name));
        sats.into_iter().map(|s| s.norad_id).collect()
    }

    fn angles(&self, tracked: &Tracked, ground: &GroundLocation, t: DateTime<Utc>) -> Option<LookAngles> {
        match propagation::propagate_constants(&tracked.constants, tracked.epoch, t) {
            Ok(state) => Some(transforms::teme_to_look_angles(&state, ground)),
            Err(e) => {
                warn!("Propagation of {} failed: {}", tracked.satellite.norad_id, e);
                None
            }
        }
    }

    fn is_up(&self, tracked: &Tracked, ground: &GroundLocation, t: DateTime<Utc>) -> Option<bool> {
        self.angles(tracked, ground, t).map(|a| a.elevation_deg > 0.0)
    }

    /// Bisect a horizon crossing between `lo` (state `lo_up`) and `hi`.
    fn refine_crossing(
        &self,
        tracked: &Tracked,
        ground: &GroundLocation,
        mut lo: DateTime<Utc>,
        mut hi: DateTime<Utc>,
        lo_up: bool,
    ) -> DateTime<Utc> {
        while (hi - lo).num_milliseconds() > REFINE_RESOLUTION_MS {
            let mid = lo + (hi - lo) / 2;
            match self.is_up(tracked, ground, mid) {
                Some(up) if up == lo_up => lo = mid,
                Some(_) => hi = mid,
                None => break,
            }
        }
        if lo_up { lo } else { hi }
    }

    /// Scan forward from `start` for the next rising edge before `limit`.
    fn find_aos(
        &self,
        tracked: &Tracked,
        ground: &GroundLocation,
        start: DateTime<Utc>,
        limit: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let step = Duration::seconds(SCAN_STEP_SECS);
        let mut t = start;
        let mut was_up = self.is_up(tracked, ground, t)?;

        // Skip a pass already in progress
        while was_up {
            t += step;
            if t > limit {
                return None;
            }
            was_up = self.is_up(tracked, ground, t)?;
        }

        while t < limit {
            let next = t + step;
            if self.is_up(tracked, ground, next)? {
                return Some(self.refine_crossing(tracked, ground, t, next, false));
            }
            t = next;
        }
        None
    }

    /// Scan forward from an instant where the satellite is up to its LOS.
    fn find_los(&self, tracked: &Tracked, ground: &GroundLocation, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let step = Duration::seconds(SCAN_STEP_SECS);
        // LEO passes are short; a day bounds geostationary-like cases
        let limit = from + Duration::days(1);
        let mut t = from;
        while t < limit {
            let next = t + step;
            if !self.is_up(tracked, ground, next)? {
                return Some(self.refine_crossing(tracked, ground, t, next, true));
            }
            t = next;
        }
        None
    }

    /// Walk back from an instant where the satellite is up to its AOS.
    fn find_previous_aos(&self, tracked: &Tracked, ground: &GroundLocation, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let step = Duration::seconds(SCAN_STEP_SECS);
        let limit = from - Duration::days(1);
        let mut t = from;
        while t > limit {
            let prev = t - step;
            if !self.is_up(tracked, ground, prev)? {
                return Some(self.refine_crossing(tracked, ground, prev, t, false));
            }
            t = prev;
        }
        None
    }

    fn build_pass(
        &self,
        tracked: &Tracked,
        ground: &GroundLocation,
        aos: DateTime<Utc>,
        los: DateTime<Utc>,
    ) -> Option<Pass> {
        let span_ms = (los - aos).num_milliseconds().max(0);
        let samples = (span_ms / (DETAIL_SPACING_SECS * 1000)).max(MIN_DETAIL_SAMPLES);

        let mut details = Vec::with_capacity(samples as usize + 1);
        let mut max_el = f64::MIN;
        let mut tca = aos;
        for i in 0..=samples {
            let t = aos + Duration::milliseconds(span_ms * i / samples);
            let angles = self.angles(tracked, ground, t)?;
            if angles.elevation_deg > max_el {
                max_el = angles.elevation_deg;
                tca = t;
            }
            details.push(PassDetail {
                time: t,
                azimuth_deg: angles.azimuth_deg,
                elevation_deg: angles.elevation_deg,
            });
        }

        let aos_az = details.first()?.azimuth_deg;
        let los_az = details.last()?.azimuth_deg;

        debug!(
            "Pass for {}: AOS {} ({:.1}°) LOS {} ({:.1}°) max el {:.1}°",
            tracked.satellite.norad_id, aos, aos_az, los, los_az, max_el
        );

        Some(Pass {
            norad_id: tracked.satellite.norad_id,
            aos,
            los,
            tca,
            aos_az,
            los_az,
            max_el,
            details,
            ground: *ground,
        })
    }
}

impl Default for Sgp4Predictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor for Sgp4Predictor {
    fn look_angles(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<LookAngles> {
        let tracked = self.catalog.get(&norad_id)?;
        self.angles(tracked, ground, t)
    }

    fn current_pass(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<Pass> {
        let tracked = self.catalog.get(&norad_id)?;
        if !self.is_up(tracked, ground, t)? {
            return self.next_pass(norad_id, ground, t, 3.0);
        }
        let aos = self.find_previous_aos(tracked, ground, t)?;
        let los = self.find_los(tracked, ground, t)?;
        self.build_pass(tracked, ground, aos, los)
    }

    fn next_pass(
        &self,
        norad_id: u32,
        ground: &GroundLocation,
        t: DateTime<Utc>,
        days_ahead: f64,
    ) -> Option<Pass> {
        let tracked = self.catalog.get(&norad_id)?;
        let limit = t + Duration::milliseconds((days_ahead * 86_400_000.0) as i64);
        let aos = self.find_aos(tracked, ground, t, limit)?;
        let los = self.find_los(tracked, ground, aos + Duration::milliseconds(REFINE_RESOLUTION_MS))?;
        self.build_pass(tracked, ground, aos, los)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ISS_LINE1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    fn predictor() -> Sgp4Predictor {
        let sat = Satellite::from_tle(Some("ISS"), ISS_LINE1, ISS_LINE2).unwrap();
        Sgp4Predictor::with_satellites([sat]).unwrap()
    }

    fn ground() -> GroundLocation {
        GroundLocation::new(55.6761, 12.5683, 10.0).unwrap()
    }

    #[test]
    fn test_next_pass_is_ordered() {
        let p = predictor();
        let t = Utc.with_ymd_and_hms(2008, 9, 20, 12, 0, 0).unwrap();
        let pass = p.next_pass(25544, &ground(), t, 3.0).expect("ISS passes Copenhagen within 3 days");

        assert!(pass.aos > t);
        assert!(pass.aos < pass.los);
        assert!(pass.max_el > 0.0);
        assert!(pass.details.len() >= MIN_DETAIL_SAMPLES as usize);
        assert!(pass.details.windows(2).all(|w| w[0].time <= w[1].time));
        assert!(pass.duration() < Duration::minutes(20));
    }

    #[test]
    fn test_current_pass_contains_time() {
        let p = predictor();
        let t = Utc.with_ymd_and_hms(2008, 9, 20, 12, 0, 0).unwrap();
        let next = p.next_pass(25544, &ground(), t, 3.0).unwrap();
        let mid = next.aos + next.duration() / 2;

        let current = p.current_pass(25544, &ground(), mid).unwrap();
        assert!(current.contains(mid));
        assert!((current.aos - next.aos).num_seconds().abs() <= 2);
        assert!((current.los - next.los).num_seconds().abs() <= 2);
    }

    #[test]
    fn test_unknown_satellite() {
        let p = predictor();
        let t = Utc.with_ymd_and_hms(2008, 9, 20, 12, 0, 0).unwrap();
        assert!(p.look_angles(1, &ground(), t).is_none());
        assert!(p.next_pass(1, &ground(), t, 1.0).is_none());
    }
}
