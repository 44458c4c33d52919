//! Antenna Rotator Tracking Control
//!
//! Drives an az/el rotator so that it follows a satellite across a pass:
//! - Angle ring math and due-north smoothing
//! - Pass tracking with flip detection
//! - Future target search along the satellite path
//! - Path profiling against the rotator travel limits
//! - Threshold-gated control loop
//! - rotctld device client running on its own task
//!
//! The control tick never blocks on the network. It exchanges commanded
//! and actual positions with the device task through one mutex-guarded
//! record, using a non-blocking lock attempt.

use chrono::{DateTime, Utc};
use orbital_mechanics::{GroundLocation, Predictor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::pass_tracker::PASS_SEARCH_DAYS;

pub mod angle;
pub mod config;
pub mod controller;
pub mod device;
pub mod pass_tracker;
pub mod profile;
pub mod search;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::{AzimuthType, RotatorConfig, RotatorLimits};
pub use controller::{ControlMode, PolarMarkers, RotorReading, TickReport, TrackingController};
pub use device::{ClientTiming, DeviceClient, DeviceRecord};
pub use pass_tracker::{PassChange, PassTracker};
pub use profile::PathProfiler;
pub use search::{SearchOutcome, SearchParams};

#[derive(Error, Debug)]
pub enum RotorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid rotator configuration: {0}")]
    Config(String),
    #[error("No rotator profiles found in {0:?}")]
    NoProfiles(PathBuf),
    #[error("Name resolution of rotctld server {0} failed")]
    Resolve(String),
    #[error("Connection to rotctld server at {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Rotator is already engaged")]
    AlreadyEngaged,
    #[error("Rotator configuration cannot change while engaged")]
    Engaged,
    #[error("Controller does not have a valid rotator configuration")]
    NotConfigured,
    #[error("Unknown satellite {0}")]
    UnknownSatellite(u32),
    #[error("rotctld protocol error: {0}")]
    Protocol(String),
    #[error("rotctld returned error {0}")]
    Rprt(i32),
}

pub type Result<T> = std::result::Result<T, RotorError>;

/// Azimuth/elevation pair in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AzEl {
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
}

impl AzEl {
    pub const fn new(azimuth_deg: f64, elevation_deg: f64) -> Self {
        Self {
            azimuth_deg,
            elevation_deg,
        }
    }
}

/// Live telemetry of the selected satellite, replaced every update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub norad_id: u32,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    /// Next acquisition of signal
    pub aos: Option<DateTime<Utc>>,
    /// Next loss of signal
    pub los: Option<DateTime<Utc>>,
}

impl TargetState {
    /// Build the telemetry for `norad_id` at `t` from a predictor.
    ///
    /// While the satellite is up, `los` ends the pass in progress and `aos`
    /// starts the following one.
    pub fn observe<P: Predictor + ?Sized>(
        predictor: &P,
        norad_id: u32,
        ground: &GroundLocation,
        t: DateTime<Utc>,
    ) -> Option<Self> {
        let angles = predictor.look_angles(norad_id, ground, t)?;
        let (aos, los) = Self::scan_events(predictor, norad_id, ground, t, angles.elevation_deg);

        Some(Self {
            norad_id,
            azimuth_deg: angles.azimuth_deg,
            elevation_deg: angles.elevation_deg,
            aos,
            los,
        })
    }

    /// Telemetry at `t` that keeps this state's AOS/LOS while the next
    /// event is still ahead and the satellite has not risen or set since.
    /// Otherwise the events are searched again as in `observe`.
    pub fn follow<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        ground: &GroundLocation,
        t: DateTime<Utc>,
    ) -> Option<Self> {
        let angles = predictor.look_angles(self.norad_id, ground, t)?;
        let up = angles.elevation_deg > 0.0;
        let was_up = self.elevation_deg > 0.0;

        let events_ahead = match (up, was_up) {
            (true, true) => self.los.is_some_and(|los| t <= los),
            (false, false) => self.aos.is_some_and(|aos| t < aos),
            _ => false,
        };
        let (aos, los) = if events_ahead {
            (self.aos, self.los)
        } else {
            Self::scan_events(predictor, self.norad_id, ground, t, angles.elevation_deg)
        };

        Some(Self {
            norad_id: self.norad_id,
            azimuth_deg: angles.azimuth_deg,
            elevation_deg: angles.elevation_deg,
            aos,
            los,
        })
    }

    fn scan_events<P: Predictor + ?Sized>(
        predictor: &P,
        norad_id: u32,
        ground: &GroundLocation,
        t: DateTime<Utc>,
        elevation_deg: f64,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if elevation_deg > 0.0 {
            let los = predictor.current_pass(norad_id, ground, t).map(|p| p.los);
            let aos = predictor
                .next_pass(norad_id, ground, los.unwrap_or(t), PASS_SEARCH_DAYS)
                .map(|p| p.aos);
            (aos, los)
        } else {
            match predictor.next_pass(norad_id, ground, t, PASS_SEARCH_DAYS) {
                Some(p) => (Some(p.aos), Some(p.los)),
                None => (None, None),
            }
        }
    }

    pub fn position(&self) -> AzEl {
        AzEl::new(self.azimuth_deg, self.elevation_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ground, synthetic_pass, t0, LinearSky, TEST_NORAD_ID};
    use chrono::Duration;
    use orbital_mechanics::{LookAngles, Pass};
    use std::cell::Cell;

    /// Counts the pass searches made through it
    struct Counting {
        sky: LinearSky,
        scans: Cell<u32>,
    }

    impl Predictor for Counting {
        fn look_angles(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<LookAngles> {
            self.sky.look_angles(norad_id, ground, t)
        }

        fn current_pass(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<Pass> {
            self.scans.set(self.scans.get() + 1);
            self.sky.current_pass(norad_id, ground, t)
        }

        fn next_pass(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>, days_ahead: f64) -> Option<Pass> {
            self.scans.set(self.scans.get() + 1);
            self.sky.next_pass(norad_id, ground, t, days_ahead)
        }
    }

    #[test]
    fn test_observe_while_up_reports_los() {
        let los = t0() + Duration::minutes(4);
        let sky = LinearSky::stationary(120.0, 25.0)
            .with_pass(synthetic_pass(t0() - Duration::minutes(6), los, &[60.0, 120.0, 180.0]));

        let state = TargetState::observe(&sky, TEST_NORAD_ID, &ground(), t0()).unwrap();
        assert_eq!(state.position(), AzEl::new(120.0, 25.0));
        assert_eq!(state.los, Some(los));
        assert_eq!(state.aos, None);
    }

    #[test]
    fn test_observe_while_down_reports_next_pass() {
        let aos = t0() + Duration::minutes(30);
        let sky = LinearSky::stationary(300.0, -20.0)
            .with_pass(synthetic_pass(aos, aos + Duration::minutes(8), &[200.0, 270.0, 340.0]));

        let state = TargetState::observe(&sky, TEST_NORAD_ID, &ground(), t0()).unwrap();
        assert_eq!(state.aos, Some(aos));
        assert_eq!(state.los, Some(aos + Duration::minutes(8)));
        assert!(TargetState::observe(&sky, 42, &ground(), t0()).is_none());
    }

    #[test]
    fn test_follow_reuses_events_until_they_pass() {
        let aos = t0() + Duration::minutes(30);
        let sky = Counting {
            sky: LinearSky::new(300.0, 0.1, -20.0, 0.0)
                .with_pass(synthetic_pass(aos, aos + Duration::minutes(8), &[200.0, 270.0, 340.0])),
            scans: Cell::new(0),
        };

        let state = TargetState::observe(&sky, TEST_NORAD_ID, &ground(), t0()).unwrap();
        assert_eq!(sky.scans.get(), 1);

        let later = state.follow(&sky, &ground(), t0() + Duration::minutes(10)).unwrap();
        assert_eq!(sky.scans.get(), 1);
        assert_eq!(later.aos, Some(aos));
        assert_eq!(later.elevation_deg, -20.0);

        // AOS went by without the satellite rising: search again
        let stale = later.follow(&sky, &ground(), aos + Duration::seconds(1)).unwrap();
        assert_eq!(sky.scans.get(), 2);
        assert_eq!(stale.aos, None);
    }

    #[test]
    fn test_follow_rescans_when_satellite_rises() {
        let aos = t0() + Duration::minutes(1);
        let sky = LinearSky::new(100.0, 0.0, -1.0, 0.1)
            .with_pass(synthetic_pass(aos, aos + Duration::minutes(8), &[100.0, 150.0, 200.0]));

        let state = TargetState::observe(&sky, TEST_NORAD_ID, &ground(), t0()).unwrap();
        assert_eq!(state.aos, Some(aos));

        let up = state.follow(&sky, &ground(), t0() + Duration::seconds(20)).unwrap();
        assert!(up.elevation_deg > 0.0);
        assert_eq!(up.los, Some(aos + Duration::minutes(8)));
        assert_eq!(up.aos, None);
    }
}
