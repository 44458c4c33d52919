//! Tracking Controller
//!
//! One control tick per cycle period decides where the rotator should
//! point and hands the clamped command to the device task:
//!
//! path point (flip corrected) -> smoothing -> threshold gate / search
//! -> profile offset -> display projection -> clamp -> shared record
//!
//! The tick never waits on the device. If the device task holds the shared
//! record the tick keeps the previous reading and tries again next cycle.

use chrono::{DateTime, Utc};
use orbital_mechanics::{GroundLocation, Pass, Predictor};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::angle::{normalize_positive, project_for_display, smooth, within_threshold};
use crate::config::RotatorConfig;
use crate::device::{ClientTiming, DeviceClient, DeviceRecord};
use crate::pass_tracker::{PassChange, PassTracker};
use crate::profile::PathProfiler;
use crate::search::{future_target, SearchParams};
use crate::{AzEl, Result, RotorError, TargetState};

/// Polar plot position of a marker that is not shown
pub const HIDDEN_MARKER: AzEl = AzEl::new(-10.0, -10.0);

/// Controller state as of the last tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlMode {
    /// Tracking requested without a target; follows the manual values
    Idle,
    /// Tracking off; follows the manual values
    Manual,
    /// Last command still within threshold of the path
    Tracking,
    /// Path left the threshold disk; a new command was searched
    Correcting,
}

/// Rotator position as last reported by the device task
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum RotorReading {
    Disengaged,
    /// Engaged, nothing read back yet
    Waiting,
    Error,
    Position { raw: AzEl, display: AzEl },
}

impl RotorReading {
    /// Azimuth and elevation label text
    pub fn labels(&self) -> (String, String) {
        match self {
            RotorReading::Disengaged | RotorReading::Waiting => ("---".to_string(), "---".to_string()),
            RotorReading::Error => ("ERROR".to_string(), "ERROR".to_string()),
            RotorReading::Position { raw, .. } => (
                format!("{:.2}\u{b0}", raw.azimuth_deg),
                format!("{:.2}\u{b0}", raw.elevation_deg),
            ),
        }
    }

    /// Label text in the configured azimuth convention
    pub fn display_labels(&self) -> (String, String) {
        match self {
            RotorReading::Position { display, .. } => (
                format!("{:.2}\u{b0}", display.azimuth_deg),
                format!("{:.2}\u{b0}", display.elevation_deg),
            ),
            other => other.labels(),
        }
    }
}

/// Polar plot feed, angles made non-negative
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PolarMarkers {
    pub satellite: AzEl,
    pub target: AzEl,
    pub rotor: AzEl,
}

/// Outcome of one control tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TickReport {
    pub mode: ControlMode,
    /// Smoothed path point, or the manual values
    pub path: Option<AzEl>,
    /// Command with the profile offset applied, before clamping
    pub commanded: Option<AzEl>,
    /// `commanded` in the configured azimuth convention
    pub display: Option<AzEl>,
    pub markers: PolarMarkers,
    pub rotor: RotorReading,
    /// The shared record was read this tick
    pub rotor_fresh: bool,
}

pub struct TrackingController<P: Predictor> {
    predictor: P,
    ground: GroundLocation,
    candidates: Vec<u32>,
    config: RotatorConfig,
    configured: bool,

    t: DateTime<Utc>,
    target: Option<TargetState>,
    tracking: bool,
    monitor: bool,
    manual: AzEl,
    mode: ControlMode,

    /// Last target before the profile offset, for due north smoothing
    last_target: Option<AzEl>,
    last_commanded: Option<AzEl>,
    last_reading: RotorReading,

    passes: PassTracker,
    profiler: PathProfiler,
    device: Option<DeviceClient>,
    timing: ClientTiming,
}

impl<P: Predictor> TrackingController<P> {
    /// Controller for the satellites in `candidates`. Without a rotator
    /// configuration the loop runs on default limits but cannot engage.
    pub fn new(
        predictor: P,
        ground: GroundLocation,
        candidates: Vec<u32>,
        config: Option<RotatorConfig>,
    ) -> Self {
        let configured = config.is_some();
        Self {
            predictor,
            ground,
            candidates,
            config: config.unwrap_or_default(),
            configured,
            t: Utc::now(),
            target: None,
            tracking: false,
            monitor: false,
            manual: AzEl::default(),
            mode: ControlMode::Manual,
            last_target: None,
            last_commanded: None,
            last_reading: RotorReading::Disengaged,
            passes: PassTracker::new(),
            profiler: PathProfiler::new(),
            device: None,
            timing: ClientTiming::default(),
        }
    }

    // ========================================================================
    // Target and pass bookkeeping
    // ========================================================================

    /// Take new telemetry for the selected satellite at `t` and keep the
    /// cached pass consistent with it
    pub fn update(&mut self, t: DateTime<Utc>, telemetry: TargetState) {
        self.t = t;
        match self.target {
            Some(current) if current.norad_id == telemetry.norad_id => {
                self.target = Some(telemetry);
            }
            Some(current) => {
                debug!(
                    "Ignoring telemetry for {} while {} is selected",
                    telemetry.norad_id, current.norad_id
                );
                return;
            }
            None => return,
        }
        self.refresh_pass();
    }

    /// Compute telemetry for the selected satellite from the predictor and
    /// apply it. Pass searches only run once the cached AOS or LOS is behind.
    pub fn advance(&mut self, t: DateTime<Utc>) {
        self.t = t;
        let Some(current) = self.target else {
            return;
        };
        match current.follow(&self.predictor, &self.ground, t) {
            Some(telemetry) => self.update(t, telemetry),
            None => warn!("No telemetry for {} at {}", current.norad_id, t),
        }
    }

    fn refresh_pass(&mut self) {
        let Some(target) = self.target else {
            return;
        };
        let change = self.passes.refresh(
            &self.predictor,
            &target,
            &self.ground,
            self.t,
            self.config.cycle_ms,
            self.config.az_type,
            self.config.az_stop_pos,
        );
        if change == PassChange::Restarted {
            self.last_target = None;
        }
    }

    pub fn select_target(&mut self, norad_id: u32) -> Result<()> {
        self.last_target = None;

        let telemetry = if self.candidates.contains(&norad_id) {
            TargetState::observe(&self.predictor, norad_id, &self.ground, self.t)
        } else {
            None
        };
        let Some(telemetry) = telemetry else {
            warn!("Invalid satellite selection: {}", norad_id);
            self.target = None;
            self.passes.clear();
            return Err(RotorError::UnknownSatellite(norad_id));
        };

        info!(
            "Selected {} at az {:.2} el {:.2}",
            norad_id, telemetry.azimuth_deg, telemetry.elevation_deg
        );
        self.target = Some(telemetry);
        self.passes.reset(
            &self.predictor,
            &telemetry,
            &self.ground,
            self.t,
            self.config.az_type,
            self.config.az_stop_pos,
        );
        Ok(())
    }

    /// Move the station. A move beyond the drift distance replaces the pass
    /// on the next update.
    pub fn set_ground(&mut self, ground: GroundLocation) {
        self.ground = ground;
        // AOS/LOS were predicted for the old station
        if let Some(target) = &mut self.target {
            target.aos = None;
            target.los = None;
        }
    }

    // ========================================================================
    // Operator controls
    // ========================================================================

    pub fn set_tracking(&mut self, tracking: bool) {
        self.last_target = None;
        self.tracking = tracking;
    }

    /// Manual knob values, clamped to the rotator limits
    pub fn set_manual(&mut self, azimuth_deg: f64, elevation_deg: f64) {
        self.manual = self.config.limits().clamp(AzEl::new(azimuth_deg, elevation_deg));
    }

    /// Stop tracking and send the rotator home
    pub fn park(&mut self) {
        info!("Parking rotator");
        self.set_tracking(false);
        self.set_manual(0.0, 0.0);
    }

    /// Read the rotator without commanding it
    pub fn set_monitor(&mut self, monitor: bool) {
        self.monitor = monitor;
        if let Some(device) = &self.device {
            device.set_monitor(monitor);
        }
    }

    pub fn set_cycle_period(&mut self, cycle_ms: u64) {
        self.config.cycle_ms = cycle_ms.max(1);
    }

    pub fn set_threshold(&mut self, threshold_deg: f64) {
        if threshold_deg.is_finite() {
            self.config.threshold_deg = threshold_deg.max(0.0);
        }
    }

    /// Switch rotator profile. Refused while engaged. An invalid profile
    /// leaves the controller unable to engage until a valid one is set.
    pub fn set_rotator(&mut self, config: RotatorConfig) -> Result<()> {
        if self.device.is_some() {
            return Err(RotorError::Engaged);
        }
        if let Err(e) = config.validate() {
            error!("Rotator configuration {} rejected: {}", config.name, e);
            self.configured = false;
            return Err(e);
        }
        info!("Loaded new rotator configuration {}", config.name);
        self.config = config;
        self.configured = true;
        self.manual = self.config.limits().clamp(self.manual);
        self.passes
            .update_flipped(self.config.az_type, self.config.az_stop_pos);
        Ok(())
    }

    /// Pacing for device tasks started by later engages
    pub fn set_client_timing(&mut self, timing: ClientTiming) {
        self.timing = timing;
    }

    // ========================================================================
    // Device
    // ========================================================================

    pub async fn engage(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Err(RotorError::AlreadyEngaged);
        }
        if !self.configured {
            warn!("Controller does not have a valid configuration");
            return Err(RotorError::NotConfigured);
        }
        let device =
            DeviceClient::engage(&self.config.host, self.config.port, self.monitor, self.timing)
                .await?;
        self.device = Some(device);
        self.last_reading = RotorReading::Waiting;
        Ok(())
    }

    pub async fn disengage(&mut self) {
        if let Some(device) = self.device.take() {
            device.disengage().await;
        }
        self.last_reading = RotorReading::Disengaged;
    }

    pub async fn set_engaged(&mut self, engaged: bool) -> Result<()> {
        if engaged {
            if self.device.is_none() {
                self.engage().await?;
            }
        } else {
            self.disengage().await;
        }
        Ok(())
    }

    // ========================================================================
    // Control tick
    // ========================================================================

    pub fn tick(&mut self) -> TickReport {
        let limits = self.config.limits();
        let mut satellite_marker = HIDDEN_MARKER;
        let mut path = None;

        let mode = match self.target.filter(|_| self.tracking) {
            None => {
                let target = self.manual;
                self.last_target = Some(target);
                self.last_commanded = Some(target);
                path = Some(target);
                if self.tracking {
                    ControlMode::Idle
                } else {
                    ControlMode::Manual
                }
            }
            Some(target) => match self.passes.corrected_path_point(&target, self.t, &limits) {
                Some(point) => {
                    let pth = AzEl::new(self.smooth_az(point.azimuth_deg), point.elevation_deg);
                    let mut trg = self.last_target.unwrap_or(pth);

                    let mode = if within_threshold(pth, trg, self.config.threshold_deg) {
                        ControlMode::Tracking
                    } else {
                        trg = if target.elevation_deg < 0.0 {
                            pth
                        } else {
                            self.search_ahead(&target, pth)
                        };
                        trg.azimuth_deg = self.smooth_az(trg.azimuth_deg);
                        ControlMode::Correcting
                    };
                    self.last_target = Some(trg);

                    let offset = self
                        .profiler
                        .offset(self.passes.pass(), trg.azimuth_deg, &limits);
                    self.last_commanded = Some(AzEl::new(trg.azimuth_deg + offset, trg.elevation_deg));

                    path = Some(pth);
                    satellite_marker = positive(pth);
                    mode
                }
                // Down inside the predicted window: hold the last command
                None => ControlMode::Tracking,
            },
        };
        self.mode = mode;

        let commanded = self.last_commanded;
        let display = commanded.map(|c| project_for_display(c, self.config.az_type));
        let (rotor, rotor_fresh) = self.exchange_with_device(commanded.map(|c| limits.clamp(c)));

        let rotor_marker = match rotor {
            RotorReading::Position { raw, .. } => positive(raw),
            _ => HIDDEN_MARKER,
        };
        let report = TickReport {
            mode,
            path,
            commanded,
            display,
            markers: PolarMarkers {
                satellite: satellite_marker,
                target: commanded.map(positive).unwrap_or(HIDDEN_MARKER),
                rotor: rotor_marker,
            },
            rotor,
            rotor_fresh,
        };
        debug!("Tick {:?}", report);
        report
    }

    fn smooth_az(&self, az: f64) -> f64 {
        match self.last_target {
            Some(last) => smooth(last.azimuth_deg, az),
            None => az,
        }
    }

    fn search_ahead(&self, target: &TargetState, path: AzEl) -> AzEl {
        let limits = self.config.limits();
        let params = SearchParams {
            threshold_deg: self.config.threshold_deg,
            cycle_ms: self.config.cycle_ms,
            flip: self.passes.flipped() && limits.supports_flip(),
        };
        let los = self.passes.pass().map(|p| p.los);
        future_target(
            &self.predictor,
            target.norad_id,
            &self.ground,
            self.t,
            los,
            path,
            &params,
        )
        .target
    }

    /// Queue `command` and pick up the latest reading without blocking
    fn exchange_with_device(&mut self, command: Option<AzEl>) -> (RotorReading, bool) {
        let Some(device) = &self.device else {
            self.last_reading = RotorReading::Disengaged;
            return (RotorReading::Disengaged, false);
        };
        let seen = match command {
            Some(command) => device.try_exchange(command),
            None => device.try_read(),
        };
        match seen {
            Some(record) => {
                self.last_reading = self.reading_from(&record);
                (self.last_reading, true)
            }
            None => (self.last_reading, false),
        }
    }

    fn reading_from(&self, record: &DeviceRecord) -> RotorReading {
        if record.io_error {
            return RotorReading::Error;
        }
        match record.actual {
            Some(raw) => RotorReading::Position {
                raw,
                display: project_for_display(raw, self.config.az_type),
            },
            None => RotorReading::Waiting,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Time to AOS while the satellite is down, to LOS while it is up,
    /// as `HH:MM:SS`, or `MM:SS` under an hour
    pub fn countdown(&self, t: DateTime<Utc>) -> Option<String> {
        let target = self.target?;
        let event = if target.elevation_deg < 0.0 {
            target.aos?
        } else {
            target.los?
        };
        let secs = (event - t).num_seconds().max(0);
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        Some(if h > 0 {
            format!("{:02}:{:02}:{:02}", h, m, s)
        } else {
            format!("{:02}:{:02}", m, s)
        })
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn pass(&self) -> Option<&Pass> {
        self.passes.pass()
    }

    pub fn flipped(&self) -> bool {
        self.passes.flipped()
    }

    pub fn last_commanded(&self) -> Option<AzEl> {
        self.last_commanded
    }

    pub fn last_reading(&self) -> RotorReading {
        self.last_reading
    }

    pub fn config(&self) -> &RotatorConfig {
        &self.config
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn target(&self) -> Option<&TargetState> {
        self.target.as_ref()
    }

    pub fn candidates(&self) -> &[u32] {
        &self.candidates
    }

    pub fn tracking(&self) -> bool {
        self.tracking
    }

    pub fn monitor(&self) -> bool {
        self.monitor
    }

    pub fn manual(&self) -> AzEl {
        self.manual
    }

    pub fn is_engaged(&self) -> bool {
        self.device.is_some()
    }

    pub fn device(&self) -> Option<&DeviceClient> {
        self.device.as_ref()
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }

    pub fn ground(&self) -> &GroundLocation {
        &self.ground
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.t
    }
}

fn positive(pos: AzEl) -> AzEl {
    AzEl::new(normalize_positive(pos.azimuth_deg), normalize_positive(pos.elevation_deg))
}
