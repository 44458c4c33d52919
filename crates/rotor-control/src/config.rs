//! Rotator Profiles
//!
//! One JSON profile per rotator (`<name>.rot.json`) in a hardware
//! configuration directory: rotctld endpoint, travel limits, azimuth
//! convention, command cycle and threshold.

use crate::{AzEl, Result, RotorError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// File suffix of rotator profiles
pub const PROFILE_SUFFIX: &str = ".rot.json";

/// Default rotctld TCP port
pub const DEFAULT_ROTCTLD_PORT: u16 = 4533;

pub const DEFAULT_CYCLE_MS: u64 = 1000;
pub const DEFAULT_THRESHOLD_DEG: f64 = 5.0;

/// Azimuth convention of the rotator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AzimuthType {
    /// Unfolded azimuth, any value the rotator accepts
    #[serde(rename = "raw")]
    Raw,
    #[default]
    #[serde(rename = "zero_to_360")]
    ZeroTo360,
    #[serde(rename = "plus_minus_180")]
    PlusMinus180,
}

impl AzimuthType {
    /// Nominal range before the stop position offset is applied
    pub fn base_range(&self) -> (f64, f64) {
        match self {
            AzimuthType::Raw | AzimuthType::ZeroTo360 => (0.0, 360.0),
            AzimuthType::PlusMinus180 => (-180.0, 180.0),
        }
    }
}

/// Mechanical travel limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatorLimits {
    pub min_az: f64,
    pub max_az: f64,
    pub min_el: f64,
    pub max_el: f64,
}

impl RotatorLimits {
    pub fn clamp(&self, pos: AzEl) -> AzEl {
        AzEl::new(
            pos.azimuth_deg.max(self.min_az).min(self.max_az),
            pos.elevation_deg.max(self.min_el).min(self.max_el),
        )
    }

    /// Elevation travel reaches over the zenith
    pub fn supports_flip(&self) -> bool {
        self.max_el >= 180.0
    }
}

/// Rotator profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotatorConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub az_type: AzimuthType,
    /// Azimuth of the mechanical stop
    #[serde(default)]
    pub az_stop_pos: f64,
    pub min_az: f64,
    pub max_az: f64,
    pub min_el: f64,
    pub max_el: f64,
    /// Control cycle period in milliseconds
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
    /// Command threshold in degrees
    #[serde(default = "default_threshold")]
    pub threshold_deg: f64,
}

fn default_port() -> u16 {
    DEFAULT_ROTCTLD_PORT
}

fn default_cycle_ms() -> u64 {
    DEFAULT_CYCLE_MS
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_DEG
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            host: "localhost".to_string(),
            port: DEFAULT_ROTCTLD_PORT,
            az_type: AzimuthType::ZeroTo360,
            az_stop_pos: 0.0,
            min_az: 0.0,
            max_az: 360.0,
            min_el: 0.0,
            max_el: 90.0,
            cycle_ms: DEFAULT_CYCLE_MS,
            threshold_deg: DEFAULT_THRESHOLD_DEG,
        }
    }
}

impl RotatorConfig {
    pub fn limits(&self) -> RotatorLimits {
        RotatorLimits {
            min_az: self.min_az,
            max_az: self.max_az,
            min_el: self.min_el,
            max_el: self.max_el,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RotorError::Config(format!("{}: empty host", self.name)));
        }
        if !(self.min_az < self.max_az) {
            return Err(RotorError::Config(format!(
                "{}: min_az {} must be below max_az {}",
                self.name, self.min_az, self.max_az
            )));
        }
        if !(self.min_el < self.max_el) {
            return Err(RotorError::Config(format!(
                "{}: min_el {} must be below max_el {}",
                self.name, self.min_el, self.max_el
            )));
        }
        if self.cycle_ms == 0 {
            return Err(RotorError::Config(format!("{}: cycle_ms must be positive", self.name)));
        }
        if !(self.threshold_deg >= 0.0) {
            return Err(RotorError::Config(format!(
                "{}: threshold {} must not be negative",
                self.name, self.threshold_deg
            )));
        }
        Ok(())
    }

    /// Load and validate a profile from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: RotatorConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        info!("Loaded rotator configuration {} from {:?}", config.name, path);
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn profile_path(dir: impl AsRef<Path>, name: &str) -> PathBuf {
        dir.as_ref().join(format!("{}{}", name, PROFILE_SUFFIX))
    }

    /// Load the profile called `name` from a configuration directory
    pub fn load_profile(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = Self::profile_path(dir, name);
        Self::load(&path).map_err(|e| {
            error!("Failed to load rotator configuration {}: {}", name, e);
            e
        })
    }
}

/// Sorted names of the rotator profiles in `dir`
pub fn list_profiles(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if let Some(name) = entry
            .file_name()
            .to_str()
            .and_then(|n| n.strip_suffix(PROFILE_SUFFIX))
        {
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// At least one rotator profile is present in `dir`
pub fn have_profiles(dir: impl AsRef<Path>) -> bool {
    match list_profiles(dir.as_ref()) {
        Ok(names) => !names.is_empty(),
        Err(e) => {
            error!("Failed to open hwconf dir {:?}: {}", dir.as_ref(), e);
            false
        }
    }
}
