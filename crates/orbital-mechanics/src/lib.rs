//! Orbital Mechanics Library
//!
//! SGP4 propagation, TEME to topocentric transforms and pass prediction
//! for a single ground station pointing an antenna rotator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod passes;

pub use passes::{Pass, PassDetail, Predictor, Sgp4Predictor};

#[derive(Error, Debug)]
pub enum OrbitalError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

pub type Result<T> = std::result::Result<T, OrbitalError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Satellite {
    pub norad_id: u32,
    pub name: String,
    pub tle_line1: String,
    pub tle_line2: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StateVector {
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub epoch: DateTime<Utc>,
}

/// Observer position on the WGS-84 ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundLocation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl GroundLocation {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude_deg) || !latitude_deg.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "latitude {} out of range",
                latitude_deg
            )));
        }
        if !(-180.0..=180.0).contains(&longitude_deg) || !longitude_deg.is_finite() {
            return Err(OrbitalError::InvalidCoordinates(format!(
                "longitude {} out of range",
                longitude_deg
            )));
        }
        Ok(Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        })
    }

    /// Surface distance to `other` in km, equirectangular approximation.
    ///
    /// Only meant for short baselines such as detecting that a mobile
    /// station has moved since a pass was predicted.
    pub fn small_distance_km(&self, other: &GroundLocation) -> f64 {
        let lat1 = self.latitude_deg.to_radians();
        let lat2 = other.latitude_deg.to_radians();
        let mut dlon = (other.longitude_deg - self.longitude_deg).to_radians();
        if dlon > std::f64::consts::PI {
            dlon -= 2.0 * std::f64::consts::PI;
        } else if dlon < -std::f64::consts::PI {
            dlon += 2.0 * std::f64::consts::PI;
        }
        let x = dlon * ((lat1 + lat2) / 2.0).cos();
        let y = lat2 - lat1;
        (x * x + y * y).sqrt() * transforms::EARTH_RADIUS_KM
    }
}

/// Antenna look angles from a ground location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookAngles {
    pub azimuth_deg: f64,   // 0-360° from North
    pub elevation_deg: f64, // negative below the horizon
    pub range_km: f64,
}

impl Satellite {
    pub fn from_tle(name: Option<&str>, tle_line1: &str, tle_line2: &str) -> Result<Self> {
        let elements = sgp4::Elements::from_tle(
            name.map(str::to_string),
            tle_line1.as_bytes(),
            tle_line2.as_bytes(),
        )
        .map_err(|e| OrbitalError::InvalidTle(format!("{:?}", e)))?;

        Ok(Self {
            norad_id: elements.norad_id as u32,
            name: name
                .map(str::to_string)
                .unwrap_or_else(|| format!("NORAD {}", elements.norad_id)),
            tle_line1: tle_line1.trim_end().to_string(),
            tle_line2: tle_line2.trim_end().to_string(),
        })
    }

    pub fn propagate(&self, time: DateTime<Utc>) -> Result<StateVector> {
        propagation::sgp4_propagate(&self.tle_line1, &self.tle_line2, time)
    }

    pub fn look_angles(&self, ground: &GroundLocation, time: DateTime<Utc>) -> Result<LookAngles> {
        let state = self.propagate(time)?;
        Ok(transforms::teme_to_look_angles(&state, ground))
    }
}

/// Parse a block of two- or three-line element sets.
///
/// Lines that are neither `1 ...` nor `2 ...` are taken as the name of the
/// following element set.
pub fn parse_tle_file(text: &str) -> Result<Vec<Satellite>> {
    let mut satellites = Vec::new();
    let mut name: Option<&str> = None;
    let mut line1: Option<&str> = None;

    for line in text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
        if line.starts_with("1 ") {
            line1 = Some(line);
        } else if line.starts_with("2 ") {
            let first = line1
                .take()
                .ok_or_else(|| OrbitalError::InvalidTle(format!("line 2 without line 1: {}", line)))?;
            satellites.push(Satellite::from_tle(name.take().map(str::trim), first, line)?);
        } else {
            name = Some(line);
        }
    }

    Ok(satellites)
}

pub mod propagation {
    use super::*;

    pub fn sgp4_propagate(
        tle_line1: &str,
        tle_line2: &str,
        time: DateTime<Utc>,
    ) -> Result<StateVector> {
        let elements = sgp4::Elements::from_tle(
            None,
            tle_line1.as_bytes(),
            tle_line2.as_bytes(),
        ).map_err(|e| OrbitalError::InvalidTle(format!("{:?}", e)))?;

        let constants = sgp4::Constants::from_elements(&elements)
            .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

        let epoch_utc = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);
        propagate_constants(&constants, epoch_utc, time)
    }

    /// Propagate already-initialised SGP4 constants to `time`.
    pub fn propagate_constants(
        constants: &sgp4::Constants,
        epoch: DateTime<Utc>,
        time: DateTime<Utc>,
    ) -> Result<StateVector> {
        let duration = time.signed_duration_since(epoch);
        let minutes_since_epoch = duration.num_milliseconds() as f64 / 60_000.0;

        let prediction = constants.propagate(minutes_since_epoch)
            .map_err(|e| OrbitalError::PropagationFailed(format!("{:?}", e)))?;

        Ok(StateVector {
            position_x: prediction.position[0],
            position_y: prediction.position[1],
            position_z: prediction.position[2],
            velocity_x: prediction.velocity[0],
            velocity_y: prediction.velocity[1],
            velocity_z: prediction.velocity[2],
            epoch: time,
        })
    }
}

pub mod transforms {
    use super::*;

    pub const EARTH_RADIUS_KM: f64 = 6378.137;
    const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;

    /// Julian date of a UTC instant (UT1 taken as UTC)
    pub fn julian_date(time: DateTime<Utc>) -> f64 {
        time.timestamp_millis() as f64 / 86_400_000.0 + 2_440_587.5
    }

    /// Greenwich mean sidereal time in radians (IAU 1982)
    pub fn gmst_rad(time: DateTime<Utc>) -> f64 {
        let jd = julian_date(time);
        let d = jd - 2_451_545.0;
        let t = d / 36_525.0;
        let gmst_deg = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
            - t * t * t / 38_710_000.0;
        gmst_deg.rem_euclid(360.0).to_radians()
    }

    /// Rotate a TEME position into the Earth-fixed frame.
    pub fn teme_to_ecef(x: f64, y: f64, z: f64, time: DateTime<Utc>) -> (f64, f64, f64) {
        let g = gmst_rad(time);
        let (sin_g, cos_g) = g.sin_cos();
        (cos_g * x + sin_g * y, -sin_g * x + cos_g * y, z)
    }

    pub fn geodetic_to_ecef(pos: &GroundLocation) -> (f64, f64, f64) {
        let lat_rad = pos.latitude_deg.to_radians();
        let lon_rad = pos.longitude_deg.to_radians();
        let alt = pos.altitude_m / 1000.0;

        let e2 = EARTH_FLATTENING * (2.0 - EARTH_FLATTENING);
        let n = EARTH_RADIUS_KM / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();

        let x = (n + alt) * lat_rad.cos() * lon_rad.cos();
        let y = (n + alt) * lat_rad.cos() * lon_rad.sin();
        let z = (n * (1.0 - e2) + alt) * lat_rad.sin();

        (x, y, z)
    }

    /// Project an Earth-fixed satellite position onto the observer's
    /// East-North-Up frame.
    pub fn ecef_to_look_angles(sat: (f64, f64, f64), ground: &GroundLocation) -> LookAngles {
        let (gx, gy, gz) = geodetic_to_ecef(ground);
        let dx = sat.0 - gx;
        let dy = sat.1 - gy;
        let dz = sat.2 - gz;
        let range_km = (dx * dx + dy * dy + dz * dz).sqrt();

        let (sin_lat, cos_lat) = ground.latitude_deg.to_radians().sin_cos();
        let (sin_lon, cos_lon) = ground.longitude_deg.to_radians().sin_cos();

        let east = -sin_lon * dx + cos_lon * dy;
        let north = -sin_lat * cos_lon * dx - sin_lat * sin_lon * dy + cos_lat * dz;
        let up = cos_lat * cos_lon * dx + cos_lat * sin_lon * dy + sin_lat * dz;

        let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
        let elevation_deg = up.atan2((east * east + north * north).sqrt()).to_degrees();

        LookAngles {
            azimuth_deg,
            elevation_deg,
            range_km,
        }
    }

    pub fn teme_to_look_angles(state: &StateVector, ground: &GroundLocation) -> LookAngles {
        let ecef = teme_to_ecef(state.position_x, state.position_y, state.position_z, state.epoch);
        ecef_to_look_angles(ecef, ground)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // ISS (ZARYA), epoch 2008-264
    const ISS_LINE1: &str = "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    const ISS_LINE2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    #[test]
    fn test_parse_tle_file_with_names() {
        let text = format!("ISS (ZARYA)\n{}\n{}\n", ISS_LINE1, ISS_LINE2);
        let sats = parse_tle_file(&text).unwrap();
        assert_eq!(sats.len(), 1);
        assert_eq!(sats[0].norad_id, 25544);
        assert_eq!(sats[0].name, "ISS (ZARYA)");
    }

    #[test]
    fn test_parse_tle_file_rejects_orphan_line2() {
        assert!(parse_tle_file(ISS_LINE2).is_err());
    }

    #[test]
    fn test_propagation_radius_is_leo() {
        let sat = Satellite::from_tle(None, ISS_LINE1, ISS_LINE2).unwrap();
        let t = Utc.with_ymd_and_hms(2008, 9, 21, 12, 0, 0).unwrap();
        let state = sat.propagate(t).unwrap();
        let r = (state.position_x.powi(2) + state.position_y.powi(2) + state.position_z.powi(2)).sqrt();
        assert!(r > 6600.0 && r < 6900.0, "radius {}", r);
    }

    #[test]
    fn test_zenith_look_angles() {
        let ground = GroundLocation::new(0.0, 0.0, 0.0).unwrap();
        let sat = (transforms::EARTH_RADIUS_KM + 500.0, 0.0, 0.0);
        let angles = transforms::ecef_to_look_angles(sat, &ground);
        assert!((angles.elevation_deg - 90.0).abs() < 1e-6);
        assert!((angles.range_km - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_north_azimuth() {
        let ground = GroundLocation::new(0.0, 0.0, 0.0).unwrap();
        // Slightly north of the station, above the horizon
        let sat = (transforms::EARTH_RADIUS_KM + 500.0, 0.0, 1000.0);
        let angles = transforms::ecef_to_look_angles(sat, &ground);
        assert!(angles.azimuth_deg < 1e-6 || angles.azimuth_deg > 360.0 - 1e-6);
        assert!(angles.elevation_deg > 0.0);
    }

    #[test]
    fn test_small_distance() {
        let a = GroundLocation::new(55.0, 12.0, 0.0).unwrap();
        let b = GroundLocation::new(55.01, 12.0, 0.0).unwrap();
        let d = a.small_distance_km(&b);
        assert!((d - 1.113).abs() < 0.01, "distance {}", d);
        assert_eq!(a.small_distance_km(&a), 0.0);
    }

    #[test]
    fn test_invalid_ground_location() {
        assert!(GroundLocation::new(91.0, 0.0, 0.0).is_err());
        assert!(GroundLocation::new(0.0, 181.0, 0.0).is_err());
    }
}
