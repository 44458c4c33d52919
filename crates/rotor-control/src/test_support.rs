//! Deterministic sky and a mock rotctld for tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use orbital_mechanics::{GroundLocation, LookAngles, Pass, PassDetail, Predictor};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TEST_NORAD_ID: u32 = 1;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn ground() -> GroundLocation {
    GroundLocation::new(55.0, 12.0, 0.0).unwrap()
}

/// Satellite moving at constant angular rates from a position at `t0()`
#[derive(Debug, Clone)]
pub struct LinearSky {
    pub az0: f64,
    pub az_rate: f64,
    pub el0: f64,
    pub el_rate: f64,
    pub pass: Option<Pass>,
}

impl LinearSky {
    pub fn new(az0: f64, az_rate: f64, el0: f64, el_rate: f64) -> Self {
        Self {
            az0,
            az_rate,
            el0,
            el_rate,
            pass: None,
        }
    }

    pub fn stationary(az: f64, el: f64) -> Self {
        Self::new(az, 0.0, el, 0.0)
    }

    pub fn with_pass(mut self, pass: Pass) -> Self {
        self.pass = Some(pass);
        self
    }

    fn seconds(t: DateTime<Utc>) -> f64 {
        (t - t0()).num_milliseconds() as f64 / 1000.0
    }

    fn pass_for(&self, ground: &GroundLocation) -> Option<Pass> {
        self.pass.clone().map(|mut p| {
            p.ground = *ground;
            p
        })
    }
}

impl Predictor for LinearSky {
    fn look_angles(&self, norad_id: u32, _ground: &GroundLocation, t: DateTime<Utc>) -> Option<LookAngles> {
        if norad_id != TEST_NORAD_ID {
            return None;
        }
        let dt = Self::seconds(t);
        Some(LookAngles {
            azimuth_deg: (self.az0 + self.az_rate * dt).rem_euclid(360.0),
            elevation_deg: self.el0 + self.el_rate * dt,
            range_km: 1000.0,
        })
    }

    fn current_pass(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>) -> Option<Pass> {
        if norad_id != TEST_NORAD_ID {
            return None;
        }
        self.pass_for(ground).filter(|p| p.los >= t)
    }

    fn next_pass(&self, norad_id: u32, ground: &GroundLocation, t: DateTime<Utc>, _days_ahead: f64) -> Option<Pass> {
        if norad_id != TEST_NORAD_ID {
            return None;
        }
        self.pass_for(ground).filter(|p| p.aos > t)
    }
}

/// Pass whose detail samples walk through `azimuths`, evenly spread between
/// `aos` and `los`, peaking at 45° elevation
pub fn synthetic_pass(aos: DateTime<Utc>, los: DateTime<Utc>, azimuths: &[f64]) -> Pass {
    let n = azimuths.len().max(2);
    let step_ms = (los - aos).num_milliseconds() / (n as i64 - 1);
    let details: Vec<PassDetail> = azimuths
        .iter()
        .enumerate()
        .map(|(i, &az)| {
            let frac = i as f64 / (n - 1) as f64;
            PassDetail {
                time: aos + Duration::milliseconds(step_ms * i as i64),
                azimuth_deg: az,
                elevation_deg: 45.0 * (std::f64::consts::PI * frac).sin(),
            }
        })
        .collect();

    Pass {
        norad_id: TEST_NORAD_ID,
        aos,
        los,
        tca: aos + (los - aos) / 2,
        aos_az: azimuths.first().copied().unwrap_or(0.0),
        los_az: azimuths.last().copied().unwrap_or(0.0),
        max_el: 45.0,
        details,
        ground: ground(),
    }
}

/// rotctld stand-in serving a single session on 127.0.0.1
pub struct MockRotctld {
    pub port: u16,
    pub received: Arc<Mutex<Vec<String>>>,
    /// Reply to `p`
    pub position_reply: Arc<Mutex<String>>,
    /// Reply to `P`
    pub set_reply: Arc<Mutex<String>>,
    pub session: JoinHandle<()>,
}

impl MockRotctld {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let position_reply = Arc::new(Mutex::new("123.40\n45.60\n".to_string()));
        let set_reply = Arc::new(Mutex::new("RPRT 0\n".to_string()));

        let session = {
            let received = received.clone();
            let position_reply = position_reply.clone();
            let set_reply = set_reply.clone();
            tokio::spawn(async move {
                let (socket, _) = listener.accept().await.unwrap();
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    received.lock().push(line.clone());
                    let reply = match line.chars().next() {
                        Some('P') => set_reply.lock().clone(),
                        Some('p') => position_reply.lock().clone(),
                        Some('S') => "RPRT 0\n".to_string(),
                        Some('q') => break,
                        _ => "RPRT -1\n".to_string(),
                    };
                    if write.write_all(reply.as_bytes()).await.is_err() {
                        break;
                    }
                }
            })
        };

        Self {
            port,
            received,
            position_reply,
            set_reply,
            session,
        }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}
