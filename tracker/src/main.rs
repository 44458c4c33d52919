//! Rotator Tracker CLI
//!
//! Points an az/el rotator at a satellite through rotctld.
//!
//! Usage:
//!   rotor-tracker --config-dir hwconf --rotator g5500 \
//!                 --tle-file data/stations.tle --norad-id 25544 \
//!                 --lat 55.68 --lon 12.57 --track --engage

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use orbital_mechanics::{parse_tle_file, GroundLocation, Sgp4Predictor};
use rotor_control::config::{have_profiles, list_profiles};
use rotor_control::{RotatorConfig, RotorError, TrackingController};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "rotor-tracker",
    about = "Track satellites with an antenna rotator through rotctld"
)]
struct Args {
    /// Directory holding <name>.rot.json rotator profiles
    #[arg(short = 'c', long, default_value = "hwconf")]
    config_dir: PathBuf,

    /// Rotator profile name, defaults to the first profile found
    #[arg(short, long)]
    rotator: Option<String>,

    /// TLE file with the candidate satellites
    #[arg(short, long)]
    tle_file: PathBuf,

    /// Satellite to track, defaults to the first one in the TLE file
    #[arg(short, long)]
    norad_id: Option<u32>,

    /// Station latitude in degrees
    #[arg(long, env = "GS_LAT", default_value_t = 0.0, allow_negative_numbers = true)]
    lat: f64,

    /// Station longitude in degrees
    #[arg(long, env = "GS_LON", default_value_t = 0.0, allow_negative_numbers = true)]
    lon: f64,

    /// Station altitude in meters
    #[arg(long, env = "GS_ALT_M", default_value_t = 0.0, allow_negative_numbers = true)]
    alt_m: f64,

    /// Follow the satellite instead of the manual position
    #[arg(long)]
    track: bool,

    /// Connect to rotctld and command the rotator
    #[arg(long)]
    engage: bool,

    /// Read the rotator without commanding it
    #[arg(long)]
    monitor: bool,

    /// Override the profile's control cycle in milliseconds
    #[arg(long)]
    cycle_ms: Option<u64>,

    /// Override the profile's command threshold in degrees
    #[arg(long)]
    threshold: Option<f64>,

    /// Write cycle and threshold back to the profile on exit
    #[arg(long)]
    save_on_exit: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Info level report interval, in ticks
const REPORT_EVERY: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "rotor_tracker=debug,rotor_control=debug,orbital_mechanics=info"
    } else {
        "rotor_tracker=info,rotor_control=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_rotator(&args)?;
    let ground = GroundLocation::new(args.lat, args.lon, args.alt_m)?;

    let tle = std::fs::read_to_string(&args.tle_file)
        .with_context(|| format!("reading {}", args.tle_file.display()))?;
    let predictor = Sgp4Predictor::with_satellites(parse_tle_file(&tle)?)?;
    let candidates = predictor.catalog_numbers();
    let Some(&first) = candidates.first() else {
        bail!("no satellites in {}", args.tle_file.display());
    };
    let norad_id = args.norad_id.unwrap_or(first);

    info!(
        "Station at {:.4}°, {:.4}°, {:.0} m; {} candidate satellites",
        ground.latitude_deg,
        ground.longitude_deg,
        ground.altitude_m,
        candidates.len()
    );

    let mut ctrl = TrackingController::new(predictor, ground, candidates, Some(config));
    if let Some(cycle_ms) = args.cycle_ms {
        ctrl.set_cycle_period(cycle_ms);
    }
    if let Some(threshold) = args.threshold {
        ctrl.set_threshold(threshold);
    }
    ctrl.set_monitor(args.monitor);
    ctrl.advance(Utc::now());
    ctrl.select_target(norad_id)?;
    ctrl.set_tracking(args.track);

    if let Some(pass) = ctrl.pass() {
        info!(
            "Pass of {}: AOS {} at {:.1}°, LOS {} at {:.1}°, max el {:.1}°{}",
            norad_id,
            pass.aos,
            pass.aos_az,
            pass.los,
            pass.los_az,
            pass.max_el,
            if ctrl.flipped() { " (flipped)" } else { "" }
        );
    }

    if args.engage {
        ctrl.engage().await?;
    }

    let mut interval = time::interval(Duration::from_millis(ctrl.config().cycle_ms));
    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }

        let now = Utc::now();
        ctrl.advance(now);
        let report = ctrl.tick();
        ticks += 1;

        debug!("{:?}", report);
        if ticks % REPORT_EVERY == 1 {
            let (az, el) = report.rotor.display_labels();
            let countdown = ctrl.countdown(now).unwrap_or_else(|| "--:--".to_string());
            match report.display {
                Some(cmd) => info!(
                    "{:?}: target {:.2}° {:.2}°, rotor {} {}, next event in {}",
                    report.mode, cmd.azimuth_deg, cmd.elevation_deg, az, el, countdown
                ),
                None => info!("{:?}: no target, rotor {} {}, next event in {}", report.mode, az, el, countdown),
            }
        }
    }

    ctrl.disengage().await;

    if args.save_on_exit {
        let path = RotatorConfig::profile_path(&args.config_dir, &ctrl.config().name);
        match ctrl.config().save(&path) {
            Ok(()) => info!("Saved rotator configuration to {}", path.display()),
            Err(e) => error!("Failed to save rotator configuration: {}", e),
        }
    }

    Ok(())
}

fn load_rotator(args: &Args) -> Result<RotatorConfig> {
    if !have_profiles(&args.config_dir) {
        return Err(RotorError::NoProfiles(args.config_dir.clone()).into());
    }
    let name = match &args.rotator {
        Some(name) => name.clone(),
        None => {
            let names = list_profiles(&args.config_dir)?;
            let Some(first) = names.into_iter().next() else {
                return Err(RotorError::NoProfiles(args.config_dir.clone()).into());
            };
            warn!("No rotator given, using {}", first);
            first
        }
    };
    RotatorConfig::load_profile(&args.config_dir, &name)
        .with_context(|| format!("loading rotator profile {}", name))
}
