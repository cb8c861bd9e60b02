//! Seawarp - camera/radar homography node driver.
//!
//! Runs the homography engine against a synthetic sea-state orientation
//! feed (or a single refresh cycle) and exports the published matrices,
//! standing in for the live pub/sub transport during calibration work.

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::UnitQuaternion;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use seawarp_core::{Homography, PerspectiveWarp};
use seawarp_node::config::keys;
use seawarp_node::{HomographyEngine, OrientationSample, ParamStore, SystemClock};
use std::f64::consts::TAU;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "seawarp")]
#[command(about = "Camera/radar homography republisher for surface vessels")]
#[command(version)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Feed duration in seconds
    #[arg(long, default_value_t = 10.0)]
    duration: f64,

    /// Orientation sample rate in Hz
    #[arg(long, default_value_t = 20.0)]
    rate: f64,

    /// Run a single refresh cycle (no IMU data) and print the matrices
    #[arg(long)]
    refresh_only: bool,

    /// JSON parameter file merged over the command-line values
    #[arg(long)]
    params: Option<PathBuf>,

    // ── Calibration ───────────────────────────────────────────
    #[arg(long, default_value_t = 500.0)]
    radar_img_w: f64,

    #[arg(long, default_value_t = 50.0)]
    radar_range: f64,

    #[arg(long, default_value_t = 0.0)]
    yaw: f64,

    #[arg(long, default_value_t = 0.0)]
    pitch: f64,

    #[arg(long, default_value_t = 0.0)]
    roll: f64,

    #[arg(long, default_value_t = 52.0)]
    fovy: f64,

    #[arg(long, default_value_t = 0.0)]
    tx: f64,

    #[arg(long, default_value_t = 0.0)]
    ty: f64,

    #[arg(long, default_value_t = 0.0)]
    tz: f64,

    #[arg(long, default_value = "rgb")]
    rgb_frame_id: String,

    #[arg(long, default_value = "radarimg")]
    radarimg_frame_id: String,

    #[arg(long, default_value = "radar")]
    radar_frame_id: String,

    // ── Controller gains ──────────────────────────────────────
    #[arg(long, default_value_t = 0.0)]
    imu_yaw_alpha: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_yaw_beta: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_yaw_gamma: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_pitch_alpha: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_pitch_beta: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_pitch_gamma: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_roll_alpha: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_roll_beta: f64,

    #[arg(long, default_value_t = 0.0)]
    imu_roll_gamma: f64,

    // ── Synthetic sea state ───────────────────────────────────
    #[arg(long, default_value_t = 4.0)]
    wave_amp_deg: f64,

    #[arg(long, default_value_t = 7.0)]
    wave_period: f64,

    #[arg(long, default_value_t = 0.15)]
    noise_deg: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut store = build_store(&args);
    if let Some(path) = &args.params {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameter file {:?}", path))?;
        store
            .merge_json(&json)
            .with_context(|| format!("parsing parameter file {:?}", path))?;
    }

    let mut engine = HomographyEngine::new(store, PerspectiveWarp, SystemClock);

    if args.refresh_only {
        run_refresh(&mut engine)
    } else {
        run_feed(&args, &mut engine)
    }
}

// ---------------------------------------------------------------------------
// Refresh mode
// ---------------------------------------------------------------------------
fn run_refresh(
    engine: &mut HomographyEngine<ParamStore, PerspectiveWarp, SystemClock>,
) -> Result<()> {
    let rgb_radarimg = engine.subscribe_rgb_radarimg();
    let radarimg_radar = engine.subscribe_radarimg_radar();
    let rgb_radar = engine.subscribe_rgb_radar();

    engine.on_refresh();

    for rx in [&rgb_radarimg, &radarimg_radar, &rgb_radar] {
        match rx.borrow().as_ref() {
            Some(h) => print_matrix(h),
            None => println!("(no matrix published; see log for the reason)"),
        }
    }
    Ok(())
}

fn print_matrix(h: &Homography) {
    println!("{} -> {}  (t = {} us)", h.frame_id, h.child_frame_id, h.stamp_us);
    let v = h.values();
    for row in v.chunks(3) {
        println!("  [{:14.6} {:14.6} {:14.6}]", row[0], row[1], row[2]);
    }
}

// ---------------------------------------------------------------------------
// Synthetic feed
// ---------------------------------------------------------------------------
fn run_feed(
    args: &Args,
    engine: &mut HomographyEngine<ParamStore, PerspectiveWarp, SystemClock>,
) -> Result<()> {
    println!("Seawarp homography feed");
    println!("=======================\n");

    let rgb_radarimg = engine.subscribe_rgb_radarimg();
    let radarimg_radar = engine.subscribe_radarimg_radar();
    let rgb_radar = engine.subscribe_rgb_radar();

    std::fs::create_dir_all(&args.output_dir)?;
    let path = args.output_dir.join("homographies.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {:?}", path))?;
    wtr.write_record([
        "time_s",
        "frame_id",
        "child_frame_id",
        "h00",
        "h01",
        "h02",
        "h10",
        "h11",
        "h12",
        "h20",
        "h21",
        "h22",
    ])?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let noise = Normal::new(0.0, args.noise_deg.to_radians())
        .context("noise-deg must be finite and non-negative")?;

    let amp = args.wave_amp_deg.to_radians();
    let steps = (args.duration * args.rate).ceil() as usize;
    let mut published = 0usize;

    // latched initial publish before the feed starts, as on a live vessel
    engine.on_refresh();

    for i in 0..steps {
        let t = i as f64 / args.rate;

        // rolling swell with a weaker, phase-shifted pitch component
        let roll = amp * (TAU * t / args.wave_period).sin() + noise.sample(&mut rng);
        let pitch =
            0.5 * amp * (TAU * t / args.wave_period + 0.25 * TAU).sin() + noise.sample(&mut rng);
        let yaw = noise.sample(&mut rng);

        let quat = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
        engine.on_imu(OrientationSample::new(quat, (t * 1e6) as u64));

        for rx in [&rgb_radarimg, &radarimg_radar, &rgb_radar] {
            if let Some(h) = rx.borrow().as_ref() {
                write_row(&mut wtr, t, h)?;
                published += 1;
            }
        }
    }
    wtr.flush()?;

    println!("Feed Stats:");
    println!("  Samples:   {}", steps);
    println!("  Messages:  {}", published);
    println!("-----------------------------");
    println!("Matrices written to {:?}", path);
    Ok(())
}

fn write_row<W: std::io::Write>(wtr: &mut csv::Writer<W>, t: f64, h: &Homography) -> Result<()> {
    let v = h.values();
    let mut record = vec![
        format!("{:.4}", t),
        h.frame_id.clone(),
        h.child_frame_id.clone(),
    ];
    record.extend(v.iter().map(|x| format!("{:.9}", x)));
    wtr.write_record(&record)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_store(args: &Args) -> ParamStore {
    let mut store = ParamStore::new();
    store.set_f64(keys::RADAR_IMG_W, args.radar_img_w);
    store.set_f64(keys::RADAR_RANGE, args.radar_range);
    store.set_f64(keys::YAW, args.yaw);
    store.set_f64(keys::PITCH, args.pitch);
    store.set_f64(keys::ROLL, args.roll);
    store.set_f64(keys::FOVY, args.fovy);
    store.set_f64(keys::TX, args.tx);
    store.set_f64(keys::TY, args.ty);
    store.set_f64(keys::TZ, args.tz);
    store.set_text(keys::RGB_FRAME_ID, &args.rgb_frame_id);
    store.set_text(keys::RADARIMG_FRAME_ID, &args.radarimg_frame_id);
    store.set_text(keys::RADAR_FRAME_ID, &args.radar_frame_id);

    store.set_f64(keys::IMU_YAW_ALPHA, args.imu_yaw_alpha);
    store.set_f64(keys::IMU_YAW_BETA, args.imu_yaw_beta);
    store.set_f64(keys::IMU_YAW_GAMMA, args.imu_yaw_gamma);
    store.set_f64(keys::IMU_PITCH_ALPHA, args.imu_pitch_alpha);
    store.set_f64(keys::IMU_PITCH_BETA, args.imu_pitch_beta);
    store.set_f64(keys::IMU_PITCH_GAMMA, args.imu_pitch_gamma);
    store.set_f64(keys::IMU_ROLL_ALPHA, args.imu_roll_alpha);
    store.set_f64(keys::IMU_ROLL_BETA, args.imu_roll_beta);
    store.set_f64(keys::IMU_ROLL_GAMMA, args.imu_roll_gamma);
    store
}
