//! # TRACKLINK Monitor
//!
//! A reader process. Each frame it predicts the head pose at
//! `now + render_latency`, feeds the latency aggregator and, when
//! `latency.csv_dir` is configured, appends every epoch to the CSV log.
//!
//! ```bash
//! tracklink-monitor --config config/tracklink.toml --recenter --profile centered.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracklink::{logging, TrackLinkConfig};
use tracklink_core::{monotonic_seconds, RegionFactory, StateReader};
use tracklink_latency::{LatencyAggregator, LatencyCsvSink};
use tracklink_shared::LocklessSensorState;
use tracklink_tracking::{TrackingError, TrackingReader};

#[derive(Parser, Debug)]
#[command(name = "tracklink-monitor", version, about = "Read, predict and measure tracking state")]
struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frames per second
    #[arg(long, default_value_t = 90.0)]
    rate_hz: f64,

    /// Seconds between the pose query and photons, added to each query time
    #[arg(long, default_value_t = 0.02)]
    render_latency: f64,

    /// Recenter on the first tracked pose
    #[arg(long)]
    recenter: bool,

    /// Centered-frame profile: loaded at start, saved after recentering
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Seconds to wait for a publisher before giving up
    #[arg(long, default_value_t = 10.0)]
    wait: f64,

    /// Stop after this many seconds instead of running until killed
    #[arg(long)]
    seconds: Option<f64>,
}

type Reader = TrackingReader<StateReader<LocklessSensorState>>;

fn main() -> Result<()> {
    let args = Args::parse();
    let config = TrackLinkConfig::load_or_default(args.config.as_deref())
        .context("failed to load config")?;
    logging::init(&config.logging.filter);

    ensure!(
        args.rate_hz.is_finite() && args.rate_hz > 0.0,
        "--rate-hz must be a positive number"
    );
    ensure!(
        args.wait.is_finite() && args.wait >= 0.0,
        "--wait must be a non-negative number"
    );

    let factory = config.region.factory();
    let patience = Duration::from_secs_f64(args.wait);
    let source = wait_for_writer(&factory, &config.region.name, patience)?;
    let mut reader = TrackingReader::new(source)
        .with_filter(config.prediction.filter())
        .with_max_prediction_dt(config.prediction.max_prediction_dt);

    if let Some(profile) = &args.profile {
        reader
            .load_profile(profile)
            .with_context(|| format!("failed to load profile {}", profile.display()))?;
    }

    let mut stats = LatencyAggregator::with_config(config.latency.aggregator())?;
    let sink = match &config.latency.csv_dir {
        Some(dir) => {
            let sink = Arc::new(LatencyCsvSink::new());
            sink.start(dir, &config.latency.csv_file, &config.latency.user_data1)?;
            stats.add_observer(sink.clone());
            Some(sink)
        }
        None => None,
    };

    run(&args, &mut reader, &mut stats)?;

    if let Some(sink) = sink {
        sink.stop();
    }
    Ok(())
}

fn wait_for_writer(
    factory: &RegionFactory,
    name: &str,
    patience: Duration,
) -> Result<StateReader<LocklessSensorState>> {
    let deadline = Instant::now() + patience;
    loop {
        match StateReader::open(factory, name) {
            Ok(source) if source.is_published() => {
                info!(region = name, backend = factory.backend_kind(), "attached");
                return Ok(source);
            }
            Ok(_) => debug!(region = name, "region exists, writer not ready"),
            Err(error) if error.is_recoverable() => {
                debug!(region = name, %error, "waiting for writer");
            }
            Err(error) => {
                return Err(error).with_context(|| format!("failed to open region {name:?}"));
            }
        }
        ensure!(
            Instant::now() < deadline,
            "no writer published region {name:?} within {patience:?}"
        );
        thread::sleep(Duration::from_millis(250));
    }
}

fn run(args: &Args, reader: &mut Reader, stats: &mut LatencyAggregator) -> Result<()> {
    let period = Duration::from_secs_f64(1.0 / args.rate_hz);
    let started = Instant::now();
    let mut next_tick = started;
    let mut recenter_pending = args.recenter;
    let mut was_tracking = true;

    loop {
        let frame_start = monotonic_seconds();
        stats.instrument_frame_start(frame_start);

        match reader.get_sensor_state_at_time(frame_start + args.render_latency) {
            Ok(snapshot) => {
                if !was_tracking {
                    info!("tracking acquired");
                    was_tracking = true;
                }
                if recenter_pending {
                    recenter(reader, args.profile.as_deref())?;
                    recenter_pending = false;
                }
                stats.instrument_pose(&snapshot);

                let pose = snapshot.head_pose.pose;
                debug!(
                    x = pose.translation.x,
                    y = pose.translation.y,
                    z = pose.translation.z,
                    "predicted head pose"
                );
            }
            Err(TrackingError::NoTracking) => {
                if was_tracking {
                    warn!("no tracking");
                    was_tracking = false;
                }
            }
            Err(error) => return Err(error.into()),
        }

        // No compositor here: the whole render latency is attributed to render.
        stats.instrument_latency_timings(args.render_latency, 0.0, 0.0);
        stats.instrument_frame_end(monotonic_seconds());

        if args
            .seconds
            .is_some_and(|limit| started.elapsed().as_secs_f64() >= limit)
        {
            return Ok(());
        }

        next_tick += period;
        match next_tick.checked_duration_since(Instant::now()) {
            Some(wait) => thread::sleep(wait),
            None => next_tick = Instant::now(),
        }
    }
}

fn recenter(reader: &mut Reader, profile: Option<&Path>) -> Result<()> {
    reader.recenter_pose()?;
    let centered = reader.centered_from_world();
    info!(
        x = centered.translation.x,
        z = centered.translation.z,
        "recentered"
    );
    if let Some(path) = profile {
        reader
            .save_profile(path)
            .with_context(|| format!("failed to save profile {}", path.display()))?;
    }
    Ok(())
}
