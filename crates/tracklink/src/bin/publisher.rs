//! # TRACKLINK Publisher
//!
//! The single writer. Publishes synthetic head motion into the shared
//! region at a fixed rate, standing in for the device sampling loop.
//!
//! ```bash
//! tracklink-publisher --config config/tracklink.toml --rate-hz 1000
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracklink::{logging, BackendKind, OrbitMotion, TrackLinkConfig};
use tracklink_core::{monotonic_seconds, StateWriter};
use tracklink_shared::LocklessSensorState;

#[derive(Parser, Debug)]
#[command(name = "tracklink-publisher", version, about = "Publish synthetic tracking state")]
struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Samples published per second
    #[arg(long, default_value_t = 1000.0)]
    rate_hz: f64,

    /// Stop after this many seconds instead of running until killed
    #[arg(long)]
    seconds: Option<f64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = TrackLinkConfig::load_or_default(args.config.as_deref())
        .context("failed to load config")?;
    logging::init(&config.logging.filter);

    ensure!(
        args.rate_hz.is_finite() && args.rate_hz > 0.0,
        "--rate-hz must be a positive number"
    );
    if config.region.backend == BackendKind::InProcess {
        warn!("in_process backend: readers in other processes cannot see this region");
    }

    let factory = config.region.factory();
    let mut writer = StateWriter::<LocklessSensorState>::open(&factory, &config.region.name)
        .with_context(|| format!("failed to open region {:?}", config.region.name))?;
    info!(
        region = writer.name(),
        backend = factory.backend_kind(),
        rate_hz = args.rate_hz,
        "publishing"
    );

    let motion = OrbitMotion::default();
    let period = Duration::from_secs_f64(1.0 / args.rate_hz);
    let started = Instant::now();
    let mut next_tick = started;
    let mut next_report = started + Duration::from_secs(1);

    loop {
        writer.set_state(motion.sample(monotonic_seconds()));

        let now = Instant::now();
        if now >= next_report {
            info!(updates = writer.update_count(), "publisher alive");
            next_report += Duration::from_secs(1);
        }
        if args
            .seconds
            .is_some_and(|limit| started.elapsed().as_secs_f64() >= limit)
        {
            break;
        }

        next_tick += period;
        match next_tick.checked_duration_since(Instant::now()) {
            Some(wait) => thread::sleep(wait),
            // Fell behind; do not burst to catch up.
            None => next_tick = Instant::now(),
        }
    }

    info!(updates = writer.update_count(), "publisher stopped");
    Ok(())
}
