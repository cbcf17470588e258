mod args;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use pose_dump::common::{InferenceDevice, RunMode};
use pose_dump::images::{self, ImageBatch};
use pose_dump::{init_runtime, load_detector, load_pose_model, Driver};
use crate::args::Args;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let device = InferenceDevice::parse(&args.device)?;
    log::info!("Mode: {} | Device: {}", args.mode.str(), device);

    init_runtime(args.ort_lib.as_deref())?;
    let detector = load_detector(&args.det_config, &args.det_checkpoint, device)?;
    let mut estimator = load_pose_model(&args.pose_config, &args.pose_checkpoint, device)?;

    if args.wants_rendering() {
        log::warn!("--show and --out-img-root are accepted but no rendering is performed");
    }

    if args.mode == RunMode::ExportTrace {
        estimator.export_trace(&args.trace_out)?;
        return Ok(());
    }

    let config = args.export_config();
    let batch = match &args.img {
        Some(img) => ImageBatch::single(img),
        None => ImageBatch::from_pattern(&images::pattern_for(&config.img_root, &args.pattern))?,
    };
    log::info!("{} image(s) to process", batch.len());

    let mut driver = Driver::new(detector, estimator, config);
    driver.run(batch)?;
    if args.mode == RunMode::Detect {
        driver.detector().print_time();
    }
    driver.estimator().print_time();

    Ok(())
}
