use anyhow::{bail, Context, Result};
use crabcorder::pool::{FramePool, FrameSink};
use crabcorder::recording::{H264Backend, RecordingStats, RecordingStream};
use crabcorder::testing::synthetic_planar_image;
use crabcorder::timing::SensorClock;
use crabcorder::{CaptureBridge, RecorderConfig};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    crabcorder::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: crabcorder-cli <record|init-config> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "record" => cmd_record(&args),
        "init-config" => cmd_init_config(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(args: &[String]) -> Result<()> {
    let path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(RecorderConfig::default_path);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    RecorderConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn cmd_record(args: &[String]) -> Result<()> {
    // Parse args: record [--config <file>] [--frames <n>] [--output <path>] [--json]
    let mut config_path = None;
    let mut frames: u64 = 90;
    let mut output = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(args.get(i).context("--config needs a path")?));
            }
            "--frames" => {
                i += 1;
                frames = args
                    .get(i)
                    .context("--frames needs a count")?
                    .parse()
                    .context("--frames must be a number")?;
            }
            "--output" => {
                i += 1;
                output = Some(PathBuf::from(args.get(i).context("--output needs a path")?));
            }
            "--json" => json = true,
            other => bail!("Unexpected argument: {}", other),
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => RecorderConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RecorderConfig::load_or_default(),
    };
    config.validate().map_err(anyhow::Error::msg)?;

    let pool = Arc::new(FramePool::new(config.pool.capacity));
    let stream = RecordingStream::new(Arc::new(H264Backend::new(true)));
    stream.set_data_provider(pool.clone());
    stream.configure(config.stream_config(output))?;

    let stats = if config.stream.uses_producer_surface {
        let surface = stream
            .input_surface()
            .context("encoder did not provide an input surface")?;
        record_frames(&stream, &config, Arc::new(surface), frames)?
    } else {
        record_frames(&stream, &config, pool.clone(), frames)?
    };

    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!(
            "Recorded {} samples ({} skipped, {} dropped by the pool) in {:.2}s -> {}",
            stats.samples_written,
            stats.input_timeouts,
            pool.dropped_frames(),
            stats.duration_secs(),
            stats.output_path
        );
        println!("Average bitrate: {:.0} bps", stats.avg_bitrate());
    }
    Ok(())
}

/// Push a moving synthetic pattern through a capture bridge at the
/// configured frame rate.
fn record_frames<S: FrameSink>(
    stream: &RecordingStream,
    config: &RecorderConfig,
    sink: Arc<S>,
    frames: u64,
) -> Result<RecordingStats> {
    let mut bridge = CaptureBridge::new(sink, config.stream.layout);
    if let Some(dir) = config.dump_directory() {
        bridge = bridge.with_raw_dump(dir);
    }

    let (width, height) = (config.stream.width, config.stream.height);
    let interval = Duration::from_secs(1) / config.stream.frame_rate;

    let clock = SensorClock::new();
    stream.start()?;
    for n in 0..frames {
        let image = synthetic_planar_image(n, width, height);
        if let Err(e) = bridge.on_image(&image.as_image(), clock.now_ns()) {
            log::warn!("Frame {} not delivered: {}", n, e);
        }
        std::thread::sleep(interval);
    }

    stream
        .stop()?
        .context("stream stopped before the recording finished")
}
