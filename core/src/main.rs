//! IMU DEAD RECKONING: replay a recorded IMU log through the strapdown integrator.
//!
//! Reads `IMU t gx gy gz ax ay az` lines from a text log, integrates them open loop with known gravity and
//! biases, and writes one `t px py pz qw qx qy qz vx vy vz` line per accepted sample. Calibration comes
//! from a JSON/YAML/TOML file when `--config` is given, otherwise from built-in defaults matching the
//! reference data set.
use clap::Parser;
use log::{LevelFilter, error, info, warn};
use std::error::Error;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use deadreckoning::config::IntegratorConfig;
use deadreckoning::integrator::StrapdownIntegrator;
use deadreckoning::sim::{ImuTextReader, StateWriter, dead_reckoning};

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Open-loop strapdown integration of a recorded IMU log.")]
struct Cli {
    /// Path to the IMU text log
    #[arg(long, default_value = "./data/ch3/10.txt")]
    imu_txt_path: PathBuf,

    /// Where to write the integrated states
    #[arg(short, long, default_value = "./data/ch3/state.txt")]
    output: PathBuf,

    /// Calibration and integrator configuration (JSON/YAML/TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Route `log` output to stderr, or append it to `log_file` when one is given.
///
/// Lines carry a millisecond local timestamp and the emitting module, e.g.
/// `12:03:04.512 WARN  deadreckoning::integrator: 0.250 s gap ...`. An unparsable level falls back to `info`.
fn init_logger(log_level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let level = log_level.parse::<LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", log_level);
        LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            IntegratorConfig::from_file(path)?
        }
        None => IntegratorConfig::default(),
    };
    info!(
        "gravity {:?}, gyro bias {:?}, accel bias {:?}",
        config.gravity, config.gyro_bias, config.accel_bias
    );
    let mut integrator = StrapdownIntegrator::from_config(&config)?;

    if let Some(parent) = cli.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut reader = ImuTextReader::from_path(&cli.imu_txt_path)?;
    let mut writer = StateWriter::create(&cli.output)?;
    info!(
        "Integrating {} into {}",
        cli.imu_txt_path.display(),
        cli.output.display()
    );

    let samples = reader.samples().filter_map(|sample| match sample {
        Ok(sample) => Some(sample),
        Err(e) => {
            warn!("{}", e);
            None
        }
    });
    let summary = dead_reckoning(samples, &mut integrator, &mut writer)?;
    writer.flush()?;
    info!("Final state: {}", summary.final_state);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logger(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logger: {}", e);
    }
    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
