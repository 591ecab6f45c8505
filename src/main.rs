//! Himax-capture binary: capture one frame and write it to disk.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use himax_capture::mock::TestPattern;
use himax_capture::persist::DEFAULT_OUTPUT;
use himax_capture::{
    resolve, CaptureController, CaptureMode, FramePool, MockSensor, PgmFileSink, Resolution,
    SensorDriver, SessionError, TransferMode, V4L2Sensor,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    /// 324x324
    Full,
    /// 324x244 (QVGA window)
    Reduced,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransferArg {
    /// Capture call returns once the frame is in memory
    Blocking,
    /// Capture completes through a notification
    EventDriven,
}

#[derive(Parser)]
#[command(name = "himax-capture")]
#[command(about = "Capture a single grayscale frame from a Himax sensor")]
#[command(version)]
struct Cli {
    /// Resolution preset
    #[arg(long, value_enum, env = "HIMAX_PRESET", default_value = "full")]
    preset: PresetArg,

    /// Transfer mode
    #[arg(long, value_enum, env = "HIMAX_TRANSFER", default_value = "blocking")]
    transfer: TransferArg,

    /// V4L2 device index (/dev/videoN)
    #[arg(short, long, default_value_t = 0)]
    device: u32,

    /// Output path for the captured frame
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Delay before verifying the orientation register, in milliseconds
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Give up on an event-driven transfer after this many milliseconds
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Use the simulated sensor instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn mode(&self) -> CaptureMode {
        let preset = match self.preset {
            PresetArg::Full => Resolution::Full,
            PresetArg::Reduced => Resolution::Reduced,
        };
        let transfer = match self.transfer {
            TransferArg::Blocking => TransferMode::Blocking,
            TransferArg::EventDriven => TransferMode::EventDriven,
        };
        CaptureMode::new(preset, transfer)
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("himax_capture={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    info!("*** Image capture ***");
    if let Err(err) = run(&cli) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), SessionError> {
    if cli.simulate {
        capture_with(MockSensor::new().with_pattern(TestPattern::Gradient), cli)
    } else {
        capture_with(V4L2Sensor::new(cli.device), cli)
    }
}

fn capture_with<D: SensorDriver>(driver: D, cli: &Cli) -> Result<(), SessionError> {
    let config = resolve(cli.mode()).with_settle(Duration::from_millis(cli.settle_ms));
    info!(
        preset = %config.preset,
        transfer = ?config.transfer,
        output = %cli.output.display(),
        "Entering main controller"
    );

    let mut controller = CaptureController::new(driver, FramePool::new(), config);
    if let Some(timeout) = cli.wait_timeout_ms {
        controller = controller.with_wait_limit(Duration::from_millis(timeout));
    }

    controller.run(&mut PgmFileSink, &cli.output)?;

    let caps = controller.driver().capabilities();
    info!(driver = %caps.driver, card = %caps.card, "Capture complete");
    Ok(())
}
