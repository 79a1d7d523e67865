use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mecanum_teleop_runtime::config::ControlConfig;
use mecanum_teleop_runtime::runtime::{self, RunOptions};

/// Teleop control loop for the mecanum base
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file overriding the built-in tuning
    #[arg(long)]
    config: Option<PathBuf>,

    /// Control loop rate in Hz
    #[arg(long)]
    hz: Option<u64>,

    /// Start driving immediately instead of waiting for the active signal
    #[arg(long)]
    autostart: bool,

    /// Run without the odometry computer
    #[arg(long)]
    no_pose: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ControlConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Config error ({}): {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => ControlConfig::default(),
    };
    if let Some(hz) = args.hz {
        config.loop_hz = hz;
    }

    let options = RunOptions {
        config,
        autostart: args.autostart,
        pose_enabled: !args.no_pose,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
