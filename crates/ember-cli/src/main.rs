//! Ember CLI - Command-line interface for the Ember particle engine

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{check, simulate};

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Headless particle simulation from TOML scenes", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scene for a number of frames and report what happened
    Simulate {
        /// Path to scene file
        scene: String,

        /// Number of frames to step
        #[arg(long, default_value = "120")]
        frames: usize,

        /// Frames per second of the fixed timestep
        #[arg(long, default_value = "60", value_parser = parse_fps)]
        fps: f64,

        /// Output format (text or json)
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Parse and validate a scene, then print its groups and capacities
    Check {
        /// Path to scene file
        scene: String,
    },
}

fn parse_fps(s: &str) -> Result<f64, String> {
    let fps: f64 = s.parse().map_err(|e| format!("invalid fps: {}", e))?;
    if !(fps.is_finite() && fps > 0.0) {
        return Err(format!("fps must be positive, got {}", fps));
    }
    Ok(fps)
}

fn init_logging(verbose: u8, quiet: bool) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();

    // RUST_LOG wins over the flags
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    log::set_max_level(if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    });
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Simulate {
            scene,
            frames,
            fps,
            format,
        } => simulate::run(simulate::SimulateArgs {
            scene,
            frames,
            fps,
            format,
            quiet: cli.quiet,
        }),
        Commands::Check { scene } => check::run(&scene),
    }
}
