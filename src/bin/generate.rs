//! Feature driver generator CLI

use std::fs::File;
use std::process;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use redfish_feature_gen::GeneratorConfig;

#[derive(Parser)]
#[command(
    name = "redfish-feature-gen",
    about = "Generate EDK2 Redfish feature drivers from JSON schemas",
    after_help = "Example:\n  redfish-feature-gen --config ./config.json"
)]
struct Args {
    /// Path to the JSON config file
    #[arg(long)]
    config: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<String>,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &args.log_file {
        Some(path) => {
            let file = match File::create(path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Error: unable to open log file {path}: {e}");
                    process::exit(1);
                }
            };
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    let config = match GeneratorConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = redfish_feature_gen::run(&config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
