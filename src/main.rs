use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use selfheal::config::{Config, LoggingConfig};
use selfheal::detect::engine::AnomalyDetector;
use selfheal::detect::Assessment;

#[derive(Parser)]
#[command(
    name = "selfheal",
    about = "Self-healing observability loop: sample, predict, remediate",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults: $SELFHEAL_CONFIG, ./selfheal.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run everything in one process (monitor + predictor + healer + API)
    Serve,

    /// Run only the monitor: poll the target and record samples
    Monitor,

    /// Run only the predictor: assess the window and post events to the healer
    Predictor,

    /// Run only the healer: accept events over HTTP and remediate
    Healer,

    /// Assess the current window once and print the result
    Evaluate {
        /// Service to assess (defaults to the configured service)
        #[arg(long)]
        service: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent incidents
    Incidents {
        /// Number of incidents to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Only incidents for this service
        #[arg(long)]
        service: Option<String>,
    },

    /// Show the most recent samples of a service
    Samples {
        /// Number of samples to show
        #[arg(long, default_value = "15")]
        limit: usize,

        /// Service to show (defaults to the configured service)
        #[arg(long)]
        service: Option<String>,
    },

    /// Run the toy target service with failure injection
    DemoTarget {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolved = Config::resolve(cli.config.as_deref())?;
    init_tracing(&resolved.config.logging);
    resolved.log();
    let config = resolved.config;

    match cli.command {
        Commands::Serve => {
            tracing::info!(service = %config.service.name, "Starting selfheal loop");
            selfheal::serve(config).await?;
        }
        Commands::Monitor => selfheal::run_monitor(config).await?,
        Commands::Predictor => selfheal::run_predictor(config).await?,
        Commands::Healer => selfheal::run_healer(config).await?,
        Commands::Evaluate { service, json } => {
            let service = service.unwrap_or_else(|| config.service.name.clone());
            let store = selfheal::open_store(&config)?;
            let detector = AnomalyDetector::new(store, config.detector.clone());
            let assessment = detector.assess(&service).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&assessment)?);
            } else {
                match assessment {
                    Assessment::InsufficientData { have, needed } => {
                        println!("{service}: not enough data ({have}/{needed} samples)");
                    }
                    Assessment::Healthy => println!("{service}: stable"),
                    Assessment::Anomalous(event) => {
                        println!(
                            "{service}: {} (ETA {} min, confidence {:.0}%)",
                            event.kind,
                            event.eta_minutes,
                            event.confidence * 100.0
                        );
                        println!("  {}", event.message);
                    }
                }
            }
        }
        Commands::Incidents { limit, service } => {
            let store = selfheal::open_store(&config)?;
            let incidents = match service.as_deref() {
                Some(service) => store.fetch_incidents_for(service, limit)?,
                None => store.fetch_recent_incidents(limit)?,
            };

            if incidents.is_empty() {
                println!("No incidents recorded.");
            } else {
                println!(
                    "{:<25} | {:<15} | {:<22} | {:<7} | Action",
                    "Time", "Service", "Type", "Success"
                );
                println!("{:-<25}-|-{:-<15}-|-{:-<22}-|-{:-<7}-|-{:-<30}", "", "", "", "", "");
                for i in incidents {
                    let time = chrono::DateTime::from_timestamp(i.timestamp, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| i.timestamp.to_string());
                    println!(
                        "{:<25} | {:<15} | {:<22} | {:<7} | {}",
                        time, i.service, i.kind, i.success, i.action
                    );
                }
            }
        }
        Commands::Samples { limit, service } => {
            let service = service.unwrap_or_else(|| config.service.name.clone());
            let store = selfheal::open_store(&config)?;
            let samples = store.fetch_recent(&service, limit)?;

            if samples.is_empty() {
                println!("No samples recorded for {service}.");
            } else {
                println!(
                    "{:<12} | {:>12} | {:>10} | {:>6}",
                    "Timestamp", "Response ms", "Memory MB", "Error"
                );
                println!("{:-<12}-|-{:->12}-|-{:->10}-|-{:->6}", "", "", "", "");
                for s in samples {
                    println!(
                        "{:<12} | {:>12.2} | {:>10.1} | {:>6.2}",
                        s.timestamp, s.response_time_ms, s.memory_mb, s.error_rate
                    );
                }
            }
        }
        Commands::DemoTarget { bind } => {
            tracing::info!(%bind, "Starting demo target");
            selfheal::demo::serve(&bind).await?;
        }
    }

    Ok(())
}
