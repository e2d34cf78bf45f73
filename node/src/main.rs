use anyhow::Context as _;
use clap::Parser;
use commonware_runtime::{tokio, Metrics, Runner};
use liftoff_node::{bots, engine::Engine, journal, scheduler::Scheduler, wallet, Config};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs a liftoff round engine.", long_about = None)]
struct Args {
    /// Path to the YAML configuration
    #[arg(short, long)]
    config: String,
}

fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Load config
    let config = std::fs::read_to_string(&args.config)
        .with_context(|| format!("could not read config file {}", args.config))?;
    let config: Config = serde_yaml::from_str(&config).context("could not parse config file")?;
    let config = config.validate().context("invalid config")?;

    // Initialize runtime
    let cfg = tokio::Config::default()
        .with_worker_threads(config.worker_threads)
        .with_catch_panics(true);
    let executor = tokio::Runner::new(cfg);

    // Start runtime
    executor.start(|context| async move {
        // Configure telemetry
        tokio::telemetry::init(
            context.with_label("telemetry"),
            tokio::telemetry::Logging {
                level: config.log_level,
                json: config.json_logs,
            },
            Some(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                config.metrics_port,
            )),
            None,
        );

        // Build engine
        let wallet = wallet::Memory::new();
        let journal = journal::Memory::new();
        let engine = Engine::new(
            context.with_label("engine"),
            config.engine(wallet.clone(), journal),
        );
        info!(
            house_edge = config.policy.house_edge,
            cap = %config.policy.cap,
            distribution = ?config.policy.distribution,
            growth = config.clock.growth(),
            "loaded config"
        );

        // Start lifecycle
        let scheduler =
            Scheduler::new(context.with_label("scheduler"), engine.clone(), config.tick).start();

        // Start simulated bettors
        if config.bots > 0 {
            bots::spawn(
                context.with_label("bots"),
                engine,
                wallet,
                bots::Config {
                    count: config.bots,
                    funding: config.bot_funding,
                    max_stake: config.bot_max_stake,
                    ..Default::default()
                },
            );
            info!(bots = config.bots, "started bots");
        }

        if let Err(e) = scheduler.await {
            error!(?e, "scheduler failed");
        }
    });
    Ok(())
}
