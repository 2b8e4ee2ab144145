use std::{
    fmt::{self, Display},
    future,
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
};

use clap::{Args, Parser, Subcommand};
use jemallocator::Jemalloc;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use stampede::{
    config::{self, Config},
    names,
    replay::{self, FailurePolicy},
    telemetry::{self, Telemetry},
};
use tokio::{runtime::Builder, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::Error),
    #[error("Name generation failed: {0}")]
    Names(#[from] names::Error),
    #[error("Replay failed: {0}")]
    Replay(#[from] replay::Error),
    #[error(transparent)]
    Telemetry(#[from] telemetry::Error),
}

#[derive(Default, Clone, Debug)]
struct CliKeyValues {
    inner: FxHashMap<String, String>,
}

impl Display for CliKeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        for (k, v) in &self.inner {
            write!(f, "{k}={v},")?;
        }
        Ok(())
    }
}

impl FromStr for CliKeyValues {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // A key always matches `[[:alpha:]_]+` and is followed by a '='. Pairs
        // are delimited by ',' but ',' is also valid inside a value, so keys
        // serve as the delimiter and values are whatever lies between them.
        static RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"([[:alpha:]_]+)=").expect("Invalid regex pattern provided"));

        let mut labels = FxHashMap::default();

        for cap in RE.captures_iter(input) {
            let key = cap[1].to_string();
            let start = cap.get(0).map_or(input.len(), |m| m.end());

            // The value runs to the next key or the end of the input.
            let end = RE.find_at(input, start).map_or(input.len(), |m| m.start());
            let value = input[start..end].trim_end_matches(',').to_string();

            labels.insert(key, value);
        }

        Ok(Self { inner: labels })
    }
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce and persist a universe of unique metric names
    Generate(GenerateCommand),
    /// Stream data points for a persisted universe to a Graphite endpoint
    Replay(ReplayCommand),
    /// Validate configuration and exit
    ConfigCheck(ConfigCheckCommand),
}

// Shared arguments used by every subcommand that does work
#[derive(Args)]
struct CommonArgs {
    /// path on disk to the configuration file
    #[clap(long, env = "STAMPEDE_CONFIG_PATH")]
    config_path: Option<PathBuf>,
    /// socket to bind prometheus exporter to
    #[clap(long, env = "STAMPEDE_PROMETHEUS_ADDR")]
    prometheus_addr: Option<SocketAddr>,
    /// additional labels to apply to all metrics, format KEY=VAL,KEY2=VAL
    #[clap(long)]
    global_labels: Option<CliKeyValues>,
}

impl CommonArgs {
    fn load(&self) -> Result<Config, Error> {
        let mut config = Config::load(self.config_path.as_deref())?;

        if let Some(addr) = self.prometheus_addr {
            config.telemetry = Some(Telemetry::Prometheus {
                addr,
                global_labels: FxHashMap::default(),
            });
        }
        if let (Some(telemetry), Some(labels)) = (config.telemetry.as_mut(), &self.global_labels)
        {
            telemetry.extend_global_labels(labels.inner.clone());
        }
        Ok(config)
    }
}

#[derive(Args)]
struct GenerateCommand {
    #[command(flatten)]
    common: CommonArgs,
    /// number of unique names to produce
    #[clap(long, env = "STAMPEDE_COUNT")]
    count: Option<u64>,
    /// seconds between progress reports and snapshots
    #[clap(long, env = "STAMPEDE_FLUSH_INTERVAL_SECONDS")]
    flush_interval_seconds: Option<u64>,
    /// path to persist the name universe to
    #[clap(long, env = "STAMPEDE_OUTPUT")]
    output: Option<PathBuf>,
}

impl GenerateCommand {
    fn apply(&self, config: &mut names::Config) {
        if let Some(count) = self.count {
            config.count = count;
        }
        if let Some(flush_interval_seconds) = self.flush_interval_seconds {
            config.flush_interval_seconds = flush_interval_seconds;
        }
        if let Some(output) = &self.output {
            config.output.clone_from(output);
        }
    }
}

#[derive(Args)]
struct ReplayCommand {
    #[command(flatten)]
    common: CommonArgs,
    /// address of the Graphite endpoint, host:port
    #[clap(long, env = "STAMPEDE_ADDR")]
    addr: Option<String>,
    /// path of the persisted name universe
    #[clap(long, env = "STAMPEDE_UNIVERSE")]
    universe: Option<PathBuf>,
    /// maximum data points per second
    #[clap(long, env = "STAMPEDE_LINES_PER_SECOND")]
    lines_per_second: Option<NonZeroU32>,
    /// stop after this many points
    #[clap(long, env = "STAMPEDE_MAX_POINTS")]
    max_points: Option<u64>,
    /// reconnect after a failed write rather than continuing on the same
    /// connection
    #[clap(long)]
    reconnect: bool,
}

impl ReplayCommand {
    fn apply(&self, config: &mut replay::Config) {
        if let Some(addr) = &self.addr {
            config.addr.clone_from(addr);
        }
        if let Some(universe) = &self.universe {
            config.universe.clone_from(universe);
        }
        if let Some(lines_per_second) = self.lines_per_second {
            config.lines_per_second = Some(lines_per_second);
        }
        if let Some(max_points) = self.max_points {
            config.max_points = Some(max_points);
        }
        if self.reconnect {
            config.on_failure = FailurePolicy::Reconnect;
        }
    }
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long, env = "STAMPEDE_CONFIG_PATH")]
    config_path: Option<PathBuf>,
}

fn install_telemetry(config: &Config) -> Result<(), Error> {
    if let Some(telemetry) = &config.telemetry {
        telemetry.install()?;
    }
    Ok(())
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("received ctrl-c"),
        Err(err) => {
            error!("unable to listen for ctrl-c: {err}");
            future::pending::<()>().await;
        }
    }
}

fn generate(cmd: &GenerateCommand) -> Result<(), Error> {
    let mut config = cmd.common.load()?;
    cmd.apply(&mut config.names);
    config.validate()?;
    install_telemetry(&config)?;

    names::run(&config.names)?;
    Ok(())
}

fn replay(cmd: &ReplayCommand) -> Result<(), Error> {
    let mut config = cmd.common.load()?;
    cmd.apply(&mut config.replay);
    config.validate()?;

    // Points are produced and written one at a time from a single task.
    let runtime = Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let stats = runtime.block_on(async {
        install_telemetry(&config)?;
        replay::run(&config.replay, ctrl_c())
            .await
            .map_err(Error::from)
    })?;
    info!(
        sent = stats.points_sent,
        failed = stats.points_failed,
        reconnects = stats.reconnects,
        "replay finished"
    );
    Ok(())
}

fn config_check(cmd: &ConfigCheckCommand) -> Result<(), Error> {
    let config = Config::load(cmd.config_path.as_deref()).inspect_err(|err| {
        error!("Configuration validation failed: {err}");
    })?;
    config.validate().inspect_err(|err| {
        error!("Configuration validation failed: {err}");
    })?;
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .finish()
        .init();

    let cli = Cli::parse();
    let version = env!("CARGO_PKG_VERSION");
    info!("Starting stampede {version}.");

    match cli.command {
        Commands::Generate(cmd) => generate(&cmd),
        Commands::Replay(cmd) => replay(&cmd),
        Commands::ConfigCheck(cmd) => config_check(&cmd),
    }
}
