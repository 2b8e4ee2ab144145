//! The Graphite plaintext stream replayer.
//!
//! The replayer loads a persisted name universe, opens one long-lived
//! connection to its target and writes one randomized data point per line
//! until shut down. A failed write is logged and the point dropped. By
//! default the loop then carries on over the same connection; with
//! [`FailurePolicy::Reconnect`] the connection is re-established first.
//!
//! ## Metrics
//!
//! `bytes_written`: Bytes sent successfully
//! `points_sent`: Data points sent successfully
//! `request_failure`: Number of failed writes
//! `connection_failure`: Number of failed connection attempts
//! `reconnect`: Connections re-established after a failed write
//!

use std::{fmt, future::Future, io, num::NonZeroU32, path::PathBuf};

use metrics::counter;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use stampede_payload::{Graphite, TimeWindow, Universe, graphite, universe};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::{self, Duration},
};
use tracing::{error, info};

use crate::throttle::Throttle;

fn default_addr() -> String {
    "localhost:2003".to_string()
}

fn default_universe() -> PathBuf {
    PathBuf::from("metrics.json")
}

/// What the replayer does after a failed write.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep writing to the same connection
    #[default]
    Continue,
    /// Drop the connection and reconnect before the next point
    Reconnect,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
/// Configuration of the replayer.
pub struct Config {
    /// The address of the target, `host:port`
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Path of the persisted name universe
    #[serde(default = "default_universe")]
    pub universe: PathBuf,
    /// The historical window timestamps are drawn from
    #[serde(default)]
    pub window: TimeWindow,
    /// The seed for random operations, drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<[u8; 32]>,
    /// Maximum data points per second, unlimited when absent
    #[serde(default)]
    pub lines_per_second: Option<NonZeroU32>,
    /// Behavior after a failed write
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Stop after this many attempted points, run forever when absent
    #[serde(default)]
    pub max_points: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            universe: default_universe(),
            window: TimeWindow::default(),
            seed: None,
            lines_per_second: None,
            on_failure: FailurePolicy::default(),
            max_points: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Replayer`].
pub enum Error {
    /// The name universe could not be loaded.
    #[error("Name universe error: {0}")]
    Universe(#[from] universe::Error),
    /// The time window is not usable.
    #[error(transparent)]
    Window(#[from] graphite::Error),
    /// The initial connection to the target failed.
    #[error("Failed to connect to address {addr}: {source}")]
    ConnectionFailed {
        /// Target address
        addr: String,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

/// Source of connections to the replay target.
pub trait Connector {
    /// The connection type
    type Stream: AsyncWrite + Unpin + fmt::Debug;

    /// The address connections are made to, for diagnostics.
    fn addr(&self) -> &str;

    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = io::Result<Self::Stream>>;
}

#[derive(Debug, Clone)]
/// Connects to the target over TCP.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Create a new [`TcpConnector`] for `addr`, `host:port`.
    #[must_use]
    pub fn new(addr: String) -> Self {
        Self { addr }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn addr(&self) -> &str {
        &self.addr
    }

    fn connect(&self) -> impl Future<Output = io::Result<TcpStream>> {
        TcpStream::connect(self.addr.as_str())
    }
}

/// Counts of a replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Points written in full
    pub points_sent: u64,
    /// Points whose write failed, each one dropped
    pub points_failed: u64,
    /// Connections re-established after a failure
    pub reconnects: u64,
}

impl Stats {
    /// Points attempted, successful or not.
    #[must_use]
    pub fn attempted(&self) -> u64 {
        self.points_sent + self.points_failed
    }
}

#[derive(Debug)]
/// The stream replayer.
///
/// Owns the connection, the data point source and the RNG for its whole
/// lifetime.
pub struct Replayer<C>
where
    C: Connector,
{
    connector: C,
    connection: Option<C::Stream>,
    graphite: Graphite,
    rng: StdRng,
    throttle: Throttle,
    on_failure: FailurePolicy,
    max_points: Option<u64>,
    stats: Stats,
    metric_labels: Vec<(String, String)>,
}

impl<C> Replayer<C>
where
    C: Connector,
{
    /// Load the universe named in `config` and connect to the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the universe cannot be loaded, if the time window
    /// is inverted or if the initial connection fails. No reconnection is
    /// attempted for the initial connection.
    pub async fn new(config: &Config, connector: C) -> Result<Self, Error> {
        let universe = Universe::load(&config.universe)?;
        info!(
            names = universe.len(),
            "loaded name universe from {}",
            config.universe.display()
        );
        let graphite = Graphite::new(universe, config.window)?;
        Self::with_graphite(config, connector, graphite).await
    }

    /// Connect to the target, drawing points from `graphite`. The universe
    /// and window settings of `config` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection fails.
    pub async fn with_graphite(
        config: &Config,
        connector: C,
        graphite: Graphite,
    ) -> Result<Self, Error> {
        let metric_labels = vec![
            ("component".to_string(), "generator".to_string()),
            ("component_name".to_string(), "replay".to_string()),
        ];
        let rng = match config.seed {
            Some(seed) => StdRng::from_seed(seed),
            None => StdRng::from_os_rng(),
        };

        let connection = match connector.connect().await {
            Ok(connection) => {
                info!("connected {addr}", addr = connector.addr());
                connection
            }
            Err(source) => {
                error!("connection error: {addr}: {source}", addr = connector.addr());
                counter!("connection_failure", &metric_labels).increment(1);
                return Err(Error::ConnectionFailed {
                    addr: connector.addr().to_string(),
                    source: Box::new(source),
                });
            }
        };

        Ok(Self {
            connector,
            connection: Some(connection),
            graphite,
            rng,
            throttle: Throttle::new(config.lines_per_second),
            on_failure: config.on_failure,
            max_points: config.max_points,
            stats: Stats::default(),
            metric_labels,
        })
    }

    /// Run the replay loop until `shutdown` completes or, if configured,
    /// `max_points` points have been attempted.
    ///
    /// Write failures never end the loop.
    pub async fn spin<F>(mut self, shutdown: F) -> Stats
    where
        F: Future<Output = ()>,
    {
        let mut line = String::with_capacity(256);
        tokio::pin!(shutdown);

        loop {
            if self
                .max_points
                .is_some_and(|max| self.stats.attempted() >= max)
            {
                info!(
                    sent = self.stats.points_sent,
                    failed = self.stats.points_failed,
                    "point budget exhausted"
                );
                return self.stats;
            }

            if self.connection.is_none() {
                tokio::select! {
                    biased;
                    () = &mut shutdown => {
                        info!("shutdown signal received");
                        return self.stats;
                    }
                    () = self.reconnect() => {}
                }
                continue;
            }

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown signal received");
                    return self.stats;
                }
                () = self.throttle.wait() => {
                    self.send_next(&mut line).await;
                }
            }
        }
    }

    async fn send_next(&mut self, line: &mut String) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        self.graphite.render_next(&mut self.rng, line);

        match connection.write_all(line.as_bytes()).await {
            Ok(()) => {
                self.stats.points_sent += 1;
                counter!("bytes_written", &self.metric_labels).increment(line.len() as u64);
                counter!("points_sent", &self.metric_labels).increment(1);
            }
            Err(err) => {
                self.stats.points_failed += 1;
                error!("transmit error: {err}");

                let mut error_labels = self.metric_labels.clone();
                error_labels.push(("error".to_string(), format!("{:?}", err.kind())));
                counter!("request_failure", &error_labels).increment(1);

                if self.on_failure == FailurePolicy::Reconnect {
                    self.connection = None;
                }
                // Let the runtime observe shutdown between failed attempts.
                tokio::task::yield_now().await;
            }
        }
    }

    async fn reconnect(&mut self) {
        match self.connector.connect().await {
            Ok(connection) => {
                info!("reconnected {addr}", addr = self.connector.addr());
                counter!("reconnect", &self.metric_labels).increment(1);
                self.stats.reconnects += 1;
                self.connection = Some(connection);
            }
            Err(source) => {
                error!(
                    "reconnection error: {addr}: {source}",
                    addr = self.connector.addr()
                );
                let mut error_labels = self.metric_labels.clone();
                error_labels.push(("error".to_string(), format!("{:?}", source.kind())));
                counter!("connection_failure", &error_labels).increment(1);
                time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Connect to `config.addr` over TCP and replay until `shutdown` completes.
///
/// # Errors
///
/// Returns an error if the universe cannot be loaded, the window is inverted
/// or the initial connection fails.
pub async fn run<F>(config: &Config, shutdown: F) -> Result<Stats, Error>
where
    F: Future<Output = ()>,
{
    let replayer = Replayer::new(config, TcpConnector::new(config.addr.clone())).await?;
    Ok(replayer.spin(shutdown).await)
}
