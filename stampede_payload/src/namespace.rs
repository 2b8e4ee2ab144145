//! Unique metric name generation.
//!
//! The [`Generator`] collects distinct names from a [`NameSpace`] until a
//! target count is reached, snapshotting the collection to disk on a fixed
//! wall-clock cadence and once more on completion.
//!
//! Two strategies are available. Rejection sampling draws one value from
//! each catalog, keeps the name if it is new and discards it otherwise. Its
//! throughput degrades as the collection approaches the cardinality space,
//! every draw becoming ever more likely to be a duplicate. When the target is
//! a large enough fraction of the space the generator instead draws a uniform
//! random subset of ordinals without replacement, which bounds the work by
//! the size of the space. Both yield a uniformly chosen subset.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use rand::{Rng, seq::index};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{NameSpace, snapshot};

/// Default fraction of the cardinality space at which [`Generator`] switches
/// from rejection sampling to enumeration.
pub const DEFAULT_ENUMERATION_THRESHOLD: f64 = 0.8;

/// Errors produced by [`Generator`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The requested count was zero.
    #[error("requested name count must be greater than zero")]
    ZeroCount,
    /// The flush interval was zero.
    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,
    /// The enumeration threshold was not a fraction in `(0, 1]`.
    #[error("enumeration threshold must lie in (0, 1], found {0}")]
    Threshold(f64),
    /// The target does not fit in memory on this platform.
    #[error("target of {0} names cannot be held in memory")]
    TooLarge(u64),
    /// Writing a snapshot failed, the run is aborted.
    #[error("Snapshot failed: {0}")]
    Snapshot(#[from] snapshot::Error),
}

/// How a [`Generator`] run collects its names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Independent draws from each catalog, duplicates discarded
    Rejection,
    /// A uniform random subset of the ordinals, drawn without replacement
    Enumeration,
}

/// A progress report, emitted every flush interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Time since the run began
    pub elapsed: Duration,
    /// Distinct names collected so far
    pub current: u64,
    /// The effective target
    pub target: u64,
    /// Names collected per second over the last interval
    pub rate: f64,
}

impl Progress {
    /// Completion in percent.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.target == 0 {
            return 100.0;
        }
        self.current as f64 / self.target as f64 * 100.0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{elapsed:.1}s] Generated: {current}/{target} ({percent:.1}%) | Speed: {rate:.0} metrics/sec",
            elapsed = self.elapsed.as_secs_f64(),
            current = self.current,
            target = self.target,
            percent = self.percent(),
            rate = self.rate,
        )
    }
}

/// The outcome of a completed [`Generator::generate`] run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// The count the caller asked for
    pub requested: u64,
    /// The number of distinct names persisted
    pub produced: u64,
    /// True if `requested` exceeded the cardinality space and was clamped
    pub clamped: bool,
    /// The strategy used to collect names
    pub strategy: Strategy,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Number of snapshots written, the final one included
    pub snapshots: u64,
}

/// Tracks when the next progress report and snapshot are due.
#[derive(Debug)]
struct Cadence {
    interval: Duration,
    start: Instant,
    last_flush: Instant,
    last_count: u64,
}

impl Cadence {
    fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            start,
            last_flush: start,
            last_count: 0,
        }
    }

    fn due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.interval
    }

    fn advance(&mut self, now: Instant, current: u64, target: u64) -> Progress {
        let rate = current.saturating_sub(self.last_count) as f64 / self.interval.as_secs_f64();
        self.last_flush = now;
        self.last_count = current;
        Progress {
            elapsed: now.saturating_duration_since(self.start),
            current,
            target,
            rate,
        }
    }
}

/// The names collected so far, rendered lazily at snapshot time.
struct Rendered<'a> {
    space: &'a NameSpace,
    ordinals: &'a [u64],
}

impl Serialize for Rendered<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_seq(
            self.ordinals
                .iter()
                .filter_map(|&ordinal| self.space.name(ordinal)),
        )
    }
}

/// Generator of unique metric name universes.
#[derive(Debug)]
pub struct Generator<'a> {
    space: &'a NameSpace,
    flush_interval: Duration,
    output: PathBuf,
    enumeration_threshold: Option<f64>,
}

impl<'a> Generator<'a> {
    /// Create a new [`Generator`] that persists to `output` every
    /// `flush_interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if `flush_interval` is zero.
    pub fn new(space: &'a NameSpace, flush_interval: Duration, output: PathBuf) -> Result<Self, Error> {
        if flush_interval.is_zero() {
            return Err(Error::ZeroFlushInterval);
        }
        Ok(Self {
            space,
            flush_interval,
            output,
            enumeration_threshold: Some(DEFAULT_ENUMERATION_THRESHOLD),
        })
    }

    /// Set the fraction of the cardinality space at or above which names are
    /// enumerated rather than rejection sampled. None disables enumeration.
    ///
    /// # Errors
    ///
    /// Returns an error if `threshold` is not in `(0, 1]`.
    pub fn enumeration_threshold(mut self, threshold: Option<f64>) -> Result<Self, Error> {
        if let Some(t) = threshold {
            if !(t > 0.0 && t <= 1.0) {
                return Err(Error::Threshold(t));
            }
        }
        self.enumeration_threshold = threshold;
        Ok(self)
    }

    /// The path snapshots are installed at.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The strategy a run targeting `target` names will use.
    #[must_use]
    pub fn strategy(&self, target: u64) -> Strategy {
        let cardinality = self.space.cardinality();
        let Some(threshold) = self.enumeration_threshold else {
            return Strategy::Rejection;
        };
        if usize::try_from(cardinality).is_err() {
            return Strategy::Rejection;
        }
        if target as f64 >= threshold * cardinality as f64 {
            Strategy::Enumeration
        } else {
            Strategy::Rejection
        }
    }

    /// Collect `count` distinct names, or every name in the space if `count`
    /// exceeds it, and persist them.
    ///
    /// `observe` is called with every progress report and with a final report
    /// once the target is reached.
    ///
    /// # Errors
    ///
    /// Returns an error if `count` is zero, if the target cannot be held in
    /// memory or if any snapshot fails to be written.
    pub fn generate<R, F>(&self, count: u64, rng: &mut R, mut observe: F) -> Result<Summary, Error>
    where
        R: Rng + ?Sized,
        F: FnMut(&Progress),
    {
        if count == 0 {
            return Err(Error::ZeroCount);
        }
        let cardinality = self.space.cardinality();
        let clamped = count > cardinality;
        let target = count.min(cardinality);
        if clamped {
            warn!(
                requested = count,
                maximum = cardinality,
                "Requested {count} metrics, but max possible is {cardinality}. Generating {cardinality} metrics instead."
            );
        }
        let target_len = usize::try_from(target).map_err(|_| Error::TooLarge(target))?;
        let strategy = self.strategy(target);
        info!(
            names = target,
            cardinality,
            ?strategy,
            "Generation starting, snapshots to {}",
            self.output.display()
        );

        let mut cadence = Cadence::new(self.flush_interval, Instant::now());
        let mut ordinals: Vec<u64> = Vec::with_capacity(target_len);
        let mut snapshots = 0_u64;

        match strategy {
            Strategy::Rejection => {
                let mut seen: FxHashSet<u64> = FxHashSet::default();
                seen.reserve(target_len);
                while ordinals.len() < target_len {
                    let ordinal = self.space.sample(rng);
                    if seen.insert(ordinal) {
                        ordinals.push(ordinal);
                    }
                    if self.tick(&mut cadence, &ordinals, target, &mut observe)? {
                        snapshots += 1;
                    }
                }
            }
            Strategy::Enumeration => {
                // Checked in `strategy`.
                let space_len = usize::try_from(cardinality).map_err(|_| Error::TooLarge(cardinality))?;
                for ordinal in index::sample(rng, space_len, target_len) {
                    ordinals.push(ordinal as u64);
                    if self.tick(&mut cadence, &ordinals, target, &mut observe)? {
                        snapshots += 1;
                    }
                }
            }
        }

        self.snapshot(&ordinals)?;
        snapshots += 1;

        let now = Instant::now();
        let produced = ordinals.len() as u64;
        observe(&cadence.advance(now, produced, target));
        let elapsed = now.saturating_duration_since(cadence.start);
        info!(
            "Generated {produced} metrics in {secs:.1} seconds!",
            secs = elapsed.as_secs_f64()
        );

        Ok(Summary {
            requested: count,
            produced,
            clamped,
            strategy,
            elapsed,
            snapshots,
        })
    }

    /// Report progress and snapshot if the flush interval has elapsed. Returns
    /// true if a snapshot was written.
    fn tick<F>(
        &self,
        cadence: &mut Cadence,
        ordinals: &[u64],
        target: u64,
        observe: &mut F,
    ) -> Result<bool, Error>
    where
        F: FnMut(&Progress),
    {
        let now = Instant::now();
        if !cadence.due(now) {
            return Ok(false);
        }
        let progress = cadence.advance(now, ordinals.len() as u64, target);
        info!("{progress}");
        observe(&progress);
        self.snapshot(ordinals)?;
        Ok(true)
    }

    fn snapshot(&self, ordinals: &[u64]) -> Result<(), Error> {
        let rendered = Rendered {
            space: self.space,
            ordinals,
        };
        snapshot::save(&rendered, &self.output)?;
        debug!(names = ordinals.len(), "snapshot written");
        Ok(())
    }
}
