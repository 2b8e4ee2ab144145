//! Graphite plaintext payload.
//!
//! Each data point is rendered as a single line
//! `<metric-name> <value> <timestamp>\n`, the value with exactly two decimal
//! digits and the timestamp in integer Unix seconds.

use std::fmt::{self, Write};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Universe;

/// Exclusive upper bound of a data point value.
pub const MAX_VALUE: f64 = 1_000.0;

// Values are drawn on the hundredths grid so that the two-digit rendering is
// exact and never rounds up to `MAX_VALUE`.
const VALUE_STEPS: u32 = 100_000;

/// Errors produced by [`TimeWindow::new`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The window's start lies after its end.
    #[error("time window start {start} is after its end {end}")]
    InvertedWindow {
        /// Start of the window, Unix seconds
        start: i64,
        /// End of the window, Unix seconds
        end: i64,
    },
}

fn default_start() -> i64 {
    // 2025-01-01T00:00:00Z
    1_735_689_600
}

fn default_end() -> i64 {
    // 2025-02-20T00:00:00Z
    1_740_009_600
}

/// A closed, historical interval of Unix seconds data point timestamps are
/// drawn from.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TimeWindow {
    /// First admissible timestamp, inclusive
    #[serde(default = "default_start")]
    pub start: i64,
    /// Last admissible timestamp, inclusive
    #[serde(default = "default_end")]
    pub end: i64,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
        }
    }
}

impl TimeWindow {
    /// Create a new [`TimeWindow`].
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is after `end`.
    pub fn new(start: i64, end: i64) -> Result<Self, Error> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    /// Check that the window is not inverted. Needed for windows built
    /// through deserialization.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is after `end`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.start > self.end {
            return Err(Error::InvertedWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Draw a timestamp uniformly from the window, both ends included.
    pub fn sample<R>(&self, rng: &mut R) -> i64
    where
        R: Rng + ?Sized,
    {
        rng.random_range(self.start..=self.end)
    }
}

/// A single synthetic data point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint<'a> {
    /// The metric this point belongs to
    pub name: &'a str,
    /// The value, in `[0, 1000)`
    pub value: f64,
    /// Unix seconds
    pub timestamp: i64,
}

impl fmt::Display for DataPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{name} {value:.2} {timestamp}",
            name = self.name,
            value = self.value,
            timestamp = self.timestamp,
        )
    }
}

/// Graphite plaintext data point source.
///
/// Draws names from a [`Universe`], values uniformly from `[0, 1000)` and
/// timestamps uniformly from a [`TimeWindow`].
#[derive(Debug, Clone)]
pub struct Graphite {
    universe: Universe,
    window: TimeWindow,
}

impl Graphite {
    /// Create a new [`Graphite`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if `window` is inverted.
    pub fn new(universe: Universe, window: TimeWindow) -> Result<Self, Error> {
        window.validate()?;
        Ok(Self { universe, window })
    }

    /// The universe names are drawn from.
    #[must_use]
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Draw the next data point.
    pub fn next_point<R>(&self, rng: &mut R) -> DataPoint<'_>
    where
        R: Rng + ?Sized,
    {
        let name = self.universe.choose(rng);
        let value = f64::from(rng.random_range(0..VALUE_STEPS)) / 100.0;
        let timestamp = self.window.sample(rng);
        DataPoint {
            name,
            value,
            timestamp,
        }
    }

    /// Draw the next data point and render it, newline included, into
    /// `buffer`. The buffer is cleared first.
    pub fn render_next<R>(&self, rng: &mut R, buffer: &mut String)
    where
        R: Rng + ?Sized,
    {
        buffer.clear();
        let point = self.next_point(rng);
        // Writing into a String does not fail.
        let _ = write!(buffer, "{point}");
    }
}
