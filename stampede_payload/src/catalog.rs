//! Catalogs of metric names and tag values.
//!
//! A [`MetricName`] is composed of one base metric and three tags: `circuit`,
//! `application` and `instance`. Each tag value is drawn from a fixed,
//! finite catalog. The product of the catalog sizes is the cardinality space
//! of a [`NameSpace`], the upper bound on how many distinct names exist.
//!
//! Every member of the space is addressed by an ordinal in
//! `0..cardinality`. Ordinals are mixed-radix numbers with the instance as
//! the least significant digit, so distinct ordinals always decode to
//! distinct names.

use std::fmt;

use rand::Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Default upper bound, inclusive, of the `instance` tag.
pub const DEFAULT_MAX_INSTANCES: u32 = 1_000;

const METRICS: &[&str] = &[
    "cpu.usage",
    "cpu.idle",
    "cpu.iowait",
    "cpu.system",
    "cpu.user",
    "memory.used",
    "memory.free",
    "memory.cached",
    "memory.buffers",
    "memory.available",
    "disk.usage",
    "disk.iops.read",
    "disk.iops.write",
    "disk.latency.read",
    "disk.latency.write",
    "disk.throughput.read",
    "disk.throughput.write",
    "network.bytes_in",
    "network.bytes_out",
    "network.packets_in",
    "network.packets_out",
    "network.errors_in",
    "network.errors_out",
    "requests.total",
    "requests.success",
    "requests.errors",
    "requests.rate",
    "response_time.avg",
    "response_time.min",
    "response_time.max",
    "response_time.p50",
    "response_time.p95",
    "response_time.p99",
    "connections.active",
    "connections.idle",
    "connections.total",
    "queue.size",
    "queue.processing",
    "queue.pending",
    "cache.hits",
    "cache.misses",
    "cache.hit_rate",
    "db.queries",
    "db.slow_queries",
    "db.connections",
    "errors.rate",
    "errors.5xx",
    "errors.4xx",
    "users.active",
    "users.registered",
    "orders.total",
    "orders.completed",
    "revenue.total",
    "conversions.rate",
];

const CIRCUITS: &[&str] = &["live", "stage", "dev"];

const APPLICATIONS: &[&str] = &[
    "web", "api", "db", "cache", "queue", "worker", "lb", "storage",
];

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

fn default_metrics() -> Vec<String> {
    owned(METRICS)
}

fn default_circuits() -> Vec<String> {
    owned(CIRCUITS)
}

fn default_applications() -> Vec<String> {
    owned(APPLICATIONS)
}

fn default_max_instances() -> u32 {
    DEFAULT_MAX_INSTANCES
}

/// Errors produced by [`NameSpace::new`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// One of the catalogs has no entries.
    #[error("catalog `{0}` must not be empty")]
    Empty(&'static str),
    /// A catalog entry would break the line protocol or the tag syntax.
    #[error("catalog `{dimension}` entry {value:?} contains characters outside of [a-zA-Z0-9_.{extra}]")]
    InvalidEntry {
        /// Catalog holding the entry
        dimension: &'static str,
        /// The offending entry
        value: String,
        /// Characters permitted beyond the base class
        extra: &'static str,
    },
    /// A catalog holds the same entry twice, distinct ordinals would render to
    /// the same name.
    #[error("catalog `{dimension}` holds {value:?} more than once")]
    Duplicate {
        /// Catalog holding the entry
        dimension: &'static str,
        /// The repeated entry
        value: String,
    },
    /// The instance tag has no values.
    #[error("max_instances must be greater than zero")]
    ZeroInstances,
    /// The product of catalog sizes does not fit in a u64.
    #[error("cardinality space of the catalogs overflows u64")]
    Overflow,
}

/// The catalogs a [`NameSpace`] is built from.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Base metric identifiers, for example `cpu.usage`
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,
    /// Values of the `circuit` tag
    #[serde(default = "default_circuits")]
    pub circuits: Vec<String>,
    /// Values of the `application` tag
    #[serde(default = "default_applications")]
    pub applications: Vec<String>,
    /// The `instance` tag takes values in `1..=max_instances`
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
            circuits: default_circuits(),
            applications: default_applications(),
            max_instances: default_max_instances(),
        }
    }
}

fn validate(dimension: &'static str, values: &[String], extra: &'static str) -> Result<(), Error> {
    if values.is_empty() {
        return Err(Error::Empty(dimension));
    }
    let mut seen = FxHashSet::default();
    for value in values {
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || extra.contains(c));
        if !valid {
            return Err(Error::InvalidEntry {
                dimension,
                value: value.clone(),
                extra,
            });
        }
        if !seen.insert(value.as_str()) {
            return Err(Error::Duplicate {
                dimension,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// A metric name borrowed from the catalogs of a [`NameSpace`].
///
/// Renders as `base;circuit=<c>;application=<a>;instance=<i>`, the tag clauses
/// always in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricName<'a> {
    /// Base metric identifier
    pub metric: &'a str,
    /// Value of the `circuit` tag
    pub circuit: &'a str,
    /// Value of the `application` tag
    pub application: &'a str,
    /// Value of the `instance` tag, at least 1
    pub instance: u32,
}

impl fmt::Display for MetricName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{metric};circuit={circuit};application={application};instance={instance}",
            metric = self.metric,
            circuit = self.circuit,
            application = self.application,
            instance = self.instance,
        )
    }
}

impl Serialize for MetricName<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A validated [`Catalog`] together with its cardinality space.
#[derive(Debug, Clone)]
pub struct NameSpace {
    catalog: Catalog,
    cardinality: u64,
}

impl NameSpace {
    /// Create a new [`NameSpace`] from `catalog`.
    ///
    /// # Errors
    ///
    /// Returns an error if any catalog is empty, holds an entry outside the
    /// permitted character class or holds the same entry twice, if
    /// `max_instances` is zero or if the cardinality space overflows u64.
    pub fn new(catalog: Catalog) -> Result<Self, Error> {
        validate("metrics", &catalog.metrics, "")?;
        validate("circuits", &catalog.circuits, "-")?;
        validate("applications", &catalog.applications, "-")?;
        if catalog.max_instances == 0 {
            return Err(Error::ZeroInstances);
        }

        let cardinality = [
            catalog.metrics.len() as u64,
            catalog.circuits.len() as u64,
            catalog.applications.len() as u64,
            u64::from(catalog.max_instances),
        ]
        .into_iter()
        .try_fold(1_u64, u64::checked_mul)
        .ok_or(Error::Overflow)?;

        Ok(Self {
            catalog,
            cardinality,
        })
    }

    /// The number of distinct names in this space.
    #[must_use]
    pub fn cardinality(&self) -> u64 {
        self.cardinality
    }

    /// The catalogs this space was built from.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Decode `ordinal` into the name it addresses. None if `ordinal` lies
    /// outside of the cardinality space.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn name(&self, ordinal: u64) -> Option<MetricName<'_>> {
        if ordinal >= self.cardinality {
            return None;
        }
        let instances = u64::from(self.catalog.max_instances);
        let applications = self.catalog.applications.len() as u64;
        let circuits = self.catalog.circuits.len() as u64;

        // Every remainder is bounded by a catalog length, so the casts below
        // never truncate.
        let mut rest = ordinal;
        let instance = (rest % instances) as u32 + 1;
        rest /= instances;
        let application = (rest % applications) as usize;
        rest /= applications;
        let circuit = (rest % circuits) as usize;
        let metric = (rest / circuits) as usize;

        Some(MetricName {
            metric: &self.catalog.metrics[metric],
            circuit: &self.catalog.circuits[circuit],
            application: &self.catalog.applications[application],
            instance,
        })
    }

    /// Draw one value uniformly from each catalog and return the ordinal of
    /// the resulting name.
    pub fn sample<R>(&self, rng: &mut R) -> u64
    where
        R: Rng + ?Sized,
    {
        let metric = rng.random_range(0..self.catalog.metrics.len());
        let circuit = rng.random_range(0..self.catalog.circuits.len());
        let application = rng.random_range(0..self.catalog.applications.len());
        let instance = rng.random_range(1..=self.catalog.max_instances);

        let circuits = self.catalog.circuits.len() as u64;
        let applications = self.catalog.applications.len() as u64;
        let instances = u64::from(self.catalog.max_instances);

        ((metric as u64 * circuits + circuit as u64) * applications + application as u64)
            * instances
            + u64::from(instance - 1)
    }
}
