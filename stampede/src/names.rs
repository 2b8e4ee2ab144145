//! Name universe generation runs.
//!
//! ## Metrics
//!
//! `names_target`: The effective number of names the run will produce
//! `names_generated`: Distinct names collected so far, updated every flush
//!

use std::{path::PathBuf, time::Duration};

use metrics::gauge;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use stampede_payload::{
    Catalog, NameSpace, catalog,
    namespace::{self, DEFAULT_ENUMERATION_THRESHOLD, Generator, Summary},
};
use tracing::info;

fn default_count() -> u64 {
    600_000
}

fn default_flush_interval_seconds() -> u64 {
    5
}

fn default_output() -> PathBuf {
    PathBuf::from("metrics.json")
}

#[allow(clippy::unnecessary_wraps)]
fn default_enumeration_threshold() -> Option<f64> {
    Some(DEFAULT_ENUMERATION_THRESHOLD)
}

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`run`].
pub enum Error {
    /// The configured catalogs are not usable.
    #[error("Catalog configuration error: {0}")]
    Catalog(#[from] catalog::Error),
    /// Generation failed or was misconfigured.
    #[error(transparent)]
    Namespace(#[from] namespace::Error),
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
/// Configuration of a generation run.
pub struct Config {
    /// The number of unique names to produce. Clamped to the cardinality
    /// space of `catalog`.
    #[serde(default = "default_count")]
    pub count: u64,
    /// Seconds between progress reports and snapshots
    #[serde(default = "default_flush_interval_seconds")]
    pub flush_interval_seconds: u64,
    /// Where the name universe is persisted
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Fraction of the cardinality space at or above which names are
    /// enumerated instead of rejection sampled. Null disables enumeration.
    #[serde(default = "default_enumeration_threshold")]
    pub enumeration_threshold: Option<f64>,
    /// The catalogs names are composed from
    #[serde(default)]
    pub catalog: Catalog,
    /// The seed for random operations, drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<[u8; 32]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: default_count(),
            flush_interval_seconds: default_flush_interval_seconds(),
            output: default_output(),
            enumeration_threshold: default_enumeration_threshold(),
            catalog: Catalog::default(),
            seed: None,
        }
    }
}

impl Config {
    /// Check the configuration without producing any names.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalogs are invalid, `count` or
    /// `flush_interval_seconds` is zero or the enumeration threshold is out of
    /// range.
    pub fn validate(&self) -> Result<(), Error> {
        let space = NameSpace::new(self.catalog.clone())?;
        self.generator(&space)?;
        if self.count == 0 {
            return Err(namespace::Error::ZeroCount.into());
        }
        Ok(())
    }

    fn generator<'a>(&self, space: &'a NameSpace) -> Result<Generator<'a>, Error> {
        let generator = Generator::new(
            space,
            Duration::from_secs(self.flush_interval_seconds),
            self.output.clone(),
        )?
        .enumeration_threshold(self.enumeration_threshold)?;
        Ok(generator)
    }
}

/// Produce and persist a name universe according to `config`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a snapshot cannot be
/// written. A failed snapshot aborts the run.
pub fn run(config: &Config) -> Result<Summary, Error> {
    let space = NameSpace::new(config.catalog.clone())?;
    let generator = config.generator(&space)?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::from_seed(seed),
        None => StdRng::from_os_rng(),
    };

    gauge!("names_target").set(config.count.min(space.cardinality()) as f64);
    let summary = generator.generate(config.count, &mut rng, |progress| {
        gauge!("names_generated").set(progress.current as f64);
    })?;
    info!(
        produced = summary.produced,
        snapshots = summary.snapshots,
        clamped = summary.clamped,
        "name universe persisted to {}",
        generator.output().display()
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use stampede_payload::{Universe, namespace};

    use super::{Config, Error, run};

    fn tiny(dir: &tempfile::TempDir) -> Config {
        let contents = format!(
            r#"
count: 50
flush_interval_seconds: 1
output: {output}
seed: [3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3]
catalog:
  metrics: [cpu.usage]
  circuits: [live]
  applications: [web]
  max_instances: 10
"#,
            output = dir.path().join("metrics.json").display()
        );
        serde_yaml::from_str(&contents).expect("valid yaml")
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_yaml::from_str("count: 10").expect("valid yaml");
        assert_eq!(config.count, 10);
        assert_eq!(config.flush_interval_seconds, 5);
        assert_eq!(config.output.to_str(), Some("metrics.json"));
        assert_eq!(config.enumeration_threshold, Some(0.8));
        assert_eq!(config.catalog.circuits, ["live", "stage", "dev"]);
        assert_eq!(config.catalog.max_instances, 1_000);
        assert!(config.seed.is_none());
    }

    #[test]
    fn null_threshold_disables_enumeration() {
        let config: Config =
            serde_yaml::from_str("enumeration_threshold: ~").expect("valid yaml");
        assert_eq!(config.enumeration_threshold, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Config>("counts: 10").is_err());
    }

    #[test]
    fn run_clamps_and_persists() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let config = tiny(&dir);

        let summary = run(&config).expect("run succeeds");
        assert!(summary.clamped);
        assert_eq!(summary.produced, 10);

        let universe = Universe::load(&config.output).expect("universe loads");
        assert_eq!(universe.len(), 10);
    }

    #[test]
    fn validate_rejects_zero_count() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let mut config = tiny(&dir);
        config.count = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::Namespace(namespace::Error::ZeroCount))
        ));
        assert!(matches!(
            run(&config),
            Err(Error::Namespace(namespace::Error::ZeroCount))
        ));
        assert!(!config.output.exists());
    }

    #[test]
    fn validate_rejects_zero_interval_and_bad_catalog() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let mut config = tiny(&dir);
        config.flush_interval_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::Namespace(namespace::Error::ZeroFlushInterval))
        ));

        let mut config = tiny(&dir);
        config.catalog.metrics.clear();
        assert!(matches!(config.validate(), Err(Error::Catalog(_))));
    }
}
