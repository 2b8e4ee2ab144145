//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.

use std::{env, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use stampede_payload::graphite;
use tracing::{debug, info};

use crate::{names, replay, telemetry::Telemetry};

/// Environment variable whose contents, when set, are used as the
/// configuration document in place of any file.
pub const CONFIG_ENV: &str = "STAMPEDE_CONFIG";

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Config`]
pub enum Error {
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: std::path::PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// The name generation section is invalid.
    #[error("Invalid names configuration: {0}")]
    Names(#[from] names::Error),
    /// The replay section is invalid.
    #[error("Invalid replay configuration: {0}")]
    Replay(#[from] graphite::Error),
}

/// Main configuration struct for this program
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name universe generation
    #[serde(default)]
    pub names: names::Config,
    /// Stream replay
    #[serde(default)]
    pub replay: replay::Config,
    /// The method by which to express telemetry
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub telemetry: Option<Telemetry>,
}

impl Config {
    /// Parse a YAML document. Absent sections and fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML or names unknown
    /// fields.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load configuration from the [`CONFIG_ENV`] environment variable if set,
    /// else from `path` if given, else the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        Self::from_sources(env::var(CONFIG_ENV).ok(), path)
    }

    fn from_sources(env_contents: Option<String>, path: Option<&Path>) -> Result<Self, Error> {
        if let Some(contents) = env_contents {
            debug!("Using config from env var '{CONFIG_ENV}'");
            return Self::from_yaml(&contents);
        }
        let Some(path) = path else {
            debug!("No configuration given, using defaults");
            return Ok(Self::default());
        };
        debug!("Attempting to open configuration file at: {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Self::from_yaml(&contents)
    }

    /// Check every section without doing any work.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        self.names.validate()?;
        self.replay.window.validate()?;
        info!("Configuration is valid");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use stampede_payload::{TimeWindow, catalog};

    use super::{Config, Error};
    use crate::{names, replay::FailurePolicy, telemetry::Telemetry};

    #[test]
    fn config_deserializes() {
        let contents = r#"
names:
  count: 1000
  output: /tmp/names.json
  catalog:
    metrics: [cpu.usage, mem.used]
    circuits: [live]
    applications: [web]
    max_instances: 100
replay:
  addr: "graphite:2003"
  universe: /tmp/names.json
  window: { start: 10, end: 20 }
  lines_per_second: 500
  on_failure: reconnect
  max_points: 1000
telemetry:
  prometheus:
    addr: "0.0.0.0:9000"
"#;
        let config = Config::from_yaml(contents).expect("valid yaml");
        assert_eq!(config.names.count, 1000);
        assert_eq!(config.names.catalog.metrics, ["cpu.usage", "mem.used"]);
        assert_eq!(config.replay.addr, "graphite:2003");
        assert_eq!(
            config.replay.window,
            TimeWindow::new(10, 20).expect("valid window")
        );
        assert_eq!(config.replay.on_failure, FailurePolicy::Reconnect);
        assert_eq!(config.replay.max_points, Some(1000));
        assert!(matches!(config.telemetry, Some(Telemetry::Prometheus { .. })));
        config.validate().expect("valid config");
    }

    #[test]
    fn telemetry_section_enables_prometheus() {
        let contents = r#"
telemetry:
  prometheus:
    addr: "127.0.0.1:9100"
    global_labels:
      run: soak
"#;
        let config = Config::from_sources(Some(contents.to_string()), None).expect("valid yaml");
        let Some(Telemetry::Prometheus {
            addr,
            global_labels,
        }) = &config.telemetry
        else {
            panic!("telemetry not configured: {config:?}");
        };
        assert_eq!(addr.port(), 9100);
        assert_eq!(global_labels.get("run").map(String::as_str), Some("soak"));

        let rendered = serde_yaml::to_string(&config).expect("serializes");
        assert!(rendered.contains("prometheus:"), "{rendered}");
        assert_eq!(Config::from_yaml(&rendered).expect("reparses"), config);
    }

    #[test]
    fn unknown_telemetry_kind_is_rejected() {
        assert!(matches!(
            Config::from_yaml("telemetry:\n  statsd:\n    addr: \"127.0.0.1:8125\""),
            Err(Error::SerdeYaml(_))
        ));
    }

    #[test]
    fn empty_document_is_default() {
        let config = Config::from_yaml("{}").expect("valid yaml");
        assert_eq!(config, Config::default());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(matches!(
            Config::from_yaml("generator: []"),
            Err(Error::SerdeYaml(_))
        ));
    }

    #[test]
    fn env_contents_take_precedence_over_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "names:\n  count: 7").expect("write");

        let config = Config::from_sources(Some("names:\n  count: 9".to_string()), Some(file.path()))
            .expect("env config");
        assert_eq!(config.names.count, 9);

        let config = Config::from_sources(None, Some(file.path())).expect("file config");
        assert_eq!(config.names.count, 7);

        let config = Config::from_sources(None, None).expect("default config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("absent.yaml");
        assert!(matches!(
            Config::from_sources(None, Some(&path)),
            Err(Error::ReadFile { .. })
        ));
    }

    #[test]
    fn validation_failures() {
        let config = Config::from_yaml("replay:\n  window: { start: 20, end: 10 }").expect("parses");
        assert!(matches!(config.validate(), Err(Error::Replay(_))));

        let config = Config::from_yaml("names:\n  catalog:\n    metrics: [\"bad name\"]")
            .expect("parses");
        assert!(matches!(
            config.validate(),
            Err(Error::Names(names::Error::Catalog(
                catalog::Error::InvalidEntry { .. }
            )))
        ));

        let config = Config::from_yaml("names:\n  enumeration_threshold: 1.5").expect("parses");
        assert!(matches!(config.validate(), Err(Error::Names(_))));
    }
}
