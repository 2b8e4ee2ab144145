//! Telemetry export.
//!
//! Counters and gauges are recorded through the `metrics` facade. Without an
//! installed recorder they are discarded.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Telemetry::install`].
pub enum Error {
    /// The exporter could not be built or installed.
    #[error("Failed to install prometheus recorder: {0}")]
    Install(#[from] BuildError),
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
/// Defines the manner of stampede's telemetry.
pub enum Telemetry {
    /// Expose telemetry for scraping at a prometheus poll endpoint.
    Prometheus {
        /// Address and port for prometheus exporter
        addr: SocketAddr,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: FxHashMap<String, String>,
    },
}

impl Telemetry {
    /// Merge `labels` into the global labels, overriding keys already set.
    pub fn extend_global_labels<I>(&mut self, labels: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        match self {
            Self::Prometheus { global_labels, .. } => global_labels.extend(labels),
        }
    }

    /// Install this telemetry as the global metrics recorder.
    ///
    /// If called within a tokio runtime the exporter is spawned onto it,
    /// otherwise it runs on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or a global recorder
    /// is already installed.
    pub fn install(&self) -> Result<(), Error> {
        match self {
            Self::Prometheus {
                addr,
                global_labels,
            } => {
                let mut builder = PrometheusBuilder::new().with_http_listener(*addr);
                for (k, v) in global_labels {
                    builder = builder.add_global_label(k, v);
                }
                builder.install()?;
                info!("prometheus exporter listening on {addr}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Telemetry;

    fn parse(contents: &str) -> Result<Telemetry, serde_yaml::Error> {
        serde_yaml::with::singleton_map::deserialize(serde_yaml::Deserializer::from_str(contents))
    }

    #[test]
    fn parses_prometheus_section() {
        let contents = r#"
prometheus:
  addr: "127.0.0.1:9000"
  global_labels:
    run: smoke
"#;
        let telemetry = parse(contents).expect("valid yaml");
        let Telemetry::Prometheus {
            addr,
            global_labels,
        } = telemetry;
        assert_eq!(addr.port(), 9000);
        assert_eq!(global_labels.get("run").map(String::as_str), Some("smoke"));
    }

    #[test]
    fn global_labels_default_to_empty_and_extend() {
        let mut telemetry = parse("prometheus:\n  addr: \"0.0.0.0:9000\"").expect("valid yaml");
        telemetry.extend_global_labels([("env".to_string(), "ci".to_string())]);
        let Telemetry::Prometheus { global_labels, .. } = telemetry;
        assert_eq!(global_labels.len(), 1);
    }

    #[test]
    fn unparseable_address_is_rejected() {
        assert!(parse("prometheus:\n  addr: nowhere").is_err());
    }

    #[test]
    fn installs_exporter() {
        let telemetry = parse("prometheus:\n  addr: \"127.0.0.1:0\"").expect("valid yaml");
        telemetry.install().expect("exporter installs");
    }
}
