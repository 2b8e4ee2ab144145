//! The stampede payloads
//!
//! This library supports the two halves of the stampede project: building a
//! bounded universe of unique, tag-structured metric names and synthesizing
//! plaintext data points that name members of that universe.
//!
//! The name universe is produced by [`namespace::Generator`] and persisted
//! through [`snapshot`]. The replay side loads it back as a
//! [`universe::Universe`] and draws [`graphite::DataPoint`] values from it.

#![deny(clippy::cargo)]
#![deny(missing_docs)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod catalog;
pub mod graphite;
pub mod namespace;
pub mod snapshot;
pub mod universe;

pub use catalog::{Catalog, MetricName, NameSpace};
pub use graphite::{DataPoint, Graphite, TimeWindow};
pub use universe::Universe;
