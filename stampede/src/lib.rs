//! The stampede Graphite load generation tool.
//!
//! This library supports the stampede binary found elsewhere in this project.
//! It holds the process-level pieces: configuration, the name universe
//! generation run, the stream replayer and telemetry. Payload construction
//! lives in `stampede_payload`.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod names;
pub mod replay;
pub mod telemetry;
pub mod throttle;
