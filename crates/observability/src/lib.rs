//! Tracing/logging setup shared by every binary that embeds the services.
//!
//! The library crates only emit `tracing` events; installing a subscriber is
//! left to whoever owns the process. A binary calls [`init`] (or [`init_with`]
//! on a config read through [`ObservabilityConfig::from_env`]) once at
//! startup. The `fieldcrm-infra` test suite installs
//! [`ObservabilityConfig::for_tests`] so pipeline logs show up with
//! `RUST_LOG=debug cargo test`.

pub mod tracing;

pub use crate::tracing::{ObservabilityConfig, ObservabilityError, LogFormat, init, init_with};
