//! # freshet-core
//!
//! Domain model and shared infrastructure for Freshet, the incremental
//! intervention-analytics engine.
//!
//! This crate holds everything the aggregation pipelines and their
//! collaborators agree on:
//!
//! - **Event model**: [`InterventionChangeEvent`] and the classifier that
//!   produces it from raw CDC payloads
//! - **Vocabulary**: [`InterventionStatus`] and [`ChangeOp`]
//! - **Configuration**: [`EngineConfig`] loaded from the environment with
//!   deployment defaults
//! - **Observability**: logging initialization helpers
//!
//! The aggregation engine itself lives in `freshet-flow`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod event;
pub mod observability;
pub mod status;
pub mod timestamp;

pub use config::{BusConfig, EngineConfig, StoreConfig};
pub use error::{ClassifyError, Error, Result};
pub use event::InterventionChangeEvent;
pub use status::{ChangeOp, InterventionStatus};
pub use timestamp::FlexTimestamp;
