//! # GreenScout Common Library
//!
//! Shared code for the GreenScout scouting backend:
//! - Observation and pit visit models
//! - Derived metrics and spreadsheet row addressing
//! - Multi-scouter reconciliation
//! - Spreadsheet row layout
//! - Configuration loading

pub mod config;
pub mod consensus;
pub mod error;
pub mod metrics;
pub mod observation;
pub mod pit;
pub mod row;

pub use consensus::{merge, Consensus};
pub use error::{Error, Result};
pub use observation::{Alliance, Cycle, CycleType, DriverStation, Observation};
pub use pit::PitObservation;
