//! Alder Lineage - cross-period data point lineage
//!
//! Rollover copies a data point into a successor period and links the
//! copy back to its source. This crate is the only writer of those
//! links; afterwards they are read-only until a further rollover. The
//! tracker reconstructs the full version chain back to the period of
//! origin on demand.

#![deny(unsafe_code)]

pub mod data_point;
pub mod error;
pub mod tracker;

pub use data_point::{DataPoint, DataPointUpdate, NewDataPoint};
pub use error::LineageError;
pub use tracker::{LineageReport, LineageTracker, LineageVersion, RolloverTarget};
