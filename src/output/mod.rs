//! Output module for reporting on accumulated results
//!
//! This module handles:
//! - Computing statistics over the output table
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{compute_statistics, load_statistics, print_statistics, OutputStatistics};
