//! SPA (Statistical Performance Analysis) estimates confidence intervals
//! for properties of benchmark and simulation data by sequential sampling.
//!
//! The estimation engine lives in [`spa_core`];
//! this crate loads recorded datasets and provides the command line interface.

mod cli;
mod dataset;
mod trace;

pub use cli::Cli;
pub use dataset::{Column, load_column, load_columns, load_runs};
pub use spa_core;
pub use trace::TraceWriter;
