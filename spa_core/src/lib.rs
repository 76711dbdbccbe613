//! Sequential confidence-interval estimation for statistical model checking
//! and benchmark analysis.
//!
//! A [`Session`] draws observations one at a time from a [`SampleSource`],
//! evaluates a [`Property`] on each of them, and stops as soon as an exact
//! confidence interval for the probability (or bounded mean) of the property
//! reaches the requested precision, or the sample budget runs out.
//!
//! On top of the estimation engine, the crate provides the sequential
//! [`HypothesisTest`] of a probability threshold, the threshold [`search()`]
//! built on it, and [`replicate()`] to run independent sessions in parallel.
//! Runs recorded as event logs are observations too, see [`events`].

#![forbid(unsafe_code)]

mod config;
pub mod events;
pub mod hypothesis;
pub mod interval;
mod property;
pub mod replicate;
pub mod search;
mod session;
pub mod smc;
pub mod source;
pub mod special;
pub mod stats;
pub mod stopping;

pub use config::*;
pub use events::{Event, Run};
pub use hypothesis::{HypothesisTest, TestResult};
pub use interval::{ConfidenceInterval, Tail};
pub use property::*;
pub use replicate::{coverage, replicate};
pub use search::{SearchConfig, SearchError, SearchResult, search};
pub use session::*;
pub use source::{
    BernoulliSource, FnSource, Recorded, SampleSource, SourceError, UniformSource,
};
pub use stopping::StoppingDecision;
