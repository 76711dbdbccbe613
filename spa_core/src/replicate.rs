//! Independent replications of an estimation run.
//!
//! Sessions share no mutable state, so replications run in parallel.
//! Each one is built from its index, which keeps seeded experiments reproducible.

use crate::config::SessionConfig;
use crate::property::Property;
use crate::session::{Report, Session, SessionError};
use crate::source::SampleSource;
use log::info;
use rayon::prelude::*;

/// Runs `replications` independent sessions with the same configuration.
///
/// `build(i)` provides property and source of the `i`-th replication.
/// Reports are returned in index order.
pub fn replicate<P, S, F>(
    config: &SessionConfig,
    replications: u64,
    build: F,
) -> Result<Vec<Report>, SessionError>
where
    F: Fn(u64) -> (P, S) + Sync,
    S: SampleSource,
    P: Property<S::Observation>,
{
    config.validate()?;
    let reports = (0..replications)
        .into_par_iter()
        .map(|i| {
            let (property, mut source) = build(i);
            Session::new(*config, property)?.run(&mut source)
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        target: "session",
        "{replications} replications, {} converged",
        reports.iter().filter(|report| report.precision_met()).count()
    );
    Ok(reports)
}

/// Fraction of the reports whose interval contains the true value.
///
/// Reports without an interval count as misses.
pub fn coverage(reports: &[Report], truth: f64) -> f64 {
    if reports.is_empty() {
        return 0f64;
    }
    let hits = reports.iter().filter(|report| report.contains(truth)).count();
    hits as f64 / reports.len() as f64
}
