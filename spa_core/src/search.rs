//! Threshold search.
//!
//! Finds a confidence interval for the threshold at which a [`ThresholdProperty`]
//! holds with a given probability (e.g. a quantile of a benchmark metric),
//! by running the continuous [`HypothesisTest`] at successive thresholds over the same recorded data.
//!
//! See Vitali et al., *SPA: Statistical Performance Analysis*, MICRO '23,
//! <https://doi.org/10.1145/3613424.3623785>.

use crate::config::ConfigError;
use crate::hypothesis::{HypothesisTest, TestResult};
use crate::property::ThresholdProperty;
use crate::session::SessionError;
use crate::source::Recorded;
use log::{debug, info};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search configuration")]
    Config(#[from] ConfigError),
    #[error("granularity {0} is not strictly positive and finite")]
    Granularity(f64),
    #[error("cannot estimate a starting point from the data")]
    NoStartPoint,
    #[error(
        "reached search iteration limit of {limit} without a conclusive {goal} verdict: \
        check that the data suffice for the test to conclude, raise the limit or provide a start point"
    )]
    IterationLimit { limit: usize, goal: bool },
    #[error("tested thresholds do not bracket the goal")]
    NoBracket,
    #[error("hypothesis test failed at threshold {threshold}")]
    Test {
        threshold: f64,
        #[source]
        err: SessionError,
    },
}

/// Rounds to the nearest multiple of `precision`.
pub fn round_to(value: f64, precision: f64) -> f64 {
    (value / precision).round() * precision
}

fn default_iteration_limit() -> usize {
    1000
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Probability `θ` with which the property has to hold.
    pub prob_threshold: f64,
    pub confidence: f64,
    /// Maximum number of thresholds tested in each direction.
    #[serde(default = "default_iteration_limit")]
    pub iteration_limit: usize,
    /// Step between tested thresholds.
    /// Defaults to the order of magnitude of a thousandth of the start point.
    #[serde(default)]
    pub granularity: Option<f64>,
    /// First threshold tested.
    /// Defaults to the empirical `1 - θ` quantile of the property's statistic.
    #[serde(default)]
    pub start: Option<f64>,
}

impl SearchConfig {
    pub fn new(prob_threshold: f64, confidence: f64) -> Result<Self, ConfigError> {
        HypothesisTest::new(prob_threshold, confidence)?;
        Ok(Self {
            prob_threshold,
            confidence,
            iteration_limit: default_iteration_limit(),
            granularity: None,
            start: None,
        })
    }

    pub fn with_granularity(mut self, granularity: f64) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.iteration_limit = iteration_limit;
        self
    }
}

/// Interval and per-threshold details of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub low: f64,
    pub high: f64,
    /// Outcome of the hypothesis test at every threshold tried, by threshold.
    pub details: BTreeMap<OrderedFloat<f64>, TestResult>,
}

impl SearchResult {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

struct LinearSearch<'a, O, P> {
    data: &'a [O],
    property: &'a mut P,
    test: HypothesisTest,
    granularity: f64,
    iteration_limit: usize,
}

impl<O, P> LinearSearch<'_, O, P>
where
    O: Clone,
    P: ThresholdProperty<O>,
{
    fn run(
        &mut self,
        start: f64,
        direction: Direction,
        goal: bool,
        details: &mut BTreeMap<OrderedFloat<f64>, TestResult>,
    ) -> Result<(), SearchError> {
        let mut threshold = start;
        for _ in 0..self.iteration_limit {
            self.property.set_threshold(threshold);
            let result = self
                .test
                .run(&*self.property, &mut Recorded::new(self.data.iter().cloned()))
                .map_err(|err| SearchError::Test { threshold, err })?;
            debug!(target: "search", "threshold {threshold}: verdict {:?}", result.verdict);
            let reached = result.verdict == Some(goal);
            details.insert(OrderedFloat(threshold), result);
            if reached {
                return Ok(());
            }
            let next = match direction {
                Direction::Up => threshold + self.granularity,
                Direction::Down => threshold - self.granularity,
            };
            threshold = round_to(next, self.granularity);
        }
        Err(SearchError::IterationLimit {
            limit: self.iteration_limit,
            goal,
        })
    }
}

/// Searches the confidence interval of the threshold.
///
/// The property's threshold is left at the last value tested.
pub fn search<O, P>(
    data: &[O],
    property: &mut P,
    config: &SearchConfig,
) -> Result<SearchResult, SearchError>
where
    O: Clone,
    P: ThresholdProperty<O>,
{
    let test = HypothesisTest::new(config.prob_threshold, config.confidence)?.continuous();
    let start = match config.start {
        Some(start) => start,
        None => property
            .start_point_estimate(data, config.prob_threshold)
            .ok_or(SearchError::NoStartPoint)?,
    };
    let granularity = config
        .granularity
        .unwrap_or_else(|| 10f64.powf((start / 1000f64).log10().ceil()));
    if !(granularity > 0f64 && granularity.is_finite()) {
        return Err(SearchError::Granularity(granularity));
    }
    let start = round_to(start, granularity);
    info!(target: "search", "searching from {start} with granularity {granularity}");

    let goal_up = property.high_threshold_outcome();
    let mut details = BTreeMap::new();
    let mut linear = LinearSearch {
        data,
        property,
        test,
        granularity,
        iteration_limit: config.iteration_limit,
    };
    linear.run(start, Direction::Up, goal_up, &mut details)?;
    linear.run(
        round_to(start - granularity, granularity),
        Direction::Down,
        !goal_up,
        &mut details,
    )?;

    // Below the interval the verdict is the opposite of the one at high thresholds.
    let low = details
        .iter()
        .filter(|(_, result)| result.verdict == Some(!goal_up))
        .map(|(threshold, _)| threshold.into_inner())
        .next_back();
    let high = details
        .iter()
        .find(|(_, result)| result.verdict == Some(goal_up))
        .map(|(threshold, _)| threshold.into_inner());
    match (low, high) {
        (Some(low), Some(high)) => {
            info!(target: "search", "interval [{low}, {high}] after {} tests", details.len());
            Ok(SearchResult { low, high, details })
        }
        _ => Err(SearchError::NoBracket),
    }
}
