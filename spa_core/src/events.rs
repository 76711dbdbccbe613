//! Properties over runs recorded as event logs.
//!
//! Some benchmarks do not produce one measurement per run, but a log of
//! tagged events, each stamped with the cycle it happened at
//! (`mispredict`/`recovered` pairs, `tlb miss` or `error` timestamps).
//! A [`Run`] collects the events of one run and is a single observation:
//! the properties below reduce it to a statistic and compare that against a threshold.
//!
//! A run lacking the events a statistic needs has no defined outcome.
//! It evaluates to `Outcome::Real(NaN)`, which sessions and tests reject
//! as a range violation instead of counting it as a failure.

use crate::property::{Comparison, Outcome, Property, ThresholdProperty};

/// Marks the first cycle of a run.
pub const SYSTEM_START: &str = "system start";
/// Marks the last cycle of a run.
pub const SYSTEM_END: &str = "system end";

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub tag: String,
    pub value: f64,
}

/// The events of a single run, in recording order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub id: String,
    pub events: Vec<Event>,
}

impl Run {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, tag: impl Into<String>, value: f64) {
        self.events.push(Event {
            tag: tag.into(),
            value,
        });
    }

    /// Values of the events with the given tag, in recording order.
    pub fn values<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.events
            .iter()
            .filter(move |event| event.tag == tag)
            .map(|event| event.value)
    }

    pub fn first(&self, tag: &str) -> Option<f64> {
        self.values(tag).next()
    }
}

fn gaps(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.windows(2).map(|pair| pair[1] - pair[0])
}

fn compare(statistic: f64, op: Comparison, threshold: f64) -> Outcome {
    if statistic.is_nan() {
        Outcome::Real(f64::NAN)
    } else {
        Outcome::Bool(op.compare(statistic, threshold))
    }
}

/// Fraction of the run's duration spent between paired `enter` and `exit` events,
/// compared against the threshold.
///
/// The `n`-th `exit` closes the `n`-th `enter`; unmatched events are ignored.
/// The duration goes from the [`SYSTEM_START`] to the [`SYSTEM_END`] event.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupancy {
    pub enter: String,
    pub exit: String,
    pub threshold: f64,
    pub op: Comparison,
}

impl Occupancy {
    pub fn new(
        enter: impl Into<String>,
        exit: impl Into<String>,
        threshold: f64,
        op: Comparison,
    ) -> Self {
        Self {
            enter: enter.into(),
            exit: exit.into(),
            threshold,
            op,
        }
    }

    /// Share of runtime spent recovering from branch mispredictions.
    pub fn mispredict_recovery(threshold: f64, op: Comparison) -> Self {
        Self::new("mispredict", "recovered", threshold, op)
    }
}

impl Property<Run> for Occupancy {
    fn evaluate(&self, run: &Run) -> Outcome {
        compare(self.statistic(run), self.op, self.threshold)
    }
}

impl ThresholdProperty<Run> for Occupancy {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn high_threshold_outcome(&self) -> bool {
        self.op.high_threshold_outcome()
    }

    fn statistic(&self, run: &Run) -> f64 {
        let (Some(start), Some(end)) = (run.first(SYSTEM_START), run.first(SYSTEM_END)) else {
            return f64::NAN;
        };
        let spent: f64 = run
            .values(&self.enter)
            .zip(run.values(&self.exit))
            .map(|(enter, exit)| exit - enter)
            .sum();
        spent / (end - start)
    }
}

/// Mean number of cycles between consecutive events with the given tag,
/// compared against the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanGap {
    pub tag: String,
    pub threshold: f64,
    pub op: Comparison,
}

impl MeanGap {
    pub fn new(tag: impl Into<String>, threshold: f64, op: Comparison) -> Self {
        Self {
            tag: tag.into(),
            threshold,
            op,
        }
    }

    pub fn tlb_misses(threshold: f64, op: Comparison) -> Self {
        Self::new("tlb miss", threshold, op)
    }
}

impl Property<Run> for MeanGap {
    fn evaluate(&self, run: &Run) -> Outcome {
        compare(self.statistic(run), self.op, self.threshold)
    }
}

impl ThresholdProperty<Run> for MeanGap {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn high_threshold_outcome(&self) -> bool {
        self.op.high_threshold_outcome()
    }

    // NaN with fewer than two events.
    fn statistic(&self, run: &Run) -> f64 {
        let values = run.values(&self.tag).collect::<Vec<_>>();
        let count = values.len().saturating_sub(1);
        gaps(&values).sum::<f64>() / count as f64
    }
}

/// Holds if less than `threshold` of the events with the given tag
/// happen within `window` cycles of the previous one.
///
/// The fraction is taken over all events of the tag, the first one included.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub tag: String,
    pub window: f64,
    pub threshold: f64,
}

impl Clustering {
    pub fn new(tag: impl Into<String>, window: f64, threshold: f64) -> Self {
        Self {
            tag: tag.into(),
            window,
            threshold,
        }
    }

    pub fn errors(window: f64, threshold: f64) -> Self {
        Self::new("error", window, threshold)
    }
}

impl Property<Run> for Clustering {
    fn evaluate(&self, run: &Run) -> Outcome {
        compare(self.statistic(run), Comparison::Less, self.threshold)
    }
}

impl ThresholdProperty<Run> for Clustering {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn high_threshold_outcome(&self) -> bool {
        true
    }

    // NaN without events.
    fn statistic(&self, run: &Run) -> f64 {
        let values = run.values(&self.tag).collect::<Vec<_>>();
        let close = gaps(&values).filter(|gap| *gap <= self.window).count();
        close as f64 / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::HypothesisTest;
    use crate::search::{SearchConfig, search};
    use crate::session::SessionError;
    use crate::source::Recorded;

    fn run(id: usize, events: &[(&str, f64)]) -> Run {
        let mut run = Run::new(id.to_string());
        for &(tag, value) in events {
            run.push(tag, value);
        }
        run
    }

    #[test]
    fn occupancy() {
        let recovering = run(
            0,
            &[
                (SYSTEM_START, 0.0),
                ("mispredict", 100.0),
                ("recovered", 150.0),
                ("mispredict", 400.0),
                ("recovered", 430.0),
                ("mispredict", 900.0),
                (SYSTEM_END, 1000.0),
            ],
        );
        let property = Occupancy::mispredict_recovery(0.2, Comparison::Less);
        assert!((property.statistic(&recovering) - 0.08).abs() < 1e-12);
        assert_eq!(property.evaluate(&recovering), Outcome::Bool(true));
        assert!(property.high_threshold_outcome());
        let strict = Occupancy::mispredict_recovery(0.05, Comparison::Less);
        assert_eq!(strict.evaluate(&recovering), Outcome::Bool(false));

        let unbounded = run(1, &[("mispredict", 1.0), ("recovered", 2.0)]);
        assert!(property.statistic(&unbounded).is_nan());
        assert!(property.evaluate(&unbounded).as_bernoulli().is_err());
    }

    #[test]
    fn mean_gap() {
        let misses = run(
            0,
            &[("tlb miss", 10.0), ("other", 15.0), ("tlb miss", 100.0), ("tlb miss", 250.0)],
        );
        let property = MeanGap::tlb_misses(95.0, Comparison::Greater);
        assert_eq!(property.statistic(&misses), 120.0);
        assert_eq!(property.evaluate(&misses), Outcome::Bool(true));
        assert!(!property.high_threshold_outcome());
        assert!(property.statistic(&run(1, &[("tlb miss", 10.0)])).is_nan());
        assert!(property.statistic(&Run::new("empty")).is_nan());
    }

    #[test]
    fn clustering() {
        // Gaps 500, 1500, 200: two of four errors follow the previous one within 1000 cycles.
        let errors = run(
            0,
            &[("error", 0.0), ("error", 500.0), ("error", 2000.0), ("error", 2200.0)],
        );
        let property = Clustering::errors(1000.0, 0.6);
        assert_eq!(property.statistic(&errors), 0.5);
        assert_eq!(property.evaluate(&errors), Outcome::Bool(true));
        let strict = Clustering::errors(1000.0, 0.5);
        assert_eq!(strict.evaluate(&errors), Outcome::Bool(false));
        assert_eq!(property.statistic(&run(1, &[("error", 7.0)])), 0.0);
        assert!(property.statistic(&Run::new("empty")).is_nan());
    }

    // Runs whose mean gap between misses is 50 + i % 100 cycles.
    fn tlb_runs() -> Vec<Run> {
        (0..400)
            .map(|i| {
                let gap = 50.0 + (i % 100) as f64;
                run(i, &[("tlb miss", 0.0), ("tlb miss", gap), ("tlb miss", 2.0 * gap)])
            })
            .collect()
    }

    #[test]
    fn hypothesis_over_runs() -> Result<(), SessionError> {
        let test = HypothesisTest::new(0.9, 0.9)?;
        let property = MeanGap::tlb_misses(40.0, Comparison::Greater);
        let result = test.run(&property, &mut Recorded::new(tlb_runs()))?;
        assert_eq!(result.verdict, Some(true));
        assert_eq!(result.trials, 22);

        let mut runs = tlb_runs();
        runs[3] = Run::new("truncated");
        let err = test.run(&property, &mut Recorded::new(runs));
        assert!(matches!(
            err,
            Err(SessionError::PropertyRangeViolation { sample: 4, .. })
        ));
        Ok(())
    }

    #[test]
    fn search_over_runs() {
        let config = SearchConfig::new(0.5, 0.9)
            .expect("valid config")
            .with_granularity(1.0);
        let mut property = MeanGap::tlb_misses(0.0, Comparison::Greater);
        let result = search(&tlb_runs(), &mut property, &config).expect("search");
        assert!(result.low < result.high);
        assert!(result.contains(99.5), "{} {}", result.low, result.high);
    }
}
