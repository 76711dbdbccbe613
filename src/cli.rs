use crate::dataset::{Column, load_column, load_columns, load_runs};
use crate::trace::TraceWriter;
use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;
use spa_core::events::{Clustering, MeanGap, Occupancy};
use spa_core::smc::{adaptive_bound, derive_precision, min_samples, okamoto_bound};
use spa_core::stats::RunningStatistics;
use spa_core::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Sequential confidence intervals for benchmark and simulation data
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate the probability of a property, or a bounded mean, to the requested precision
    Estimate(EstimateArgs),
    /// Test whether a property holds with probability above a threshold
    Test(TestArgs),
    /// Search the confidence interval of a threshold (e.g. a quantile)
    Search(SearchArgs),
    /// Test or search a property of runs recorded as `run,tag,value` event logs
    Events(EventsArgs),
}

#[derive(Args)]
struct DataArgs {
    /// Path of the CSV dataset, gzip-compressed if it ends in `.gz`
    #[arg(value_hint = clap::ValueHint::FilePath)]
    data: PathBuf,
    /// Column to analyse, by header name or zero-based index
    #[arg(long, default_value = "0")]
    column: Column,
    /// The dataset has no header row
    #[arg(long)]
    no_headers: bool,
}

impl DataArgs {
    fn load(&self) -> anyhow::Result<Vec<f64>> {
        load_column(&self.data, &self.column, !self.no_headers)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Op {
    Greater,
    Less,
}

impl From<Op> for Comparison {
    fn from(op: Op) -> Self {
        match op {
            Op::Greater => Comparison::Greater,
            Op::Less => Comparison::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Hoeffding,
    EmpiricalBernstein,
}

impl From<Method> for BoundedMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Hoeffding => BoundedMethod::Hoeffding,
            Method::EmpiricalBernstein => BoundedMethod::EmpiricalBernstein,
        }
    }
}

#[derive(Args)]
struct EstimateArgs {
    #[command(flatten)]
    data: DataArgs,
    /// Property: the value compares to this threshold (see --op)
    #[arg(long, conflicts_with_all = ["between", "bounded"])]
    threshold: Option<f64>,
    /// Comparison of the value against the threshold
    #[arg(long, value_enum, default_value_t = Op::Greater)]
    op: Op,
    /// Property: the value lies strictly between the two bounds
    #[arg(long, num_args = 2, value_names = ["LOWER", "UPPER"], conflicts_with = "bounded")]
    between: Option<Vec<f64>>,
    /// Estimate the mean of values in the declared range instead of a probability
    #[arg(long, num_args = 2, value_names = ["LO", "HI"])]
    bounded: Option<Vec<f64>>,
    /// Confidence
    #[arg(short, long, default_value = "0.95")]
    confidence: f64,
    /// Precision or half-width parameter
    #[arg(short, long, default_value = "0.01")]
    precision: f64,
    /// Maximum number of samples
    #[arg(long)]
    max_samples: Option<u64>,
    /// Concentration bound for bounded means
    #[arg(long, value_enum, default_value_t = Method::EmpiricalBernstein)]
    method: Method,
    /// Session configuration file (JSON), replacing the statistical flags
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// Write the running interval after every sample to a gzip-compressed CSV file
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    trace: Option<PathBuf>,
}

/// Properties over a single column.
#[derive(Debug, Clone, Copy)]
enum ColumnProperty {
    Threshold(Threshold),
    Between(Between),
    Value(Value),
}

impl Property<f64> for ColumnProperty {
    fn evaluate(&self, observation: &f64) -> Outcome {
        match self {
            ColumnProperty::Threshold(property) => property.evaluate(observation),
            ColumnProperty::Between(property) => property.evaluate(observation),
            ColumnProperty::Value(property) => property.evaluate(observation),
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<SessionConfig> {
    info!("loading session configuration from '{}'", path.display());
    let reader = File::open(path)
        .with_context(|| format!("failed to create reader from file '{}'", path.display()))?;
    let config: SessionConfig = serde_json::de::from_reader(reader).with_context(|| {
        format!(
            "failed to parse session configuration in '{}'",
            path.display()
        )
    })?;
    config
        .validate()
        .with_context(|| format!("invalid session configuration in '{}'", path.display()))?;
    Ok(config)
}

fn pair(values: &[f64]) -> anyhow::Result<(f64, f64)> {
    match *values {
        [a, b] => Ok((a, b)),
        _ => Err(anyhow!("expected two values, found {}", values.len())),
    }
}

impl EstimateArgs {
    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        if let Some(path) = &self.config {
            return load_config(path);
        }
        let mode = match &self.bounded {
            Some(range) => {
                let (lo, hi) = pair(range)?;
                Mode::BoundedMean { lo, hi }
            }
            None => Mode::Bernoulli,
        };
        let mut config = SessionConfig::new(self.confidence, self.precision, mode)?
            .with_bounded_method(self.method.into());
        if let Some(max_samples) = self.max_samples {
            config = config.with_max_samples(max_samples)?;
        }
        Ok(config)
    }

    fn property(&self, mode: Mode) -> anyhow::Result<ColumnProperty> {
        match (mode, self.threshold, &self.between) {
            (Mode::BoundedMean { .. }, None, None) => Ok(ColumnProperty::Value(Value)),
            (Mode::BoundedMean { .. }, _, _) => {
                bail!("bounded-mean mode estimates the values themselves, drop --threshold/--between")
            }
            (Mode::Bernoulli, Some(threshold), None) => Ok(ColumnProperty::Threshold(
                Threshold::new(threshold, self.op.into()),
            )),
            (Mode::Bernoulli, None, Some(bounds)) => {
                let (lower, upper) = pair(bounds)?;
                Ok(ColumnProperty::Between(Between { lower, upper }))
            }
            (Mode::Bernoulli, _, _) => {
                bail!("a Boolean property is required: use --threshold or --between")
            }
        }
    }

    fn run(&self) -> anyhow::Result<()> {
        let config = self.session_config()?;
        let property = self.property(config.mode)?;
        let data = self.data.load()?;
        let mut trace = self.trace.as_deref().map(TraceWriter::create).transpose()?;
        info!(
            "estimating {property:?} over {} samples of '{}' with confidence {} and precision {}",
            data.len(),
            self.data.data.display(),
            config.confidence,
            config.precision
        );

        let available = data.len() as u64;
        let budget = config.max_samples.map_or(available, |max| max.min(available));
        let bound = match config.mode {
            Mode::Bernoulli => okamoto_bound(config.confidence, config.precision).ceil() as u64,
            Mode::BoundedMean { .. } => budget,
        };
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {percent:>2}% {wide_bar} {msg} ETA: {eta:<5}",
        )?;
        let bar = ProgressBar::new(bound.min(budget)).with_style(style);
        let mag = (-config.precision.log10().floor()).max(0f64) as usize;

        let mut session = Session::new(config, property)?;
        for value in &data {
            let decision = session
                .observe(value)
                .with_context(|| format!("session failed on value {value}"))?;
            let n = session.samples();
            if let Some(trace) = trace.as_mut() {
                let interval = interval::estimate(session.statistics(), session.config());
                trace.record(
                    n,
                    property.evaluate(value),
                    interval.as_ref(),
                    &format!("{decision:?}"),
                )?;
            }
            if let RunningStatistics::Bernoulli(counter) = session.statistics() {
                let rate = counter.proportion().unwrap_or_default();
                let derived = derive_precision(counter.successes(), counter.failures(), config.confidence);
                let bound = adaptive_bound(rate, config.confidence, config.precision).ceil() as u64;
                bar.set_length(bound.clamp(n, budget.max(n)));
                bar.set_message(format!("Rate: {rate:.mag$}±{derived:.mag$}"));
            }
            bar.set_position(n);
            if decision.is_terminal() {
                break;
            }
        }
        bar.finish_and_clear();
        if let Some(trace) = trace {
            trace.finish()?;
        }

        let report = match session.report() {
            Some(report) => report,
            None => session.exhaust()?,
        };
        if !report.precision_met() {
            warn!("precision {} not met after {} samples", report.precision, report.sample_count);
        }
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

#[derive(Args)]
struct TestArgs {
    #[command(flatten)]
    data: DataArgs,
    /// The value compares to this threshold (see --op)
    #[arg(long)]
    threshold: f64,
    /// Comparison of the value against the threshold
    #[arg(long, value_enum, default_value_t = Op::Greater)]
    op: Op,
    /// Probability threshold the property is tested against
    #[arg(long, default_value = "0.9")]
    prob_threshold: f64,
    /// Confidence
    #[arg(short, long, default_value = "0.9")]
    confidence: f64,
    /// Consume the whole dataset even after concluding
    #[arg(long)]
    continuous: bool,
}

#[derive(Serialize)]
struct TestSummary {
    verdict: Option<bool>,
    confidence: f64,
    trials: u64,
    successes: u64,
    min_samples: u64,
}

impl TestArgs {
    fn run(&self) -> anyhow::Result<()> {
        let mut test = HypothesisTest::new(self.prob_threshold, self.confidence)?;
        if self.continuous {
            test = test.continuous();
        }
        let data = self.data.load()?;
        let min_samples = min_samples(self.prob_threshold, self.confidence);
        if (data.len() as u64) < min_samples {
            warn!(
                "{} samples cannot conclude a test at probability {} and confidence {}: at least {min_samples} are needed",
                data.len(),
                self.prob_threshold,
                self.confidence
            );
        }
        let property = Threshold::new(self.threshold, self.op.into());
        let result = test.run(&property, &mut Recorded::new(data.iter().copied()))?;
        let summary = TestSummary {
            verdict: result.verdict,
            confidence: result.confidence,
            trials: result.trials,
            successes: result.successes,
            min_samples,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    data: DataArgs,
    /// Search the threshold of the ratio between --column and this column
    #[arg(long)]
    ratio_with: Option<Column>,
    /// Comparison of the value against the threshold
    #[arg(long, value_enum, default_value_t = Op::Greater)]
    op: Op,
    /// Probability with which the property has to hold
    #[arg(long, default_value = "0.9")]
    prob_threshold: f64,
    /// Confidence
    #[arg(short, long, default_value = "0.9")]
    confidence: f64,
    /// Maximum number of thresholds tested in each direction
    #[arg(long, default_value = "1000")]
    iteration_limit: usize,
    /// Step between tested thresholds
    #[arg(long)]
    granularity: Option<f64>,
    /// First threshold tested
    #[arg(long)]
    start: Option<f64>,
}

#[derive(Serialize)]
struct ThresholdTest {
    threshold: f64,
    verdict: Option<bool>,
    confidence: f64,
}

#[derive(Serialize)]
struct SearchSummary {
    low: f64,
    high: f64,
    tests: Vec<ThresholdTest>,
}

impl From<SearchResult> for SearchSummary {
    fn from(result: SearchResult) -> Self {
        Self {
            low: result.low,
            high: result.high,
            tests: result
                .details
                .into_iter()
                .map(|(threshold, test)| ThresholdTest {
                    threshold: threshold.into_inner(),
                    verdict: test.verdict,
                    confidence: test.confidence,
                })
                .collect(),
        }
    }
}

impl SearchArgs {
    fn search_config(&self) -> anyhow::Result<SearchConfig> {
        let mut config = SearchConfig::new(self.prob_threshold, self.confidence)?
            .with_iteration_limit(self.iteration_limit);
        if let Some(granularity) = self.granularity {
            config = config.with_granularity(granularity);
        }
        if let Some(start) = self.start {
            config = config.with_start(start);
        }
        Ok(config)
    }

    fn run(&self) -> anyhow::Result<()> {
        let config = self.search_config()?;
        let result = match &self.ratio_with {
            Some(other) => {
                let columns = [self.data.column.clone(), other.clone()];
                let mut values =
                    load_columns(&self.data.data, &columns, !self.data.no_headers)?.into_iter();
                let (Some(numerators), Some(denominators)) = (values.next(), values.next()) else {
                    bail!("failed to load columns {} and {other}", self.data.column);
                };
                let pairs = numerators.into_iter().zip(denominators).collect::<Vec<_>>();
                let mut property = Ratio {
                    threshold: 0f64,
                    op: self.op.into(),
                };
                search(&pairs, &mut property, &config)?
            }
            None => {
                let data = self.data.load()?;
                let mut property = Threshold::new(0f64, self.op.into());
                search(&data, &mut property, &config)?
            }
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&SearchSummary::from(result))?
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EventStatistic {
    /// Fraction of the run between `mispredict` and `recovered` events
    Occupancy,
    /// Mean cycles between `tlb miss` events
    MeanGap,
    /// Fraction of `error` events within --window cycles of the previous one, tested with `<`
    Clustering,
}

#[derive(Args)]
struct EventsArgs {
    /// Path of the event log, gzip-compressed if it ends in `.gz`
    #[arg(value_hint = clap::ValueHint::FilePath)]
    data: PathBuf,
    /// Statistic computed on every run
    #[arg(long, value_enum)]
    statistic: EventStatistic,
    /// Threshold the statistic is compared to (ignored by --search)
    #[arg(long, default_value = "0")]
    threshold: f64,
    /// Comparison of the statistic against the threshold
    #[arg(long, value_enum, default_value_t = Op::Greater)]
    op: Op,
    /// Tag of the events for `mean-gap` and `clustering`, replacing `tlb miss` and `error`
    #[arg(long)]
    tag: Option<String>,
    /// Window in cycles for `clustering`
    #[arg(long, default_value = "1000")]
    window: f64,
    /// Probability threshold the property is tested against
    #[arg(long, default_value = "0.9")]
    prob_threshold: f64,
    /// Confidence
    #[arg(short, long, default_value = "0.9")]
    confidence: f64,
    /// Search the confidence interval of the threshold instead of testing it
    #[arg(long)]
    search: bool,
    /// Step between tested thresholds when searching
    #[arg(long)]
    granularity: Option<f64>,
}

/// Properties over event logs.
#[derive(Debug, Clone)]
enum RunProperty {
    Occupancy(Occupancy),
    MeanGap(MeanGap),
    Clustering(Clustering),
}

impl Property<Run> for RunProperty {
    fn evaluate(&self, run: &Run) -> Outcome {
        match self {
            RunProperty::Occupancy(property) => property.evaluate(run),
            RunProperty::MeanGap(property) => property.evaluate(run),
            RunProperty::Clustering(property) => property.evaluate(run),
        }
    }
}

impl ThresholdProperty<Run> for RunProperty {
    fn threshold(&self) -> f64 {
        match self {
            RunProperty::Occupancy(property) => property.threshold(),
            RunProperty::MeanGap(property) => property.threshold(),
            RunProperty::Clustering(property) => property.threshold(),
        }
    }

    fn set_threshold(&mut self, threshold: f64) {
        match self {
            RunProperty::Occupancy(property) => property.set_threshold(threshold),
            RunProperty::MeanGap(property) => property.set_threshold(threshold),
            RunProperty::Clustering(property) => property.set_threshold(threshold),
        }
    }

    fn high_threshold_outcome(&self) -> bool {
        match self {
            RunProperty::Occupancy(property) => property.high_threshold_outcome(),
            RunProperty::MeanGap(property) => property.high_threshold_outcome(),
            RunProperty::Clustering(property) => property.high_threshold_outcome(),
        }
    }

    fn statistic(&self, run: &Run) -> f64 {
        match self {
            RunProperty::Occupancy(property) => property.statistic(run),
            RunProperty::MeanGap(property) => property.statistic(run),
            RunProperty::Clustering(property) => property.statistic(run),
        }
    }
}

impl EventsArgs {
    fn property(&self) -> RunProperty {
        let op = self.op.into();
        match (self.statistic, &self.tag) {
            (EventStatistic::Occupancy, _) => {
                RunProperty::Occupancy(Occupancy::mispredict_recovery(self.threshold, op))
            }
            (EventStatistic::MeanGap, Some(tag)) => {
                RunProperty::MeanGap(MeanGap::new(tag.as_str(), self.threshold, op))
            }
            (EventStatistic::MeanGap, None) => {
                RunProperty::MeanGap(MeanGap::tlb_misses(self.threshold, op))
            }
            (EventStatistic::Clustering, Some(tag)) => {
                RunProperty::Clustering(Clustering::new(tag.as_str(), self.window, self.threshold))
            }
            (EventStatistic::Clustering, None) => {
                RunProperty::Clustering(Clustering::errors(self.window, self.threshold))
            }
        }
    }

    fn run(&self) -> anyhow::Result<()> {
        let runs = load_runs(&self.data)?;
        let mut property = self.property();
        if self.search {
            let mut config = SearchConfig::new(self.prob_threshold, self.confidence)?;
            if let Some(granularity) = self.granularity {
                config = config.with_granularity(granularity);
            }
            let result = search(&runs, &mut property, &config)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&SearchSummary::from(result))?
            );
        } else {
            let test = HypothesisTest::new(self.prob_threshold, self.confidence)?;
            let result = test
                .run(&property, &mut Recorded::new(runs.iter().cloned()))
                .with_context(|| format!("failed to test {property:?}"))?;
            let summary = TestSummary {
                verdict: result.verdict,
                confidence: result.confidence,
                trials: result.trials,
                successes: result.successes,
                min_samples: min_samples(self.prob_threshold, self.confidence),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Ok(())
    }
}

impl Cli {
    pub fn run(&self) -> anyhow::Result<()> {
        match &self.command {
            Command::Estimate(args) => args.run(),
            Command::Test(args) => args.run(),
            Command::Search(args) => args.run(),
            Command::Events(args) => args.run(),
        }
    }
}
