use anyhow::anyhow;
use spa_core::*;

fn is_true() -> impl Property<bool> {
    from_fn(|b: &bool| *b)
}

// Three successes and two failures, repeated: p̂ stays within 0.4/n of 0.6.
fn interleaved() -> impl Iterator<Item = bool> {
    [true, true, true, false, false].into_iter().cycle()
}

#[test]
fn converges_near_proportion() -> Result<(), SessionError> {
    let config = SessionConfig::new(0.95, 0.05, Mode::Bernoulli)?.with_max_samples(1000)?;
    let mut session = Session::new(config, is_true())?;
    let report = session.run(&mut Recorded::new(interleaved()))?;
    assert_eq!(report.status, Status::Converged);
    assert!(report.precision_met());
    assert!(report.sample_count < 1000);
    assert!(report.half_width().expect("interval") <= 0.05);
    assert!(report.contains(0.6));
    assert!((report.estimate.expect("estimate") - 0.6).abs() < 0.01);
    Ok(())
}

#[test]
fn exhausts_budget_when_precision_unreachable() -> Result<(), SessionError> {
    let config = SessionConfig::new(0.95, 0.01, Mode::Bernoulli)?.with_max_samples(1000)?;
    let mut session = Session::new(config, is_true())?;
    let report = session.run(&mut Recorded::new(interleaved()))?;
    assert_eq!(report.status, Status::Exhausted);
    assert!(!report.precision_met());
    assert_eq!(report.sample_count, 1000);
    assert!(report.half_width().expect("interval") > 0.01);
    assert!(report.contains(0.6));
    Ok(())
}

#[test]
fn ordered_successes_stop_early() -> Result<(), SessionError> {
    // 60 successes then 40 failures: the rule stops within the leading run of successes,
    // as soon as the interval around 1 is narrow enough.
    let config = SessionConfig::new(0.95, 0.05, Mode::Bernoulli)?.with_max_samples(1000)?;
    let mut session = Session::new(config, is_true())?;
    let data = std::iter::repeat_n(true, 60).chain(std::iter::repeat_n(false, 40));
    let report = session.run(&mut Recorded::new(data))?;
    assert_eq!(report.status, Status::Converged);
    assert_eq!(report.sample_count, 36);
    assert_eq!(report.upper, Some(1.0));
    Ok(())
}

#[test]
fn boundary_counts() -> Result<(), SessionError> {
    for outcome in [false, true] {
        let config = SessionConfig::new(0.95, 0.001, Mode::Bernoulli)?.with_max_samples(100)?;
        let mut session = Session::new(config, is_true())?;
        let report = session.run(&mut Recorded::new(std::iter::repeat(outcome)))?;
        assert_eq!(report.status, Status::Exhausted);
        assert_eq!(report.sample_count, 100);
        let (lower, upper) = report.interval().expect("interval");
        assert!(lower.is_finite() && upper.is_finite());
        assert!(lower < upper);
        assert!(report.contains(if outcome { 1.0 } else { 0.0 }));
    }
    Ok(())
}

#[test]
fn deterministic() -> Result<(), SessionError> {
    let config = SessionConfig::new(0.9, 0.02, Mode::Bernoulli)?;
    let run = || -> Result<Report, SessionError> {
        let mut source = BernoulliSource::new(0.42, 7).expect("probability");
        Session::new(config, is_true())?.run(&mut source)
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn invalid_configurations() {
    for (confidence, precision) in [(1.0, 0.05), (0.0, 0.05), (0.95, 0.0), (0.95, -0.01)] {
        assert!(SessionConfig::new(confidence, precision, Mode::Bernoulli).is_err());
    }
    for (lo, hi) in [(1.0, 1.0), (2.0, 1.0)] {
        assert!(matches!(
            SessionConfig::new(0.95, 0.05, Mode::BoundedMean { lo, hi }),
            Err(ConfigError::Range { .. })
        ));
    }
}

fn bernoulli_coverage(p: f64, replications: u64) -> Result<f64, SessionError> {
    let config = SessionConfig::new(0.95, 0.1, Mode::Bernoulli)?;
    let reports = replicate(&config, replications, |seed| {
        (is_true(), BernoulliSource::new(p, seed).expect("probability"))
    })?;
    assert!(reports.iter().all(Report::precision_met));
    Ok(coverage(&reports, p))
}

#[test]
fn coverage_of_replications() -> Result<(), SessionError> {
    for p in [0.05, 0.3, 0.5, 0.9] {
        let covered = bernoulli_coverage(p, 2_000)?;
        assert!(covered >= 0.94, "p = {p}: coverage {covered}");
    }
    Ok(())
}

#[test]
#[ignore = "slow: 10,000 replications per proportion"]
fn coverage_of_many_replications() -> Result<(), SessionError> {
    for p in [0.05, 0.3, 0.5, 0.9] {
        let covered = bernoulli_coverage(p, 10_000)?;
        assert!(covered >= 0.945, "p = {p}: coverage {covered}");
    }
    Ok(())
}

#[test]
fn coverage_of_bounded_means() -> anyhow::Result<()> {
    let mode = Mode::BoundedMean { lo: 0.0, hi: 1.0 };
    for method in [BoundedMethod::Hoeffding, BoundedMethod::EmpiricalBernstein] {
        let config = SessionConfig::new(0.95, 0.1, mode)?.with_bounded_method(method);
        // Rare successes, as values 0 and 1.
        let skewed = replicate(&config, 2_000, |seed| {
            (is_true(), BernoulliSource::new(0.1, seed).expect("probability"))
        })?;
        let covered = coverage(&skewed, 0.1);
        assert!(covered >= 0.94, "{method:?}, Bernoulli(0.1): coverage {covered}");

        let uniform = replicate(&config, 2_000, |seed| {
            (Value, UniformSource::new(0.0, 1.0, seed).expect("range"))
        })?;
        let covered = coverage(&uniform, 0.5);
        assert!(covered >= 0.94, "{method:?}, U(0, 1): coverage {covered}");
    }
    Ok(())
}

#[test]
fn bounded_mean_of_uniform() -> anyhow::Result<()> {
    let uniform = || UniformSource::new(0.0, 1.0, 11).ok_or(anyhow!("empty range"));
    let mode = Mode::BoundedMean { lo: 0.0, hi: 1.0 };
    let config = SessionConfig::new(0.95, 0.05, mode)?;
    let mut bernstein = Session::new(config, Value)?;
    let report = bernstein.run(&mut uniform()?)?;
    assert_eq!(report.status, Status::Converged);
    assert!(report.contains(0.5));

    let config = config.with_bounded_method(BoundedMethod::Hoeffding);
    let mut hoeffding = Session::new(config, Value)?;
    let baseline = hoeffding.run(&mut uniform()?)?;
    assert!(baseline.contains(0.5));
    // Hoeffding ignores the variance: sqrt(ln(40) / 2n) <= 0.05 from n = 738 on.
    assert_eq!(baseline.sample_count, 738);
    assert!(report.sample_count < baseline.sample_count);
    Ok(())
}

#[test]
fn failed_sessions_report_no_interval() -> Result<(), SessionError> {
    let mode = Mode::BoundedMean { lo: 0.0, hi: 10.0 };
    let config = SessionConfig::new(0.95, 0.5, mode)?;
    let mut session = Session::new(config, Value)?;
    let result = session.run(&mut Recorded::new([1.0, 2.0, 11.0]));
    assert!(matches!(
        result,
        Err(SessionError::PropertyRangeViolation { sample: 3, .. })
    ));
    let report = session.report().expect("terminal");
    assert_eq!(report.status, Status::Failed);
    assert_eq!(report.interval(), None);
    assert!(matches!(
        session.run(&mut Recorded::new([1.0])),
        Err(SessionError::Terminated(SessionState::Failed))
    ));
    Ok(())
}
