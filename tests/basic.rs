use anyhow::anyhow;
use clap::Parser;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use spa::spa_core::ThresholdProperty;
use spa::spa_core::events::{Clustering, MeanGap, Occupancy};
use spa::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LATENCY: &str = "./tests/data/latency.csv";
const EVENTS: &str = "./tests/data/events.csv";

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("spa-{}-{name}", std::process::id()))
}

fn run(args: &[&str]) -> anyhow::Result<()> {
    Cli::try_parse_from(std::iter::once("spa").chain(args.iter().copied()))?.run()
}

#[test]
fn load_by_name_and_index() -> anyhow::Result<()> {
    let path = PathBuf::from_str(LATENCY)?;
    let by_name = load_column(&path, &Column::Name("latency".to_owned()), true)?;
    let by_index = load_column(&path, &Column::Index(1), true)?;
    assert_eq!(by_name.len(), 400);
    assert_eq!(by_name, by_index);
    assert_eq!(&by_name[..2], &[80.0, 117.7]);
    let columns = load_columns(
        &path,
        &[Column::Name("baseline".to_owned()), Column::Index(0)],
        true,
    )?;
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0][0], 50.0);
    assert_eq!(columns[1][399], 399.0);
    Ok(())
}

#[test]
fn load_compressed() -> anyhow::Result<()> {
    let path = temp_file("latency.csv.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path)?, Compression::fast());
    encoder.write_all(&std::fs::read(LATENCY)?)?;
    encoder.finish()?;
    let column = Column::Name("latency".to_owned());
    let compressed = load_column(&path, &column, true)?;
    let plain = load_column(Path::new(LATENCY), &column, true)?;
    std::fs::remove_file(&path)?;
    assert_eq!(compressed, plain);
    Ok(())
}

#[test]
fn malformed_datasets() -> anyhow::Result<()> {
    let path = temp_file("malformed.csv");
    std::fs::write(&path, "x\n1.5\nfoo\n")?;
    let err = load_column(&path, &Column::Name("x".to_owned()), true)
        .err()
        .ok_or(anyhow!("non-numeric cell accepted"))?;
    assert!(format!("{err:#}").contains("row 2"), "{err:#}");
    assert!(load_column(&path, &Column::Name("y".to_owned()), true).is_err());
    assert!(load_column(&path, &Column::Name("x".to_owned()), false).is_err());
    assert!(load_column(&path, &Column::Index(3), true).is_err());
    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn estimate() -> anyhow::Result<()> {
    run(&[
        "estimate", LATENCY, "--column", "latency", "--threshold", "100", "--op", "less",
        "--precision", "0.1",
    ])?;
    run(&[
        "estimate", LATENCY, "--column", "latency", "--between", "90", "110", "--precision",
        "0.1", "--max-samples", "50",
    ])?;
    run(&[
        "estimate", LATENCY, "--column", "latency", "--bounded", "80", "130", "--precision",
        "5", "--method", "hoeffding",
    ])?;
    Ok(())
}

#[test]
fn estimate_from_config_file() -> anyhow::Result<()> {
    let path = temp_file("config.json");
    std::fs::write(
        &path,
        r#"{"confidence": 0.9, "precision": 0.1, "mode": "bernoulli"}"#,
    )?;
    let config = path.to_str().ok_or(anyhow!("non-UTF-8 path"))?;
    run(&[
        "estimate", LATENCY, "--column", "latency", "--threshold", "100", "--config", config,
    ])?;
    std::fs::write(&path, r#"{"confidence": 1.0, "precision": 0.1, "mode": "bernoulli"}"#)?;
    assert!(
        run(&[
            "estimate", LATENCY, "--column", "latency", "--threshold", "100", "--config", config,
        ])
        .is_err()
    );
    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn estimate_requires_matching_property() {
    assert!(run(&["estimate", LATENCY, "--column", "latency"]).is_err());
    assert!(
        run(&[
            "estimate", LATENCY, "--column", "latency", "--bounded", "0", "1",
        ])
        .is_err(),
        "values above the declared range"
    );
    assert!(run(&["estimate", LATENCY, "--threshold", "1", "--between", "0", "1"]).is_err());
}

#[test]
fn trace() -> anyhow::Result<()> {
    let path = temp_file("trace.csv.gz");
    let trace = path.to_str().ok_or(anyhow!("non-UTF-8 path"))?;
    run(&[
        "estimate", LATENCY, "--column", "latency", "--threshold", "100", "--precision", "0.2",
        "--trace", trace,
    ])?;
    let mut reader = csv::Reader::from_reader(GzDecoder::new(std::fs::File::open(&path)?));
    assert_eq!(
        reader.headers()?,
        vec!["Sample", "Outcome", "Lower", "Upper", "Decision"]
    );
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    assert!(!records.is_empty());
    assert_eq!(&records[0][0], "1");
    assert!(records[records.len() - 1][4].starts_with("Converged"));
    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn hypothesis_test() -> anyhow::Result<()> {
    run(&[
        "test", LATENCY, "--column", "latency", "--threshold", "85", "--prob-threshold", "0.8",
    ])?;
    run(&[
        "test", LATENCY, "--column", "latency", "--threshold", "85", "--continuous",
    ])?;
    Ok(())
}

#[test]
fn threshold_search() -> anyhow::Result<()> {
    run(&[
        "search", LATENCY, "--column", "latency", "--granularity", "1",
    ])?;
    run(&[
        "search", LATENCY, "--column", "latency", "--ratio-with", "baseline", "--granularity",
        "0.01",
    ])?;
    assert!(
        run(&[
            "search", LATENCY, "--column", "latency", "--granularity", "-1",
        ])
        .is_err()
    );
    Ok(())
}

#[test]
fn load_event_log() -> anyhow::Result<()> {
    let runs = load_runs(Path::new(EVENTS))?;
    assert_eq!(runs.len(), 60);
    assert_eq!(runs[0].id, "0");
    assert_eq!(runs[59].id, "59");
    assert_eq!(runs[0].events.len(), 11);
    assert_eq!(runs[0].values("tlb miss").collect::<Vec<_>>(), [0.0, 90.0, 180.0, 270.0]);
    let occupancy = Occupancy::mispredict_recovery(0.2, spa_core::Comparison::Less);
    assert_eq!(occupancy.statistic(&runs[0]), 0.01);
    let gaps = MeanGap::tlb_misses(95.0, spa_core::Comparison::Greater);
    assert_eq!(gaps.statistic(&runs[1]), 97.0);
    let clustering = Clustering::errors(1000.0, 0.6);
    assert!((clustering.statistic(&runs[0]) - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(clustering.statistic(&runs[3]), 0.0);
    Ok(())
}

#[test]
fn event_logs_group_interleaved_runs() -> anyhow::Result<()> {
    let path = temp_file("interleaved.csv");
    std::fs::write(
        &path,
        "run,tag,value\nb,error,1\na,error,2\nb,error,3\n",
    )?;
    let runs = load_runs(&path)?;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, "b");
    assert_eq!(runs[0].values("error").collect::<Vec<_>>(), [1.0, 3.0]);
    std::fs::write(&path, "run,value\n1,2\n")?;
    assert!(load_runs(&path).is_err());
    std::fs::write(&path, "run,tag,value\n1,error,soon\n")?;
    let err = load_runs(&path)
        .err()
        .ok_or(anyhow!("non-numeric value accepted"))?;
    assert!(format!("{err:#}").contains("row 1"), "{err:#}");
    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn event_properties() -> anyhow::Result<()> {
    run(&[
        "events", EVENTS, "--statistic", "occupancy", "--threshold", "0.2", "--op", "less",
    ])?;
    run(&[
        "events", EVENTS, "--statistic", "mean-gap", "--threshold", "95",
    ])?;
    run(&[
        "events", EVENTS, "--statistic", "clustering", "--window", "1000", "--threshold", "0.6",
    ])?;
    run(&[
        "events", EVENTS, "--statistic", "mean-gap", "--search", "--granularity", "1",
    ])?;
    assert!(
        run(&[
            "events", EVENTS, "--statistic", "mean-gap", "--tag", "missing", "--threshold", "1",
        ])
        .is_err(),
        "runs without events of the tag"
    );
    Ok(())
}
