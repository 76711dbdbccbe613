//! Loading recorded measurements from CSV files.

use anyhow::{Context, anyhow, bail};
use flate2::read::GzDecoder;
use log::info;
use spa_core::Run;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

/// A column of a dataset, addressed by header name or by zero-based index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Name(String),
    Index(usize),
}

impl FromStr for Column {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<usize>()
            .map(Column::Index)
            .unwrap_or_else(|_| Column::Name(s.to_owned())))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Name(name) => write!(f, "'{name}'"),
            Column::Index(index) => write!(f, "#{index}"),
        }
    }
}

fn open(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open dataset '{}'", path.display()))?;
    let reader = BufReader::new(file);
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Loads numeric columns from a CSV file, decompressing it if its name ends in `.gz`.
///
/// Returns one vector per requested column, in the order requested.
pub fn load_columns(
    path: &Path,
    columns: &[Column],
    has_headers: bool,
) -> anyhow::Result<Vec<Vec<f64>>> {
    info!(target: "dataset", "loading {} column(s) from '{}'", columns.len(), path.display());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .trim(csv::Trim::All)
        .from_reader(open(path)?);
    let indexes = if has_headers {
        let headers = reader
            .headers()
            .with_context(|| format!("failed to read header row of '{}'", path.display()))?;
        columns
            .iter()
            .map(|column| match column {
                Column::Name(name) => headers
                    .iter()
                    .position(|header| header == name)
                    .ok_or_else(|| anyhow!("no column named '{name}' in '{}'", path.display())),
                Column::Index(index) if *index < headers.len() => Ok(*index),
                Column::Index(index) => Err(anyhow!(
                    "column index {index} out of bounds, '{}' has {} columns",
                    path.display(),
                    headers.len()
                )),
            })
            .collect::<anyhow::Result<Vec<_>>>()?
    } else {
        columns
            .iter()
            .map(|column| match column {
                Column::Index(index) => Ok(*index),
                Column::Name(name) => Err(anyhow!(
                    "column '{name}' addressed by name, but the dataset has no header row"
                )),
            })
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    let mut values = vec![Vec::new(); columns.len()];
    for (row, record) in (1..).zip(reader.records()) {
        let record =
            record.with_context(|| format!("failed to read row {row} of '{}'", path.display()))?;
        for ((column, &index), column_values) in columns.iter().zip(&indexes).zip(&mut values) {
            let Some(cell) = record.get(index) else {
                bail!("row {row} has no column {column}");
            };
            let value = cell
                .parse::<f64>()
                .with_context(|| format!("row {row}, column {column}: '{cell}' is not a number"))?;
            column_values.push(value);
        }
    }
    info!(target: "dataset", "loaded {} rows", values.first().map_or(0, Vec::len));
    Ok(values)
}

/// Loads a single numeric column.
pub fn load_column(path: &Path, column: &Column, has_headers: bool) -> anyhow::Result<Vec<f64>> {
    load_columns(path, std::slice::from_ref(column), has_headers)?
        .pop()
        .ok_or_else(|| anyhow!("no column loaded"))
}

/// Loads a long-format event log with a header row and columns `run`, `tag` and `value`.
///
/// Rows are grouped into one [`Run`] per run identifier, in order of first appearance;
/// within a run, events keep their order in the file.
pub fn load_runs(path: &Path) -> anyhow::Result<Vec<Run>> {
    info!(target: "dataset", "loading event log '{}'", path.display());
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(open(path)?);
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header row of '{}'", path.display()))?;
    let [run_index, tag_index, value_index] = ["run", "tag", "value"].map(|name| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| anyhow!("no column named '{name}' in '{}'", path.display()))
    });
    let (run_index, tag_index, value_index) = (run_index?, tag_index?, value_index?);

    let mut runs: Vec<Run> = Vec::new();
    let mut positions = HashMap::new();
    for (row, record) in (1..).zip(reader.records()) {
        let record =
            record.with_context(|| format!("failed to read row {row} of '{}'", path.display()))?;
        let (Some(id), Some(tag), Some(cell)) = (
            record.get(run_index),
            record.get(tag_index),
            record.get(value_index),
        ) else {
            bail!("row {row} has {} columns, expected at least 3", record.len());
        };
        let value = cell
            .parse::<f64>()
            .with_context(|| format!("row {row}, column 'value': '{cell}' is not a number"))?;
        let position = *positions.entry(id.to_owned()).or_insert_with(|| {
            runs.push(Run::new(id));
            runs.len() - 1
        });
        runs[position].push(tag, value);
    }
    info!(target: "dataset", "loaded {} runs", runs.len());
    Ok(runs)
}
