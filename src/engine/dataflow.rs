// Copyright © 2024 Pathway

//! Partition-parallel execution of the aggregation.
//!
//! Every partition is parsed, classified, keyed and pre-aggregated by a single worker
//! with no shared state. The partial results meet only in the final merge, which waits
//! for all partitions; nothing is emitted before that point and a failed partition
//! fails the whole run.

pub mod config;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, error, info};
use rayon::iter::{ParallelBridge, ParallelIterator};
use rayon::ThreadPoolBuilder;
use serde::Serialize;

pub use self::config::{Config, ErrorPolicy};

use super::classify::{classify, extract_key};
use super::error::{DataError, Error, Result};
use super::reduce::{Aggregate, SumReducer};
use super::value::GroupKey;
use crate::connectors::data_format::DsvParser;
use crate::connectors::{Partition, ReadError};

pub type FareAggregate = Aggregate<GroupKey, SumReducer>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub input_rows: u64,
    pub rejected_rows: u64,
    pub partitions: u64,
    pub groups: u64,
}

#[derive(Debug)]
pub struct AggregationOutput {
    /// One entry per distinct key, ordered by key. Totals are not rounded yet.
    pub rows: Vec<(GroupKey, f64)>,
    pub stats: RunStats,
}

#[derive(Debug, Default)]
struct PartialResult {
    aggregate: FareAggregate,
    input_rows: u64,
    rejected_rows: u64,
    partitions: u64,
}

impl PartialResult {
    fn merge(self, other: Self) -> Self {
        Self {
            aggregate: self.aggregate.merge(other.aggregate),
            input_rows: self.input_rows + other.input_rows,
            rejected_rows: self.rejected_rows + other.rejected_rows,
            partitions: self.partitions + other.partitions,
        }
    }

    fn accepted_rows(&self) -> u64 {
        self.input_rows - self.rejected_rows
    }
}

/// Parser → classifier → key extractor for a single line.
pub fn process_line(parser: &DsvParser, line: &str) -> Result<(GroupKey, f64), DataError> {
    let record = parser.parse_line(line)?;
    let classified = classify(record)?;
    extract_key(&classified)
}

fn process_partition(
    parser: &DsvParser,
    partition: Partition,
    error_policy: ErrorPolicy,
) -> Result<PartialResult> {
    let mut result = PartialResult {
        partitions: 1,
        ..PartialResult::default()
    };
    for (line_number, line) in &partition.lines {
        result.input_rows += 1;
        match process_line(parser, line) {
            Ok((key, fare)) => result.aggregate.insert(key, fare),
            Err(e) => match error_policy {
                ErrorPolicy::FailFast => {
                    return Err(Error::Record {
                        line: *line_number,
                        source: e,
                    })
                }
                ErrorPolicy::SkipAndCount => {
                    error!("Skipping line {line_number}: {e}");
                    result.rejected_rows += 1;
                }
            },
        }
    }
    debug!(
        "Partition {} done: {} rows, {} rejected, {} groups",
        partition.index,
        result.input_rows,
        result.rejected_rows,
        result.aggregate.len()
    );
    Ok(result)
}

/// Aggregates fares per (age range, state) over all partitions.
///
/// Partitions are processed on a dedicated pool of `config.threads()` workers. Under
/// [`ErrorPolicy::FailFast`] the first bad line observed by any worker aborts the run;
/// with several workers that is not necessarily the earliest bad line of the input.
pub fn run_aggregation<I>(partitions: I, parser: &DsvParser, config: &Config) -> Result<AggregationOutput>
where
    I: Iterator<Item = Result<Partition, ReadError>> + Send,
{
    let started_at = Instant::now();
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.threads())
        .thread_name(|index| format!("cabfare-worker-{index}"))
        .build()
        .map_err(|e| Error::WorkerPool(Box::new(e)))?;
    let error_policy = config.error_policy();

    let merged = catch_unwind(AssertUnwindSafe(|| {
        pool.install(|| {
            partitions
                .par_bridge()
                .map(|partition| process_partition(parser, partition?, error_policy))
                .try_reduce(PartialResult::default, |lhs, rhs| Ok(lhs.merge(rhs)))
        })
    }))
    .map_err(Error::from_panic_payload)??;

    let accepted_rows: u64 = merged
        .aggregate
        .states()
        .map(|(_, state)| state.count() as u64)
        .sum();
    if accepted_rows != merged.accepted_rows() {
        return Err(Error::Other(
            format!(
                "aggregation lost rows: {accepted_rows} aggregated, {} accepted",
                merged.accepted_rows()
            )
            .into(),
        ));
    }

    let rows = merged.aggregate.finish();
    if let Some((key, total)) = rows.iter().find(|(_, total)| !total.is_finite()) {
        return Err(Error::NonFiniteTotal {
            key: key.to_string(),
            total: *total,
        });
    }
    let stats = RunStats {
        input_rows: merged.input_rows,
        rejected_rows: merged.rejected_rows,
        partitions: merged.partitions,
        groups: rows.len() as u64,
    };
    info!(
        "Aggregated {} rows ({} rejected) from {} partitions into {} groups in {:?}",
        stats.input_rows,
        stats.rejected_rows,
        stats.partitions,
        stats.groups,
        started_at.elapsed()
    );
    Ok(AggregationOutput { rows, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::data_format::DsvSettings;
    use crate::engine::value::AgeRange;
    use assert_matches::assert_matches;

    fn partition(index: usize, lines: &[&str]) -> Result<Partition, ReadError> {
        Ok(Partition {
            index,
            lines: lines
                .iter()
                .enumerate()
                .map(|(offset, line)| ((index * 100 + offset) as u64, (*line).to_string()))
                .collect(),
        })
    }

    fn parser() -> DsvParser {
        DsvSettings::trip_records().parser().unwrap()
    }

    #[test]
    fn test_process_line() {
        let (key, fare) =
            process_line(&parser(), "2023-01-02,Bob,24,LA,NY,15.50,M,doc").unwrap();
        assert_eq!(key, GroupKey::new(AgeRange::Age18To25, "NY"));
        assert!((fare - 15.5).abs() < 1e-12);
    }

    #[test]
    fn test_partials_are_merged() {
        let partitions = vec![
            partition(0, &["2023-01-01,Alice,22,NYC,NY,10.00,F,eng"]),
            partition(1, &["2023-01-02,Bob,24,LA,NY,15.50,M,doc"]),
        ];
        let config = Config::new(2, 1, ErrorPolicy::FailFast).unwrap();
        let output = run_aggregation(partitions.into_iter(), &parser(), &config).unwrap();
        assert_eq!(
            output.rows,
            vec![(GroupKey::new(AgeRange::Age18To25, "NY"), 25.5)]
        );
        assert_eq!(
            output.stats,
            RunStats {
                input_rows: 2,
                rejected_rows: 0,
                partitions: 2,
                groups: 1
            }
        );
    }

    #[test]
    fn test_fail_fast_reports_line() {
        let partitions = vec![partition(3, &["2023-01-01,Alice,22,NYC,NY,10.00,F,eng", "bad"])];
        let result = run_aggregation(partitions.into_iter(), &parser(), &Config::default());
        assert_matches!(
            result,
            Err(Error::Record {
                line: 301,
                source: DataError::MalformedRecord { expected: 8, actual: 1 }
            })
        );
    }

    #[test]
    fn test_skip_and_count() {
        let partitions = vec![partition(
            0,
            &[
                "2023-01-01,Alice,22,NYC,NY,10.00,F,eng",
                "2023-01-01,Carl,abc,NYC,NY,10.00,M,eng",
                "2023-01-01,Dana,30,NYC,NY,n/a,F,eng",
                "2023-01-01,Eve,30,NYC",
            ],
        )];
        let config = Config::default().with_error_policy(ErrorPolicy::SkipAndCount);
        let output = run_aggregation(partitions.into_iter(), &parser(), &config).unwrap();
        assert_eq!(output.stats.input_rows, 4);
        assert_eq!(output.stats.rejected_rows, 3);
        assert_eq!(output.rows.len(), 1);
    }

    #[test]
    fn test_read_error_fails_run() {
        let partitions = vec![
            partition(0, &["2023-01-01,Alice,22,NYC,NY,10.00,F,eng"]),
            Err(ReadError::Io(std::io::Error::other("disk gone"))),
        ];
        let result = run_aggregation(partitions.into_iter(), &parser(), &Config::default());
        assert_matches!(result, Err(Error::Reader(ReadError::Io(_))));
    }

    #[test]
    fn test_overflowing_total_fails_run() {
        let partitions = vec![
            partition(0, &["2023-01-01,Alice,22,NYC,NY,1e308,F,eng"]),
            partition(1, &["2023-01-02,Bob,24,LA,NY,1e308,M,doc"]),
        ];
        let config = Config::new(2, 1, ErrorPolicy::SkipAndCount).unwrap();
        let result = run_aggregation(partitions.into_iter(), &parser(), &config);
        assert_matches!(
            result,
            Err(Error::NonFiniteTotal { key, total }) if key == "(18-25, NY)" && total == f64::INFINITY
        );
    }

    #[test]
    fn test_empty_input() {
        let output = run_aggregation(std::iter::empty(), &parser(), &Config::default()).unwrap();
        assert!(output.rows.is_empty());
        assert_eq!(output.stats, RunStats::default());
    }
}
