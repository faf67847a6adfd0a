// Copyright © 2024 Pathway

use std::fs;
use std::path::PathBuf;

use log::info;
use serde::Serialize;

use crate::connectors::data_format::DsvSettings;
use crate::connectors::{Partitioner, Reader, Writer};
use crate::engine::{format_row, run_aggregation, Config, Error, Result, RunStats};
use crate::fs_helpers::ensure_directory;

/// Job identity and the locations the runtime keeps its files in. None of it reaches
/// the aggregation itself.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOptions {
    pub project: String,
    pub job_name: String,
    pub staging_location: PathBuf,
    pub temp_location: PathBuf,
}

#[derive(Serialize)]
struct JobSummary<'a> {
    options: &'a PipelineOptions,
    sink: String,
    stats: RunStats,
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(Error::InvalidOption {
                name: "project",
                reason: "must not be empty".to_string(),
            });
        }
        let job_name_ok = !self.job_name.is_empty()
            && self
                .job_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !job_name_ok {
            return Err(Error::InvalidOption {
                name: "job_name",
                reason: format!(
                    "{:?} must be non-empty and consist of letters, digits, '-' and '_'",
                    self.job_name
                ),
            });
        }
        for (name, location) in [
            ("staging_location", &self.staging_location),
            ("temp_location", &self.temp_location),
        ] {
            if location.as_os_str().is_empty() {
                return Err(Error::InvalidOption {
                    name,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    fn prepare_locations(&self) -> Result<()> {
        ensure_directory(&self.staging_location)?;
        ensure_directory(&self.temp_location)?;
        Ok(())
    }

    /// Where the summary of a finished run is recorded.
    pub fn summary_path(&self) -> PathBuf {
        self.staging_location
            .join(format!("{}.summary.json", self.job_name))
    }
}

/// Reads trip records from `reader`, aggregates them and hands the rows to `writer`.
///
/// The sink is only written to after every partition has been merged; it is flushed
/// once, at the end. On success a JSON summary is left in the staging location.
pub fn run_pipeline<R>(
    options: &PipelineOptions,
    config: &Config,
    reader: R,
    writer: &mut dyn Writer,
) -> Result<RunStats>
where
    R: Reader + Send,
{
    options.validate()?;
    options.prepare_locations()?;
    info!(
        "Starting job {} in project {} ({} threads, {} lines per partition, {:?}), writing to {}",
        options.job_name,
        options.project,
        config.threads(),
        config.partition_size(),
        config.error_policy(),
        writer.name()
    );

    let parser = DsvSettings::trip_records().parser()?;
    let partitions = Partitioner::new(reader, config.partition_size());
    let output = run_aggregation(partitions, &parser, config)?;

    for (key, total) in output.rows {
        writer.write(&format_row(key, total))?;
    }
    writer.flush()?;

    let summary = JobSummary {
        options,
        sink: writer.name(),
        stats: output.stats,
    };
    fs::write(
        options.summary_path(),
        serde_json::to_vec_pretty(&summary).map_err(|e| Error::Other(Box::new(e)))?,
    )?;
    info!("Job {} finished: {:?}", options.job_name, output.stats);
    Ok(output.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn options(job_name: &str) -> PipelineOptions {
        PipelineOptions {
            project: "local".to_string(),
            job_name: job_name.to_string(),
            staging_location: PathBuf::from("staging"),
            temp_location: PathBuf::from("tmp"),
        }
    }

    #[test]
    fn test_validate_accepts_plain_names() {
        options("fares-by-age_2023").validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_job_name() {
        assert_matches!(
            options("fares by age").validate(),
            Err(Error::InvalidOption {
                name: "job_name",
                ..
            })
        );
        assert_matches!(
            options("").validate(),
            Err(Error::InvalidOption {
                name: "job_name",
                ..
            })
        );
    }

    #[test]
    fn test_validate_rejects_empty_locations() {
        let mut options = options("job");
        options.temp_location = PathBuf::new();
        assert_matches!(
            options.validate(),
            Err(Error::InvalidOption {
                name: "temp_location",
                ..
            })
        );
    }

    #[test]
    fn test_summary_path() {
        assert_eq!(
            options("job").summary_path(),
            PathBuf::from("staging").join("job.summary.json")
        );
    }
}
