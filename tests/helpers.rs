#![allow(dead_code)]
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use cabfare_engine::connectors::data_storage::{WriteError, Writer};
use cabfare_engine::engine::AggregatedRow;
use cabfare_engine::pipeline::PipelineOptions;

/// Collects rows in memory; they become visible to the test only after `flush`.
#[derive(Default)]
pub struct MemoryWriter {
    pending: Vec<AggregatedRow>,
    flushed: Arc<Mutex<Vec<AggregatedRow>>>,
}

impl MemoryWriter {
    pub fn new() -> (Self, Arc<Mutex<Vec<AggregatedRow>>>) {
        let writer = Self::default();
        let flushed = writer.flushed.clone();
        (writer, flushed)
    }
}

impl Writer for MemoryWriter {
    fn write(&mut self, row: &AggregatedRow) -> Result<(), WriteError> {
        self.pending.push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        self.flushed.lock().unwrap().append(&mut self.pending);
        Ok(())
    }
}

pub fn pipeline_options(root: &Path) -> PipelineOptions {
    PipelineOptions {
        project: "test".to_string(),
        job_name: "fares-by-age".to_string(),
        staging_location: root.join("staging"),
        temp_location: root.join("tmp"),
    }
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}

pub fn rendered(rows: &[AggregatedRow]) -> Vec<(String, String, String)> {
    rows.iter()
        .map(|row| {
            (
                row.age_range.to_string(),
                row.state.to_string(),
                format!("{:.2}", row.total_fare),
            )
        })
        .collect()
}

pub fn expected(rows: &[(&str, &str, &str)]) -> Vec<(String, String, String)> {
    rows.iter()
        .map(|(age_range, state, total)| {
            (
                (*age_range).to_string(),
                (*state).to_string(),
                (*total).to_string(),
            )
        })
        .collect()
}
