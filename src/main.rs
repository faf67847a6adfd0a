// Copyright © 2024 Pathway

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{debug, error};

use cabfare_engine::connectors::data_format::{DsvFormatter, JsonLinesFormatter};
use cabfare_engine::connectors::data_storage::{
    FileWriter, FilesystemReader, SqliteWriter, TableWriterInitMode, WriteMode, Writer,
};
use cabfare_engine::engine::{output_schema, Config, ErrorPolicy, Result};
use cabfare_engine::pipeline::{run_pipeline, PipelineOptions};

const HEADER_LINES: usize = 1;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SinkKind {
    /// Comma-separated file with a header row
    Dsv,
    /// One JSON object per line
    Jsonl,
    /// Table in a SQLite database
    Sqlite,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CreateDisposition {
    CreateIfNeeded,
    CreateNever,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WriteDisposition {
    Append,
    WriteEmpty,
}

/// Sum trip fares per age range and state
#[derive(Parser, Debug)]
#[command(name = "cabfare", version)]
struct Cli {
    /// Comma-separated trip records, first line is the header
    #[arg(short, long)]
    input: PathBuf,

    /// Destination file (dsv, jsonl) or database (sqlite)
    #[arg(short, long)]
    output: PathBuf,

    #[arg(long, value_enum, default_value = "dsv")]
    sink: SinkKind,

    /// Table name for the sqlite sink
    #[arg(long, default_value = "fares_by_age_range")]
    table: String,

    #[arg(long, value_enum, default_value = "create-if-needed")]
    create_disposition: CreateDisposition,

    #[arg(long, value_enum, default_value = "append")]
    write_disposition: WriteDisposition,

    /// Worker threads (falls back to CABFARE_THREADS)
    #[arg(long)]
    threads: Option<usize>,

    /// Input lines per partition (falls back to CABFARE_PARTITION_SIZE)
    #[arg(long)]
    partition_size: Option<usize>,

    /// Skip and count malformed lines instead of failing the run
    #[arg(long)]
    skip_malformed: bool,

    #[arg(long, env = "CABFARE_PROJECT", default_value = "local")]
    project: String,

    #[arg(long, env = "CABFARE_JOB_NAME", default_value = "cabfare-aggregate")]
    job_name: String,

    #[arg(long, env = "CABFARE_STAGING_LOCATION", default_value = ".cabfare/staging")]
    staging_location: PathBuf,

    #[arg(long, env = "CABFARE_TEMP_LOCATION", default_value = ".cabfare/tmp")]
    temp_location: PathBuf,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let from_env = Config::from_env()?;
        let error_policy = if self.skip_malformed {
            ErrorPolicy::SkipAndCount
        } else {
            from_env.error_policy()
        };
        Ok(Config::new(
            self.threads.unwrap_or(from_env.threads()),
            self.partition_size.unwrap_or(from_env.partition_size()),
            error_policy,
        )?)
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            project: self.project.clone(),
            job_name: self.job_name.clone(),
            staging_location: self.staging_location.clone(),
            temp_location: self.temp_location.clone(),
        }
    }

    fn writer(&self) -> Result<Box<dyn Writer>> {
        let init_mode = match self.create_disposition {
            CreateDisposition::CreateIfNeeded => TableWriterInitMode::CreateIfNotExists,
            CreateDisposition::CreateNever => TableWriterInitMode::Default,
        };
        let write_mode = match self.write_disposition {
            WriteDisposition::Append => WriteMode::Append,
            WriteDisposition::WriteEmpty => WriteMode::WriteEmpty,
        };
        let writer: Box<dyn Writer> = match self.sink {
            SinkKind::Dsv => Box::new(FileWriter::new(
                &self.output,
                Box::new(DsvFormatter::new(&output_schema(), ',')?),
                init_mode,
                write_mode,
            )?),
            SinkKind::Jsonl => Box::new(FileWriter::new(
                &self.output,
                Box::new(JsonLinesFormatter::new()),
                init_mode,
                write_mode,
            )?),
            SinkKind::Sqlite => Box::new(SqliteWriter::new(
                &self.output,
                &self.table,
                init_mode,
                write_mode,
            )?),
        };
        Ok(writer)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    let reader = FilesystemReader::open(&cli.input, HEADER_LINES)?;
    let mut writer = cli.writer()?;
    let stats = run_pipeline(&cli.options(), &config, reader, writer.as_mut())?;
    println!(
        "{} rows read, {} rejected, {} groups written to {}",
        stats.input_rows,
        stats.rejected_rows,
        stats.groups,
        writer.name()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 2)
        .init();

    debug!("cabfare started with {cli:?}");

    if let Err(e) = run(&cli) {
        error!("Fatal error: {e}");
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
