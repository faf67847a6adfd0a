// Copyright © 2024 Pathway

use std::any::Any;
use std::error;
use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::result;

use crate::connectors::data_format::FormatterError;
use crate::connectors::data_storage::{ReadError, WriteError};
use crate::engine::dataflow::config::Error as ConfigError;

#[allow(clippy::module_name_repetitions)]
pub type DynError = Box<dyn error::Error + Send + Sync>;

/// Per-record failures. Each one concerns a single input line and, depending on the
/// configured error policy, either aborts the run or gets the line skipped.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DataError {
    #[error("malformed record: expected {expected} comma-separated values, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    #[error("invalid age {value:?}: {source}")]
    InvalidAge {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid fare {value:?}: {reason}")]
    InvalidFare { value: String, reason: FareError },

    #[error("field {0:?} is missing from the record")]
    MissingField(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FareError {
    #[error(transparent)]
    NotANumber(#[from] ParseFloatError),

    #[error("fare must be a finite number")]
    NotFinite,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("line {line}: {source}")]
    Record {
        line: u64,
        #[source]
        source: DataError,
    },

    #[error("field {name:?} required by the pipeline is absent from the header {header:?}")]
    FieldNotInHeader { name: String, header: Vec<String> },

    #[error("duplicate field {0:?} in the header")]
    DuplicateHeaderField(String),

    #[error("invalid pipeline option {name}: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("total fare of group {key} is not a finite number: {total}")]
    NonFiniteTotal { key: String, total: f64 },

    #[error("worker panic: {0}")]
    WorkerPanic(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[source] DynError),

    #[error("failed to read input: {0}")]
    Reader(#[from] ReadError),

    #[error("failed to write output: {0}")]
    Writer(#[from] WriteError),

    #[error(transparent)]
    Formatter(#[from] FormatterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(DynError),
}

impl Error {
    pub fn from_panic_payload(panic_payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = match panic_payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(panic_payload) => match panic_payload.downcast::<String>() {
                Ok(message) => *message,
                Err(panic_payload) => format!("{panic_payload:?}"),
            },
        };
        Self::WorkerPanic(message)
    }

    /// The per-record cause, if the run failed because of a bad input line.
    pub fn data_error(&self) -> Option<&DataError> {
        match self {
            Self::Record { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
