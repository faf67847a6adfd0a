// Copyright © 2024 Pathway

use std::any::type_name;
use std::borrow::Cow;
use std::collections::HashSet;
use std::io;

use arcstr::ArcStr;
use itertools::Itertools;

use crate::engine::error::DataError;
use crate::engine::value::{
    AggregatedRow, RawRecord, ValueField, AGE_FIELD, FARE_FIELD, STATE_FIELD, TRIP_HEADER,
};
use crate::engine::{Error, Result};

/// Fields the classifier and the key extractor read; a header without them can't work.
const REQUIRED_FIELDS: [&str; 3] = [AGE_FIELD, STATE_FIELD, FARE_FIELD];

pub struct DsvSettings {
    header: Vec<String>,
    separator: char,
}

impl DsvSettings {
    pub fn new(header: Vec<String>, separator: char) -> DsvSettings {
        DsvSettings { header, separator }
    }

    /// Comma-separated trip records with the fixed eight-field header.
    pub fn trip_records() -> DsvSettings {
        Self::new(TRIP_HEADER.iter().map(ToString::to_string).collect(), ',')
    }

    pub fn parser(self) -> Result<DsvParser> {
        DsvParser::new(self)
    }
}

/// Positional delimited-text parser: value `i` of a line belongs to header field `i`.
///
/// There is no quoting or escaping, a separator inside a value is indistinguishable
/// from a field boundary. The parser holds no per-line state and can be shared
/// between workers.
#[derive(Debug, Clone)]
pub struct DsvParser {
    header: Vec<ArcStr>,
    separator: char,
}

impl DsvParser {
    pub fn new(settings: DsvSettings) -> Result<DsvParser> {
        let mut seen = HashSet::new();
        for name in &settings.header {
            if !seen.insert(name.as_str()) {
                return Err(Error::DuplicateHeaderField(name.clone()));
            }
        }
        for name in REQUIRED_FIELDS {
            if !seen.contains(name) {
                return Err(Error::FieldNotInHeader {
                    name: name.to_string(),
                    header: settings.header.clone(),
                });
            }
        }
        Ok(DsvParser {
            header: settings.header.into_iter().map(ArcStr::from).collect(),
            separator: settings.separator,
        })
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    pub fn parse_line(&self, line: &str) -> Result<RawRecord, DataError> {
        let tokens: Vec<&str> = line.split(self.separator).collect();
        if tokens.len() != self.header.len() {
            return Err(DataError::MalformedRecord {
                expected: self.header.len(),
                actual: tokens.len(),
            });
        }
        Ok(self.header.iter().cloned().zip(tokens).collect())
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FormatterError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("CSV separator must be a 8-bit character, but '{0}' is provided")]
    UnsupportedCsvSeparator(char),
}

pub trait Formatter: Send {
    /// Line written once at the top of a fresh destination, if the format has one.
    fn header(&self) -> Result<Option<Vec<u8>>, FormatterError>;

    fn format(&mut self, row: &AggregatedRow) -> Result<Vec<u8>, FormatterError>;

    fn short_description(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }
}

pub struct DsvFormatter {
    column_names: Vec<String>,
    separator: u8,
}

impl DsvFormatter {
    pub fn new(schema: &[ValueField], separator: char) -> Result<DsvFormatter, FormatterError> {
        let Ok(separator) = separator.try_into() else {
            return Err(FormatterError::UnsupportedCsvSeparator(separator));
        };
        Ok(DsvFormatter {
            column_names: schema.iter().map(|field| field.name.clone()).collect(),
            separator,
        })
    }

    fn format_csv_row<I, T>(tokens: I, separator: u8) -> Result<Vec<u8>, FormatterError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(separator)
            .terminator(csv::Terminator::Any(0)) // There is no option for not having a row terminator
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(Vec::new());
        writer.write_record(tokens)?;
        let mut formatted = writer.into_inner().map_err(|e| e.into_error())?;
        formatted.pop(); // Remove the row terminator character
        Ok(formatted)
    }
}

impl Formatter for DsvFormatter {
    fn header(&self) -> Result<Option<Vec<u8>>, FormatterError> {
        Self::format_csv_row(&self.column_names, self.separator).map(Some)
    }

    fn format(&mut self, row: &AggregatedRow) -> Result<Vec<u8>, FormatterError> {
        let total_fare = format!("{:.2}", row.total_fare);
        Self::format_csv_row(
            [row.age_range.as_str(), row.state.as_str(), total_fare.as_str()],
            self.separator,
        )
    }
}

#[derive(Debug, Default)]
pub struct JsonLinesFormatter;

impl JsonLinesFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl Formatter for JsonLinesFormatter {
    fn header(&self) -> Result<Option<Vec<u8>>, FormatterError> {
        Ok(None)
    }

    fn format(&mut self, row: &AggregatedRow) -> Result<Vec<u8>, FormatterError> {
        Ok(serde_json::to_vec(row)?)
    }
}

/// Renders the header the way it is expected in the input, handy for fixtures.
pub fn trip_header_line() -> String {
    TRIP_HEADER.iter().join(",")
}
