// Copyright © 2024 Pathway

use std::any::type_name;
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::mem::take;
use std::path::{Path, PathBuf};
use std::str::{from_utf8, Utf8Error};

use itertools::Itertools;
use log::info;
use rusqlite::{params, Connection, ErrorCode, OpenFlags};

use super::data_format::{Formatter, FormatterError};
use crate::engine::value::{output_schema, AggregatedRow, Type, ValueField};
use crate::fs_helpers::ensure_parent_directory;
use crate::retry::{execute_with_retries, RetryConfig};

const MAX_SQLITE_RETRIES: usize = 5;

#[derive(Debug, PartialEq, Eq)]
pub enum ReadResult {
    /// A line with its terminator stripped, and its 1-based number in the source.
    Data(String, u64),
    Finished,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line} is not in utf-8 format: {source}")]
    NotUtf8 {
        line: u64,
        #[source]
        source: Utf8Error,
    },
}

pub trait Reader {
    fn read(&mut self) -> Result<ReadResult, ReadError>;

    fn short_description(&self) -> Cow<'static, str> {
        type_name::<Self>().into()
    }
}

impl<R: Reader + ?Sized> Reader for Box<R> {
    fn read(&mut self) -> Result<ReadResult, ReadError> {
        (**self).read()
    }

    fn short_description(&self) -> Cow<'static, str> {
        (**self).short_description()
    }
}

/// Line-oriented text source. The first `skip_header_lines` lines are dropped and both
/// `\n` and `\r\n` terminators are accepted. Blank lines are yielded like any other
/// line, it's up to the parser to reject them.
pub struct LineReader<R> {
    reader: R,
    description: String,
    header_lines_left: usize,
    line_number: u64,
    buf: Vec<u8>,
}

pub type FilesystemReader = LineReader<BufReader<File>>;
pub type MemoryReader = LineReader<Cursor<Vec<u8>>>;

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R, skip_header_lines: usize, description: impl Into<String>) -> Self {
        Self {
            reader,
            description: description.into(),
            header_lines_left: skip_header_lines,
            line_number: 0,
            buf: Vec::new(),
        }
    }

    fn strip_line_terminator(&mut self) {
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
    }
}

impl FilesystemReader {
    pub fn open(path: impl AsRef<Path>, skip_header_lines: usize) -> Result<Self, ReadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(
            BufReader::new(file),
            skip_header_lines,
            format!("FileSystem({})", path.display()),
        ))
    }
}

impl MemoryReader {
    pub fn from_text(text: impl Into<String>, skip_header_lines: usize) -> Self {
        Self::new(
            Cursor::new(text.into().into_bytes()),
            skip_header_lines,
            "Memory",
        )
    }
}

impl<R: BufRead> Reader for LineReader<R> {
    fn read(&mut self) -> Result<ReadResult, ReadError> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(ReadResult::Finished);
            }
            self.line_number += 1;
            if self.header_lines_left > 0 {
                self.header_lines_left -= 1;
                continue;
            }
            self.strip_line_terminator();
            let line = from_utf8(&self.buf).map_err(|source| ReadError::NotUtf8 {
                line: self.line_number,
                source,
            })?;
            return Ok(ReadResult::Data(line.to_string(), self.line_number));
        }
    }

    fn short_description(&self) -> Cow<'static, str> {
        self.description.clone().into()
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WriteError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to perform Sqlite request: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Formatter(#[from] FormatterError),

    #[error("table {0} doesn't exist in the destination storage")]
    TableDoesNotExist(String),

    #[error("table {0} already holds data, but the write mode only allows writing to an empty table")]
    TableNotEmpty(String),

    #[error("{0:?} can't be used as a table name")]
    InvalidTableName(String),
}

/// Create disposition of a sink.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum TableWriterInitMode {
    /// The destination must already exist.
    Default,
    /// The destination is created when absent.
    #[default]
    CreateIfNotExists,
}

impl TableWriterInitMode {
    pub fn initialize(
        self,
        table_name: &str,
        schema: &[ValueField],
        mut execute_query: impl FnMut(&str) -> Result<(), WriteError>,
        to_db_type: impl FnMut(Type) -> &'static str,
    ) -> Result<(), WriteError> {
        match self {
            TableWriterInitMode::Default => Ok(()),
            TableWriterInitMode::CreateIfNotExists => {
                Self::create_table_if_not_exists(table_name, schema, &mut execute_query, to_db_type)
            }
        }
    }

    fn create_table_if_not_exists(
        table_name: &str,
        schema: &[ValueField],
        mut execute_query: impl FnMut(&str) -> Result<(), WriteError>,
        mut to_db_type: impl FnMut(Type) -> &'static str,
    ) -> Result<(), WriteError> {
        let columns = schema
            .iter()
            .map(|item| format!("{} {}", item.name, to_db_type(item.type_)))
            .join(", ");
        let query = format!("CREATE TABLE IF NOT EXISTS {table_name} ({columns})");
        execute_query(&query)
    }
}

/// Write disposition of a sink. Existing data is never replaced.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum WriteMode {
    #[default]
    Append,
    /// Refuse to write into a destination that already holds rows.
    WriteEmpty,
}

pub trait Writer: Send {
    fn write(&mut self, row: &AggregatedRow) -> Result<(), WriteError>;

    /// Makes everything written so far durable. Writers buffer until this point,
    /// so a run that fails before flushing leaves the destination untouched.
    fn flush(&mut self) -> Result<(), WriteError> {
        Ok(())
    }

    fn name(&self) -> String {
        let short_description: Cow<'static, str> = type_name::<Self>().into();
        short_description
            .split("::")
            .last()
            .unwrap_or_default()
            .to_string()
    }
}

impl<W: Writer + ?Sized> Writer for Box<W> {
    fn write(&mut self, row: &AggregatedRow) -> Result<(), WriteError> {
        (**self).write(row)
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        (**self).flush()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

pub struct FileWriter {
    path: PathBuf,
    formatter: Box<dyn Formatter>,
    init_mode: TableWriterInitMode,
    needs_header: bool,
    needs_line_break: bool,
    buffer: Vec<u8>,
}

fn ends_with_line_break(path: &Path) -> Result<bool, io::Error> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last_byte = [0u8; 1];
    file.read_exact(&mut last_byte)?;
    Ok(last_byte[0] == b'\n')
}

impl FileWriter {
    pub fn new(
        path: impl Into<PathBuf>,
        formatter: Box<dyn Formatter>,
        init_mode: TableWriterInitMode,
        write_mode: WriteMode,
    ) -> Result<FileWriter, WriteError> {
        let path = path.into();
        let existing_len = match std::fs::metadata(&path) {
            Ok(metadata) => Some(metadata.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        match existing_len {
            None if init_mode == TableWriterInitMode::Default => {
                return Err(WriteError::TableDoesNotExist(path.display().to_string()));
            }
            Some(len) if len > 0 && write_mode == WriteMode::WriteEmpty => {
                return Err(WriteError::TableNotEmpty(path.display().to_string()));
            }
            _ => {}
        }
        let needs_line_break = match existing_len {
            Some(len) if len > 0 => !ends_with_line_break(&path)?,
            _ => false,
        };
        Ok(FileWriter {
            path,
            formatter,
            init_mode,
            needs_header: existing_len.unwrap_or(0) == 0,
            needs_line_break,
            buffer: Vec::new(),
        })
    }
}

impl Writer for FileWriter {
    fn write(&mut self, row: &AggregatedRow) -> Result<(), WriteError> {
        let payload = self.formatter.format(row)?;
        self.buffer.extend_from_slice(&payload);
        self.buffer.push(b'\n');
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        let create = self.init_mode == TableWriterInitMode::CreateIfNotExists;
        if create {
            ensure_parent_directory(&self.path)?;
        }
        let file = OpenOptions::new()
            .create(create)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        if self.needs_line_break {
            writer.write_all(b"\n")?;
            self.needs_line_break = false;
        }
        if self.needs_header {
            if let Some(header) = self.formatter.header()? {
                writer.write_all(&header)?;
                writer.write_all(b"\n")?;
            }
            self.needs_header = false;
        }
        writer.write_all(&take(&mut self.buffer))?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> String {
        format!("FileSystem({})", self.path.display())
    }
}

fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_sqlite_busy(error: &WriteError) -> bool {
    matches!(
        error,
        WriteError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

pub struct SqliteWriter {
    connection: Connection,
    path: PathBuf,
    table_name: String,
    insert_query: String,
    write_mode: WriteMode,
    buffer: Vec<AggregatedRow>,
}

impl SqliteWriter {
    pub fn new(
        path: impl Into<PathBuf>,
        table_name: &str,
        init_mode: TableWriterInitMode,
        write_mode: WriteMode,
    ) -> Result<SqliteWriter, WriteError> {
        let path = path.into();
        if !is_valid_table_name(table_name) {
            return Err(WriteError::InvalidTableName(table_name.to_string()));
        }

        let connection = match init_mode {
            TableWriterInitMode::CreateIfNotExists => {
                ensure_parent_directory(&path)?;
                Connection::open(&path)?
            }
            TableWriterInitMode::Default => {
                if !path.exists() {
                    return Err(WriteError::TableDoesNotExist(table_name.to_string()));
                }
                Connection::open_with_flags(
                    &path,
                    OpenFlags::default().difference(OpenFlags::SQLITE_OPEN_CREATE),
                )?
            }
        };

        let schema = output_schema();
        init_mode.initialize(
            table_name,
            &schema,
            |query| {
                connection.execute(query, [])?;
                Ok(())
            },
            Self::sqlite_data_type,
        )?;

        let table_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table_name],
            |row| row.get(0),
        )?;
        if table_count == 0 {
            return Err(WriteError::TableDoesNotExist(table_name.to_string()));
        }

        let column_names = schema.iter().map(|field| field.name.as_str()).join(", ");
        let placeholders = (1..=schema.len()).map(|index| format!("?{index}")).join(", ");
        let insert_query =
            format!("INSERT INTO {table_name} ({column_names}) VALUES ({placeholders})");

        info!("Writing to table {table_name} in {}", path.display());
        Ok(SqliteWriter {
            connection,
            path,
            table_name: table_name.to_string(),
            insert_query,
            write_mode,
            buffer: Vec::new(),
        })
    }

    fn sqlite_data_type(type_: Type) -> &'static str {
        match type_ {
            Type::String => "TEXT NOT NULL",
            Type::Float => "REAL NOT NULL",
        }
    }

    fn insert_rows(
        connection: &mut Connection,
        table_name: &str,
        insert_query: &str,
        rows: &[AggregatedRow],
        write_mode: WriteMode,
    ) -> Result<(), WriteError> {
        let transaction = connection.transaction()?;
        if write_mode == WriteMode::WriteEmpty {
            let existing_rows: i64 = transaction.query_row(
                &format!("SELECT COUNT(*) FROM {table_name}"),
                [],
                |row| row.get(0),
            )?;
            if existing_rows > 0 {
                return Err(WriteError::TableNotEmpty(table_name.to_string()));
            }
        }
        {
            let mut statement = transaction.prepare(insert_query)?;
            for row in rows {
                statement.execute(params![
                    row.age_range.as_str(),
                    row.state.as_str(),
                    row.total_fare
                ])?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
}

impl Writer for SqliteWriter {
    fn write(&mut self, row: &AggregatedRow) -> Result<(), WriteError> {
        self.buffer.push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        execute_with_retries(
            || {
                Self::insert_rows(
                    &mut self.connection,
                    &self.table_name,
                    &self.insert_query,
                    &self.buffer,
                    self.write_mode,
                )
            },
            is_sqlite_busy,
            RetryConfig::default(),
            MAX_SQLITE_RETRIES,
        )?;
        self.buffer.clear();
        Ok(())
    }

    fn name(&self) -> String {
        format!("Sqlite({}:{})", self.path.display(), self.table_name)
    }
}

#[derive(Default, Debug)]
pub struct NullWriter;

impl NullWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Writer for NullWriter {
    fn write(&mut self, _row: &AggregatedRow) -> Result<(), WriteError> {
        Ok(())
    }
}
