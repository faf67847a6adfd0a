mod helpers;
use helpers::fixture;

use assert_matches::assert_matches;

use cabfare_engine::connectors::data_format::{DsvParser, DsvSettings};
use cabfare_engine::connectors::data_storage::{FilesystemReader, ReadError, ReadResult, Reader};
use cabfare_engine::connectors::Partitioner;
use cabfare_engine::engine::{classify, DataError, Error};

fn read_all(reader: &mut dyn Reader) -> eyre::Result<Vec<(String, u64)>> {
    let mut lines = Vec::new();
    loop {
        match reader.read()? {
            ReadResult::Data(line, line_number) => lines.push((line, line_number)),
            ReadResult::Finished => return Ok(lines),
        }
    }
}

#[test]
fn test_dsv_read_ok() -> eyre::Result<()> {
    let parser = DsvSettings::trip_records().parser()?;
    let mut reader = FilesystemReader::open(fixture("trips.csv"), 1)?;

    let lines = read_all(&mut reader)?;
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0].1, 2);

    let record = parser.parse_line(&lines[0].0)?;
    assert_eq!(record.len(), 8);
    assert_eq!(record.get("name"), Some("Alice"));
    assert_eq!(record.get("state"), Some("NY"));
    assert_eq!(record.get("fare"), Some("10.00"));
    assert_eq!(record.get("tip"), None);
    Ok(())
}

#[test]
fn test_dsv_crlf_and_blank_lines() -> eyre::Result<()> {
    let parser = DsvSettings::trip_records().parser()?;
    let mut reader = FilesystemReader::open(fixture("trips_crlf.csv"), 1)?;
    let lines = read_all(&mut reader)?;
    assert_eq!(
        lines,
        vec![
            ("2023-01-01,Alice,22,NYC,NY,10.00,F,eng".to_string(), 2),
            (String::new(), 3),
            ("2023-01-02,Bob,24,LA,NY,15.50,M,doc".to_string(), 4),
        ]
    );
    assert_matches!(
        parser.parse_line(&lines[1].0),
        Err(DataError::MalformedRecord {
            expected: 8,
            actual: 1
        })
    );
    Ok(())
}

#[test]
fn test_dsv_header_only() -> eyre::Result<()> {
    let mut reader = FilesystemReader::open(fixture("header_only.csv"), 1)?;
    assert_eq!(reader.read()?, ReadResult::Finished);
    assert_eq!(reader.read()?, ReadResult::Finished);
    Ok(())
}

#[test]
fn test_dsv_missing_file() {
    let result = FilesystemReader::open(fixture("no_such_file.csv"), 1).map(|_| ());
    assert_matches!(result, Err(ReadError::Open { .. }));
}

#[test]
fn test_dsv_bad_lines_are_reported_individually() -> eyre::Result<()> {
    let parser = DsvSettings::trip_records().parser()?;
    let mut reader = FilesystemReader::open(fixture("trips_bad_lines.csv"), 1)?;
    let outcomes: Vec<_> = read_all(&mut reader)?
        .into_iter()
        .map(|(line, _)| parser.parse_line(&line).and_then(classify))
        .collect();

    assert!(outcomes[0].is_ok());
    assert_matches!(
        outcomes[1],
        Err(DataError::MalformedRecord {
            expected: 8,
            actual: 5
        })
    );
    assert_matches!(outcomes[2], Err(DataError::InvalidAge { .. }));
    // the fare is only looked at once the key is extracted
    assert!(outcomes[3].is_ok());
    assert!(outcomes[4].is_ok());
    Ok(())
}

#[test]
fn test_dsv_custom_header() -> eyre::Result<()> {
    let settings = DsvSettings::new(
        vec![
            "state".to_string(),
            "fare".to_string(),
            "age".to_string(),
        ],
        ';',
    );
    let parser = DsvParser::new(settings)?;
    assert_eq!(parser.column_count(), 3);
    let record = parser.parse_line("TX;4.25;30")?;
    assert_eq!(record.get("age"), Some("30"));

    let missing_fare = DsvParser::new(DsvSettings::new(
        vec!["state".to_string(), "age".to_string()],
        ',',
    ));
    assert_matches!(missing_fare, Err(Error::FieldNotInHeader { name, .. }) if name == "fare");

    let duplicated = DsvParser::new(DsvSettings::new(
        vec![
            "age".to_string(),
            "state".to_string(),
            "fare".to_string(),
            "age".to_string(),
        ],
        ',',
    ));
    assert_matches!(duplicated, Err(Error::DuplicateHeaderField(name)) if name == "age");
    Ok(())
}

#[test]
fn test_dsv_partitions_cover_file() -> eyre::Result<()> {
    let reader = FilesystemReader::open(fixture("trips.csv"), 1)?;
    let partitions = Partitioner::new(reader, 3).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        partitions.iter().map(|p| p.len()).collect::<Vec<_>>(),
        vec![3, 3, 2]
    );
    assert_eq!(
        partitions.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    let line_numbers: Vec<u64> = partitions
        .iter()
        .flat_map(|p| p.lines.iter().map(|(line_number, _)| *line_number))
        .collect();
    assert_eq!(line_numbers, (2..=9).collect::<Vec<_>>());
    Ok(())
}
