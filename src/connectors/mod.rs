// Copyright © 2024 Pathway

use log::debug;

pub mod data_format;
pub mod data_storage;

pub use data_storage::{ReadError, ReadResult, Reader, WriteError, Writer};

/// Upper bound for the line buffer reserved up front, whatever the partition size.
const MAX_PREALLOCATED_LINES: usize = 4096;

/// A contiguous run of input lines handed to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    /// `(line number, line)` pairs in source order.
    pub lines: Vec<(u64, String)>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Cuts the output of a [`Reader`] into partitions of at most `partition_size` lines.
///
/// A read error is yielded once and ends the iteration, the caller is expected to fail
/// the run on it.
pub struct Partitioner<R> {
    reader: R,
    partition_size: usize,
    next_index: usize,
    finished: bool,
}

impl<R: Reader> Partitioner<R> {
    pub fn new(reader: R, partition_size: usize) -> Self {
        Self {
            reader,
            partition_size: partition_size.max(1),
            next_index: 0,
            finished: false,
        }
    }

    fn next_partition(&mut self) -> Result<Option<Partition>, ReadError> {
        let mut lines = Vec::with_capacity(self.partition_size.min(MAX_PREALLOCATED_LINES));
        while lines.len() < self.partition_size {
            match self.reader.read()? {
                ReadResult::Data(line, line_number) => lines.push((line_number, line)),
                ReadResult::Finished => {
                    debug!("{} is exhausted", self.reader.short_description());
                    self.finished = true;
                    break;
                }
            }
        }
        if lines.is_empty() {
            return Ok(None);
        }
        let partition = Partition {
            index: self.next_index,
            lines,
        };
        self.next_index += 1;
        Ok(Some(partition))
    }
}

impl<R: Reader> Iterator for Partitioner<R> {
    type Item = Result<Partition, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_partition() {
            Ok(partition) => partition.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::data_storage::MemoryReader;
    use super::*;

    #[test]
    fn test_partitions_are_bounded_and_numbered() {
        let reader = MemoryReader::from_text("header\na\nb\nc\nd\ne\n", 1);
        let partitions: Vec<_> = Partitioner::new(reader, 2)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(partitions.len(), 3);
        assert_eq!(
            partitions[0],
            Partition {
                index: 0,
                lines: vec![(2, "a".to_string()), (3, "b".to_string())]
            }
        );
        assert_eq!(partitions[2].index, 2);
        assert_eq!(partitions[2].lines, vec![(6, "e".to_string())]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let reader = MemoryReader::from_text("a\nb\nc\nd", 0);
        let sizes: Vec<_> = Partitioner::new(reader, 2)
            .map(|partition| partition.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let reader = MemoryReader::from_text("header\n", 1);
        assert_eq!(Partitioner::new(reader, 10).count(), 0);
    }

    #[test]
    fn test_read_error_ends_iteration() {
        let reader = MemoryReader::new(std::io::Cursor::new(b"ok\n\xFF\nlater\n".to_vec()), 0, "bytes");
        let mut partitioner = Partitioner::new(reader, 10);
        assert!(matches!(
            partitioner.next(),
            Some(Err(ReadError::NotUtf8 { line: 2, .. }))
        ));
        assert!(partitioner.next().is_none());
    }
}
