//! Streaming CSV reader/writer for the block-storage trace format.
//!
//! Columns: `ts_us,lba,write,size_byte`. Timestamps are stored relative to
//! the first request in the trace, matching how the reference profiler
//! normalizes a raw capture before any feature extraction runs.

use crate::block::BlockRequest;
use blkfeature_core::errors::IoResultExt;
use blkfeature_core::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Reads `BlockRequest`s from a CSV file one at a time, normalizing
/// timestamps to be relative to the first row read.
pub struct BlockTraceReader {
    inner: csv::Reader<BufReader<File>>,
    path: PathBuf,
    base_ts_us: Option<i64>,
}

impl BlockTraceReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).io_context(&path, "open block trace")?;
        let inner = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        Ok(Self {
            inner,
            path,
            base_ts_us: None,
        })
    }

    /// Returns the next request, with `ts_us` shifted so that the first
    /// request read from this reader has `ts_us == 0`.
    pub fn next_request(&mut self) -> Result<Option<BlockRequest>> {
        let mut record = csv::StringRecord::new();
        if !self
            .inner
            .read_record(&mut record)
            .map_err(|source| csv_error(&self.path, source))?
        {
            return Ok(None);
        }

        let raw_ts: i64 = parse_field(&record, 0, &self.path, "ts_us")?;
        let lba: u64 = parse_field(&record, 1, &self.path, "lba")?;
        let write: bool = parse_bool_field(&record, 2, &self.path)?;
        let size_byte: u32 = parse_field(&record, 3, &self.path, "size_byte")?;

        if size_byte == 0 {
            return Err(Error::InputRange {
                field: "size_byte",
                message: "must be positive".to_string(),
            });
        }

        let base = *self.base_ts_us.get_or_insert(raw_ts);
        let ts_us = raw_ts - base;

        Ok(Some(BlockRequest {
            ts_us,
            lba,
            write,
            size_byte,
        }))
    }
}

/// Appends `BlockRequest`s to a CSV file, writing the header on first use.
pub struct BlockTraceWriter {
    inner: csv::Writer<BufWriter<File>>,
}

impl BlockTraceWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).io_context(path, "create block trace")?;
        let mut inner = csv::WriterBuilder::new().from_writer(BufWriter::new(file));
        inner
            .write_record(["ts_us", "lba", "write", "size_byte"])
            .map_err(|source| csv_error(path, source))?;
        Ok(Self { inner })
    }

    pub fn write_request(&mut self, req: &BlockRequest) -> Result<()> {
        self.inner
            .write_record([
                req.ts_us.to_string(),
                req.lba.to_string(),
                req.write.to_string(),
                req.size_byte.to_string(),
            ])
            .map_err(|source| csv_error(Path::new(""), source))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|source| Error::Io {
                path: PathBuf::new(),
                operation: "flush block trace",
                source,
            })
    }
}

pub(crate) fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::InputFormat {
        kind: "csv",
        path: path.to_path_buf(),
        message: source.to_string(),
    }
}

fn parse_field<T>(record: &csv::StringRecord, idx: usize, path: &Path, field: &'static str) -> Result<T>
where
    T: std::str::FromStr,
{
    record
        .get(idx)
        .ok_or_else(|| Error::InputFormat {
            kind: "csv",
            path: path.to_path_buf(),
            message: format!("missing column {field}"),
        })?
        .parse()
        .map_err(|_| Error::InputRange {
            field,
            message: format!("could not parse {field}"),
        })
}

fn parse_bool_field(record: &csv::StringRecord, idx: usize, path: &Path) -> Result<bool> {
    let raw = record.get(idx).ok_or_else(|| Error::InputFormat {
        kind: "csv",
        path: path.to_path_buf(),
        message: "missing column write".to_string(),
    })?;
    match raw {
        "true" | "1" | "w" => Ok(true),
        "false" | "0" | "r" => Ok(false),
        other => Err(Error::InputRange {
            field: "write",
            message: format!("unrecognized value {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reader_normalizes_timestamps_relative_to_first_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts_us,lba,write,size_byte").unwrap();
        writeln!(file, "5000,0,false,4096").unwrap();
        writeln!(file, "5500,1,true,4096").unwrap();
        file.flush().unwrap();

        let mut reader = BlockTraceReader::open(file.path()).unwrap();
        let first = reader.next_request().unwrap().unwrap();
        assert_eq!(first.ts_us, 0);
        let second = reader.next_request().unwrap().unwrap();
        assert_eq!(second.ts_us, 500);
        assert!(reader.next_request().unwrap().is_none());
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts_us,lba,write,size_byte").unwrap();
        writeln!(file, "0,0,false,0").unwrap();
        file.flush().unwrap();

        let mut reader = BlockTraceReader::open(file.path()).unwrap();
        assert!(reader.next_request().is_err());
    }

    #[test]
    fn round_trips_through_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let mut writer = BlockTraceWriter::create(&path).unwrap();
        let req = BlockRequest {
            ts_us: 0,
            lba: 3,
            write: true,
            size_byte: 4096,
        };
        writer.write_request(&req).unwrap();
        writer.flush().unwrap();

        let mut reader = BlockTraceReader::open(&path).unwrap();
        let read_back = reader.next_request().unwrap().unwrap();
        assert_eq!(read_back, req);
    }
}
