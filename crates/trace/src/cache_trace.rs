//! Streaming CSV reader/writer for the cache-trace format, and the
//! conversion that derives a cache trace from a block-storage trace.
//!
//! Columns: `req_index,iat_us,cache_addr,write,front_misalign_byte,rear_misalign_byte`.
//! Rows sharing `req_index` are contiguous in the file; `CacheTraceReader`
//! exposes them a group at a time so a BAFM can be built in a single
//! streaming pass with O(1) memory relative to trace length.

use crate::block_trace::BlockTraceReader;
use crate::cache_request::CacheRequest;
use blkfeature_core::errors::IoResultExt;
use blkfeature_core::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::InputFormat {
        kind: "csv",
        path: path.to_path_buf(),
        message: source.to_string(),
    }
}

/// Reads a cache trace one `req_index` group at a time.
pub struct CacheTraceReader {
    inner: csv::Reader<BufReader<File>>,
    path: PathBuf,
    pending: Option<CacheRequest>,
}

impl CacheTraceReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).io_context(&path, "open cache trace")?;
        let inner = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        Ok(Self {
            inner,
            path,
            pending: None,
        })
    }

    fn read_one(&mut self) -> Result<Option<CacheRequest>> {
        let mut record = csv::StringRecord::new();
        if !self
            .inner
            .read_record(&mut record)
            .map_err(|source| csv_error(&self.path, source))?
        {
            return Ok(None);
        }
        let get = |idx: usize, field: &'static str| -> Result<&str> {
            record.get(idx).ok_or_else(|| Error::InputFormat {
                kind: "csv",
                path: self.path.clone(),
                message: format!("missing column {field}"),
            })
        };
        let parse = |raw: &str, field: &'static str| -> Result<i64> {
            raw.parse().map_err(|_| Error::InputRange {
                field,
                message: format!("could not parse {field}"),
            })
        };
        let req_index: u64 = parse(get(0, "req_index")?, "req_index")? as u64;
        let iat_us: i64 = parse(get(1, "iat_us")?, "iat_us")?;
        let cache_addr: u64 = parse(get(2, "cache_addr")?, "cache_addr")? as u64;
        let write = match get(3, "write")? {
            "true" | "1" | "w" => true,
            "false" | "0" | "r" => false,
            other => {
                return Err(Error::InputRange {
                    field: "write",
                    message: format!("unrecognized value {other}"),
                })
            }
        };
        let front_misalign_byte = parse(get(4, "front_misalign_byte")?, "front_misalign_byte")? as u32;
        let rear_misalign_byte = parse(get(5, "rear_misalign_byte")?, "rear_misalign_byte")? as u32;

        Ok(Some(CacheRequest {
            req_index,
            iat_us,
            cache_addr,
            write,
            front_misalign_byte,
            rear_misalign_byte,
        }))
    }

    /// Returns the next group of cache requests sharing one `req_index`,
    /// or `None` at end of file.
    pub fn next_group(&mut self) -> Result<Option<Vec<CacheRequest>>> {
        let first = match self.pending.take() {
            Some(row) => row,
            None => match self.read_one()? {
                Some(row) => row,
                None => return Ok(None),
            },
        };
        let mut group = vec![first];
        loop {
            match self.read_one()? {
                Some(row) if row.req_index == group[0].req_index => group.push(row),
                Some(row) => {
                    self.pending = Some(row);
                    break;
                }
                None => break,
            }
        }
        Ok(Some(group))
    }
}

/// Appends cache requests to a CSV file, writing the header on first use.
pub struct CacheTraceWriter {
    inner: csv::Writer<BufWriter<File>>,
}

impl CacheTraceWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).io_context(path, "create cache trace")?;
        let mut inner = csv::WriterBuilder::new().from_writer(BufWriter::new(file));
        inner
            .write_record([
                "req_index",
                "iat_us",
                "cache_addr",
                "write",
                "front_misalign_byte",
                "rear_misalign_byte",
            ])
            .map_err(|source| csv_error(path, source))?;
        Ok(Self { inner })
    }

    pub fn write_request(&mut self, req: &CacheRequest) -> Result<()> {
        self.inner
            .write_record([
                req.req_index.to_string(),
                req.iat_us.to_string(),
                req.cache_addr.to_string(),
                req.write.to_string(),
                req.front_misalign_byte.to_string(),
                req.rear_misalign_byte.to_string(),
            ])
            .map_err(|source| csv_error(Path::new(""), source))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|source| Error::Io {
            path: PathBuf::new(),
            operation: "flush cache trace",
            source,
        })
    }
}

/// Expands a block-storage trace into a cache trace, one
/// `CacheRequest` per cache block touched, plus the auxiliary
/// read-modify-write rows a misaligned write implies.
///
/// A misaligned write only rewrites part of the cache blocks at its
/// edges; the untouched remainder of those edge blocks must first be
/// read. Each such edge contributes an extra read row at the same
/// `req_index` and `iat_us` as the write, before the write row for that
/// address, so it lands in the same BAFM entry group and is counted
/// independently on the read side.
pub fn cache_trace_from_block_trace(
    block_trace_path: impl AsRef<Path>,
    cache_trace_path: impl AsRef<Path>,
    cache_block_size_byte: u64,
) -> Result<()> {
    let mut reader = BlockTraceReader::open(block_trace_path)?;
    let mut writer = CacheTraceWriter::create(cache_trace_path)?;
    let mut req_index: u64 = 0;
    let mut prev_ts_us: Option<i64> = None;

    while let Some(req) = reader.next_request()? {
        let iat_us = match prev_ts_us {
            Some(prev) => req.ts_us - prev,
            None => 0,
        };
        prev_ts_us = Some(req.ts_us);

        let start = req.start_cache_addr(cache_block_size_byte);
        let end = req.end_cache_addr(cache_block_size_byte);
        let front = req.front_misalign_byte(cache_block_size_byte) as u32;
        let rear = req.rear_misalign_byte(cache_block_size_byte) as u32;

        if req.write && end == start {
            if front > 0 || rear > 0 {
                writer.write_request(&CacheRequest {
                    req_index,
                    iat_us,
                    cache_addr: start,
                    write: false,
                    front_misalign_byte: front,
                    rear_misalign_byte: rear,
                })?;
            }
        } else {
            if req.write && front > 0 {
                writer.write_request(&CacheRequest {
                    req_index,
                    iat_us,
                    cache_addr: start,
                    write: false,
                    front_misalign_byte: front,
                    rear_misalign_byte: 0,
                })?;
            }
            if req.write && rear > 0 {
                writer.write_request(&CacheRequest {
                    req_index,
                    iat_us,
                    cache_addr: end,
                    write: false,
                    front_misalign_byte: 0,
                    rear_misalign_byte: rear,
                })?;
            }
        }

        let mut first = true;
        for addr in start..=end {
            let is_first_row = first;
            first = false;
            writer.write_request(&CacheRequest {
                req_index,
                iat_us: if is_first_row { iat_us } else { 0 },
                cache_addr: addr,
                write: req.write,
                front_misalign_byte: if addr == start { front } else { 0 },
                rear_misalign_byte: if addr == end { rear } else { 0 },
            })?;
        }

        req_index += 1;
    }

    writer.flush()
}

/// Produces a reduced cache trace containing only rows whose `cache_addr`
/// is not in `removed`.
pub fn filter_removed_addrs(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    removed: &std::collections::HashSet<u64>,
) -> Result<()> {
    let mut reader = CacheTraceReader::open(input_path)?;
    let mut writer = CacheTraceWriter::create(output_path)?;
    while let Some(group) = reader.next_group()? {
        for row in group {
            if !removed.contains(&row.cache_addr) {
                writer.write_request(&row)?;
            }
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn single_block_aligned_request_produces_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let block_path = dir.path().join("block.csv");
        let mut f = File::create(&block_path).unwrap();
        writeln!(f, "ts_us,lba,write,size_byte").unwrap();
        writeln!(f, "0,0,false,4096").unwrap();
        drop(f);

        let cache_path = dir.path().join("cache.csv");
        cache_trace_from_block_trace(&block_path, &cache_path, 4096).unwrap();

        let mut reader = CacheTraceReader::open(&cache_path).unwrap();
        let group = reader.next_group().unwrap().unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].cache_addr, 0);
        assert!(!group[0].write);
        assert_eq!(group[0].front_misalign_byte, 0);
        assert!(reader.next_group().unwrap().is_none());
    }

    #[test]
    fn misaligned_single_block_write_gets_rmw_read_row() {
        let dir = tempfile::tempdir().unwrap();
        let block_path = dir.path().join("block.csv");
        let mut f = File::create(&block_path).unwrap();
        writeln!(f, "ts_us,lba,write,size_byte").unwrap();
        // lba=1, size=512: single block (addr 0), misaligned on both edges.
        writeln!(f, "0,1,true,512").unwrap();
        drop(f);

        let cache_path = dir.path().join("cache.csv");
        cache_trace_from_block_trace(&block_path, &cache_path, 4096).unwrap();

        let mut reader = CacheTraceReader::open(&cache_path).unwrap();
        let group = reader.next_group().unwrap().unwrap();
        assert_eq!(group.len(), 2);
        assert!(!group[0].write);
        assert_eq!(group[0].front_misalign_byte, 512);
        assert!(group[1].write);
        assert_eq!(group[1].cache_addr, 0);
    }

    #[test]
    fn misaligned_multi_block_write_gets_two_rmw_rows() {
        let dir = tempfile::tempdir().unwrap();
        let block_path = dir.path().join("block.csv");
        let mut f = File::create(&block_path).unwrap();
        writeln!(f, "ts_us,lba,write,size_byte").unwrap();
        // lba=1, size=4096: spans blocks 0,1. front misaligned only.
        writeln!(f, "0,1,true,4096").unwrap();
        drop(f);

        let cache_path = dir.path().join("cache.csv");
        cache_trace_from_block_trace(&block_path, &cache_path, 4096).unwrap();

        let mut reader = CacheTraceReader::open(&cache_path).unwrap();
        let group = reader.next_group().unwrap().unwrap();
        // 1 rmw read row (front) + 2 write rows.
        assert_eq!(group.len(), 3);
        assert!(!group[0].write);
        assert_eq!(group[0].cache_addr, 0);
        assert_eq!(group[0].front_misalign_byte, 512);
        assert!(group[1].write);
        assert_eq!(group[1].cache_addr, 0);
        assert!(group[2].write);
        assert_eq!(group[2].cache_addr, 1);
    }

    #[test]
    fn rear_only_misaligned_single_block_write_still_gets_rmw_read_row() {
        let dir = tempfile::tempdir().unwrap();
        let block_path = dir.path().join("block.csv");
        let mut f = File::create(&block_path).unwrap();
        writeln!(f, "ts_us,lba,write,size_byte").unwrap();
        // lba=0, size=512: single block (addr 0), front-aligned, rear misaligned.
        writeln!(f, "0,0,true,512").unwrap();
        drop(f);

        let cache_path = dir.path().join("cache.csv");
        cache_trace_from_block_trace(&block_path, &cache_path, 4096).unwrap();

        let mut reader = CacheTraceReader::open(&cache_path).unwrap();
        let group = reader.next_group().unwrap().unwrap();
        assert_eq!(group.len(), 2);
        assert!(!group[0].write);
        assert_eq!(group[0].front_misalign_byte, 0);
        assert_eq!(group[0].rear_misalign_byte, 3584);
        assert!(group[1].write);
        assert_eq!(group[1].cache_addr, 0);
    }

    #[test]
    fn filter_removes_requested_addrs() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.csv");
        let mut writer = CacheTraceWriter::create(&cache_path).unwrap();
        writer
            .write_request(&CacheRequest {
                req_index: 0,
                iat_us: 0,
                cache_addr: 1,
                write: false,
                front_misalign_byte: 0,
                rear_misalign_byte: 0,
            })
            .unwrap();
        writer
            .write_request(&CacheRequest {
                req_index: 0,
                iat_us: 0,
                cache_addr: 2,
                write: false,
                front_misalign_byte: 0,
                rear_misalign_byte: 0,
            })
            .unwrap();
        writer.flush().unwrap();

        let out_path = dir.path().join("filtered.csv");
        let removed = std::collections::HashSet::from([1u64]);
        filter_removed_addrs(&cache_path, &out_path, &removed).unwrap();

        let mut reader = CacheTraceReader::open(&out_path).unwrap();
        let group = reader.next_group().unwrap().unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].cache_addr, 2);
    }
}
