//! Append-only log of each block removed by the greedy optimizer, and the
//! resume machinery that replays it against a fresh `Bafm` to verify a
//! process can be safely restarted mid-run.

use blkfeature_bafm::Bafm;
use blkfeature_core::errors::IoResultExt;
use blkfeature_core::{Error, Result};
use blkfeature_feature::{error_dict, ErrorDict};
use blkfeature_trace::{WorkloadFeatures, WorkloadStats};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const HEADER: [&str; 13] = [
    "addr",
    "mean_read_size",
    "mean_write_size",
    "mean_read_iat",
    "mean_write_iat",
    "misalignment_per_read",
    "misalignment_per_write",
    "mean",
    "max",
    "wmean",
    "block_count",
    "rate",
    "runtime_ns",
];

/// One row of a checkpoint log: the error state right after removing
/// `addr`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointRow {
    pub addr: u64,
    pub error: ErrorDict,
    pub block_count: u64,
    pub rate: f64,
    pub runtime_ns: u64,
}

impl CheckpointRow {
    fn to_record(self) -> [String; 13] {
        let e = self.error;
        [
            self.addr.to_string(),
            e.per_feature[0].to_string(),
            e.per_feature[1].to_string(),
            e.per_feature[2].to_string(),
            e.per_feature[3].to_string(),
            e.per_feature[4].to_string(),
            e.per_feature[5].to_string(),
            e.mean.to_string(),
            e.max.to_string(),
            e.wmean.to_string(),
            self.block_count.to_string(),
            self.rate.to_string(),
            self.runtime_ns.to_string(),
        ]
    }

    fn from_record(record: &csv::StringRecord, path: &Path) -> Result<Self> {
        let get = |idx: usize, name: &'static str| -> Result<f64> {
            record
                .get(idx)
                .ok_or_else(|| Error::ResumeCorrupt {
                    path: path.to_path_buf(),
                    message: format!("missing column {name}"),
                })?
                .parse()
                .map_err(|_| Error::ResumeCorrupt {
                    path: path.to_path_buf(),
                    message: format!("could not parse {name}"),
                })
        };
        let addr = get(0, "addr")? as u64;
        let per_feature = [
            get(1, "mean_read_size")?,
            get(2, "mean_write_size")?,
            get(3, "mean_read_iat")?,
            get(4, "mean_write_iat")?,
            get(5, "misalignment_per_read")?,
            get(6, "misalignment_per_write")?,
        ];
        let mean = get(7, "mean")?;
        let max = get(8, "max")?;
        let wmean = get(9, "wmean")?;
        let block_count = get(10, "block_count")? as u64;
        let rate = get(11, "rate")?;
        let runtime_ns = get(12, "runtime_ns")? as u64;
        Ok(CheckpointRow {
            addr,
            error: ErrorDict {
                per_feature,
                mean,
                max,
                wmean,
            },
            block_count,
            rate,
            runtime_ns,
        })
    }
}

/// An append-only CSV ledger of removed addresses.
pub struct CheckpointLog {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
}

impl CheckpointLog {
    /// Creates a new log at `path`, failing if one already exists (use
    /// [`CheckpointLog::resume`] to continue an existing run).
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .io_context(&path, "create checkpoint log")?;
        let mut writer = csv::WriterBuilder::new().from_writer(BufWriter::new(file));
        writer
            .write_record(HEADER)
            .map_err(|source| csv_error(&path, source))?;
        writer.flush().io_context(&path, "flush checkpoint log header")?;
        Ok(Self { path, writer })
    }

    pub fn append(&mut self, row: CheckpointRow) -> Result<()> {
        self.writer
            .write_record(row.to_record())
            .map_err(|source| csv_error(&self.path, source))?;
        self.writer
            .flush()
            .io_context(&self.path, "flush checkpoint log row")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every row already logged at `path`, in append order.
    pub fn load(path: impl AsRef<Path>) -> Result<Vec<CheckpointRow>> {
        let path = path.as_ref();
        let file = File::open(path).io_context(path, "open checkpoint log")?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(std::io::BufReader::new(file));
        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|source| csv_error(path, source))?;
            rows.push(CheckpointRow::from_record(&record, path)?);
        }
        Ok(rows)
    }

    /// Reopens an existing log in append mode, without touching its
    /// contents. The header is assumed already present.
    fn reopen_for_append(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .io_context(&path, "reopen checkpoint log")?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        Ok(Self { path, writer })
    }
}

/// Replays every row logged at `path` against `bafm`, removing each
/// address and folding its `FeatureDelta` into `stats` in the logged
/// order, then asserts the final error dict matches the last logged row
/// exactly. Returns the replayed stats and a log reopened for append.
pub fn resume(
    path: impl AsRef<Path>,
    bafm: &mut Bafm,
    mut stats: WorkloadStats,
    full_features: &WorkloadFeatures,
    block_size_byte: u64,
) -> Result<(WorkloadStats, CheckpointLog)> {
    let path = path.as_ref().to_path_buf();
    let rows = CheckpointLog::load(&path)?;

    for row in &rows {
        let entry = bafm.get(row.addr).copied().ok_or_else(|| Error::ResumeCorrupt {
            path: path.clone(),
            message: format!("logged addr {} is not present in the feature map", row.addr),
        })?;
        stats = blkfeature_feature::apply_removal(&stats, &entry, block_size_byte)?;
        bafm.remove(row.addr)?;
    }

    if let Some(last) = rows.last() {
        let recomputed = error_dict(full_features, &stats.feature_dict());
        if recomputed != last.error {
            return Err(Error::ResumeCorrupt {
                path: path.clone(),
                message: "recomputed error dict does not match the last logged row".to_string(),
            });
        }
    }

    let log = CheckpointLog::reopen_for_append(path)?;
    Ok((stats, log))
}

fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::InputFormat {
        kind: "csv",
        path: path.to_path_buf(),
        message: source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blkfeature_feature::ErrorMetric;

    fn sample_error() -> ErrorDict {
        ErrorDict {
            per_feature: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            mean: 3.5,
            max: 6.0,
            wmean: 4.0,
        }
    }

    #[test]
    fn append_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = CheckpointLog::create(&path).unwrap();
        log.append(CheckpointRow {
            addr: 7,
            error: sample_error(),
            block_count: 99,
            rate: 0.5,
            runtime_ns: 1234,
        })
        .unwrap();

        let rows = CheckpointLog::load(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].addr, 7);
        assert_eq!(rows[0].error, sample_error());
        assert_eq!(rows[0].block_count, 99);
    }

    #[test]
    fn create_refuses_to_overwrite_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        CheckpointLog::create(&path).unwrap();
        assert!(CheckpointLog::create(&path).is_err());
    }

    #[test]
    fn resume_detects_mismatched_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.csv");
        {
            let mut f = File::create(&cache_path).unwrap();
            writeln!(f, "req_index,iat_us,cache_addr,write,front_misalign_byte,rear_misalign_byte").unwrap();
            writeln!(f, "0,0,5,false,0,0").unwrap();
        }
        let mut bafm = Bafm::build_from_cache_trace(&cache_path).unwrap();

        let log_path = dir.path().join("log.csv");
        let mut log = CheckpointLog::create(&log_path).unwrap();
        log.append(CheckpointRow {
            addr: 5,
            error: sample_error(),
            block_count: 0,
            rate: 0.0,
            runtime_ns: 0,
        })
        .unwrap();
        drop(log);

        let stats = WorkloadStats::new();
        let full_features = stats.feature_dict();
        let result = resume(&log_path, &mut bafm, stats, &full_features, 4096);
        assert!(result.is_err());
        let _ = ErrorMetric::Mean;
    }
}
