//! Aggregate read/write statistics over a stream of block requests.

use crate::block::BlockRequest;
use blkfeature_core::errors::IoResultExt;
use blkfeature_core::numeric::{checked_add, safe_mean};
use blkfeature_core::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Six wide-integer counters tracked per operation (read or write).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpStats {
    pub req_count: i64,
    pub byte_sum: i64,
    pub iat_sum: i64,
    pub misaligned_edge_count: i64,
    pub misaligned_edge_byte: i64,
    pub cache_req_count_with_misalign: i64,
}

impl OpStats {
    fn checked_add_assign(&mut self, other: &OpStats, context: &'static str) -> Result<()> {
        self.req_count = checked_add(self.req_count, other.req_count, context)?;
        self.byte_sum = checked_add(self.byte_sum, other.byte_sum, context)?;
        self.iat_sum = checked_add(self.iat_sum, other.iat_sum, context)?;
        self.misaligned_edge_count =
            checked_add(self.misaligned_edge_count, other.misaligned_edge_count, context)?;
        self.misaligned_edge_byte =
            checked_add(self.misaligned_edge_byte, other.misaligned_edge_byte, context)?;
        self.cache_req_count_with_misalign = checked_add(
            self.cache_req_count_with_misalign,
            other.cache_req_count_with_misalign,
            context,
        )?;
        Ok(())
    }
}

/// The derived feature bundle compared across sample vs. full trace. This
/// is the narrow, stable compared-feature set `ErrorModel` iterates over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadFeatures {
    pub mean_read_size: f64,
    pub mean_write_size: f64,
    pub mean_read_iat: f64,
    pub mean_write_iat: f64,
    pub misalignment_per_read: f64,
    pub misalignment_per_write: f64,
}

impl WorkloadFeatures {
    /// Feature names in the fixed order `ErrorModel` reports errors in.
    pub const NAMES: [&'static str; 6] = [
        "mean_read_size",
        "mean_write_size",
        "mean_read_iat",
        "mean_write_iat",
        "misalignment_per_read",
        "misalignment_per_write",
    ];

    pub fn as_array(&self) -> [f64; 6] {
        [
            self.mean_read_size,
            self.mean_write_size,
            self.mean_read_iat,
            self.mean_write_iat,
            self.misalignment_per_read,
            self.misalignment_per_write,
        ]
    }
}

/// Pure aggregate counters for reads/writes over a stream of block requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStats {
    pub read: OpStats,
    pub write: OpStats,
    prev_ts_us: Option<i64>,
}

impl WorkloadStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one block request into the counters. The first request ever
    /// tracked contributes IAT = 0; subsequent requests contribute
    /// `ts - prev_ts`.
    pub fn track(&mut self, req: &BlockRequest, cache_block_size_byte: u64) -> Result<()> {
        let prev_ts = self.prev_ts_us.unwrap_or(req.ts_us);
        let iat = req.ts_us - prev_ts;
        self.prev_ts_us = Some(req.ts_us);

        let front = req.front_misalign_byte(cache_block_size_byte);
        let rear = req.rear_misalign_byte(cache_block_size_byte);
        let single_block = req.cache_block_span(cache_block_size_byte) == 1;

        let misaligned_edge_count = (front > 0) as i64 + (rear > 0) as i64;
        let misaligned_edge_byte = (front + rear) as i64;
        let cache_req_count_with_misalign = if single_block {
            (misaligned_edge_count > 0) as i64
        } else {
            (front > 0) as i64 + (rear > 0) as i64
        };

        let op = if req.write {
            &mut self.write
        } else {
            &mut self.read
        };
        op.req_count = checked_add(op.req_count, 1, "workload_stats.req_count")?;
        op.byte_sum = checked_add(op.byte_sum, req.size_byte as i64, "workload_stats.byte_sum")?;
        op.iat_sum = checked_add(op.iat_sum, iat, "workload_stats.iat_sum")?;
        op.misaligned_edge_count = checked_add(
            op.misaligned_edge_count,
            misaligned_edge_count,
            "workload_stats.misaligned_edge_count",
        )?;
        op.misaligned_edge_byte = checked_add(
            op.misaligned_edge_byte,
            misaligned_edge_byte,
            "workload_stats.misaligned_edge_byte",
        )?;
        op.cache_req_count_with_misalign = checked_add(
            op.cache_req_count_with_misalign,
            cache_req_count_with_misalign,
            "workload_stats.cache_req_count_with_misalign",
        )?;
        Ok(())
    }

    /// Returns the derived feature bundle. Undefined means (zero
    /// denominator) return 0.
    pub fn feature_dict(&self) -> WorkloadFeatures {
        WorkloadFeatures {
            mean_read_size: safe_mean(self.read.byte_sum, self.read.req_count),
            mean_write_size: safe_mean(self.write.byte_sum, self.write.req_count),
            mean_read_iat: safe_mean(self.read.iat_sum, self.read.req_count),
            mean_write_iat: safe_mean(self.write.iat_sum, self.write.req_count),
            misalignment_per_read: safe_mean(self.read.misaligned_edge_count, self.read.req_count),
            misalignment_per_write: safe_mean(
                self.write.misaligned_edge_count,
                self.write.req_count,
            ),
        }
    }

    /// Adds `other`'s counters into `self` (used when summing BAFM entries).
    pub fn merge(&mut self, other: &WorkloadStats) -> Result<()> {
        self.read.checked_add_assign(&other.read, "workload_stats.merge.read")?;
        self.write
            .checked_add_assign(&other.write, "workload_stats.merge.write")?;
        Ok(())
    }

    pub fn to_dict(&self) -> WorkloadStatsDict {
        WorkloadStatsDict {
            read: self.read,
            write: self.write,
        }
    }

    pub fn load_dict(dict: WorkloadStatsDict) -> Self {
        WorkloadStats {
            read: dict.read,
            write: dict.write,
            prev_ts_us: None,
        }
    }

    /// Writes this stats snapshot as the integer-only JSON dict form.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).io_context(path, "create workload stats file")?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.to_dict())?;
        Ok(())
    }

    /// Reads a stats snapshot previously written by [`WorkloadStats::write_json`].
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).io_context(path, "open workload stats file")?;
        let dict: WorkloadStatsDict = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self::load_dict(dict))
    }
}

/// The on-disk (de)serialized form of `WorkloadStats`: integers only,
/// floats are never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatsDict {
    pub read: OpStats,
    pub write: OpStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(ts_us: i64, lba: u64, write: bool, size_byte: u32) -> BlockRequest {
        BlockRequest {
            ts_us,
            lba,
            write,
            size_byte,
        }
    }

    #[test]
    fn first_request_has_zero_iat() {
        let mut stats = WorkloadStats::new();
        stats.track(&req(1000, 0, false, 4096), 4096).unwrap();
        assert_eq!(stats.read.iat_sum, 0);
        stats.track(&req(1500, 1, false, 4096), 4096).unwrap();
        assert_eq!(stats.read.iat_sum, 500);
    }

    #[test]
    fn sub_block_misalignment_counts_once_per_request() {
        let mut stats = WorkloadStats::new();
        // lba=1, size=512 => single block, both edges misaligned.
        stats.track(&req(0, 1, false, 512), 4096).unwrap();
        assert_eq!(stats.read.misaligned_edge_count, 2);
        assert_eq!(stats.read.cache_req_count_with_misalign, 1);
    }

    #[test]
    fn multi_block_write_misalignment_counts_per_edge() {
        let mut stats = WorkloadStats::new();
        // lba=1, size=4096 => spans 2 blocks, front misaligned only.
        stats.track(&req(0, 1, true, 4096), 4096).unwrap();
        assert_eq!(stats.write.misaligned_edge_count, 1);
        assert_eq!(stats.write.cache_req_count_with_misalign, 1);
    }

    #[test]
    fn feature_dict_handles_zero_denominator() {
        let stats = WorkloadStats::new();
        let features = stats.feature_dict();
        assert_eq!(features.mean_read_size, 0.0);
        assert_eq!(features.misalignment_per_write, 0.0);
    }

    #[test]
    fn json_round_trip_preserves_integer_counters() {
        let mut stats = WorkloadStats::new();
        stats.track(&req(0, 0, false, 4096), 4096).unwrap();
        stats.track(&req(1000, 1, true, 4096), 4096).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        stats.write_json(&path).unwrap();
        let loaded = WorkloadStats::read_json(&path).unwrap();
        assert_eq!(loaded.to_dict(), stats.to_dict());
    }
}
