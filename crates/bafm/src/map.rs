//! The block access feature map: one `BafmEntry` per sampled cache address,
//! built by streaming a cache trace, updated in place as blocks are
//! removed, and snapshotted to a fixed-column CSV.

use crate::entry::{BafmEntry, ClassCounters};
use blkfeature_core::errors::IoResultExt;
use blkfeature_core::{Error, Result};
use blkfeature_trace::{classify, CacheTraceReader};
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const HEADER: [&str; 25] = [
    "addr",
    "r_misalign",
    "w_misalign",
    "solo_r",
    "solo_w",
    "solo_r_iat",
    "solo_w_iat",
    "solo_r_misalign_byte",
    "solo_w_misalign_byte",
    "left_r",
    "left_w",
    "left_r_iat",
    "left_w_iat",
    "left_r_misalign_byte",
    "left_w_misalign_byte",
    "right_r",
    "right_w",
    "right_r_iat",
    "right_w_iat",
    "right_r_misalign_byte",
    "right_w_misalign_byte",
    "mid_r",
    "mid_w",
    "mid_r_iat",
    "mid_w_iat",
];

/// The per-block access feature map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bafm {
    entries: IndexMap<u64, BafmEntry>,
}

impl Bafm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.entries.contains_key(&addr)
    }

    pub fn get(&self, addr: u64) -> Option<&BafmEntry> {
        self.entries.get(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &BafmEntry)> {
        self.entries.iter()
    }

    pub fn addrs(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    /// Sum over classes and ops of the request count attributed to `addr`,
    /// or `None` if `addr` is not currently sampled.
    pub fn total_request_count(&self, addr: u64) -> Option<i64> {
        self.entries.get(&addr).map(BafmEntry::total_request_count)
    }

    /// Builds a map from a cache trace, one `req_index` group at a time.
    pub fn build_from_cache_trace(path: impl AsRef<Path>) -> Result<Self> {
        let mut map = Self::new();
        let mut reader = CacheTraceReader::open(path)?;
        while let Some(group) = reader.next_group()? {
            let group_min = group.iter().map(|r| r.cache_addr).min().unwrap();
            let group_max = group.iter().map(|r| r.cache_addr).max().unwrap();
            for row in &group {
                let class = classify(row.cache_addr, group_min, group_max);
                let entry = map.entries.entry(row.cache_addr).or_default();
                entry.update(row, class)?;
            }
        }
        Ok(map)
    }

    /// Removes `addr`, migrating its neighbors' counters so the map still
    /// reflects how every remaining address would classify against a
    /// cache trace with `addr` filtered out. `addr`'s own entry is
    /// discarded without further adjustment; callers needing its
    /// contribution to workload features must read it before calling
    /// this.
    pub fn remove(&mut self, addr: u64) -> Result<()> {
        if !self.entries.contains_key(&addr) {
            return Err(Error::NotFound {
                addr,
                map_size: self.entries.len(),
            });
        }
        if let Some(left_addr) = addr.checked_sub(1) {
            if let Some(left) = self.entries.get_mut(&left_addr) {
                left.migrate_as_right_neighbor_removed()?;
            }
        }
        if let Some(right) = self.entries.get_mut(&(addr + 1)) {
            right.migrate_as_left_neighbor_removed()?;
        }
        self.entries.shift_remove(&addr);
        Ok(())
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).io_context(path, "create bafm snapshot")?;
        let mut writer = csv::WriterBuilder::new().from_writer(BufWriter::new(file));
        writer
            .write_record(HEADER)
            .map_err(|source| csv_error(path, source))?;
        for (addr, entry) in &self.entries {
            writer
                .write_record(entry_record(*addr, entry))
                .map_err(|source| csv_error(path, source))?;
        }
        writer
            .flush()
            .map_err(|source| Error::Io {
                path: path.to_path_buf(),
                operation: "flush bafm snapshot",
                source,
            })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).io_context(path, "open bafm snapshot")?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        let mut map = Self::new();
        for result in reader.records() {
            let record = result.map_err(|source| csv_error(path, source))?;
            let (addr, entry) = parse_entry_record(&record, path)?;
            map.entries.insert(addr, entry);
        }
        Ok(map)
    }
}

fn entry_record(addr: u64, entry: &BafmEntry) -> [String; 25] {
    let class_fields = |c: &ClassCounters, with_byte: bool| -> Vec<String> {
        let mut v = vec![
            c.read_count.to_string(),
            c.write_count.to_string(),
            c.read_iat_sum.to_string(),
            c.write_iat_sum.to_string(),
        ];
        if with_byte {
            v.push(c.read_misalign_byte.to_string());
            v.push(c.write_misalign_byte.to_string());
        }
        v
    };

    let mut out = Vec::with_capacity(25);
    out.push(addr.to_string());
    out.push(entry.read_misalign_edge_count.to_string());
    out.push(entry.write_misalign_edge_count.to_string());
    out.extend(class_fields(&entry.solo, true));
    out.extend(class_fields(&entry.left, true));
    out.extend(class_fields(&entry.right, true));
    out.extend(class_fields(&entry.mid, false));
    out.try_into()
        .unwrap_or_else(|v: Vec<String>| panic!("expected 25 fields, got {}", v.len()))
}

fn parse_entry_record(record: &csv::StringRecord, path: &Path) -> Result<(u64, BafmEntry)> {
    let field = |idx: usize, name: &'static str| -> Result<i64> {
        record
            .get(idx)
            .ok_or_else(|| Error::InputFormat {
                kind: "csv",
                path: path.to_path_buf(),
                message: format!("missing column {name}"),
            })?
            .parse()
            .map_err(|_| Error::InputRange {
                field: name,
                message: format!("could not parse {name}"),
            })
    };
    let addr = field(0, "addr")? as u64;
    let mut entry = BafmEntry::default();
    entry.read_misalign_edge_count = field(1, "r_misalign")?;
    entry.write_misalign_edge_count = field(2, "w_misalign")?;

    entry.solo.read_count = field(3, "solo_r")?;
    entry.solo.write_count = field(4, "solo_w")?;
    entry.solo.read_iat_sum = field(5, "solo_r_iat")?;
    entry.solo.write_iat_sum = field(6, "solo_w_iat")?;
    entry.solo.read_misalign_byte = field(7, "solo_r_misalign_byte")?;
    entry.solo.write_misalign_byte = field(8, "solo_w_misalign_byte")?;

    entry.left.read_count = field(9, "left_r")?;
    entry.left.write_count = field(10, "left_w")?;
    entry.left.read_iat_sum = field(11, "left_r_iat")?;
    entry.left.write_iat_sum = field(12, "left_w_iat")?;
    entry.left.read_misalign_byte = field(13, "left_r_misalign_byte")?;
    entry.left.write_misalign_byte = field(14, "left_w_misalign_byte")?;

    entry.right.read_count = field(15, "right_r")?;
    entry.right.write_count = field(16, "right_w")?;
    entry.right.read_iat_sum = field(17, "right_r_iat")?;
    entry.right.write_iat_sum = field(18, "right_w_iat")?;
    entry.right.read_misalign_byte = field(19, "right_r_misalign_byte")?;
    entry.right.write_misalign_byte = field(20, "right_w_misalign_byte")?;

    entry.mid.read_count = field(21, "mid_r")?;
    entry.mid.write_count = field(22, "mid_w")?;
    entry.mid.read_iat_sum = field(23, "mid_r_iat")?;
    entry.mid.write_iat_sum = field(24, "mid_w_iat")?;

    Ok((addr, entry))
}

fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::InputFormat {
        kind: "csv",
        path: path.to_path_buf(),
        message: source.to_string(),
    }
}
