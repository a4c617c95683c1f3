//! Per-address feature record: counts, IAT sums, and misalignment byte
//! totals split by positional class and read/write.

use blkfeature_core::numeric::checked_add;
use blkfeature_core::Result;
use blkfeature_trace::{CacheRequest, PositionalClass};
use serde::{Deserialize, Serialize};

/// Request count, IAT sum, and misalignment byte sum for one positional
/// class, split by read/write. A strictly interior (MID) access is never
/// misaligned, so its misalign byte fields stay at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounters {
    pub read_count: i64,
    pub write_count: i64,
    pub read_iat_sum: i64,
    pub write_iat_sum: i64,
    pub read_misalign_byte: i64,
    pub write_misalign_byte: i64,
}

impl ClassCounters {
    fn add_request(
        &mut self,
        write: bool,
        iat_us: i64,
        misalign_byte: i64,
        track_misalign_byte: bool,
        context: &'static str,
    ) -> Result<()> {
        if write {
            self.write_count = checked_add(self.write_count, 1, context)?;
            self.write_iat_sum = checked_add(self.write_iat_sum, iat_us, context)?;
            if track_misalign_byte {
                self.write_misalign_byte =
                    checked_add(self.write_misalign_byte, misalign_byte, context)?;
            }
        } else {
            self.read_count = checked_add(self.read_count, 1, context)?;
            self.read_iat_sum = checked_add(self.read_iat_sum, iat_us, context)?;
            if track_misalign_byte {
                self.read_misalign_byte =
                    checked_add(self.read_misalign_byte, misalign_byte, context)?;
            }
        }
        Ok(())
    }

    fn merge_from(&mut self, other: &ClassCounters, context: &'static str) -> Result<()> {
        self.read_count = checked_add(self.read_count, other.read_count, context)?;
        self.write_count = checked_add(self.write_count, other.write_count, context)?;
        self.read_iat_sum = checked_add(self.read_iat_sum, other.read_iat_sum, context)?;
        self.write_iat_sum = checked_add(self.write_iat_sum, other.write_iat_sum, context)?;
        self.read_misalign_byte =
            checked_add(self.read_misalign_byte, other.read_misalign_byte, context)?;
        self.write_misalign_byte =
            checked_add(self.write_misalign_byte, other.write_misalign_byte, context)?;
        Ok(())
    }

    fn clear(&mut self) {
        *self = ClassCounters::default();
    }
}

/// The full feature record kept for one cache block address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BafmEntry {
    pub read_misalign_edge_count: i64,
    pub write_misalign_edge_count: i64,
    pub solo: ClassCounters,
    pub left: ClassCounters,
    pub right: ClassCounters,
    pub mid: ClassCounters,
}

impl BafmEntry {
    /// Folds one cache request into this entry's counters.
    pub fn update(&mut self, req: &CacheRequest, class: PositionalClass) -> Result<()> {
        let misalign_count =
            (req.front_misalign_byte > 0) as i64 + (req.rear_misalign_byte > 0) as i64;
        let misalign_byte = (req.front_misalign_byte + req.rear_misalign_byte) as i64;

        if req.write {
            self.write_misalign_edge_count = checked_add(
                self.write_misalign_edge_count,
                misalign_count,
                "bafm_entry.write_misalign_edge_count",
            )?;
        } else {
            self.read_misalign_edge_count = checked_add(
                self.read_misalign_edge_count,
                misalign_count,
                "bafm_entry.read_misalign_edge_count",
            )?;
        }

        let track_misalign_byte = class != PositionalClass::Mid;
        let counters = self.counters_mut(class);
        counters.add_request(
            req.write,
            req.iat_us,
            misalign_byte,
            track_misalign_byte,
            "bafm_entry.update",
        )
    }

    /// Sum of read and write request counts across all four positional
    /// classes, i.e. the number of distinct cache accesses this address has
    /// ever contributed, regardless of role.
    pub fn total_request_count(&self) -> i64 {
        [&self.solo, &self.left, &self.right, &self.mid]
            .iter()
            .map(|c| c.read_count + c.write_count)
            .sum()
    }

    pub fn counters(&self, class: PositionalClass) -> &ClassCounters {
        match class {
            PositionalClass::Solo => &self.solo,
            PositionalClass::Left => &self.left,
            PositionalClass::Right => &self.right,
            PositionalClass::Mid => &self.mid,
        }
    }

    fn counters_mut(&mut self, class: PositionalClass) -> &mut ClassCounters {
        match class {
            PositionalClass::Solo => &mut self.solo,
            PositionalClass::Left => &mut self.left,
            PositionalClass::Right => &mut self.right,
            PositionalClass::Mid => &mut self.mid,
        }
    }

    /// Migrates this entry's LEFT/MID counters onto RIGHT/SOLO. Call this
    /// on the entry one address below the one just removed: every request
    /// where this address used to be MID now has it as the rightmost
    /// surviving block, and every request where it used to be LEFT now
    /// touches it alone.
    pub fn migrate_as_right_neighbor_removed(&mut self) -> Result<()> {
        self.right.merge_from(&self.mid, "bafm_entry.migrate_right.mid_to_right")?;
        self.solo.merge_from(&self.left, "bafm_entry.migrate_right.left_to_solo")?;
        self.left.clear();
        self.mid.clear();
        Ok(())
    }

    /// Migrates this entry's RIGHT/MID counters onto LEFT/SOLO. Call this
    /// on the entry one address above the one just removed.
    pub fn migrate_as_left_neighbor_removed(&mut self) -> Result<()> {
        self.left.merge_from(&self.mid, "bafm_entry.migrate_left.mid_to_left")?;
        self.solo.merge_from(&self.right, "bafm_entry.migrate_left.right_to_solo")?;
        self.right.clear();
        self.mid.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(write: bool, front: u32, rear: u32) -> CacheRequest {
        CacheRequest {
            req_index: 0,
            iat_us: 10,
            cache_addr: 0,
            write,
            front_misalign_byte: front,
            rear_misalign_byte: rear,
        }
    }

    #[test]
    fn total_request_count_sums_every_class_and_op() {
        let mut entry = BafmEntry::default();
        entry.solo.read_count = 2;
        entry.left.write_count = 1;
        entry.right.read_count = 3;
        entry.mid.write_count = 4;
        assert_eq!(entry.total_request_count(), 10);
    }

    #[test]
    fn mid_never_tracks_misalign_byte() {
        let mut entry = BafmEntry::default();
        entry.update(&req(false, 0, 0), PositionalClass::Mid).unwrap();
        assert_eq!(entry.mid.read_count, 1);
        assert_eq!(entry.mid.read_misalign_byte, 0);
    }

    #[test]
    fn solo_accumulates_both_edges() {
        let mut entry = BafmEntry::default();
        entry.update(&req(true, 100, 50), PositionalClass::Solo).unwrap();
        assert_eq!(entry.solo.write_misalign_byte, 150);
        assert_eq!(entry.write_misalign_edge_count, 2);
    }

    #[test]
    fn right_neighbor_removal_migrates_mid_to_right_and_left_to_solo() {
        let mut entry = BafmEntry::default();
        entry.mid.read_count = 3;
        entry.mid.read_iat_sum = 30;
        entry.left.read_count = 2;
        entry.left.read_iat_sum = 20;
        entry.left.read_misalign_byte = 5;

        entry.migrate_as_right_neighbor_removed().unwrap();

        assert_eq!(entry.right.read_count, 3);
        assert_eq!(entry.right.read_iat_sum, 30);
        assert_eq!(entry.solo.read_count, 2);
        assert_eq!(entry.solo.read_iat_sum, 20);
        assert_eq!(entry.solo.read_misalign_byte, 5);
        assert_eq!(entry.left, ClassCounters::default());
        assert_eq!(entry.mid, ClassCounters::default());
    }

    #[test]
    fn left_neighbor_removal_migrates_mid_to_left_and_right_to_solo() {
        let mut entry = BafmEntry::default();
        entry.mid.write_count = 4;
        entry.right.write_count = 1;

        entry.migrate_as_left_neighbor_removed().unwrap();

        assert_eq!(entry.left.write_count, 4);
        assert_eq!(entry.solo.write_count, 1);
        assert_eq!(entry.right, ClassCounters::default());
        assert_eq!(entry.mid, ClassCounters::default());
    }
}
