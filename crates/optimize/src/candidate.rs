//! Candidate enumeration and the region dry-run: computing the
//! `WorkloadStats` a candidate removal *would* produce without mutating
//! the real `Bafm`.

use blkfeature_bafm::{Bafm, BafmEntry};
use blkfeature_core::{Error, Result};
use blkfeature_feature::apply_removal;
use blkfeature_trace::WorkloadStats;
use std::collections::HashMap;

/// One removal candidate: a `--bits`-wide address region and the
/// addresses within it that currently exist in the `Bafm`, in ascending
/// order. With `bits == 0` every region holds exactly one address, so a
/// region candidate and a single-address candidate are the same thing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    pub region_key: u64,
    pub addrs: Vec<u64>,
}

/// Groups every address currently in `bafm` into regions of `2^bits`
/// addresses (`addr >> bits`), preserving the order in which each region
/// is first encountered while iterating `bafm`'s addresses. That
/// iteration order is the map's insertion order (trace first-appearance
/// order), which is what makes the greedy loop's tie-breaking
/// deterministic under "first argmin in iteration order".
pub fn group_into_regions(bafm: &Bafm, bits: u32) -> Vec<RegionPlan> {
    let mut order: Vec<u64> = Vec::new();
    let mut by_region: HashMap<u64, Vec<u64>> = HashMap::new();

    for addr in bafm.addrs() {
        let region_key = addr >> bits;
        let bucket = by_region.entry(region_key).or_insert_with(|| {
            order.push(region_key);
            Vec::new()
        });
        bucket.push(addr);
    }

    order
        .into_iter()
        .map(|region_key| {
            let mut addrs = by_region.remove(&region_key).unwrap_or_default();
            addrs.sort_unstable();
            RegionPlan { region_key, addrs }
        })
        .collect()
}

/// A small overlay over `bafm`'s entries, used to dry-run a sequence of
/// removals without touching the real map. Reads fall through to `bafm`
/// on first touch; every entry actually consulted is cloned in once and
/// mutated locally from then on, so cost is proportional to the number
/// of addresses the simulated removals actually touch, not `|bafm|`.
struct LocalOverlay<'a> {
    bafm: &'a Bafm,
    touched: HashMap<u64, BafmEntry>,
}

impl<'a> LocalOverlay<'a> {
    fn new(bafm: &'a Bafm) -> Self {
        Self {
            bafm,
            touched: HashMap::new(),
        }
    }

    /// Ensures `addr`'s entry (if it exists at all) is present in the
    /// overlay, then returns a mutable handle to it.
    fn ensure_mut(&mut self, addr: u64) -> Option<&mut BafmEntry> {
        if !self.touched.contains_key(&addr) {
            let entry = *self.bafm.get(addr)?;
            self.touched.insert(addr, entry);
        }
        self.touched.get_mut(&addr)
    }

    /// Removes `addr` from the overlay, returning its entry as it stood
    /// at the moment of removal (reflecting any prior migrations this
    /// overlay applied to it).
    fn take(&mut self, addr: u64) -> Option<BafmEntry> {
        match self.touched.remove(&addr) {
            Some(entry) => Some(entry),
            None => self.bafm.get(addr).copied(),
        }
    }
}

/// Computes the `WorkloadStats` that would result from removing every
/// address in `addrs_ascending` from `bafm`, applying the same
/// neighbor-migration algorithm `Bafm::remove` uses, in ascending address
/// order, without mutating `bafm` itself.
///
/// `addrs_ascending` need not be contiguous or identical to one `bits`
/// region's membership; callers pass a region's address list here.
pub fn simulate_region_removal(
    bafm: &Bafm,
    stats: &WorkloadStats,
    block_size_byte: u64,
    addrs_ascending: &[u64],
) -> Result<WorkloadStats> {
    let mut overlay = LocalOverlay::new(bafm);
    let mut stats = *stats;

    for &addr in addrs_ascending {
        let entry = overlay.take(addr).ok_or_else(|| Error::NotFound {
            addr,
            map_size: bafm.len(),
        })?;
        stats = apply_removal(&stats, &entry, block_size_byte)?;

        if let Some(left_addr) = addr.checked_sub(1) {
            if let Some(left) = overlay.ensure_mut(left_addr) {
                left.migrate_as_right_neighbor_removed()?;
            }
        }
        if let Some(right) = overlay.ensure_mut(addr + 1) {
            right.migrate_as_left_neighbor_removed()?;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_bafm(rows: &[(u64, i64, u64, bool, u32, u32)]) -> Bafm {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "req_index,iat_us,cache_addr,write,front_misalign_byte,rear_misalign_byte").unwrap();
        for (req_index, iat_us, cache_addr, write, front, rear) in rows {
            writeln!(f, "{req_index},{iat_us},{cache_addr},{write},{front},{rear}").unwrap();
        }
        drop(f);
        Bafm::build_from_cache_trace(&path).unwrap()
    }

    #[test]
    fn grouping_respects_bit_width_and_first_seen_order() {
        let bafm = build_bafm(&[
            (0, 0, 6, false, 0, 0),
            (1, 0, 2, false, 0, 0),
            (2, 0, 3, false, 0, 0),
        ]);
        let regions = group_into_regions(&bafm, 2);
        // addr 6 -> region 1, addr 2 -> region 0, addr 3 -> region 0.
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region_key, 1);
        assert_eq!(regions[0].addrs, vec![6]);
        assert_eq!(regions[1].region_key, 0);
        assert_eq!(regions[1].addrs, vec![2, 3]);
    }

    #[test]
    fn bits_zero_gives_one_address_per_region() {
        let bafm = build_bafm(&[(0, 0, 5, false, 0, 0), (0, 0, 6, false, 0, 0)]);
        let regions = group_into_regions(&bafm, 0);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.addrs.len() == 1));
    }

    #[test]
    fn simulating_a_contiguous_region_removal_matches_sequential_real_removal() {
        // Three contiguous blocks accessed together: 5=LEFT, 6=MID, 7=RIGHT.
        let bafm = build_bafm(&[
            (0, 0, 5, false, 0, 0),
            (0, 0, 6, false, 0, 0),
            (0, 0, 7, false, 0, 0),
        ]);
        let stats = WorkloadStats::new();

        let simulated = simulate_region_removal(&bafm, &stats, 4096, &[5, 6]).unwrap();

        let mut real = bafm.clone();
        let mut real_stats = stats;
        for addr in [5u64, 6] {
            let entry = *real.get(addr).unwrap();
            real_stats = apply_removal(&real_stats, &entry, 4096).unwrap();
            real.remove(addr).unwrap();
        }

        assert_eq!(simulated, real_stats);
    }

    #[test]
    fn simulating_an_absent_address_is_not_found() {
        let bafm = build_bafm(&[(0, 0, 5, false, 0, 0)]);
        let stats = WorkloadStats::new();
        assert!(simulate_region_removal(&bafm, &stats, 4096, &[9]).is_err());
    }
}
