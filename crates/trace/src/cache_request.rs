//! The cache-trace request and its positional class within a block request.

/// Flattened per-block view of a block request.
///
/// All cache requests sharing the same `req_index` originate from the same
/// block request. `cache_addr` values within a group are contiguous;
/// `front_misalign_byte` is non-zero only on the lowest addr,
/// `rear_misalign_byte` only on the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRequest {
    pub req_index: u64,
    pub iat_us: i64,
    pub cache_addr: u64,
    pub write: bool,
    pub front_misalign_byte: u32,
    pub rear_misalign_byte: u32,
}

/// An address's role within a specific block request, given which of its
/// neighbors survived sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionalClass {
    /// The request touches exactly one surviving cache block.
    Solo,
    /// Lowest of ≥2 surviving contiguous blocks; may carry front-misalign.
    Left,
    /// Highest of ≥2 surviving contiguous blocks; may carry rear-misalign.
    Right,
    /// Strictly interior; never misaligned.
    Mid,
}

/// Classifies one row of a `req_index` group given the minimum and maximum
/// surviving `cache_addr` in that group.
///
/// At ingestion the cache trace already only contains rows for *surviving*
/// (sampled) addresses, so a row's class is fully determined by its address
/// relative to the group's min/max.
pub fn classify(cache_addr: u64, group_min: u64, group_max: u64) -> PositionalClass {
    if group_min == group_max {
        PositionalClass::Solo
    } else if cache_addr == group_min {
        PositionalClass::Left
    } else if cache_addr == group_max {
        PositionalClass::Right
    } else {
        PositionalClass::Mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_solo() {
        assert_eq!(classify(5, 5, 5), PositionalClass::Solo);
    }

    #[test]
    fn classifies_edges_and_middle() {
        assert_eq!(classify(5, 5, 8), PositionalClass::Left);
        assert_eq!(classify(8, 5, 8), PositionalClass::Right);
        assert_eq!(classify(6, 5, 8), PositionalClass::Mid);
        assert_eq!(classify(7, 5, 8), PositionalClass::Mid);
    }
}
