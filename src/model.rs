//! Bad sector bookkeeping and span aggregation.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, ScanError};
use crate::SECTOR_SIZE;

/// Everything a scan has learned about the device so far.
///
/// `spans` maps a span's first sector (inclusive) to its end sector
/// (exclusive). Entries never overlap and never touch: touching spans are
/// merged as they are registered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BadBlockModel {
    pub bads: BTreeSet<u64>,
    pub spans: BTreeMap<u64, u64>,
}

impl BadBlockModel {
    pub fn is_clean(&self) -> bool {
        self.bads.is_empty() && self.spans.is_empty()
    }

    /// Number of sectors covered by all spans.
    pub fn span_sectors(&self) -> u64 {
        self.spans.iter().map(|(lo, hi)| hi - lo).sum()
    }
}

/// Records failing sectors and decides where the scan resumes.
#[derive(Debug)]
pub struct SpanAggregator {
    span_sectors: u64,
    model: BadBlockModel,
}

impl SpanAggregator {
    /// `min_span_bytes == 0` disables spans. Otherwise the span must be a
    /// whole number of sectors.
    pub fn new(min_span_bytes: u64) -> Result<Self> {
        if min_span_bytes % SECTOR_SIZE != 0 {
            return Err(ScanError::InvalidSpan { bytes: min_span_bytes });
        }
        Ok(Self { span_sectors: min_span_bytes / SECTOR_SIZE, model: BadBlockModel::default() })
    }

    pub fn span_sectors(&self) -> u64 {
        self.span_sectors
    }

    pub fn model(&self) -> &BadBlockModel {
        &self.model
    }

    pub fn into_model(self) -> BadBlockModel {
        self.model
    }

    /// Register `bad_sector` and return the sector to resume scanning at.
    ///
    /// With spans enabled the whole aligned cell around `bad_sector` is
    /// condemned and skipped. Sectors must arrive in non-decreasing order:
    /// only the last span is considered for merging.
    pub fn register_bad(&mut self, bad_sector: u64) -> u64 {
        self.model.bads.insert(bad_sector);
        if self.span_sectors == 0 {
            return bad_sector.saturating_add(1);
        }

        let low = (bad_sector / self.span_sectors) * self.span_sectors;
        let high = low.saturating_add(self.span_sectors);

        match self.model.spans.last_entry() {
            Some(mut last) if *last.get() == low => {
                *last.get_mut() = high;
            }
            _ => {
                self.model.spans.insert(low, high);
            }
        }
        high
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn rejects_span_not_sector_aligned() {
        assert!(matches!(SpanAggregator::new(1000), Err(ScanError::InvalidSpan { bytes: 1000 })));
        assert!(SpanAggregator::new(0).is_ok());
        assert!(SpanAggregator::new(4096).is_ok());
    }

    #[test]
    fn registering_twice_is_idempotent() {
        let mut agg = SpanAggregator::new(0).unwrap();
        agg.register_bad(42);
        agg.register_bad(42);
        assert_eq!(agg.model().bads.len(), 1);
    }

    #[test]
    fn zero_span_resumes_at_next_sector() {
        let mut agg = SpanAggregator::new(0).unwrap();
        for b in [0u64, 1, 7, 1_000_000, u64::MAX / 2] {
            assert_eq!(agg.register_bad(b), b + 1);
        }
        assert!(agg.model().spans.is_empty());
    }

    #[test]
    fn resume_is_aligned_and_past_the_bad_sector() {
        let mut agg = SpanAggregator::new(MIB).unwrap();
        let cell = agg.span_sectors();
        assert_eq!(cell, 2048);
        for b in [0u64, 1, 2047, 2048, 5000, 99_999, 123_456_789] {
            let resume = agg.register_bad(b);
            assert_eq!(resume % cell, 0);
            assert!(resume > b);
        }
    }

    #[test]
    fn adjacent_cells_merge() {
        let mut agg = SpanAggregator::new(MIB).unwrap();
        assert_eq!(agg.register_bad(5000), 6144);
        assert_eq!(agg.model().spans, BTreeMap::from([(4096, 6144)]));

        assert_eq!(agg.register_bad(6200), 8192);
        assert_eq!(agg.model().spans, BTreeMap::from([(4096, 8192)]));
        assert_eq!(agg.model().bads.len(), 2);
        assert_eq!(agg.model().span_sectors(), 4096);
    }

    #[test]
    fn gap_between_cells_starts_new_span() {
        let mut agg = SpanAggregator::new(MIB).unwrap();
        agg.register_bad(5000);
        assert_eq!(agg.register_bad(10_000), 10_240);
        assert_eq!(agg.model().spans.len(), 2);
        assert_eq!(agg.model().spans.get(&8192), Some(&10_240));
    }
}
