use std::path::Path;
use std::time::Duration;

use serde_json::json;

use crate::model::BadBlockModel;
use crate::SECTOR_SIZE;

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// Every sector up to the end of the device was visited.
    Completed,
    /// Repositioning after a bad sector failed; results are partial.
    Aborted { sector: u64, reason: String },
}

impl ScanStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::Aborted { .. } => "aborted",
        }
    }
}

/// Result summary returned by [`crate::scanner::DeviceScanner::scan`].
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub model: BadBlockModel,
    pub status: ScanStatus,
    /// Sector cursor when the loop stopped. May exceed `total_sectors` when
    /// the last span runs past the end of the device.
    pub cursor: u64,
    pub total_sectors: u64,
    pub elapsed: Duration,
}

impl ScanOutcome {
    pub fn total_bytes(&self) -> u64 {
        self.total_sectors * SECTOR_SIZE
    }

    /// Convert to JSON representation using `serde_json`.
    pub fn to_json(&self, device: &Path) -> serde_json::Value {
        let spans: Vec<[u64; 2]> = self.model.spans.iter().map(|(&lo, &hi)| [lo, hi]).collect();
        let mut v = json!({
            "device": device.display().to_string(),
            "sector_size": SECTOR_SIZE,
            "total_bytes": self.total_bytes(),
            "total_sectors": self.total_sectors,
            "sectors_reached": self.cursor.min(self.total_sectors),
            "bad_sectors": self.model.bads.len(),
            "span_sectors": self.model.span_sectors(),
            "spans": spans,
            "status": self.status.label(),
            "elapsed_seconds": self.elapsed.as_secs_f64(),
        });
        if let ScanStatus::Aborted { sector, reason } = &self.status {
            v["aborted_at_sector"] = json!(sector);
            v["abort_reason"] = json!(reason);
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpanAggregator;

    #[test]
    fn json_output() {
        let mut agg = SpanAggregator::new(1024 * 1024).unwrap();
        agg.register_bad(5000);
        let outcome = ScanOutcome {
            model: agg.into_model(),
            status: ScanStatus::Aborted { sector: 6144, reason: "seek failed".into() },
            cursor: 6144,
            total_sectors: 10_000,
            elapsed: Duration::from_secs(3),
        };
        let v = outcome.to_json(Path::new("/dev/sdz"));
        assert_eq!(v["device"], "/dev/sdz");
        assert_eq!(v["total_bytes"], 10_000 * 512);
        assert_eq!(v["bad_sectors"], 1);
        assert_eq!(v["spans"][0][0], 4096);
        assert_eq!(v["spans"][0][1], 6144);
        assert_eq!(v["status"], "aborted");
        assert_eq!(v["aborted_at_sector"], 6144);
    }
}
