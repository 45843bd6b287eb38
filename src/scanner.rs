//! The sequential read / fail / reposition loop.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::device::{SectorBuffer, SectorDevice};
use crate::error::Result;
use crate::logging::Logger;
use crate::model::{BadBlockModel, SpanAggregator};
use crate::report::{ScanOutcome, ScanStatus};
use crate::SECTOR_SIZE;

/// Receives interim renderings while a scan is running.
pub trait SnapshotSink {
    fn snapshot(&mut self, model: &BadBlockModel, done_sectors: u64);
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Width of the alignment grid for spans; 0 scans sector by sector.
    pub min_span_bytes: u64,
    pub report_interval: Duration,
    /// Progress reports between two interim snapshots.
    pub reports_per_snapshot: u32,
    pub direct_io: bool,
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_span_bytes: 0,
            report_interval: Duration::from_secs(60),
            reports_per_snapshot: 10,
            direct_io: false,
            show_progress: true,
        }
    }
}

#[derive(Debug)]
pub struct ScanProgress {
    pub cursor: u64,
    started: Instant,
    last_report: Instant,
    reports_since_snapshot: u32,
}

impl ScanProgress {
    fn start() -> Self {
        let now = Instant::now();
        Self { cursor: 0, started: now, last_report: now, reports_since_snapshot: 0 }
    }

    fn report_due(&mut self, interval: Duration) -> bool {
        if self.last_report.elapsed() >= interval {
            self.last_report = Instant::now();
            true
        } else {
            false
        }
    }

    /// Count one report; true when an interim snapshot is due.
    fn count_report(&mut self, per_snapshot: u32) -> bool {
        self.reports_since_snapshot += 1;
        if self.reports_since_snapshot >= per_snapshot {
            self.reports_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Bytes per second since the scan started, with elapsed time floored to one second.
    pub fn throughput(&self) -> u64 {
        let secs = self.started.elapsed().as_secs().max(1);
        self.cursor.saturating_mul(SECTOR_SIZE) / secs
    }

    pub fn percent_of(&self, total_sectors: u64) -> u64 {
        if total_sectors == 0 {
            return 100;
        }
        (self.cursor.min(total_sectors) as u128 * 100 / total_sectors as u128) as u64
    }
}

pub struct DeviceScanner {
    config: ScanConfig,
    logger: Logger,
}

impl DeviceScanner {
    pub fn new(config: ScanConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn progress_bar(&self, total_sectors: u64) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total_sectors);
        if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sectors ({eta_precise}) {wide_msg}") {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }

    /// Read every sector of `device` once, skipping whatever the aggregator condemns.
    ///
    /// Unreadable sectors are recorded, never returned as errors. The only
    /// early exit is a failed seek after a bad sector, reported through
    /// [`ScanStatus::Aborted`] with the partial model.
    pub fn scan<D, S>(&self, device: &mut D, total_bytes: u64, snapshots: &mut S) -> Result<ScanOutcome>
    where
        D: SectorDevice + ?Sized,
        S: SnapshotSink + ?Sized,
    {
        let total_sectors = total_bytes / SECTOR_SIZE;
        let mut aggregator = SpanAggregator::new(self.config.min_span_bytes)?;
        let mut buffer = SectorBuffer::new(self.config.direct_io);
        let pb = self.progress_bar(total_sectors);
        let mut progress = ScanProgress::start();
        let mut status = ScanStatus::Completed;

        while progress.cursor < total_sectors {
            let full_read = matches!(device.read_block(buffer.as_mut_slice()), Ok(n) if n == buffer.len());
            if full_read {
                progress.cursor += 1;
            } else {
                self.logger.info(Some(&pb), format!("Read error at sector {}", progress.cursor));
                let resume = aggregator.register_bad(progress.cursor);
                progress.cursor = resume;
                // A span may run past the last sector; there is nothing left to seek to.
                if resume < total_sectors {
                    if let Err(e) = device.seek_to(resume * SECTOR_SIZE) {
                        self.logger.info(Some(&pb), format!("Cannot reposition to sector {}: {}. Stopping scan.", resume, e));
                        status = ScanStatus::Aborted { sector: resume, reason: e.to_string() };
                        break;
                    }
                }
            }
            pb.set_position(progress.cursor.min(total_sectors));

            if progress.report_due(self.config.report_interval) {
                self.logger.info(
                    Some(&pb),
                    format!(
                        "Current sector: {} ({}%), speed={} bps",
                        progress.cursor.min(total_sectors),
                        progress.percent_of(total_sectors),
                        progress.throughput()
                    ),
                );
                if progress.count_report(self.config.reports_per_snapshot) {
                    snapshots.snapshot(aggregator.model(), progress.cursor.min(total_sectors));
                }
            }
        }

        match status {
            ScanStatus::Completed => pb.finish_with_message("Scan completed."),
            ScanStatus::Aborted { .. } => pb.abandon_with_message("Scan aborted."),
        }

        Ok(ScanOutcome {
            model: aggregator.into_model(),
            status,
            cursor: progress.cursor,
            total_sectors,
            elapsed: progress.started.elapsed(),
        })
    }
}
