//! Sequential bad-sector scanning with span aggregation and a PNG defect map.
//!
//! [`scanner::DeviceScanner`] reads a device one sector at a time. Failing
//! sectors go to [`model::SpanAggregator`], which decides where reading
//! resumes, and [`artifacts::ArtifactWriter`] periodically renders the
//! accumulated [`model::BadBlockModel`] through [`render::VisualizationRenderer`].

pub mod artifacts;
pub mod device;
pub mod error;
pub mod logging;
pub mod model;
pub mod render;
pub mod report;
pub mod scanner;


/// Bytes per sector. Fixed; every offset in this crate is counted in these.
pub const SECTOR_SIZE: u64 = 512;

/// Bytes per `-s` unit on the command line.
pub const MIB: u64 = 1024 * 1024;

pub use artifacts::{artifact_stem, ArtifactPaths, ArtifactWriter};
pub use device::{open_for_scan, BlockDevice, DeviceInfo, OsDeviceInfo, SectorDevice};
pub use error::{Result, ScanError};
pub use logging::Logger;
pub use model::{BadBlockModel, SpanAggregator};
pub use render::{ImageSink, Palette, PixelGrid, VisualizationRenderer, GRID_SIZE};
pub use report::{ScanOutcome, ScanStatus};
pub use scanner::{DeviceScanner, ScanConfig, SnapshotSink};
