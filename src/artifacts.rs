//! Persists snapshots as `<stem>.png`, `<stem>.txt` and `<stem>.span`.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};

use crate::logging::Logger;
use crate::model::BadBlockModel;
use crate::render::{ImageSink, Palette, PixelGrid, VisualizationRenderer, GRID_SIZE};
use crate::scanner::SnapshotSink;

const ARTIFACT_PREFIX: &str = "badblocks";

/// `/dev/sdb` becomes `badblocks_dev_sdb`.
pub fn artifact_stem(device: &Path) -> String {
    let mut stem = String::from(ARTIFACT_PREFIX);
    stem.push_str(&device.to_string_lossy().replace('/', "_"));
    stem
}

/// Encodes a [`PixelGrid`] to a PNG file on flush.
pub struct PngSink {
    grid: PixelGrid,
    path: PathBuf,
}

impl PngSink {
    pub fn new(grid: PixelGrid, path: PathBuf) -> Self {
        Self { grid, path }
    }
}

impl ImageSink for PngSink {
    fn width(&self) -> u32 {
        self.grid.width()
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: Palette) {
        self.grid.set_pixel(x, y, color);
    }

    fn flush(&mut self) -> io::Result<()> {
        let w = self.grid.width();
        let img = RgbImage::from_fn(w, w, |x, y| Rgb(self.grid.get(x, y).rgb()));
        img.save_with_format(&self.path, ImageFormat::Png)
            .map_err(|e| io::Error::new(ErrorKind::Other, format!("PNG encode of {} failed: {}", self.path.display(), e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// `None` when the pixel grid could not be allocated or encoded.
    pub image: Option<PathBuf>,
    pub bad_sectors: PathBuf,
    pub spans: PathBuf,
}

/// Writes the artifact set for one device.
pub struct ArtifactWriter {
    device: PathBuf,
    output_dir: PathBuf,
    total_sectors: u64,
    logger: Logger,
}

impl ArtifactWriter {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(device: P, output_dir: Q, total_sectors: u64, logger: Logger) -> Self {
        Self {
            device: device.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            total_sectors,
            logger,
        }
    }

    fn path_with_ext(&self, ext: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", artifact_stem(&self.device), ext))
    }

    pub fn write(&self, model: &BadBlockModel, done_sectors: u64) -> io::Result<ArtifactPaths> {
        let renderer = VisualizationRenderer::new(model, self.total_sectors, done_sectors);
        let png_path = self.path_with_ext("png");

        let image = match PixelGrid::try_new(GRID_SIZE) {
            Ok(grid) => {
                self.logger.info(None, format!("Writing {} ...", png_path.display()));
                let mut sink = PngSink::new(grid, png_path.clone());
                renderer.paint(&mut sink);
                match sink.flush() {
                    Ok(()) => Some(png_path),
                    Err(e) => {
                        self.logger.info(None, format!("Image not written: {}", e));
                        None
                    }
                }
            }
            Err(e) => {
                self.logger.info(None, format!("Not enough memory to allocate image ({}); skipping {}", e, png_path.display()));
                None
            }
        };

        let bad_sectors = self.path_with_ext("txt");
        write_lines(&bad_sectors, renderer.bad_sector_lines())?;
        let spans = self.path_with_ext("span");
        write_lines(&spans, renderer.span_lines())?;
        self.logger.info(None, "Written.");

        Ok(ArtifactPaths { image, bad_sectors, spans })
    }
}

impl SnapshotSink for ArtifactWriter {
    fn snapshot(&mut self, model: &BadBlockModel, done_sectors: u64) {
        if let Err(e) = self.write(model, done_sectors) {
            self.logger.info(None, format!("Snapshot failed: {}", e));
        }
    }
}

fn write_lines<I: Iterator<Item = String>>(path: &Path, lines: I) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}
