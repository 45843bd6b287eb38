//! Maps sector offsets onto a fixed square pixel grid.

use std::collections::TryReserveError;
use std::io;

use crate::model::BadBlockModel;

/// Side of the square visualization, in pixels.
pub const GRID_SIZE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Palette {
    Unscanned = 0,
    ScannedGood = 1,
    BadSector = 2,
    BadRegion = 3,
}

impl Palette {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Palette::Unscanned => [0, 0, 0],
            Palette::ScannedGood => [255, 255, 255],
            Palette::BadSector => [255, 0, 0],
            Palette::BadRegion => [100, 100, 100],
        }
    }
}

/// Destination for rendered pixels.
pub trait ImageSink {
    fn width(&self) -> u32;
    fn set_pixel(&mut self, x: u32, y: u32, color: Palette);
    /// Encode and persist whatever has been drawn.
    fn flush(&mut self) -> io::Result<()>;
}

/// In-memory indexed grid of `width * width` pixels.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    width: u32,
    pixels: Vec<Palette>,
}

impl PixelGrid {
    /// Allocate a grid filled with [`Palette::Unscanned`], reporting allocation failure.
    pub fn try_new(width: u32) -> Result<Self, TryReserveError> {
        let len = width as usize * width as usize;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len)?;
        pixels.resize(len, Palette::Unscanned);
        Ok(Self { width, pixels })
    }

    pub fn get(&self, x: u32, y: u32) -> Palette {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn pixels(&self) -> &[Palette] {
        &self.pixels
    }
}

impl ImageSink for PixelGrid {
    fn width(&self) -> u32 {
        self.width
    }

    fn set_pixel(&mut self, x: u32, y: u32, color: Palette) {
        let idx = y as usize * self.width as usize + x as usize;
        if let Some(p) = self.pixels.get_mut(idx) {
            *p = color;
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Paints scan progress and defects onto a sink.
pub struct VisualizationRenderer<'a> {
    model: &'a BadBlockModel,
    total_sectors: u64,
    done_sectors: u64,
}

impl<'a> VisualizationRenderer<'a> {
    pub fn new(model: &'a BadBlockModel, total_sectors: u64, done_sectors: u64) -> Self {
        Self { model, total_sectors, done_sectors: done_sectors.min(total_sectors) }
    }

    /// Pixel index of `sector` on a grid of `cells` pixels, i.e.
    /// `floor(sector / (total_sectors / cells))` in exact integer arithmetic.
    fn pixel_of(&self, sector: u64, cells: u64) -> u64 {
        ((sector as u128 * cells as u128) / self.total_sectors as u128) as u64
    }

    /// Pixels covering any sector of `[low, high)`: at least one, and every
    /// pixel a sector spills into when sectors are wider than pixels.
    fn covering(&self, low: u64, high: u64, cells: u64) -> std::ops::Range<u64> {
        let start = self.pixel_of(low, cells);
        let total = self.total_sectors as u128;
        let end = ((high as u128 * cells as u128 + total - 1) / total) as u64;
        start..end.max(start + 1)
    }

    /// Layers are drawn in increasing priority: scanned area, spans, then
    /// individual bad sectors so they stay visible inside spans.
    pub fn paint<S: ImageSink + ?Sized>(&self, sink: &mut S) {
        if self.total_sectors == 0 {
            return;
        }
        let width = sink.width() as u64;
        let cells = width * width;
        let put = |sink: &mut S, idx: u64, color: Palette| {
            if idx < cells {
                sink.set_pixel((idx % width) as u32, (idx / width) as u32, color);
            }
        };

        for idx in 0..self.pixel_of(self.done_sectors, cells) {
            put(sink, idx, Palette::ScannedGood);
        }

        for (&low, &high) in &self.model.spans {
            if high <= low || low >= self.total_sectors {
                continue;
            }
            for idx in self.covering(low, high.min(self.total_sectors), cells) {
                put(sink, idx, Palette::BadRegion);
            }
        }

        for &bad in &self.model.bads {
            if bad < self.total_sectors {
                for idx in self.covering(bad, bad + 1, cells) {
                    put(sink, idx, Palette::BadSector);
                }
            }
        }
    }

    /// One bad sector index per line.
    pub fn bad_sector_lines(&self) -> impl Iterator<Item = String> + 'a {
        self.model.bads.iter().map(|b| b.to_string())
    }

    /// One `low high` pair per span, in sectors.
    pub fn span_lines(&self) -> impl Iterator<Item = String> + 'a {
        self.model.spans.iter().map(|(lo, hi)| format!("{} {}", lo, hi))
    }
}
