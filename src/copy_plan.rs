//! Copy plans: how a linear buffer of palette indices is scattered into
//! the output layout.
//!
//! The tiled layout cuts the frame into square map tiles. When the frame
//! is not a whole number of tiles wide (or high), the missing padding is
//! split between the first and the last tile of that axis, so the image
//! ends up centred on the tile grid:
//!
//! ```text
//!   width 200, tile 128 -> 2 columns, 56 px of padding
//!   ┌────────────┬────────────┐
//!   │ 28 │  100  │  100  │ 28 │   columns are 100 px wide each
//!   └────────────┴────────────┘
//! ```
//!
//! Tiles are emitted row-major, each tile densely packed row by row.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Copy `len` bytes from `src_offset` in the linear buffer to
/// `dst_offset` in the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct CopyRange {
    pub src_offset: usize,
    pub dst_offset: usize,
    pub len: usize,
}

/// Placement of one tile: its rectangle in the source frame and where its
/// packed bytes start in the output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub dst_offset: usize,
}

impl Tile {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPlan {
    ranges: Vec<CopyRange>,
    tiles: Vec<Tile>,
    src_len: usize,
    dst_len: usize,
}

impl CopyPlan {
    /// Output layout equals the linear layout.
    pub fn identity(width: usize, height: usize) -> Result<Self> {
        check_size(width, height)?;
        let area = width * height;
        Ok(Self {
            ranges: vec![CopyRange {
                src_offset: 0,
                dst_offset: 0,
                len: area,
            }],
            tiles: vec![Tile {
                x: 0,
                y: 0,
                width,
                height,
                dst_offset: 0,
            }],
            src_len: area,
            dst_len: area,
        })
    }

    pub fn tiled(width: usize, height: usize, tile_size: usize) -> Result<Self> {
        check_size(width, height)?;
        if tile_size == 0 {
            return Err(PipelineError::InvalidCopyPlan("tile size must be at least 1".to_string()));
        }
        if width % 2 != 0 {
            return Err(PipelineError::InvalidCopyPlan(format!("odd width {} is not supported", width)));
        }
        if height % 2 != 0 {
            return Err(PipelineError::InvalidCopyPlan(format!("odd height {} is not supported", height)));
        }

        let columns = spans(width, tile_size);
        let rows = spans(height, tile_size);

        let mut ranges = Vec::with_capacity(height * columns.len());
        let mut tiles = Vec::with_capacity(columns.len() * rows.len());
        let mut dst = 0usize;

        for &(y, tile_h) in &rows {
            for &(x, tile_w) in &columns {
                tiles.push(Tile {
                    x,
                    y,
                    width: tile_w,
                    height: tile_h,
                    dst_offset: dst,
                });
                for row in 0..tile_h {
                    ranges.push(CopyRange {
                        src_offset: (y + row) * width + x,
                        dst_offset: dst,
                        len: tile_w,
                    });
                    dst += tile_w;
                }
            }
        }

        let area = width * height;
        debug_assert_eq!(dst, area);
        Ok(Self {
            ranges,
            tiles,
            src_len: area,
            dst_len: area,
        })
    }

    /// Builds a plan from arbitrary ranges. Every range must lie inside
    /// both buffers and no two destination ranges may overlap; source
    /// ranges may overlap freely.
    pub fn from_ranges(ranges: Vec<CopyRange>, src_len: usize, dst_len: usize) -> Result<Self> {
        for r in &ranges {
            let src_end = r.src_offset.checked_add(r.len);
            let dst_end = r.dst_offset.checked_add(r.len);
            if src_end.map_or(true, |end| end > src_len) {
                return Err(PipelineError::InvalidCopyPlan(format!(
                    "source range {}+{} exceeds {}",
                    r.src_offset, r.len, src_len
                )));
            }
            if dst_end.map_or(true, |end| end > dst_len) {
                return Err(PipelineError::InvalidCopyPlan(format!(
                    "destination range {}+{} exceeds {}",
                    r.dst_offset, r.len, dst_len
                )));
            }
        }

        let mut by_dst: Vec<&CopyRange> = ranges.iter().filter(|r| r.len > 0).collect();
        by_dst.sort_by_key(|r| r.dst_offset);
        for pair in by_dst.windows(2) {
            if pair[0].dst_offset + pair[0].len > pair[1].dst_offset {
                return Err(PipelineError::InvalidCopyPlan(format!(
                    "destination ranges at {} and {} overlap",
                    pair[0].dst_offset, pair[1].dst_offset
                )));
            }
        }

        Ok(Self {
            ranges,
            tiles: Vec::new(),
            src_len,
            dst_len,
        })
    }

    pub fn ranges(&self) -> &[CopyRange] {
        &self.ranges
    }

    /// Empty for plans built with [`from_ranges`](Self::from_ranges).
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn src_len(&self) -> usize {
        self.src_len
    }

    pub fn dst_len(&self) -> usize {
        self.dst_len
    }

    /// Scatters `src` into `dst` according to the plan.
    pub fn apply(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        if src.len() < self.src_len || dst.len() < self.dst_len {
            return Err(PipelineError::InvalidCopyPlan(format!(
                "buffers {}/{} smaller than plan {}/{}",
                src.len(),
                dst.len(),
                self.src_len,
                self.dst_len
            )));
        }
        for r in &self.ranges {
            dst[r.dst_offset..r.dst_offset + r.len]
                .copy_from_slice(&src[r.src_offset..r.src_offset + r.len]);
        }
        Ok(())
    }
}

fn check_size(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidCopyPlan(format!(
            "empty frame {}x{}",
            width, height
        )));
    }
    Ok(())
}

/// `(start, len)` of each tile along one axis.
fn spans(extent: usize, tile: usize) -> Vec<(usize, usize)> {
    let count = extent.div_ceil(tile);
    let margin = count * tile - extent;
    let lead = margin / 2;
    let trail = margin - lead;

    let mut out = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let mut len = tile;
        if i == 0 {
            len -= lead;
        }
        if i == count - 1 {
            len -= trail;
        }
        out.push((start, len));
        start += len;
    }
    out
}
