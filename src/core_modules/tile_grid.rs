// THEORY:
// The `TileGrid` is the quantization layer between the source image and the
// output maps. It decides how many grid cells a W x H image produces for a tile
// size T, and which pixel rectangle each cell covers.
//
// Key architectural principles:
// 1.  **Fixed Quantization Law**: each axis yields `floor(dim / T) + 1` cells.
//     This over-allocates by one cell whenever `dim` is an exact multiple of
//     `T`; the extra cell covers a zero-area rectangle and stays at the fill
//     value in the output. The law is kept as-is because the output grid shape
//     is part of the downstream pixel-spacing arithmetic.
// 2.  **Full Enumeration**: every cell of the `cols x rows` grid is enumerated
//     and analyzed, including the boundary row and column, with edge tiles
//     clipped to the image bounds. Every source pixel contributes to exactly
//     one tile.
// 3.  **No Extraction Here**: the grid only does coordinate math. Copying the
//     pixels of a tile out of a channel plane is the `Plane`'s job.

use crate::error::RatioVisionError;

/// Integer grid coordinates of one tile, column `i`, row `j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCell {
    pub i: u32,
    pub j: u32,
}

/// Pixel-space rectangle covered by one tile, already clipped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub x0: u32,
    pub y0: u32,
    pub width: u32,
    pub height: u32,
}

impl TileBounds {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Partitions a source image into a grid of fixed-size tiles.
#[derive(Debug, Clone)]
pub struct TileGrid {
    image_width: u32,
    image_height: u32,
    tile_size: u32,
    cols: u32,
    rows: u32,
}

impl TileGrid {
    /// Builds the grid for an image of `width x height` pixels and tile size
    /// `tile_size`. All three dimensions must be positive.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, RatioVisionError> {
        if tile_size == 0 {
            return Err(RatioVisionError::Configuration(String::from(
                "tile size must be a positive number of pixels",
            )));
        }
        if width == 0 || height == 0 {
            return Err(RatioVisionError::Configuration(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self {
            image_width: width,
            image_height: height,
            tile_size,
            cols: width / tile_size + 1,
            rows: height / tile_size + 1,
        })
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Enumerates every cell of the grid in column-major sweep order: all rows
    /// of column 0, then column 1, and so on. The sweep and the preview hook
    /// both rely on this order; the analysis itself is order-insensitive.
    pub fn cells(&self) -> impl Iterator<Item = TileCell> + '_ {
        (0..self.cols)
            .flat_map(move |i| (0..self.rows).map(move |j| TileCell { i, j }))
    }

    /// Pixel rectangle of `cell`, clipped to the image. Cells in the
    /// over-allocated final row/column clip down to zero area.
    pub fn bounds(&self, cell: TileCell) -> TileBounds {
        let x0 = cell.i * self.tile_size;
        let y0 = cell.j * self.tile_size;
        TileBounds {
            x0,
            y0,
            width: self.tile_size.min(self.image_width.saturating_sub(x0)),
            height: self.tile_size.min(self.image_height.saturating_sub(y0)),
        }
    }
}
