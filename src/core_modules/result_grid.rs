// THEORY:
// The `ResultGrids` are the five parallel output rasters of the sweep, one grid
// cell per tile: channel means, raw spot counts, and the gated ratio. They are
// the aggregation target the whole engine exists to fill.
//
// Key architectural principles:
// 1.  **Parallel Same-Shaped Grids**: all five planes share the `cols x rows`
//     shape so a single `(i, j)` addresses one tile's full record. Keeping them
//     as separate planes (instead of a grid of structs) matches the composed
//     output, where each becomes one image plane.
// 2.  **Write-Once Cells**: the sweep writes every enumerated cell exactly
//     once. Cells that are never written keep the 0.0 fill value.
// 3.  **Single Writer**: only the sweep owner mutates the grids. The parallel
//     pipeline funnels worker results through this one writer after its join
//     barrier, so no locking is ever needed.

use crate::core_modules::plane::plane::Plane;
use crate::core_modules::tile_analyzer::TileResult;
use crate::core_modules::tile_grid::TileCell;

/// The five per-tile output grids of one whole-image sweep.
#[derive(Debug, Clone)]
pub struct ResultGrids {
    cols: u32,
    rows: u32,
    mean1: Plane,
    mean2: Plane,
    count1: Plane,
    count2: Plane,
    ratio: Plane,
}

impl ResultGrids {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self {
            cols,
            rows,
            mean1: Plane::new(cols, rows),
            mean2: Plane::new(cols, rows),
            count1: Plane::new(cols, rows),
            count2: Plane::new(cols, rows),
            ratio: Plane::new(cols, rows),
        }
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Writes one tile's record into all five grids at `cell`.
    pub fn record(&mut self, cell: TileCell, result: &TileResult) {
        self.mean1.set(cell.i, cell.j, result.mean1);
        self.mean2.set(cell.i, cell.j, result.mean2);
        self.count1.set(cell.i, cell.j, result.count1 as f32);
        self.count2.set(cell.i, cell.j, result.count2 as f32);
        self.ratio.set(cell.i, cell.j, result.ratio);
    }

    pub fn ratio(&self) -> &Plane {
        &self.ratio
    }

    /// Consumes the grids in composition order:
    /// mean1, mean2, count1, count2, ratio.
    pub fn into_planes(self) -> [Plane; 5] {
        [self.mean1, self.mean2, self.count1, self.count2, self.ratio]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_cells_keep_the_fill_value() {
        let grids = ResultGrids::new(4, 3);
        let planes = grids.into_planes();
        for plane in &planes {
            assert!(plane.data().iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn record_writes_all_five_grids_at_the_cell() {
        let mut grids = ResultGrids::new(4, 3);
        let result = TileResult {
            mean1: 1500.0,
            mean2: 300.0,
            count1: 5,
            count2: 3,
            ratio: 5.0 / 3.0,
        };
        grids.record(TileCell { i: 2, j: 1 }, &result);

        let [mean1, mean2, count1, count2, ratio] = grids.into_planes();
        assert_eq!(mean1.get(2, 1), 1500.0);
        assert_eq!(mean2.get(2, 1), 300.0);
        assert_eq!(count1.get(2, 1), 5.0);
        assert_eq!(count2.get(2, 1), 3.0);
        assert!((ratio.get(2, 1) - 5.0 / 3.0).abs() < 1e-6);
        // Neighbors stay at fill.
        assert_eq!(mean1.get(1, 1), 0.0);
        assert_eq!(ratio.get(2, 0), 0.0);
    }
}
