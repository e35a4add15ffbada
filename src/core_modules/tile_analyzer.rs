// THEORY:
// The `TileAnalyzer` turns one tile of the source image into one record of the
// output maps. It is the only place where the two channels meet: two detector
// invocations, two whole-tile intensity means, and the cutoff-gated ratio.
//
// Key architectural principles:
// 1.  **Pure Per-Tile Function**: the result depends only on the tile region,
//     the two channel planes, and the configuration. No state crosses tile
//     boundaries, which is what makes the parallel sweep safe.
// 2.  **Cutoff Gating**: `ratio = count1 / count2` is computed only when BOTH
//     counts clear their per-channel cutoffs. Anything else reports 0.0. This
//     simultaneously prevents division by zero and keeps noise-dominated
//     low-count tiles from contributing spuriously extreme ratios.
// 3.  **Contained Failure**: a detector error on one tile is logged and the
//     tile records the zeroed sentinel result. A ruined tile never invents a
//     non-zero ratio, and never aborts the rest of the sweep.

use crate::core_modules::plane::plane::TwoChannelImage;
use crate::core_modules::spot_detector::{DetectorParams, SpotDetector};
use crate::core_modules::tile_grid::{TileBounds, TileCell};
use crate::pipeline::RatioMapConfig;
use log::warn;

/// One record of the output maps: the five values written at a grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileResult {
    /// Mean channel-1 intensity over the whole tile.
    pub mean1: f32,
    /// Mean channel-2 intensity over the whole tile.
    pub mean2: f32,
    /// Detected spot count in channel 1.
    pub count1: u32,
    /// Detected spot count in channel 2.
    pub count2: u32,
    /// `count1 / count2` when both counts clear their cutoffs, else 0.0.
    pub ratio: f32,
}

impl TileResult {
    /// The fill value of every output grid, and the record written for tiles
    /// that are empty or failed detection.
    pub const ZERO: TileResult = TileResult {
        mean1: 0.0,
        mean2: 0.0,
        count1: 0,
        count2: 0,
        ratio: 0.0,
    };
}

/// Analyzes single tiles against both channels of a source image.
pub struct TileAnalyzer<'a, D: SpotDetector> {
    detector: &'a D,
    config: &'a RatioMapConfig,
}

impl<'a, D: SpotDetector> TileAnalyzer<'a, D> {
    pub fn new(detector: &'a D, config: &'a RatioMapConfig) -> Self {
        Self { detector, config }
    }

    /// Produces the `TileResult` for `cell`, whose clipped pixel rectangle is
    /// `bounds`. Detector failures are contained here: the cell reports the
    /// zeroed sentinel and the sweep goes on.
    pub fn analyze(&self, image: &TwoChannelImage, cell: TileCell, bounds: TileBounds) -> TileResult {
        if bounds.is_empty() {
            return TileResult::ZERO;
        }

        let tile1 = image
            .channel1
            .sub_plane(bounds.x0, bounds.y0, bounds.width, bounds.height);
        let tile2 = image
            .channel2
            .sub_plane(bounds.x0, bounds.y0, bounds.width, bounds.height);

        let mean1 = tile1.mean() as f32;
        let mean2 = tile2.mean() as f32;

        let count1 = match self.detector.detect(&tile1, &self.config.channel1) {
            Ok(spots) => spots.len() as u32,
            Err(err) => {
                warn!("tile ({}, {}) channel 1: {err}; recording zeroed result", cell.i, cell.j);
                return TileResult { mean1, mean2, ..TileResult::ZERO };
            }
        };
        let count2 = match self.detector.detect(&tile2, &self.config.channel2) {
            Ok(spots) => spots.len() as u32,
            Err(err) => {
                warn!("tile ({}, {}) channel 2: {err}; recording zeroed result", cell.i, cell.j);
                return TileResult { mean1, mean2, ..TileResult::ZERO };
            }
        };

        let ratio = if count2 > self.config.cutoff2 && count1 > self.config.cutoff1 {
            (count1 as f64 / count2 as f64) as f32
        } else {
            0.0
        };

        TileResult { mean1, mean2, count1, count2, ratio }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::plane::plane::{PixelSpacing, Plane, TwoChannelImage};
    use crate::core_modules::spot_detector::{Spot, SpotSet};
    use crate::core_modules::tile_grid::TileGrid;
    use crate::error::RatioVisionError;

    /// Stub detector returning a fixed count per channel, keyed by the noise
    /// parameter so one instance can serve both channels.
    struct FixedCountDetector {
        count_for_channel1: usize,
        count_for_channel2: usize,
    }

    impl SpotDetector for FixedCountDetector {
        fn detect(
            &self,
            _region: &Plane,
            params: &DetectorParams,
        ) -> Result<SpotSet, RatioVisionError> {
            let count = if params.noise == 1.0 {
                self.count_for_channel1
            } else {
                self.count_for_channel2
            };
            Ok((0..count).map(|k| Spot { x: k as u32, y: 0 }).collect())
        }
    }

    struct FailingDetector;

    impl SpotDetector for FailingDetector {
        fn detect(
            &self,
            _region: &Plane,
            _params: &DetectorParams,
        ) -> Result<SpotSet, RatioVisionError> {
            Err(RatioVisionError::Detection(String::from("malformed region")))
        }
    }

    fn test_config() -> RatioMapConfig {
        RatioMapConfig {
            channel1: DetectorParams { sigma: 1.0, noise: 1.0 },
            channel2: DetectorParams { sigma: 1.0, noise: 2.0 },
            tile_size: 128,
            cutoff1: 2,
            cutoff2: 2,
            preview: false,
        }
    }

    fn uniform_image(value1: f32, value2: f32) -> TwoChannelImage {
        TwoChannelImage {
            channel1: Plane::from_data(256, 256, vec![value1; 256 * 256]),
            channel2: Plane::from_data(256, 256, vec![value2; 256 * 256]),
            spacing: PixelSpacing::default(),
        }
    }

    fn analyze_first_tile<D: SpotDetector>(detector: &D, config: &RatioMapConfig) -> TileResult {
        let image = uniform_image(1500.0, 300.0);
        let grid = TileGrid::new(image.width(), image.height(), config.tile_size).unwrap();
        let cell = TileCell { i: 0, j: 0 };
        TileAnalyzer::new(detector, config).analyze(&image, cell, grid.bounds(cell))
    }

    #[test]
    fn ratio_is_suppressed_when_channel2_fails_its_cutoff() {
        let detector = FixedCountDetector { count_for_channel1: 5, count_for_channel2: 1 };
        let result = analyze_first_tile(&detector, &test_config());
        assert_eq!(result.count1, 5);
        assert_eq!(result.count2, 1);
        assert_eq!(result.ratio, 0.0);
        assert_eq!(result.mean1, 1500.0);
        assert_eq!(result.mean2, 300.0);
    }

    #[test]
    fn ratio_is_counts_divided_when_both_cutoffs_pass() {
        let detector = FixedCountDetector { count_for_channel1: 5, count_for_channel2: 3 };
        let result = analyze_first_tile(&detector, &test_config());
        assert!((result.ratio - 5.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn empty_channel1_detection_suppresses_the_ratio() {
        let detector = FixedCountDetector { count_for_channel1: 0, count_for_channel2: 40 };
        let result = analyze_first_tile(&detector, &test_config());
        assert_eq!(result.count1, 0);
        assert_eq!(result.count2, 40);
        assert_eq!(result.ratio, 0.0);
    }

    #[test]
    fn counts_exactly_at_the_cutoff_are_suppressed() {
        // The gate is strictly-greater-than on both channels.
        let detector = FixedCountDetector { count_for_channel1: 2, count_for_channel2: 9 };
        let result = analyze_first_tile(&detector, &test_config());
        assert_eq!(result.ratio, 0.0);

        let detector = FixedCountDetector { count_for_channel1: 9, count_for_channel2: 2 };
        let result = analyze_first_tile(&detector, &test_config());
        assert_eq!(result.ratio, 0.0);

        let detector = FixedCountDetector { count_for_channel1: 3, count_for_channel2: 3 };
        let result = analyze_first_tile(&detector, &test_config());
        assert_eq!(result.ratio, 1.0);
    }

    #[test]
    fn ratio_is_always_finite() {
        for c1 in 0..6u32 {
            for c2 in 0..6u32 {
                let detector = FixedCountDetector {
                    count_for_channel1: c1 as usize,
                    count_for_channel2: c2 as usize,
                };
                let result = analyze_first_tile(&detector, &test_config());
                assert!(result.ratio.is_finite());
            }
        }
    }

    #[test]
    fn detector_failure_records_the_sentinel_but_keeps_the_means() {
        let result = analyze_first_tile(&FailingDetector, &test_config());
        assert_eq!(result.count1, 0);
        assert_eq!(result.count2, 0);
        assert_eq!(result.ratio, 0.0);
        assert_eq!(result.mean1, 1500.0);
        assert_eq!(result.mean2, 300.0);
    }

    #[test]
    fn empty_tile_records_the_sentinel() {
        let detector = FixedCountDetector { count_for_channel1: 9, count_for_channel2: 9 };
        let config = test_config();
        let image = uniform_image(1500.0, 300.0);
        // 256 is an exact multiple of 128, so the final grid column is empty.
        let grid = TileGrid::new(image.width(), image.height(), config.tile_size).unwrap();
        let cell = TileCell { i: grid.cols() - 1, j: 0 };
        let result =
            TileAnalyzer::new(&detector, &config).analyze(&image, cell, grid.bounds(cell));
        assert_eq!(result, TileResult::ZERO);
    }
}
