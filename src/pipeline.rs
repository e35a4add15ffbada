// THEORY:
// The `pipeline` module is the top-level API for the engine. It owns the full
// sweep for one image: build the tile grid, analyze every cell, aggregate the
// five result grids, and compose the output maps. One call, one image, one
// output; no state survives between images.
//
// The sweep is column-major (all rows of a column, then the next column),
// mirroring how the result maps grow on screen when previewed. After each
// completed column an optional `SweepObserver` is notified; the observer is
// purely cosmetic and can never influence the computed values.

use crate::core_modules::composer;
use crate::core_modules::plane::plane::TwoChannelImage;
use crate::core_modules::result_grid::ResultGrids;
use crate::core_modules::spot_detector::{DetectorParams, SpotDetector};
use crate::core_modules::tile_analyzer::TileAnalyzer;
use crate::core_modules::tile_grid::TileGrid;
use crate::error::RatioVisionError;
use log::debug;
use serde::Deserialize;

// Re-export key data structures for the public API.
pub use crate::core_modules::composer::{
    CompositeImage, DisplayHint, Palette, RatioMapOutput, PLANE_NAMES,
};
pub use crate::core_modules::plane::plane::{PixelSpacing, Plane};
pub use crate::core_modules::spot_detector::GaussianMaximaDetector;

/// Configuration for one ratio-map run, replacing the tunable constants of the
/// original bench script with an explicit value object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RatioMapConfig {
    /// Detector tuning for the first marker channel (e.g. GFP).
    pub channel1: DetectorParams,
    /// Detector tuning for the second marker channel (e.g. DAPI).
    pub channel2: DetectorParams,
    /// Tile edge length in pixels.
    pub tile_size: u32,
    /// Minimum channel-1 spot count for a tile's ratio to be trusted.
    pub cutoff1: u32,
    /// Minimum channel-2 spot count for a tile's ratio to be trusted.
    pub cutoff2: u32,
    /// Write a live preview of the growing ratio map. Cosmetic only.
    pub preview: bool,
}

impl Default for RatioMapConfig {
    fn default() -> Self {
        Self {
            channel1: DetectorParams { sigma: 1.0, noise: 600.0 },
            channel2: DetectorParams { sigma: 1.0, noise: 200.0 },
            tile_size: 128,
            cutoff1: 2,
            cutoff2: 2,
            preview: false,
        }
    }
}

impl RatioMapConfig {
    /// Checks the configuration before any processing starts.
    pub fn validate(&self) -> Result<(), RatioVisionError> {
        if self.tile_size == 0 {
            return Err(RatioVisionError::Configuration(String::from(
                "tile_size must be at least 1 pixel",
            )));
        }
        for (label, params) in [("channel1", &self.channel1), ("channel2", &self.channel2)] {
            if !(params.sigma > 0.0) || !params.sigma.is_finite() {
                return Err(RatioVisionError::Configuration(format!(
                    "{label}: sigma must be positive and finite, got {}",
                    params.sigma
                )));
            }
            if params.noise < 0.0 || !params.noise.is_finite() {
                return Err(RatioVisionError::Configuration(format!(
                    "{label}: noise must be non-negative and finite, got {}",
                    params.noise
                )));
            }
        }
        Ok(())
    }
}

/// Cosmetic progress hook, called after each completed grid column with the
/// ratio grid as filled so far. Implementations must not assume cells beyond
/// the reported column are meaningful.
pub trait SweepObserver {
    fn column_complete(&mut self, column: u32, ratio: &Plane);
}

/// The main, top-level struct for the ratio-map engine.
pub struct RatioPipeline<D: SpotDetector> {
    detector: D,
    config: RatioMapConfig,
}

impl<D: SpotDetector> RatioPipeline<D> {
    /// Builds a pipeline, validating the configuration up front.
    pub fn new(detector: D, config: RatioMapConfig) -> Result<Self, RatioVisionError> {
        config.validate()?;
        Ok(Self { detector, config })
    }

    pub fn config(&self) -> &RatioMapConfig {
        &self.config
    }

    /// Runs the full sweep over one image and composes the output maps.
    pub fn process_image(
        &self,
        image: &TwoChannelImage,
    ) -> Result<RatioMapOutput, RatioVisionError> {
        let grids = self.sweep(image, None)?;
        Ok(composer::compose(grids, image.width(), &image.spacing))
    }

    /// Like [`process_image`](Self::process_image), with a preview observer.
    pub fn process_image_observed(
        &self,
        image: &TwoChannelImage,
        observer: &mut dyn SweepObserver,
    ) -> Result<RatioMapOutput, RatioVisionError> {
        let grids = self.sweep(image, Some(observer))?;
        Ok(composer::compose(grids, image.width(), &image.spacing))
    }

    fn sweep(
        &self,
        image: &TwoChannelImage,
        mut observer: Option<&mut dyn SweepObserver>,
    ) -> Result<ResultGrids, RatioVisionError> {
        let grid = TileGrid::new(image.width(), image.height(), self.config.tile_size)?;
        debug!(
            "sweeping {}x{} image as {}x{} grid of {}px tiles",
            image.width(),
            image.height(),
            grid.cols(),
            grid.rows(),
            grid.tile_size()
        );

        let analyzer = TileAnalyzer::new(&self.detector, &self.config);
        let mut grids = ResultGrids::new(grid.cols(), grid.rows());
        for cell in grid.cells() {
            let result = analyzer.analyze(image, cell, grid.bounds(cell));
            grids.record(cell, &result);

            // Column-major order: the last row of a column closes the column.
            if cell.j == grid.rows() - 1 {
                if let Some(obs) = observer.as_deref_mut() {
                    obs.column_complete(cell.i, grids.ratio());
                }
            }
        }
        Ok(grids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::plane::plane::{PixelSpacing, Plane};
    use crate::core_modules::spot_detector::{Spot, SpotSet};

    /// Deterministic stub: 5 spots per full 8x8 tile in channel 1, 4 in
    /// channel 2, nothing for clipped partial tiles.
    struct PatternDetector;

    impl SpotDetector for PatternDetector {
        fn detect(
            &self,
            region: &Plane,
            params: &DetectorParams,
        ) -> Result<SpotSet, RatioVisionError> {
            if region.width() < 8 || region.height() < 8 {
                return Ok(Vec::new());
            }
            let count = if params.noise == 1.0 { 5 } else { 4 };
            Ok((0..count).map(|k| Spot { x: k, y: k }).collect())
        }
    }

    fn pattern_config() -> RatioMapConfig {
        RatioMapConfig {
            channel1: DetectorParams { sigma: 1.0, noise: 1.0 },
            channel2: DetectorParams { sigma: 1.0, noise: 2.0 },
            tile_size: 8,
            cutoff1: 2,
            cutoff2: 2,
            preview: false,
        }
    }

    fn test_image(width: u32, height: u32) -> TwoChannelImage {
        TwoChannelImage {
            channel1: Plane::from_data(
                width,
                height,
                (0..width * height).map(|k| (k % 7) as f32).collect(),
            ),
            channel2: Plane::from_data(width, height, vec![3.0; (width * height) as usize]),
            spacing: PixelSpacing::default(),
        }
    }

    #[test]
    fn invalid_configuration_is_rejected_before_processing() {
        let config = RatioMapConfig { tile_size: 0, ..RatioMapConfig::default() };
        assert!(RatioPipeline::new(PatternDetector, config).is_err());

        let config = RatioMapConfig {
            channel1: DetectorParams { sigma: -1.0, noise: 1.0 },
            ..RatioMapConfig::default()
        };
        assert!(RatioPipeline::new(PatternDetector, config).is_err());

        let config = RatioMapConfig {
            channel2: DetectorParams { sigma: 1.0, noise: f32::NAN },
            ..RatioMapConfig::default()
        };
        assert!(RatioPipeline::new(PatternDetector, config).is_err());
    }

    #[test]
    fn sweep_fills_every_full_tile_with_the_gated_ratio() {
        // 20x12 with 8px tiles: 3x2 grid, full tiles at i<2, j<1 only.
        let pipeline = RatioPipeline::new(PatternDetector, pattern_config()).unwrap();
        let image = test_image(20, 12);
        let output = pipeline.process_image(&image).unwrap();

        assert_eq!(output.composite.width, 3);
        assert_eq!(output.composite.height, 2);
        for i in 0..3 {
            for j in 0..2 {
                let expected = if i < 2 && j < 1 { 1.25 } else { 0.0 };
                assert_eq!(output.ratio.get(i, j), expected, "cell ({i}, {j})");
            }
        }
    }

    #[test]
    fn sweep_is_idempotent() {
        let pipeline = RatioPipeline::new(PatternDetector, pattern_config()).unwrap();
        let image = test_image(40, 24);
        let first = pipeline.process_image(&image).unwrap();
        let second = pipeline.process_image(&image).unwrap();

        for (a, b) in first.composite.planes.iter().zip(second.composite.planes.iter()) {
            assert_eq!(a.data(), b.data());
        }
        assert_eq!(first.spacing, second.spacing);
    }

    #[test]
    fn observer_sees_every_column_exactly_once() {
        struct ColumnRecorder {
            columns: Vec<u32>,
        }
        impl SweepObserver for ColumnRecorder {
            fn column_complete(&mut self, column: u32, _ratio: &Plane) {
                self.columns.push(column);
            }
        }

        let pipeline = RatioPipeline::new(PatternDetector, pattern_config()).unwrap();
        let image = test_image(20, 12);
        let mut recorder = ColumnRecorder { columns: Vec::new() };
        let observed = pipeline.process_image_observed(&image, &mut recorder).unwrap();
        assert_eq!(recorder.columns, vec![0, 1, 2]);

        // The observer must not change the result.
        let plain = pipeline.process_image(&image).unwrap();
        assert_eq!(observed.ratio.data(), plain.ratio.data());
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let pipeline = RatioPipeline::new(PatternDetector, pattern_config()).unwrap();
        let image = TwoChannelImage {
            channel1: Plane::new(0, 0),
            channel2: Plane::new(0, 0),
            spacing: PixelSpacing::default(),
        };
        assert!(matches!(
            pipeline.process_image(&image),
            Err(RatioVisionError::Configuration(_))
        ));
    }
}
