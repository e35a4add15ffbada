// THEORY:
// The `parallel_pipeline` module is the fork-join rendition of the sweep. Tile
// analysis has no cross-tile state, so the enumerated cells are dealt
// round-robin to a fixed pool of workers, each worker analyzes its share
// against shared read-only channel planes, and a join barrier collects every
// `(cell, result)` pair before a single writer fills the grids and composes
// the output.
//
// Key architectural principles:
// 1.  **Disjoint Writes**: workers never touch the grids. Results travel back
//     keyed by cell and are written once, after the barrier, by the caller's
//     task. No locks anywhere on the hot path.
// 2.  **Bit-Identical Results**: because each cell's record is written at its
//     own coordinates, scheduling order cannot change the output. The parallel
//     sweep produces exactly the grids the sequential pipeline produces.
// 3.  **Cooperative Cancellation**: a shared flag is checked between tiles.
//     A cancelled sweep surfaces `Cancelled` and its partial results are
//     dropped, never composed.

use crate::core_modules::composer;
use crate::core_modules::plane::plane::TwoChannelImage;
use crate::core_modules::result_grid::ResultGrids;
use crate::core_modules::spot_detector::SpotDetector;
use crate::core_modules::tile_analyzer::{TileAnalyzer, TileResult};
use crate::core_modules::tile_grid::{TileCell, TileGrid};
use crate::error::RatioVisionError;
use crate::pipeline::{RatioMapConfig, RatioMapOutput};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Fork-join ratio-map pipeline distributing tiles over a worker pool.
pub struct ParallelRatioPipeline<D: SpotDetector + Send + Sync + 'static> {
    detector: Arc<D>,
    config: Arc<RatioMapConfig>,
    workers: usize,
    cancel: Arc<AtomicBool>,
}

impl<D: SpotDetector + Send + Sync + 'static> ParallelRatioPipeline<D> {
    /// Builds a pipeline with one worker per available CPU core.
    pub fn new(detector: D, config: RatioMapConfig) -> Result<Self, RatioVisionError> {
        config.validate()?;
        Ok(Self {
            detector: Arc::new(detector),
            config: Arc::new(config),
            workers: num_cpus::get().max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Overrides the worker count (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Handle for aborting an in-flight sweep from another task.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &RatioMapConfig {
        &self.config
    }

    /// Runs the sweep over `image` across the worker pool and composes the
    /// output maps. The image is shared read-only with every worker.
    pub async fn process_image(
        &self,
        image: Arc<TwoChannelImage>,
    ) -> Result<RatioMapOutput, RatioVisionError> {
        let grid = TileGrid::new(image.width(), image.height(), self.config.tile_size)?;
        let cells: Vec<TileCell> = grid.cells().collect();
        debug!(
            "parallel sweep: {} tiles across {} workers",
            cells.len(),
            self.workers
        );

        // Deal cells round-robin so every worker holds a comparable share.
        let mut shares: Vec<Vec<TileCell>> = vec![Vec::new(); self.workers];
        for (index, cell) in cells.into_iter().enumerate() {
            shares[index % self.workers].push(cell);
        }

        let mut handles = Vec::with_capacity(self.workers);
        for share in shares {
            let detector = Arc::clone(&self.detector);
            let config = Arc::clone(&self.config);
            let image = Arc::clone(&image);
            let cancel = Arc::clone(&self.cancel);
            let grid = grid.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let analyzer = TileAnalyzer::new(detector.as_ref(), config.as_ref());
                let mut results: Vec<(TileCell, TileResult)> = Vec::with_capacity(share.len());
                for cell in share {
                    if cancel.load(Ordering::Relaxed) {
                        return Err(RatioVisionError::Cancelled);
                    }
                    results.push((cell, analyzer.analyze(&image, cell, grid.bounds(cell))));
                }
                Ok(results)
            }));
        }

        // Join barrier: every cell must be in hand before any grid is written.
        let joined = futures::future::join_all(handles).await;
        let mut grids = ResultGrids::new(grid.cols(), grid.rows());
        for outcome in joined {
            let results = outcome
                .map_err(|err| RatioVisionError::Detection(format!("worker panicked: {err}")))??;
            for (cell, result) in results {
                grids.record(cell, &result);
            }
        }

        if self.cancel.load(Ordering::Relaxed) {
            return Err(RatioVisionError::Cancelled);
        }
        Ok(composer::compose(grids, image.width(), &image.spacing))
    }
}
