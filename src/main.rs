// Batch runner for the `ratio_vision` library: sweeps a directory of
// two-channel TIFF exports and writes the composite spot map and the ratio map
// next to each input. One bad file is logged and skipped; the rest of the
// directory still gets processed.

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use ratio_vision::core_modules::utils::image_helper::image_helper;
use ratio_vision::parallel_pipeline::ParallelRatioPipeline;
use ratio_vision::pipeline::{
    GaussianMaximaDetector, Plane, RatioMapConfig, RatioMapOutput, RatioPipeline, SweepObserver,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const COMPOSITE_SUFFIX: &str = "_spotmap";
const RATIO_SUFFIX: &str = "_ratio";

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Logging & Argument Parsing ---
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?
        .start()
        .context("logger initialization failed")?;

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("Usage: ratio_vision <input_dir> [config.yml]");
        return Ok(());
    }
    let input_dir = PathBuf::from(&args[1]);

    // --- 2. Configuration ---
    let config = match args.get(2) {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read configuration file {path}"))?;
            serde_yml::from_str::<RatioMapConfig>(&text)
                .with_context(|| format!("failed to parse configuration file {path}"))?
        }
        None => RatioMapConfig::default(),
    };
    config.validate()?;

    // --- 3. Directory Sweep ---
    if !input_dir.is_dir() {
        bail!("input directory {} does not exist", input_dir.display());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(&input_dir)
        .with_context(|| format!("failed to list {}", input_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_source_image(path))
        .collect();
    files.sort();

    if files.is_empty() {
        warn!("no two-channel TIFF files found in {}", input_dir.display());
        return Ok(());
    }

    // --- 4. Per-File Processing ---
    // A failing file must not take the rest of the directory down with it.
    let mut failed = 0usize;
    for file in &files {
        match process_file(file, &config).await {
            Ok(()) => info!("finished {}", file.display()),
            Err(err) => {
                failed += 1;
                error!("failed {}: {err:#}", file.display());
            }
        }
    }

    info!("processed {} file(s), {failed} failed", files.len());
    Ok(())
}

/// Source files are `.tif`/`.tiff`, excluding our own output maps so a rerun
/// does not feed on its previous results.
fn is_source_image(path: &Path) -> bool {
    let has_tiff_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
    if !has_tiff_extension {
        return false;
    }
    let is_own_output = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with(COMPOSITE_SUFFIX) || s.ends_with(RATIO_SUFFIX));
    if is_own_output {
        debug!("skipping previous output {}", path.display());
        return false;
    }
    true
}

async fn process_file(path: &Path, config: &RatioMapConfig) -> Result<()> {
    info!("processing {}", path.display());
    let image = Arc::new(image_helper::read_two_channel_tiff(path)?);

    let output = if config.preview {
        // The preview wants to watch the map grow column by column, so this
        // path runs the sequential sweep with a PNG-writing observer.
        let pipeline = RatioPipeline::new(GaussianMaximaDetector, config.clone())?;
        let mut observer = PngPreview {
            path: sibling_path(path, "_preview", "png"),
        };
        pipeline.process_image_observed(&image, &mut observer)?
    } else {
        let pipeline = ParallelRatioPipeline::new(GaussianMaximaDetector, config.clone())?;
        pipeline.process_image(Arc::clone(&image)).await?
    };

    write_outputs(path, &output)
}

fn write_outputs(source: &Path, output: &RatioMapOutput) -> Result<()> {
    let composite_path = sibling_path(source, COMPOSITE_SUFFIX, "tif");
    let planes: Vec<&Plane> = output.composite.planes.iter().collect();
    image_helper::write_planes_tiff(&composite_path, &planes, &output.spacing)
        .with_context(|| format!("failed to write {}", composite_path.display()))?;

    let ratio_path = sibling_path(source, RATIO_SUFFIX, "tif");
    image_helper::write_planes_tiff(&ratio_path, &[&output.ratio], &output.spacing)
        .with_context(|| format!("failed to write {}", ratio_path.display()))?;

    debug!(
        "wrote {} and {} ({} unit/px)",
        composite_path.display(),
        ratio_path.display(),
        output.spacing.width
    );
    Ok(())
}

/// `<dir>/<stem><suffix>.<extension>` next to the source file.
fn sibling_path(source: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = format!("{stem}{suffix}.{extension}");
    source.with_file_name(name)
}

/// Cosmetic live preview: rewrites one PNG as each grid column completes.
struct PngPreview {
    path: PathBuf,
}

impl SweepObserver for PngPreview {
    fn column_complete(&mut self, _column: u32, ratio: &Plane) {
        if let Err(err) = image_helper::save_preview_png(&self.path, ratio) {
            debug!("preview write failed: {err}");
        }
    }
}
