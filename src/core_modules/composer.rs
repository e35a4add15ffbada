// THEORY:
// The `ResultComposer` is the hand-off layer: it takes the five filled grids
// and packages them into the two deliverables of a run (the 5-plane composite
// map and the standalone ratio map) plus the metadata a writer or viewer
// needs. It contains no branching logic, only data assembly and the pixel
// spacing arithmetic.
//
// Downstream consumers want both outputs: the composite for context (means and
// raw counts next to the ratio) and the bare ratio map for quantification.
// Display treatment (palettes, contrast stretching) is emitted as plain data
// hints; actually rendering anything is somebody else's job.

use crate::core_modules::plane::plane::{PixelSpacing, Plane};
use crate::core_modules::result_grid::ResultGrids;

/// Output pixel spacing is scaled by `source_width / grid_width` times this
/// constant. The factor 2 compensates for the half-resolution pyramid series
/// the upstream reader selects; it is inherited calibration, not derived here.
pub const DOWNSAMPLE_CORRECTION: f64 = 2.0;

/// Labels of the composite planes, in order.
pub const PLANE_NAMES: [&str; 5] = ["mean1", "mean2", "count1", "count2", "ratio"];

/// Color palette a viewer should apply to a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Green,
    Blue,
    Inferno,
}

/// Per-plane visualization hint. Never consulted by the analysis itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayHint {
    pub plane: &'static str,
    pub palette: Palette,
    /// Stretch display contrast to the plane's value range.
    pub auto_contrast: bool,
    /// Fixed display range overriding auto contrast, e.g. 0..1 for the ratio.
    pub fixed_range: Option<(f32, f32)>,
}

/// A multi-plane f32 image: same-shaped planes stacked as channels.
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Plane>,
}

/// Everything one whole-image sweep delivers.
#[derive(Debug, Clone)]
pub struct RatioMapOutput {
    /// The 5-plane composite: mean1, mean2, count1, count2, ratio.
    pub composite: CompositeImage,
    /// The ratio plane alone, identical to composite plane 5.
    pub ratio: Plane,
    /// Pixel spacing of both outputs, rescaled from the source spacing.
    pub spacing: PixelSpacing,
    /// Visualization hints, one per composite plane.
    pub display_hints: [DisplayHint; 5],
}

/// Merges filled result grids into the two output images.
///
/// `source_width` and `source_spacing` come from the image the grids were
/// swept over; the output spacing is
/// `source_spacing * (source_width / grid_width) * DOWNSAMPLE_CORRECTION`,
/// with the width-derived factor applied to both axes.
pub fn compose(
    grids: ResultGrids,
    source_width: u32,
    source_spacing: &PixelSpacing,
) -> RatioMapOutput {
    let cols = grids.cols();
    let rows = grids.rows();
    let ratio = grids.ratio().clone();
    let planes = grids.into_planes();

    let factor = (source_width as f64 / cols as f64) * DOWNSAMPLE_CORRECTION;
    let spacing = PixelSpacing {
        unit: source_spacing.unit.clone(),
        width: source_spacing.width * factor,
        height: source_spacing.height * factor,
    };

    RatioMapOutput {
        composite: CompositeImage {
            width: cols,
            height: rows,
            planes: planes.into(),
        },
        ratio,
        spacing,
        display_hints: [
            DisplayHint {
                plane: PLANE_NAMES[0],
                palette: Palette::Green,
                auto_contrast: true,
                fixed_range: None,
            },
            DisplayHint {
                plane: PLANE_NAMES[1],
                palette: Palette::Blue,
                auto_contrast: true,
                fixed_range: None,
            },
            DisplayHint {
                plane: PLANE_NAMES[2],
                palette: Palette::Inferno,
                auto_contrast: true,
                fixed_range: None,
            },
            DisplayHint {
                plane: PLANE_NAMES[3],
                palette: Palette::Inferno,
                auto_contrast: true,
                fixed_range: None,
            },
            DisplayHint {
                plane: PLANE_NAMES[4],
                palette: Palette::Inferno,
                auto_contrast: false,
                fixed_range: Some((0.0, 1.0)),
            },
        ],
    }
}
