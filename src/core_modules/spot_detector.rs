// THEORY:
// The `SpotDetector` is the perception primitive of the engine: given one
// channel of one tile, report where the bright puncta (putative nuclei) are.
// The rest of the pipeline only ever consumes `spots.len()`, but the detector
// returns coordinates so that alternative consumers (and the tests) can see
// exactly what was found.
//
// Key architectural principles:
// 1.  **Capability Interface**: detection is a trait so the sweep can be driven
//     with a stub returning fixed counts. The production implementation is
//     `GaussianMaximaDetector`.
// 2.  **Determinism Contract**: `detect` must be a pure function of the region
//     and the parameters. Implementations must not carry state between calls;
//     the whole-image sweep is bit-reproducible because of this.
// 3.  **Empty Is Normal**: a tile with no maxima yields an empty `SpotSet`.
//     That is a valid measurement, not an error.
//
// The production algorithm is the classic blur-then-find-maxima pair:
// 1.  **Gaussian Smoothing**: separable 1D kernel, rows then columns, with
//     clamp-to-edge borders, so single-pixel sensor noise cannot seed maxima.
// 2.  **Peak Finding**: candidate spots are pixels at least as bright as all
//     8 neighbors.
// 3.  **Noise Tolerance**: each candidate is flooded over the pixels at or
//     above `peak - noise`. A candidate whose flood reaches a strictly
//     brighter pixel is a shoulder of a larger peak and is discarded; a
//     plateau is claimed by its first candidate so it counts once.

use crate::core_modules::plane::plane::Plane;
use crate::error::RatioVisionError;
use serde::Deserialize;

/// A detected local-intensity maximum, in tile-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spot {
    pub x: u32,
    pub y: u32,
}

/// The detections for one channel of one tile. Only the count feeds the ratio
/// map; the coordinates exist for inspection.
pub type SpotSet = Vec<Spot>;

/// Per-channel detector tuning.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DetectorParams {
    /// Gaussian blur scale in pixels.
    pub sigma: f32,
    /// Local height a maximum must have over its surroundings to count.
    pub noise: f32,
}

/// A deterministic spot detector over a single-channel region.
///
/// Implementations must be pure functions of `(region, params)`: same inputs,
/// same spots, in the same order. The sweep's reproducibility guarantees
/// depend on it.
pub trait SpotDetector {
    fn detect(&self, region: &Plane, params: &DetectorParams)
    -> Result<SpotSet, RatioVisionError>;
}

/// Gaussian smoothing followed by noise-tolerant local-maxima finding.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianMaximaDetector;

impl SpotDetector for GaussianMaximaDetector {
    fn detect(
        &self,
        region: &Plane,
        params: &DetectorParams,
    ) -> Result<SpotSet, RatioVisionError> {
        if !params.sigma.is_finite()
            || params.sigma <= 0.0
            || !params.noise.is_finite()
            || params.noise < 0.0
        {
            return Err(RatioVisionError::Detection(format!(
                "invalid detector parameters: sigma={}, noise={}",
                params.sigma, params.noise
            )));
        }
        if region.is_empty() {
            return Ok(Vec::new());
        }
        let blurred = gaussian_blur(region, params.sigma);
        Ok(find_maxima(&blurred, params.noise))
    }
}

/// Builds a normalized 1D Gaussian kernel with radius `ceil(3 * sigma)`.
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i64;
    let two_sigma_sq = 2.0 * (sigma as f64) * (sigma as f64);
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|offset| (-((offset * offset) as f64) / two_sigma_sq).exp() as f32)
        .collect();
    let sum: f32 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Separable Gaussian blur: one horizontal pass, one vertical pass.
/// Out-of-bounds taps clamp to the nearest edge sample.
fn gaussian_blur(src: &Plane, sigma: f32) -> Plane {
    let kernel = gaussian_kernel(sigma);
    let half = (kernel.len() / 2) as i64;
    let w = src.width();
    let h = src.height();

    let mut rows = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &weight) in kernel.iter().enumerate() {
                let sx = (x as i64 + k as i64 - half).clamp(0, w as i64 - 1) as u32;
                acc += src.get(sx, y) * weight;
            }
            rows.set(x, y, acc);
        }
    }

    let mut out = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = (y as i64 + k as i64 - half).clamp(0, h as i64 - 1) as u32;
                acc += rows.get(x, sy) * weight;
            }
            out.set(x, y, acc);
        }
    }
    out
}

/// Finds local maxima that stand out by more than `noise` from their
/// surroundings.
///
/// Candidates are processed brightest-first. Each candidate floods over the
/// connected pixels at or above `peak - noise`; if the flood touches a pixel
/// brighter than the peak, the candidate sits on the shoulder of a larger
/// maximum and is dropped. Flooded pixels are claimed either way, so a plateau
/// yields exactly one spot. A region with no intensity relief at all (every
/// sample equal) yields no spots.
fn find_maxima(plane: &Plane, noise: f32) -> SpotSet {
    let w = plane.width() as usize;
    let h = plane.height() as usize;
    if w == 0 || h == 0 {
        return Vec::new();
    }

    // --- 1. Candidate peaks ---
    // A candidate is at least as bright as all 8 neighbors. Ties survive here;
    // the flood stage dedups plateaus.
    let mut candidates: Vec<usize> = Vec::new();
    let mut floor = f32::INFINITY;
    let mut ceiling = f32::NEG_INFINITY;
    for y in 0..h {
        for x in 0..w {
            let value = plane.get(x as u32, y as u32);
            floor = floor.min(value);
            ceiling = ceiling.max(value);

            let mut is_peak = true;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx >= 0
                        && nx < w as i64
                        && ny >= 0
                        && ny < h as i64
                        && plane.get(nx as u32, ny as u32) > value
                    {
                        is_peak = false;
                        break;
                    }
                }
                if !is_peak {
                    break;
                }
            }
            if is_peak {
                candidates.push(y * w + x);
            }
        }
    }

    // A perfectly flat region has no maxima to report.
    if ceiling <= floor {
        return Vec::new();
    }

    // Brightest first; index order breaks ties so the scan is deterministic.
    candidates.sort_by(|&a, &b| {
        plane.data()[b]
            .total_cmp(&plane.data()[a])
            .then(a.cmp(&b))
    });

    // --- 2. Noise-tolerance flood ---
    let mut claimed = vec![false; w * h];
    let mut spots: Vec<Spot> = Vec::new();
    let mut queue: Vec<usize> = Vec::new();

    for &seed in &candidates {
        if claimed[seed] {
            continue;
        }
        let peak_value = plane.data()[seed];
        let cutoff = peak_value - noise;

        let mut on_shoulder = false;
        queue.clear();
        queue.push(seed);
        claimed[seed] = true;

        while let Some(index) = queue.pop() {
            let cx = (index % w) as i64;
            let cy = (index / w) as i64;
            for (dx, dy) in &[(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                let nx = cx + dx;
                let ny = cy + dy;
                if nx < 0 || nx >= w as i64 || ny < 0 || ny >= h as i64 {
                    continue;
                }
                let neighbor = (ny as usize) * w + nx as usize;
                let neighbor_value = plane.data()[neighbor];
                if neighbor_value > peak_value {
                    on_shoulder = true;
                }
                if !claimed[neighbor] && neighbor_value >= cutoff {
                    claimed[neighbor] = true;
                    queue.push(neighbor);
                }
            }
        }

        if !on_shoulder {
            spots.push(Spot {
                x: (seed % w) as u32,
                y: (seed / w) as u32,
            });
        }
    }

    spots
}
