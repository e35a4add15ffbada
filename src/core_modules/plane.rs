// THEORY:
// The `Plane` module is the lowest layer of the engine: a single fluorescence
// channel as a flat grid of f32 intensity samples. Everything above it (tile
// extraction, spot detection, the output grids) speaks `Plane`.
//
// Key architectural principles:
// 1.  **Dumb Data Container**: A `Plane` holds samples and knows how to do
//     summary arithmetic on its own data (`mean`) and how to copy a clipped
//     rectangle of itself out (`sub_plane`). It knows nothing about channels,
//     tiles, or detection.
// 2.  **Owned, Read-Only Inputs**: Source channel planes are read but never
//     mutated by the analysis layers. All derived data lands in freshly
//     allocated planes, which keeps the per-tile work trivially shareable
//     across workers.
// 3.  **Clipped Extraction**: `sub_plane` clamps the requested rectangle to the
//     plane bounds. A request entirely outside the plane yields an empty plane
//     rather than a panic, which is exactly what edge tiles of the sweep need.

pub mod plane {
    /// A single-channel raster of f32 intensity samples in row-major order.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Plane {
        width: u32,
        height: u32,
        data: Vec<f32>,
    }

    impl Plane {
        /// Creates a zero-filled plane. This is also the fill value of the
        /// output grids: a cell that is never written reads 0.0.
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                data: vec![0.0; (width as usize) * (height as usize)],
            }
        }

        /// Wraps an existing row-major sample buffer.
        ///
        /// # Panics
        /// Panics if `data.len() != width * height`.
        pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Self {
            assert_eq!(
                data.len(),
                (width as usize) * (height as usize),
                "plane buffer length does not match {width}x{height}"
            );
            Self {
                width,
                height,
                data,
            }
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn is_empty(&self) -> bool {
            self.data.is_empty()
        }

        pub fn data(&self) -> &[f32] {
            &self.data
        }

        pub fn get(&self, x: u32, y: u32) -> f32 {
            self.data[(y as usize) * (self.width as usize) + x as usize]
        }

        pub fn set(&mut self, x: u32, y: u32, value: f32) {
            self.data[(y as usize) * (self.width as usize) + x as usize] = value;
        }

        /// Arithmetic mean intensity over the whole plane. An empty plane has
        /// mean 0.0.
        pub fn mean(&self) -> f64 {
            if self.data.is_empty() {
                return 0.0;
            }
            let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
            sum / self.data.len() as f64
        }

        /// Copies out the rectangle `(x0, y0, width, height)`, clipped to the
        /// plane bounds. The result may be smaller than requested, down to an
        /// empty 0x0 plane when the rectangle lies entirely outside.
        pub fn sub_plane(&self, x0: u32, y0: u32, width: u32, height: u32) -> Plane {
            let x1 = x0.saturating_add(width).min(self.width);
            let y1 = y0.saturating_add(height).min(self.height);
            if x0 >= x1 || y0 >= y1 {
                return Plane::new(0, 0);
            }
            let out_w = x1 - x0;
            let out_h = y1 - y0;
            let mut data = Vec::with_capacity((out_w as usize) * (out_h as usize));
            for y in y0..y1 {
                let row_start = (y as usize) * (self.width as usize) + x0 as usize;
                data.extend_from_slice(&self.data[row_start..row_start + out_w as usize]);
            }
            Plane {
                width: out_w,
                height: out_h,
                data,
            }
        }
    }

    /// Physical pixel spacing carried through from the source image.
    #[derive(Debug, Clone, PartialEq)]
    pub struct PixelSpacing {
        /// Calibration unit label, passed through untouched (e.g. "micron").
        pub unit: String,
        /// Physical width of one pixel, in `unit`s.
        pub width: f64,
        /// Physical height of one pixel, in `unit`s.
        pub height: f64,
    }

    impl Default for PixelSpacing {
        fn default() -> Self {
            Self {
                unit: String::from("pixel"),
                width: 1.0,
                height: 1.0,
            }
        }
    }

    /// A decoded two-channel source image: two same-sized planes plus the
    /// calibration metadata of the file they came from.
    #[derive(Debug, Clone)]
    pub struct TwoChannelImage {
        pub channel1: Plane,
        pub channel2: Plane,
        pub spacing: PixelSpacing,
    }

    impl TwoChannelImage {
        pub fn width(&self) -> u32 {
            self.channel1.width()
        }

        pub fn height(&self) -> u32 {
            self.channel1.height()
        }
    }
}
