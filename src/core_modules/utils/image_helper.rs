// THEORY:
// The `image_helper` module is the file boundary of the engine. Everything on
// the inside speaks `Plane`; everything on the outside is a TIFF (or a PNG for
// the cosmetic preview). Proprietary microscope containers are deliberately
// not handled here; inputs are expected as plain two-page grayscale TIFFs,
// exported upstream.
//
// Reading: a source file must hold exactly two same-sized grayscale planes.
// Sample formats from 8-bit integer up to 64-bit float are widened to f32.
// Pixel spacing is recovered from the resolution tags when present and
// defaults to 1.0 px otherwise.
//
// Writing: result maps are written as 32-bit float grayscale pages, one page
// per plane, with the rescaled pixel spacing stored in the resolution tags.

pub mod image_helper {
    use crate::core_modules::plane::plane::{PixelSpacing, Plane, TwoChannelImage};
    use crate::error::RatioVisionError;
    use image::ImageEncoder;
    use std::fs::File;
    use std::io::BufReader;
    use std::path::Path;
    use tiff::ColorType;
    use tiff::decoder::{Decoder, DecodingResult};
    use tiff::encoder::colortype::Gray32Float;
    use tiff::encoder::{Rational, TiffEncoder};
    use tiff::tags::{ResolutionUnit, Tag};

    /// Reads a two-page grayscale TIFF into a pair of f32 planes.
    ///
    /// Rejects files with any other page count, non-grayscale pages, or pages
    /// of differing size.
    pub fn read_two_channel_tiff(path: &Path) -> Result<TwoChannelImage, RatioVisionError> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let spacing = read_pixel_spacing(&mut decoder);
        let channel1 = read_gray_plane(&mut decoder)?;
        if !decoder.more_images() {
            return Err(RatioVisionError::Decode(format!(
                "{}: expected 2 channel planes, found 1",
                path.display()
            )));
        }
        decoder.next_image()?;
        let channel2 = read_gray_plane(&mut decoder)?;
        if decoder.more_images() {
            return Err(RatioVisionError::Decode(format!(
                "{}: expected 2 channel planes, found more",
                path.display()
            )));
        }
        if channel1.width() != channel2.width() || channel1.height() != channel2.height() {
            return Err(RatioVisionError::Decode(format!(
                "{}: channel planes differ in size ({}x{} vs {}x{})",
                path.display(),
                channel1.width(),
                channel1.height(),
                channel2.width(),
                channel2.height()
            )));
        }

        Ok(TwoChannelImage { channel1, channel2, spacing })
    }

    /// Writes planes as consecutive 32-bit float grayscale TIFF pages.
    pub fn write_planes_tiff(
        path: &Path,
        planes: &[&Plane],
        spacing: &PixelSpacing,
    ) -> Result<(), RatioVisionError> {
        let mut file = File::create(path)?;
        let mut encoder = TiffEncoder::new(&mut file)?;
        for plane in planes {
            let mut page = encoder.new_image::<Gray32Float>(plane.width(), plane.height())?;
            page.resolution_unit(ResolutionUnit::None);
            page.x_resolution(spacing_to_resolution(spacing.width));
            page.y_resolution(spacing_to_resolution(spacing.height));
            page.write_data(plane.data())?;
        }
        Ok(())
    }

    /// Saves an 8-bit PNG of a plane, stretched to its own value range. Used
    /// only by the cosmetic preview.
    pub fn save_preview_png(path: &Path, plane: &Plane) -> Result<(), image::error::ImageError> {
        let (min, max) = plane
            .data()
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = if max > min { max - min } else { 1.0 };
        let buffer: Vec<u8> = plane
            .data()
            .iter()
            .map(|&v| (((v - min) / span) * 255.0).round() as u8)
            .collect();

        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder.write_image(
            &buffer,
            plane.width(),
            plane.height(),
            image::ExtendedColorType::L8,
        )?;
        Ok(())
    }

    fn read_gray_plane(
        decoder: &mut Decoder<BufReader<File>>,
    ) -> Result<Plane, RatioVisionError> {
        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(RatioVisionError::Decode(format!(
                    "expected a grayscale plane, found {other:?}"
                )));
            }
        }
        let (width, height) = decoder.dimensions()?;
        let data: Vec<f32> = match decoder.read_image()? {
            DecodingResult::U8(samples) => samples.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U16(samples) => samples.into_iter().map(|v| v as f32).collect(),
            DecodingResult::U32(samples) => samples.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I8(samples) => samples.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I16(samples) => samples.into_iter().map(|v| v as f32).collect(),
            DecodingResult::I32(samples) => samples.into_iter().map(|v| v as f32).collect(),
            DecodingResult::F32(samples) => samples,
            DecodingResult::F64(samples) => samples.into_iter().map(|v| v as f32).collect(),
            _ => {
                return Err(RatioVisionError::Decode(String::from(
                    "unsupported sample format",
                )));
            }
        };
        if data.len() != (width as usize) * (height as usize) {
            return Err(RatioVisionError::Decode(format!(
                "plane buffer length {} does not match {width}x{height}",
                data.len()
            )));
        }
        Ok(Plane::from_data(width, height, data))
    }

    /// Pixel spacing from the resolution tags: spacing = 1 / resolution.
    /// Missing or degenerate tags fall back to the 1.0 px default.
    fn read_pixel_spacing(decoder: &mut Decoder<BufReader<File>>) -> PixelSpacing {
        let mut spacing = PixelSpacing::default();
        if let Some(width) = read_spacing_tag(decoder, Tag::XResolution) {
            spacing.width = width;
        }
        if let Some(height) = read_spacing_tag(decoder, Tag::YResolution) {
            spacing.height = height;
        }
        spacing
    }

    fn read_spacing_tag(decoder: &mut Decoder<BufReader<File>>, tag: Tag) -> Option<f64> {
        match decoder.find_tag(tag) {
            Ok(Some(tiff::decoder::ifd::Value::Rational(numerator, denominator)))
                if numerator != 0 =>
            {
                Some(denominator as f64 / numerator as f64)
            }
            _ => None,
        }
    }

    /// Resolution tag value (pixels per unit) for a spacing (units per pixel).
    fn spacing_to_resolution(spacing: f64) -> Rational {
        if !(spacing > 0.0) {
            return Rational { n: 1, d: 1 };
        }
        const SCALE: f64 = 1_000_000.0;
        let denominator = (spacing * SCALE).round().clamp(1.0, u32::MAX as f64) as u32;
        Rational { n: SCALE as u32, d: denominator }
    }
}

#[cfg(test)]
mod tests {
    use super::image_helper::*;
    use crate::core_modules::plane::plane::{PixelSpacing, Plane};
    use crate::error::RatioVisionError;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ratio_vision_test_{name}"))
    }

    fn gradient_plane(width: u32, height: u32, offset: f32) -> Plane {
        let data = (0..width * height).map(|k| k as f32 + offset).collect();
        Plane::from_data(width, height, data)
    }

    #[test]
    fn two_plane_round_trip_preserves_samples_and_spacing() {
        let path = temp_path("round_trip.tif");
        let channel1 = gradient_plane(16, 12, 0.0);
        let channel2 = gradient_plane(16, 12, 1000.0);
        let spacing = PixelSpacing {
            unit: String::from("pixel"),
            width: 24.09,
            height: 24.09,
        };

        write_planes_tiff(&path, &[&channel1, &channel2], &spacing).expect("write failed");
        let image = read_two_channel_tiff(&path).expect("read failed");

        assert_eq!(image.channel1, channel1);
        assert_eq!(image.channel2, channel2);
        assert!((image.spacing.width - 24.09).abs() < 1e-4);
        assert!((image.spacing.height - 24.09).abs() < 1e-4);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn single_plane_file_is_a_decode_error() {
        let path = temp_path("single_plane.tif");
        let only = gradient_plane(8, 8, 0.0);
        write_planes_tiff(&path, &[&only], &PixelSpacing::default()).expect("write failed");

        let err = read_two_channel_tiff(&path).unwrap_err();
        assert!(matches!(err, RatioVisionError::Decode(_)));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn three_plane_file_is_a_decode_error() {
        let path = temp_path("three_planes.tif");
        let plane = gradient_plane(8, 8, 0.0);
        write_planes_tiff(&path, &[&plane, &plane, &plane], &PixelSpacing::default())
            .expect("write failed");

        assert!(read_two_channel_tiff(&path).is_err());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_two_channel_tiff(&temp_path("does_not_exist.tif")).unwrap_err();
        assert!(matches!(err, RatioVisionError::Io(_)));
    }

    #[test]
    fn preview_png_is_written() {
        let path = temp_path("preview.png");
        let plane = gradient_plane(10, 10, 0.0);
        save_preview_png(&path, &plane).expect("Error Saving File.");
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
