//! RGBA image data and CPU reference filters.
//!
//! The compute filter program checks its GPU output against
//! [`Filter::apply_cpu`], so the formulas here must stay in sync with
//! `filter.comp`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::{ImageFormat, RgbaImage};

use crate::error::{Error, Result};

/// Tightly packed RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Wrap existing pixels, checking that the buffer matches the extent.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 {
            return Err(Error::InvalidData(format!(
                "image extent {width}x{height} is empty"
            )));
        }
        if pixels.len() != expected {
            return Err(Error::InvalidData(format!(
                "expected {expected} bytes for {width}x{height} RGBA, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode an image file and convert it to RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }

    /// Encode as PNG, creating parent directories as needed.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let img = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| Error::InvalidData("pixel buffer does not match extent".into()))?;
        img.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Procedural checkerboard, used when no texture file is given.
    pub fn checkerboard(width: u32, height: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let even = ((x / cell) + (y / cell)) % 2 == 0;
                pixels.extend_from_slice(if even { &a } else { &b });
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> u64 {
        self.pixels.len() as u64
    }

    /// Pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// Largest per-channel difference to `other`, or `None` if the extents differ.
    pub fn max_channel_difference(&self, other: &Self) -> Option<u8> {
        if self.width != other.width || self.height != other.height {
            return None;
        }
        Some(
            self.pixels
                .iter()
                .zip(&other.pixels)
                .map(|(a, b)| a.abs_diff(*b))
                .max()
                .unwrap_or(0),
        )
    }
}

/// Colour filters implemented by `filter.comp`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    #[default]
    Grayscale,
    Invert,
    Sepia,
}

impl Filter {
    pub const ALL: [Self; 3] = [Self::Grayscale, Self::Invert, Self::Sepia];

    /// Code passed to the shader as a push constant.
    pub const fn id(self) -> u32 {
        match self {
            Self::Grayscale => 0,
            Self::Invert => 1,
            Self::Sepia => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Invert => "invert",
            Self::Sepia => "sepia",
        }
    }

    /// Apply the filter on the CPU.
    pub fn apply_cpu(self, image: &ImageData) -> ImageData {
        let mut pixels = Vec::with_capacity(image.pixels.len());
        for px in image.pixels.chunks_exact(4) {
            pixels.extend_from_slice(&self.apply_pixel([px[0], px[1], px[2], px[3]]));
        }
        ImageData {
            width: image.width,
            height: image.height,
            pixels,
        }
    }

    fn apply_pixel(self, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
        let [r, g, b] = [r, g, b].map(|c| f32::from(c) / 255.0);
        let rgb = match self {
            Self::Grayscale => {
                let luma = 0.0722f32.mul_add(b, 0.2126f32.mul_add(r, 0.7152 * g));
                [luma; 3]
            }
            Self::Invert => [1.0 - r, 1.0 - g, 1.0 - b],
            Self::Sepia => [
                0.189f32.mul_add(b, 0.393f32.mul_add(r, 0.769 * g)),
                0.168f32.mul_add(b, 0.349f32.mul_add(r, 0.686 * g)),
                0.131f32.mul_add(b, 0.272f32.mul_add(r, 0.534 * g)),
            ],
        };
        let [r, g, b] = rgb.map(to_unorm8);
        [r, g, b, a]
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_unorm8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|filter| filter.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "unknown filter '{s}' (expected grayscale, invert or sepia)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(px: [u8; 4]) -> ImageData {
        ImageData::new(1, 1, px.to_vec()).unwrap()
    }

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(ImageData::new(2, 2, vec![0; 15]).is_err());
        assert!(ImageData::new(0, 2, Vec::new()).is_err());
        assert!(ImageData::new(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn grayscale_uses_rec709_luma() {
        let white = Filter::Grayscale.apply_cpu(&single([255, 255, 255, 255]));
        assert_eq!(white.pixels, vec![255, 255, 255, 255]);

        let red = Filter::Grayscale.apply_cpu(&single([255, 0, 0, 7]));
        assert_eq!(red.pixels, vec![54, 54, 54, 7]);
    }

    #[test]
    fn invert_preserves_alpha() {
        let out = Filter::Invert.apply_cpu(&single([10, 20, 30, 40]));
        assert_eq!(out.pixels, vec![245, 235, 225, 40]);
    }

    #[test]
    fn sepia_clamps_to_white() {
        let out = Filter::Sepia.apply_cpu(&single([255, 255, 255, 255]));
        assert_eq!(out.pixels, vec![255, 255, 239, 255]);
    }

    #[test]
    fn filter_names_parse_case_insensitively() {
        assert_eq!("GrayScale".parse::<Filter>().unwrap(), Filter::Grayscale);
        assert_eq!("invert".parse::<Filter>().unwrap(), Filter::Invert);
        assert!("blur".parse::<Filter>().is_err());
        assert_eq!(Filter::Sepia.to_string(), "sepia");
    }

    #[test]
    fn filter_ids_are_distinct() {
        let ids: Vec<u32> = Filter::ALL.iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let a = [255, 255, 255, 255];
        let b = [0, 0, 0, 255];
        let board = ImageData::checkerboard(8, 8, 4, a, b);
        assert_eq!(board.byte_len(), 8 * 8 * 4);
        assert_eq!(board.pixel(0, 0), a);
        assert_eq!(board.pixel(4, 0), b);
        assert_eq!(board.pixel(4, 4), a);
    }

    #[test]
    fn channel_difference_requires_matching_extent() {
        let a = single([10, 10, 10, 255]);
        let b = single([12, 9, 10, 255]);
        assert_eq!(a.max_channel_difference(&b), Some(2));

        let wide = ImageData::checkerboard(2, 1, 1, [0; 4], [0; 4]);
        assert_eq!(a.max_channel_difference(&wide), None);
    }

    #[test]
    fn png_save_and_load() {
        let dir = std::env::temp_dir().join(format!("smv-core-png-{}", std::process::id()));
        let path = dir.join("nested").join("board.png");
        let board = ImageData::checkerboard(6, 4, 2, [255, 0, 0, 255], [0, 0, 255, 255]);

        board.save_png(&path).unwrap();
        let loaded = ImageData::load(&path).unwrap();
        assert_eq!(loaded, board);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn loading_missing_file_is_not_found() {
        let err = ImageData::load("definitely/not/here.png").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
