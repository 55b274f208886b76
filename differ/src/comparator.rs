/*
 * SPDX-FileCopyrightText: 2025 Wavelens UG <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use argos_core::consts::{DEFAULT_FUZZ, NOISE_FLOOR};
use argos_core::error::JobError;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use std::path::{Path, PathBuf};
use thiserror::Error;

const HIGHLIGHT: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("image file {} does not exist", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to decode image {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write diff image {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl From<CompareError> for JobError {
    fn from(e: CompareError) -> Self {
        JobError::Unretryable(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompareOptions {
    /// Colour distance in `[0, 1]` below which two pixels count as equal.
    pub fuzz: f64,
    /// Scores below this collapse to zero.
    pub noise_floor: f64,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            fuzz: DEFAULT_FUZZ,
            noise_floor: NOISE_FLOOR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageDifference {
    pub width: u32,
    pub height: u32,
    pub pixels_different: u64,
    pub score: f64,
    /// Only present when `score > 0`.
    pub diff_image: Option<RgbaImage>,
}

/// Compares two images on the bounding canvas of both.
///
/// Smaller images are padded with transparent pixels anchored top-left and are
/// never scaled, so a size change shows up as a difference along the new edge.
pub fn compare_images(
    base: &DynamicImage,
    compare: &DynamicImage,
    options: &CompareOptions,
) -> ImageDifference {
    let width = base.width().max(compare.width());
    let height = base.height().max(compare.height());

    let base = pad_to_canvas(base, width, height);
    let compare = pad_to_canvas(compare, width, height);

    let mut diff_image = RgbaImage::new(width, height);
    let mut pixels_different = 0u64;

    for (x, y, pixel) in base.enumerate_pixels() {
        if color_distance(pixel, compare.get_pixel(x, y)) > options.fuzz {
            pixels_different += 1;
            diff_image.put_pixel(x, y, HIGHLIGHT);
        }
    }

    let area = u64::from(width) * u64::from(height);
    let score = if area == 0 {
        0.0
    } else {
        pixels_different as f64 / area as f64
    };
    let score = if score < options.noise_floor { 0.0 } else { score };

    ImageDifference {
        width,
        height,
        pixels_different,
        score,
        diff_image: (score > 0.0).then_some(diff_image),
    }
}

pub fn compare_files(
    base: &Path,
    compare: &Path,
    options: &CompareOptions,
) -> Result<ImageDifference, CompareError> {
    let base = load_image(base)?;
    let compare = load_image(compare)?;
    Ok(compare_images(&base, &compare, options))
}

pub fn write_diff_image(image: &RgbaImage, path: &Path) -> Result<(), CompareError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| CompareError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads only the image header.
pub fn image_dimensions(path: &Path) -> Result<(u32, u32), CompareError> {
    if !path.is_file() {
        return Err(CompareError::MissingFile(path.to_path_buf()));
    }

    image::image_dimensions(path).map_err(|source| CompareError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn load_image(path: &Path) -> Result<DynamicImage, CompareError> {
    if !path.is_file() {
        return Err(CompareError::MissingFile(path.to_path_buf()));
    }

    image::open(path).map_err(|source| CompareError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn pad_to_canvas(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
    let rgba = image.to_rgba8();
    if rgba.dimensions() == (width, height) {
        return rgba;
    }

    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, &rgba, 0, 0);
    canvas
}

/// Euclidean distance of alpha-premultiplied RGBA, normalised to `[0, 1]`.
fn color_distance(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    let a = premultiply(a);
    let b = premultiply(b);

    let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
    sum.sqrt() / 2.0
}

fn premultiply(pixel: &Rgba<u8>) -> [f64; 4] {
    let [r, g, b, a] = pixel.0.map(|channel| f64::from(channel) / 255.0);
    [r * a, g * a, b * a, a]
}
