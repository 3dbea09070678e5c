//! Brings HST cutouts and Galaxy Zoo photographs to a common square shape and `[0, 1]` range.

use std::fs;

use camino::Utf8Path;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageBuffer, Pixel, RgbImage};
use ndarray::{Array3, ArrayD, Axis, Ix2, Ix3, ShapeError};
use serde::Serialize;
use thiserror::Error;

use crate::config::BuildConfig;
use crate::domain::{NPY_EXT, SourceTag};
use crate::error::AstroError;
use crate::layout::{OutputLayout, ensure_dir, list_files, write_bytes_atomic};
use crate::npy::{decode_npy, encode_npy};
use crate::output::{ProgressEvent, ProgressSink, iso_timestamp};

const RESAMPLER: FilterType = FilterType::CatmullRom;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unsupported cutout shape {0:?}")]
    UnsupportedShape(Vec<usize>),

    #[error("cannot build a {width}x{height} image from the cutout")]
    ImageSize { width: usize, height: usize },

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub hst: usize,
    pub zoo: usize,
    pub image_size: u32,
    pub output_dir: String,
    pub finished_at: String,
}

/// Global min-max scaling over all elements.
///
/// Non-finite values are ignored when finding the range and map to 0. An array without a
/// finite range (constant or empty) becomes all zeros.
pub fn min_max_normalize(array: &ArrayD<f64>) -> ArrayD<f64> {
    let (min, max) = array
        .iter()
        .filter(|value| value.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &value| {
            (lo.min(value), hi.max(value))
        });
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        tracing::warn!("image has no dynamic range, writing zeros");
        return ArrayD::zeros(array.raw_dim());
    }
    array.mapv(|value| {
        if value.is_finite() {
            (value - min) / range
        } else {
            0.0
        }
    })
}

/// Normalizes one HST cutout to `(size, size, 3)`.
///
/// Accepts `(H, W)`, `(H, W, 1)` and `(H, W, 3)` arrays; single-channel data is repeated
/// across three channels before resampling.
pub fn normalize_hst(array: &ArrayD<f64>, size: u32) -> Result<Array3<f64>, NormalizeError> {
    let normalized = min_max_normalize(array);
    let shape = normalized.shape().to_vec();
    let unsupported = || NormalizeError::UnsupportedShape(shape.clone());
    let rgb = match shape.as_slice() {
        [_, _] => {
            let stacked = normalized.into_dimensionality::<Ix2>()?.insert_axis(Axis(2));
            let (height, width, _) = stacked.dim();
            stacked
                .broadcast((height, width, 3))
                .ok_or_else(unsupported)?
                .to_owned()
        }
        [_, _, 1] => {
            let cube = normalized.into_dimensionality::<Ix3>()?;
            let (height, width, _) = cube.dim();
            cube.broadcast((height, width, 3))
                .ok_or_else(unsupported)?
                .to_owned()
        }
        [_, _, 3] => normalized.into_dimensionality::<Ix3>()?,
        _ => return Err(unsupported()),
    };

    let (height, width, _) = rgb.dim();
    let raw: Vec<u8> = rgb.iter().map(|&value| quantize(value)).collect();
    let image = RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or(NormalizeError::ImageSize { width, height })?;
    renormalize(resize_to_array(&image, size)?)
}

/// Resizes a decoded photograph to `(size, size, C)` in 8-bit space, then normalizes.
///
/// `C` is the channel count of the source: 16-bit and float images are reduced to 8 bits per
/// channel without changing the number of channels.
pub fn normalize_zoo(image: &DynamicImage, size: u32) -> Result<Array3<f64>, NormalizeError> {
    let resized = match image.color().channel_count() {
        1 => resize_to_array(&image.to_luma8(), size)?,
        2 => resize_to_array(&image.to_luma_alpha8(), size)?,
        4 => resize_to_array(&image.to_rgba8(), size)?,
        _ => resize_to_array(&image.to_rgb8(), size)?,
    };
    renormalize(resized)
}

/// Runs both pipelines and writes arrays under `<dir_output>/hst` and `<dir_output>/zoo`.
pub fn build_dataset(
    config: &BuildConfig,
    sink: &dyn ProgressSink,
) -> Result<BuildSummary, AstroError> {
    let layout = OutputLayout::new(config.dir_output.clone());
    let hst_out = layout.source_dir(SourceTag::Hst);
    let zoo_out = layout.source_dir(SourceTag::Zoo);
    ensure_dir(&hst_out)?;
    ensure_dir(&zoo_out)?;

    let hst_inputs: Vec<_> = list_files(&config.dir_hst)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.ends_with(&config.hst_suffix))
        })
        .collect();
    sink.event(ProgressEvent::new(format!(
        "phase=Build; {} {} files",
        hst_inputs.len(),
        SourceTag::Hst
    )));
    for path in &hst_inputs {
        let bytes = read_input(path)?;
        let array = decode_npy(&bytes).map_err(|err| decode_error(path, err))?;
        let normalized = normalize_hst(&array, config.image_size)
            .map_err(|err| decode_error(path, err))?;
        let file_name = path.file_name().unwrap_or_default();
        write_bytes_atomic(
            &hst_out.join(file_name),
            &encode_npy(&normalized.into_dyn()),
        )?;
    }

    let zoo_inputs = list_files(&config.dir_zoo)?;
    sink.event(ProgressEvent::new(format!(
        "phase=Build; {} {} files",
        zoo_inputs.len(),
        SourceTag::Zoo
    )));
    for path in &zoo_inputs {
        let bytes = read_input(path)?;
        let image = image::load_from_memory(&bytes).map_err(|err| decode_error(path, err))?;
        let normalized =
            normalize_zoo(&image, config.image_size).map_err(|err| decode_error(path, err))?;
        let renamed = path.with_extension(NPY_EXT);
        let destination = zoo_out.join(renamed.file_name().unwrap_or_default());
        write_bytes_atomic(&destination, &encode_npy(&normalized.into_dyn()))?;
    }

    tracing::info!(
        hst = hst_inputs.len(),
        zoo = zoo_inputs.len(),
        size = config.image_size,
        "dataset build complete"
    );
    Ok(BuildSummary {
        hst: hst_inputs.len(),
        zoo: zoo_inputs.len(),
        image_size: config.image_size,
        output_dir: layout.root().to_string(),
        finished_at: iso_timestamp(),
    })
}

fn quantize(value: f64) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

fn resize_to_array<I>(image: &I, size: u32) -> Result<Array3<f64>, NormalizeError>
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8> + 'static,
{
    let resized: ImageBuffer<I::Pixel, Vec<u8>> = imageops::resize(image, size, size, RESAMPLER);
    let channels = usize::from(<I::Pixel as Pixel>::CHANNEL_COUNT);
    let side = size as usize;
    let values: Vec<f64> = resized.into_raw().into_iter().map(f64::from).collect();
    Ok(Array3::from_shape_vec((side, side, channels), values)?)
}

fn renormalize(array: Array3<f64>) -> Result<Array3<f64>, NormalizeError> {
    Ok(min_max_normalize(&array.into_dyn()).into_dimensionality::<Ix3>()?)
}

fn read_input(path: &Utf8Path) -> Result<Vec<u8>, AstroError> {
    fs::read(path.as_std_path()).map_err(|err| AstroError::Filesystem(format!("read {path}: {err}")))
}

fn decode_error(path: &Utf8Path, reason: impl ToString) -> AstroError {
    AstroError::Decode {
        file: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, ImageBuffer, Luma, Rgb, Rgba};
    use ndarray::{Array2, IxDyn};

    use super::*;

    #[test]
    fn constant_image_becomes_zeros() {
        let array = ArrayD::from_elem(IxDyn(&[4, 4]), 7.0);
        let normalized = min_max_normalize(&array);
        assert!(normalized.iter().all(|&value| value == 0.0));
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let array = ArrayD::from_shape_vec(IxDyn(&[4]), vec![2.0, f64::NAN, 4.0, 3.0]).unwrap();
        let normalized = min_max_normalize(&array);
        assert_eq!(normalized.as_slice().unwrap(), &[0.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn hst_cutout_is_resized_to_three_equal_channels() {
        let plane = Array2::from_shape_fn((100, 100), |(row, col)| {
            10.0 + 190.0 * ((row * 100 + col) as f64 / 9999.0)
        });
        let output = normalize_hst(&plane.into_dyn(), 64).unwrap();

        assert_eq!(output.dim(), (64, 64, 3));
        for ((row, col, _), _) in output.indexed_iter() {
            let red = output[[row, col, 0]];
            assert_eq!(red, output[[row, col, 1]]);
            assert_eq!(red, output[[row, col, 2]]);
        }
        let min = output.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = output.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert!(min.abs() < 1e-9);
        assert!((max - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hst_rejects_unsupported_shape() {
        let array = ArrayD::<f64>::zeros(IxDyn(&[2, 2, 2, 2]));
        assert!(matches!(
            normalize_hst(&array, 8),
            Err(NormalizeError::UnsupportedShape(shape)) if shape == vec![2, 2, 2, 2]
        ));
    }

    #[test]
    fn zoo_keeps_channel_count() {
        let rgb = RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8, y as u8, 200]));
        let output = normalize_zoo(&DynamicImage::ImageRgb8(rgb), 16).unwrap();
        assert_eq!(output.dim(), (16, 16, 3));

        let gray = GrayImage::from_fn(20, 20, |x, _| Luma([(x * 10) as u8]));
        let output = normalize_zoo(&DynamicImage::ImageLuma8(gray), 8).unwrap();
        assert_eq!(output.dim(), (8, 8, 1));
        assert!(output.iter().all(|value| (0.0..=1.0).contains(value)));
    }

    #[test]
    fn zoo_wide_pixels_keep_channel_count() {
        let gray16: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(20, 20, |x, _| Luma([x as u16 * 3000]));
        let output = normalize_zoo(&DynamicImage::ImageLuma16(gray16), 8).unwrap();
        assert_eq!(output.dim(), (8, 8, 1));

        let rgba16: ImageBuffer<Rgba<u16>, Vec<u16>> = ImageBuffer::from_fn(20, 20, |x, y| {
            Rgba([x as u16 * 3000, y as u16 * 3000, 1000, u16::MAX])
        });
        let output = normalize_zoo(&DynamicImage::ImageRgba16(rgba16), 8).unwrap();
        assert_eq!(output.dim(), (8, 8, 4));

        let gray_alpha = DynamicImage::ImageLumaA8(ImageBuffer::from_fn(12, 12, |x, _| {
            image::LumaA([x as u8 * 20, 255])
        }));
        assert_eq!(normalize_zoo(&gray_alpha, 8).unwrap().dim(), (8, 8, 2));
    }
}
