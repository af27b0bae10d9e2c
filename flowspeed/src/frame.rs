//! # Frame representations
//!
//! All per-frame grids of a clip share the same width and height. Colour frames are kept
//! exactly as decoded, while the analysis stages work on single channel frames.
//!
//! Frames live in `image` buffers. Stages that run through OpenCV copy them into continuous
//! matrices and back with the helpers in this module.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage, RgbaImage};
use opencv::core::{Mat, Scalar, CV_8UC1, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;

/// Decoded colour frame.
pub type RawFrame = RgbImage;

/// Single channel intensity frame.
pub type GrayFrame = GrayImage;

/// Binary mask, with `255` marking foreground and `0` marking background.
pub type ForegroundMask = GrayImage;

/// Value used for foreground pixels in a [`ForegroundMask`].
pub const FOREGROUND: u8 = 255;

fn to_mat(width: u32, height: u32, typ: i32, data: &[u8]) -> Result<Mat> {
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(data);
    Ok(mat)
}

/// Copy a gray frame into an 8-bit single channel matrix.
pub(crate) fn gray_to_mat(frame: &GrayImage) -> Result<Mat> {
    to_mat(frame.width(), frame.height(), CV_8UC1, frame.as_raw())
}

/// Copy a colour frame into an 8-bit three channel matrix, keeping RGB channel order.
pub(crate) fn rgb_to_mat(frame: &RgbImage) -> Result<Mat> {
    to_mat(frame.width(), frame.height(), CV_8UC3, frame.as_raw())
}

/// Copy an 8-bit single channel matrix into a gray frame.
pub(crate) fn mat_to_gray(mat: &Mat) -> Result<GrayImage> {
    GrayImage::from_raw(mat.cols() as u32, mat.rows() as u32, mat.data_bytes()?.to_vec())
        .ok_or_else(|| anyhow!("Expected a single channel 8-bit matrix"))
}

/// Copy an 8-bit three channel RGB matrix into a colour frame.
pub(crate) fn mat_to_rgb(mat: &Mat) -> Result<RgbImage> {
    RgbImage::from_raw(mat.cols() as u32, mat.rows() as u32, mat.data_bytes()?.to_vec())
        .ok_or_else(|| anyhow!("Expected a three channel 8-bit matrix"))
}

/// Convert a colour frame into a luminance frame.
///
/// Uses BT.601 weights (`0.299 R + 0.587 G + 0.114 B`).
pub fn to_gray(frame: &RawFrame) -> Result<GrayFrame> {
    if frame.width() == 0 || frame.height() == 0 {
        return Ok(GrayImage::new(frame.width(), frame.height()));
    }

    let mut gray = Mat::default();
    imgproc::cvt_color(&rgb_to_mat(frame)?, &mut gray, imgproc::COLOR_RGB2GRAY, 0)?;
    mat_to_gray(&gray)
}

/// Drop the alpha channel of a decoded frame.
pub fn from_rgba(frame: &RgbaImage) -> RawFrame {
    let (width, height) = frame.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let p = frame.get_pixel(x, y).0;
        image::Rgb([p[0], p[1], p[2]])
    })
}

/// Create a black frame.
///
/// Used as the representative frame of clips that produced no frames at all.
pub fn blank_frame(width: u32, height: u32) -> RawFrame {
    RgbImage::new(width.max(1), height.max(1))
}

/// Create a gray frame filled with a constant value.
#[cfg(test)]
pub(crate) fn filled_gray(width: u32, height: u32, value: u8) -> GrayFrame {
    GrayImage::from_pixel(width, height, image::Luma([value]))
}
