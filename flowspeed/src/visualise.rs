//! # Motion heatmap overlays
//!
//! Magnitudes are amplified, saturated to 8 bits, coloured with OpenCV's jet colour map (blue
//! for slow, red for fast) and blended over the frame they were measured on.

use crate::config::OverlayConfig;
use crate::frame::{blank_frame, mat_to_rgb, rgb_to_mat, RawFrame};
use crate::motion_field::MagnitudeField;
use crate::prelude::v1::*;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use opencv::core::{self, Mat, Scalar, Size, CV_32FC1};
use opencv::imgproc;
use opencv::prelude::*;

/// Amplify magnitudes and saturate them to an 8-bit matrix.
fn to_levels(field: &MagnitudeField, amplification: f32) -> Result<Mat> {
    let (width, height) = field.dim();

    let mut mags =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_32FC1, Scalar::all(0.0))?;
    mags.data_typed_mut::<f32>()?.copy_from_slice(field.as_slice());

    let mut levels = Mat::default();
    core::convert_scale_abs(&mags, &mut levels, amplification as f64, 0.0)?;

    Ok(levels)
}

/// Colour a magnitude field.
///
/// # Arguments
///
/// * `field` - magnitudes to colour.
/// * `amplification` - factor applied before saturating to 8 bits.
pub fn heatmap(field: &MagnitudeField, amplification: f32) -> Result<RgbImage> {
    let (width, height) = field.dim();

    if width == 0 || height == 0 {
        return Ok(RgbImage::new(width as u32, height as u32));
    }

    let mut bgr = Mat::default();
    imgproc::apply_color_map(
        &to_levels(field, amplification)?,
        &mut bgr,
        imgproc::COLORMAP_JET,
    )?;

    let mut rgb = Mat::default();
    imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    mat_to_rgb(&rgb)
}

/// Weighted per-channel sum of two equally sized images, saturated to 8 bits.
pub fn blend(a: &RgbImage, b: &RgbImage, a_weight: f32, b_weight: f32) -> Result<RgbImage> {
    if a.width() == 0 || a.height() == 0 {
        return Ok(a.clone());
    }

    let mut out = Mat::default();
    core::add_weighted(
        &rgb_to_mat(a)?,
        a_weight as f64,
        &rgb_to_mat(b)?,
        b_weight as f64,
        0.0,
        &mut out,
        -1,
    )?;

    mat_to_rgb(&out)
}

/// Resample an image to a different size by picking the nearest pixel.
fn resize_nearest(src: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if src.dimensions() == (width, height) {
        return Ok(src.clone());
    }

    if src.width() == 0 || src.height() == 0 || width == 0 || height == 0 {
        return Ok(RgbImage::new(width, height));
    }

    let mut out = Mat::default();
    imgproc::resize(
        &rgb_to_mat(src)?,
        &mut out,
        Size::new(width as i32, height as i32),
        0.0,
        0.0,
        imgproc::INTER_NEAREST,
    )?;

    mat_to_rgb(&out)
}

/// Index of the frame the overlay is drawn on.
///
/// This is the frame the last flow field ends on, or `None` when there are no frames.
pub fn representative_index(sampled: usize, flows: usize) -> Option<usize> {
    sampled.checked_sub(1).map(|last| last.min(flows))
}

/// Frame with a motion heatmap blended on top.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub image: RgbImage,
}

impl Overlay {
    /// Render the overlay.
    ///
    /// Without a frame a 1x1 black one is used. A field of a different size than the frame is
    /// stretched over it.
    pub fn render(
        frame: Option<&RawFrame>,
        field: &MagnitudeField,
        config: &OverlayConfig,
    ) -> Result<Self> {
        let frame = frame.cloned().unwrap_or_else(|| blank_frame(1, 1));
        let (width, height) = frame.dimensions();

        let heat = resize_nearest(&heatmap(field, config.amplification)?, width, height)?;

        Ok(Self {
            image: blend(&frame, &heat, config.frame_weight, config.heatmap_weight)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the overlay as a baseline JPEG.
    ///
    /// # Arguments
    ///
    /// * `quality` - JPEG quality in `[1; 100]`.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = vec![];
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));

        encoder.write_image(
            self.image.as_raw(),
            self.image.width(),
            self.image.height(),
            ExtendedColorType::Rgb8,
        )?;

        Ok(buffer)
    }
}
