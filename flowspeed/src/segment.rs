//! # Foreground segmentation
//!
//! Wraps OpenCV's adaptive Gaussian mixture background subtractor (MOG2). Every pixel keeps
//! a small mixture of Gaussians describing the intensities it has shown so far. Pixels that
//! no background mode explains are reported as foreground, and the raw model output is then
//! binarized and optionally cleaned up with 3x3 morphology.

use crate::config::SegmenterConfig;
use crate::frame::{gray_to_mat, mat_to_gray, ForegroundMask, GrayFrame, FOREGROUND};
use crate::prelude::v1::Result;
use image::GrayImage;
use log::*;
use opencv::core::{Mat, Point, Ptr, Size, BORDER_CONSTANT};
use opencv::prelude::*;
use opencv::{imgproc, video};

/// Raw model output for shadow pixels.
pub const SHADOW: u8 = 127;

fn is_empty(frame: &GrayImage) -> bool {
    frame.width() == 0 || frame.height() == 0
}

/// Produces binary foreground masks for a sequence of frames.
///
/// One segmenter must be used per clip, feeding frames in order. A frame of a different size
/// restarts the background model.
pub struct Segmenter {
    config: SegmenterConfig,
    model: Ptr<dyn video::BackgroundSubtractorMOG2>,
    frames: usize,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self> {
        let model = video::create_background_subtractor_mog2(
            config.history as i32,
            config.var_threshold as f64,
            config.detect_shadows,
        )?;

        Ok(Self {
            config,
            model,
            frames: 0,
        })
    }

    /// Update the background model with a frame and classify its pixels.
    ///
    /// Returns the raw classification: 0 for background, [`SHADOW`] for shadows and 255 for
    /// foreground. The very first frame of a model is learned with a rate of 0.5, so all of
    /// its pixels come out as foreground or shadow.
    pub fn apply_raw(&mut self, frame: &GrayFrame) -> Result<GrayImage> {
        if is_empty(frame) {
            return Ok(frame.clone());
        }

        let mut raw = Mat::default();
        video::BackgroundSubtractorMOG2::apply(
            &mut self.model,
            &gray_to_mat(frame)?,
            &mut raw,
            self.config.learning_rate as f64,
        )?;
        self.frames += 1;

        mat_to_gray(&raw)
    }

    /// Classify the next frame.
    pub fn apply(&mut self, frame: &GrayFrame) -> Result<ForegroundMask> {
        let raw = self.apply_raw(frame)?;
        let mut mask = threshold(&raw, self.config.threshold)?;

        if self.config.morph {
            mask = dilate(&dilate(&erode(&mask)?)?)?;
        }

        trace!(
            "Frame {}: {} foreground pixels",
            self.frames,
            mask.as_raw().iter().filter(|&&v| v == FOREGROUND).count()
        );

        Ok(mask)
    }

    /// Classify every frame of a clip in order.
    pub fn apply_clip(&mut self, frames: &[GrayFrame]) -> Result<Vec<ForegroundMask>> {
        let masks = frames
            .iter()
            .map(|f| self.apply(f))
            .collect::<Result<Vec<_>>>()?;
        debug!("Segmented {} frames", masks.len());
        Ok(masks)
    }
}

/// Binarize a raw model output. Values strictly above `cutoff` become foreground.
pub fn threshold(raw: &GrayImage, cutoff: usize) -> Result<ForegroundMask> {
    if is_empty(raw) {
        return Ok(raw.clone());
    }

    let mut out = Mat::default();
    imgproc::threshold(
        &gray_to_mat(raw)?,
        &mut out,
        cutoff as f64,
        FOREGROUND as f64,
        imgproc::THRESH_BINARY,
    )?;
    mat_to_gray(&out)
}

/// 3x3 rectangular morphology. Pixels outside the frame never affect the result.
fn morph3(src: &GrayImage, op: i32) -> Result<GrayImage> {
    if is_empty(src) {
        return Ok(src.clone());
    }

    let anchor = Point::new(-1, -1);
    let kernel = imgproc::get_structuring_element(imgproc::MORPH_RECT, Size::new(3, 3), anchor)?;

    let mut out = Mat::default();
    imgproc::morphology_ex(
        &gray_to_mat(src)?,
        &mut out,
        op,
        &kernel,
        anchor,
        1,
        BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;
    mat_to_gray(&out)
}

/// 3x3 erosion.
pub fn erode(src: &GrayImage) -> Result<GrayImage> {
    morph3(src, imgproc::MORPH_ERODE)
}

/// 3x3 dilation.
pub fn dilate(src: &GrayImage) -> Result<GrayImage> {
    morph3(src, imgproc::MORPH_DILATE)
}
