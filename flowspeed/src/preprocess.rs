//! # Frame preprocessing
//!
//! Turns decoded colour frames into normalised single channel frames. Conversion, blurring
//! and equalization are stateless, while frame differencing keeps a reference frame.

use crate::config::{DiffOrder, DiffReference, PreprocessConfig};
use crate::frame::{gray_to_mat, mat_to_gray, to_gray, GrayFrame, RawFrame};
use crate::prelude::v1::Result;
use image::GrayImage;
use log::*;
use opencv::core::{self, Mat, Size, BORDER_DEFAULT};
use opencv::imgproc;
use rayon::prelude::*;

fn blur_mat(src: &Mat, ksize: usize) -> Result<Mat> {
    let mut out = Mat::default();
    let ksize = Size::new(ksize as i32, ksize as i32);
    imgproc::gaussian_blur(src, &mut out, ksize, 0.0, 0.0, BORDER_DEFAULT)?;
    Ok(out)
}

fn equalize_mat(src: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::equalize_hist(src, &mut out)?;
    Ok(out)
}

fn is_empty(frame: &GrayFrame) -> bool {
    frame.width() == 0 || frame.height() == 0
}

/// Global histogram equalization.
///
/// The lowest occupied intensity maps to 0 and the highest to 255. Constant images are
/// returned unchanged.
pub fn equalize_hist(src: &GrayFrame) -> Result<GrayFrame> {
    if is_empty(src) {
        return Ok(src.clone());
    }

    mat_to_gray(&equalize_mat(&gray_to_mat(src)?)?)
}

/// Per-pixel absolute difference of two equally sized frames.
pub fn abs_diff(a: &GrayFrame, b: &GrayFrame) -> Result<GrayFrame> {
    if is_empty(a) {
        return Ok(a.clone());
    }

    let mut out = Mat::default();
    core::absdiff(&gray_to_mat(a)?, &gray_to_mat(b)?, &mut out)?;
    mat_to_gray(&out)
}

/// Stateful frame preprocessor.
///
/// A single preprocessor must only see the frames of one clip, in order. Call
/// [`reset`](Self::reset) before reusing it.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    config: PreprocessConfig,
    reference: Option<GrayFrame>,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            config,
            reference: None,
        }
    }

    /// Forget the reference frame.
    pub fn reset(&mut self) {
        self.reference = None;
    }

    /// Preprocess a single frame.
    pub fn process(&mut self, frame: &RawFrame) -> Result<GrayFrame> {
        let gray = self.prepare(frame)?;
        self.finish(gray)
    }

    /// Preprocess all frames of a clip, starting from a clean state.
    ///
    /// Stateless steps run in parallel, differencing runs in frame order.
    pub fn process_clip(&mut self, frames: &[RawFrame]) -> Result<Vec<GrayFrame>> {
        self.reset();

        let prepared = frames
            .par_iter()
            .map(|f| self.prepare(f))
            .collect::<Result<Vec<_>>>()?;

        let out = prepared
            .into_iter()
            .map(|g| self.finish(g))
            .collect::<Result<Vec<_>>>()?;

        debug!("Preprocessed {} frames", out.len());

        Ok(out)
    }

    /// Stateless part of the preprocessing.
    fn prepare(&self, frame: &RawFrame) -> Result<GrayFrame> {
        let gray = to_gray(frame)?;

        if is_empty(&gray) {
            return Ok(gray);
        }

        let mut mat = gray_to_mat(&gray)?;

        if self.config.blur_ksize > 1 {
            mat = blur_mat(&mat, self.config.blur_ksize)?;
        }

        if self.config.hist_eq && self.config.diff_order == DiffOrder::EqualizeThenDiff {
            mat = equalize_mat(&mat)?;
        }

        mat_to_gray(&mat)
    }

    /// Differencing and everything that follows it.
    fn finish(&mut self, gray: GrayFrame) -> Result<GrayFrame> {
        let diffed = if self.config.frame_diff {
            let reference = self
                .reference
                .take()
                .filter(|r| r.dimensions() == gray.dimensions());

            // Without a reference the first frame is compared with itself.
            let diffed = match (reference, self.config.diff_reference) {
                (Some(reference), _) => abs_diff(&reference, &gray)?,
                (None, DiffReference::PreviousFrame) => {
                    GrayImage::new(gray.width(), gray.height())
                }
                (None, DiffReference::PreviousOutput) => gray.clone(),
            };

            self.reference = Some(match self.config.diff_reference {
                DiffReference::PreviousFrame => gray,
                DiffReference::PreviousOutput => diffed.clone(),
            });

            diffed
        } else {
            gray
        };

        match self.config.diff_order {
            DiffOrder::DiffThenEqualize if self.config.hist_eq => equalize_hist(&diffed),
            _ => Ok(diffed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::filled_gray;
    use image::{Luma, Rgb};

    fn raw(value: u8) -> RawFrame {
        RawFrame::from_pixel(8, 8, Rgb([value, value, value]))
    }

    fn textured(seed: u32) -> RawFrame {
        RawFrame::from_fn(16, 16, |x, y| {
            let v = ((x * 13 + y * 7 + seed * 29) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        })
    }

    fn plain() -> PreprocessConfig {
        PreprocessConfig {
            blur_ksize: 1,
            hist_eq: false,
            frame_diff: false,
            ..Default::default()
        }
    }

    #[test]
    fn equalize_constant() {
        let img = filled_gray(4, 4, 93);
        assert_eq!(equalize_hist(&img).unwrap(), img);
    }

    #[test]
    fn equalize_stretches_range() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8 * 10]));
        assert_eq!(equalize_hist(&img).unwrap().as_raw(), &vec![0, 85, 170, 255]);
    }

    #[test]
    fn equalize_two_levels() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([if x < 3 { 10 } else { 20 }]));
        assert_eq!(equalize_hist(&img).unwrap().as_raw(), &vec![0, 0, 0, 255]);
    }

    #[test]
    fn diff_is_symmetric() {
        let a = filled_gray(2, 2, 30);
        let b = filled_gray(2, 2, 200);
        assert_eq!(abs_diff(&a, &b).unwrap(), filled_gray(2, 2, 170));
        assert_eq!(abs_diff(&b, &a).unwrap(), filled_gray(2, 2, 170));
    }

    #[test]
    fn blur_size_one_is_noop() {
        let frame = textured(1);
        let expected = to_gray(&frame).unwrap();
        let mut pre = Preprocessor::new(plain());
        assert_eq!(pre.process(&frame).unwrap(), expected);
    }

    #[test]
    fn blur_keeps_constant_and_spreads_impulse() {
        let mut pre = Preprocessor::new(PreprocessConfig {
            blur_ksize: 3,
            ..plain()
        });

        assert_eq!(pre.process(&raw(77)).unwrap(), filled_gray(8, 8, 77));

        let mut impulse = RawFrame::new(9, 9);
        impulse.put_pixel(4, 4, Rgb([255, 255, 255]));
        let out = pre.process(&impulse).unwrap();

        // 255 * 0.5 * 0.5
        assert_eq!(out.get_pixel(4, 4).0[0], 64);
        assert_eq!(out.get_pixel(3, 4), out.get_pixel(5, 4));
        assert_eq!(out.get_pixel(4, 3), out.get_pixel(4, 5));
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn previous_output_reference() {
        let mut pre = Preprocessor::new(PreprocessConfig {
            frame_diff: true,
            diff_reference: DiffReference::PreviousOutput,
            ..plain()
        });

        assert_eq!(pre.process(&raw(120)).unwrap(), filled_gray(8, 8, 120));
        assert_eq!(pre.process(&raw(100)).unwrap(), filled_gray(8, 8, 20));
        assert_eq!(pre.process(&raw(100)).unwrap(), filled_gray(8, 8, 80));

        pre.reset();
        assert_eq!(pre.process(&raw(100)).unwrap(), filled_gray(8, 8, 100));
    }

    #[test]
    fn previous_frame_reference() {
        let mut pre = Preprocessor::new(PreprocessConfig {
            frame_diff: true,
            diff_reference: DiffReference::PreviousFrame,
            ..plain()
        });

        assert_eq!(pre.process(&raw(120)).unwrap(), filled_gray(8, 8, 0));
        assert_eq!(pre.process(&raw(100)).unwrap(), filled_gray(8, 8, 20));
        assert_eq!(pre.process(&raw(100)).unwrap(), filled_gray(8, 8, 0));
        assert_eq!(pre.process(&raw(130)).unwrap(), filled_gray(8, 8, 30));
    }

    #[test]
    fn textured_static_clip_differences_to_zero() {
        let mut pre = Preprocessor::new(PreprocessConfig::default());
        let out = pre.process_clip(&vec![textured(3); 5]).unwrap();

        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|f| f.as_raw().iter().all(|&v| v == 0)));

        let mut pre = Preprocessor::new(PreprocessConfig {
            diff_reference: DiffReference::PreviousOutput,
            ..Default::default()
        });
        let out = pre.process_clip(&vec![textured(3); 3]).unwrap();

        assert!(out[0].as_raw().iter().any(|&v| v != 0));
        assert!(out[1].as_raw().iter().all(|&v| v == 0));
        assert_eq!(out[2], out[0]);
    }

    #[test]
    fn clip_matches_sequential() {
        let frames = (0..6).map(textured).collect::<Vec<_>>();

        for diff_order in [DiffOrder::EqualizeThenDiff, DiffOrder::DiffThenEqualize] {
            for diff_reference in [DiffReference::PreviousFrame, DiffReference::PreviousOutput] {
                let cfg = PreprocessConfig {
                    diff_order,
                    diff_reference,
                    ..Default::default()
                };

                let mut seq = Preprocessor::new(cfg);
                let expected = frames
                    .iter()
                    .map(|f| seq.process(f).unwrap())
                    .collect::<Vec<_>>();

                let mut par = Preprocessor::new(cfg);
                assert_eq!(par.process_clip(&frames).unwrap(), expected);
                assert_eq!(par.process_clip(&frames).unwrap(), expected);
            }
        }
    }

    #[test]
    fn diff_order_changes_output() {
        let frames = vec![
            RawFrame::from_fn(4, 1, |x, _| Rgb([[10, 20, 30, 40][x as usize]; 3])),
            RawFrame::from_fn(4, 1, |x, _| Rgb([[10, 25, 30, 60][x as usize]; 3])),
        ];

        let run = |diff_order| {
            let mut pre = Preprocessor::new(PreprocessConfig {
                blur_ksize: 1,
                diff_order,
                ..Default::default()
            });
            pre.process_clip(&frames).unwrap().pop().unwrap()
        };

        let eq_first = run(DiffOrder::EqualizeThenDiff);
        let diff_first = run(DiffOrder::DiffThenEqualize);

        // Both frames equalize to the same ramp.
        assert!(eq_first.as_raw().iter().all(|&v| v == 0));
        assert_eq!(diff_first.as_raw(), &vec![0, 128, 0, 255]);
    }
}
