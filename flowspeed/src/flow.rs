//! # Dense optical flow
//!
//! Pyramidal polynomial expansion flow, as described by Gunnar Farnebäck in "Two-Frame Motion
//! Estimation Based on Polynomial Expansion", computed by OpenCV.

use crate::config::FlowConfig;
use crate::frame::{gray_to_mat, GrayFrame};
use crate::motion_field::FlowField;
use crate::prelude::v1::*;
use log::*;
use opencv::core::{Mat, Point2f};
use opencv::prelude::*;
use rayon::prelude::*;

/// Dense Farnebäck optical flow estimator.
///
/// The estimator holds no per-clip state. Matrices are created per frame pair, so pairs can be
/// processed on any thread.
#[derive(Clone, Debug)]
pub struct FlowEstimator {
    config: FlowConfig,
}

impl FlowEstimator {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    /// Estimate motion from `prev` to `next`.
    ///
    /// The resulting field holds, for every pixel of `prev`, its displacement in `next`.
    /// Frames of differing sizes produce a zero field. Pyramid levels whose smaller side would
    /// drop under 32 pixels are skipped.
    pub fn estimate(&self, prev: &GrayFrame, next: &GrayFrame) -> Result<FlowField> {
        let (width, height) = (prev.width() as usize, prev.height() as usize);

        if prev.dimensions() != next.dimensions() {
            warn!(
                "Cannot estimate flow between {:?} and {:?} frames",
                prev.dimensions(),
                next.dimensions()
            );
            return Ok(FlowField::new(width, height));
        }

        if width == 0 || height == 0 {
            return Ok(FlowField::new(width, height));
        }

        let cfg = &self.config;
        let mut flow = Mat::default();

        opencv::video::calc_optical_flow_farneback(
            &gray_to_mat(prev)?,
            &gray_to_mat(next)?,
            &mut flow,
            cfg.pyr_scale as f64,
            cfg.levels as i32,
            cfg.winsize as i32,
            cfg.iterations as i32,
            cfg.poly_n as i32,
            cfg.poly_sigma as f64,
            0,
        )?;

        let (dx, dy): (Vec<f32>, Vec<f32>) = flow
            .data_typed::<Point2f>()?
            .iter()
            .map(|p| (p.x, p.y))
            .unzip();

        if dx.len() != width * height {
            return Err(anyhow!(
                "Flow has {} vectors, expected {}",
                dx.len(),
                width * height
            ));
        }

        Ok(FlowField::from_components(width, &dx, &dy))
    }

    /// Estimate motion between every adjacent pair of frames.
    ///
    /// Pairs are processed in parallel. Returns one field less than there are frames.
    pub fn estimate_clip(&self, frames: &[GrayFrame]) -> Result<Vec<FlowField>> {
        let fields = frames
            .par_windows(2)
            .map(|pair| self.estimate(&pair[0], &pair[1]))
            .collect::<Result<Vec<_>>>()?;

        debug!("Estimated {} flow fields", fields.len());

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::mat_to_gray;
    use image::{GrayImage, Luma};
    use nalgebra::Vector2;
    use opencv::core::{Size, BORDER_DEFAULT};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Smooth random texture.
    fn texture(width: u32, height: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = GrayImage::from_fn(width, height, |_, _| Luma([rng.gen::<u8>()]));

        let mut smooth = Mat::default();
        opencv::imgproc::gaussian_blur(
            &gray_to_mat(&noise).unwrap(),
            &mut smooth,
            Size::new(9, 9),
            0.0,
            0.0,
            BORDER_DEFAULT,
        )
        .unwrap();

        mat_to_gray(&smooth).unwrap()
    }

    fn crop(img: &GrayImage, x0: u32, width: u32) -> GrayImage {
        GrayImage::from_fn(width, img.height(), |x, y| *img.get_pixel(x + x0, y))
    }

    /// Average flow over the central part of the field.
    fn mean_interior(flow: &FlowField, margin: usize) -> Vector2<f32> {
        let (width, height) = flow.dim();
        let inner = flow
            .iter()
            .filter(|&(x, y, _)| {
                x >= margin && y >= margin && x < width - margin && y < height - margin
            })
            .map(|(_, _, m)| m)
            .collect::<Vec<_>>();

        inner.iter().sum::<Vector2<f32>>() / inner.len() as f32
    }

    #[test]
    fn identical_frames_zero_flow() {
        let est = FlowEstimator::new(Default::default());
        let frame = texture(96, 96, 3);
        let flow = est.estimate(&frame, &frame).unwrap();

        assert_eq!(flow.dim(), (96, 96));
        assert!(flow.iter().all(|(_, _, m)| m.norm() < 1e-3));
    }

    #[test]
    fn recovers_horizontal_shift() {
        let est = FlowEstimator::new(Default::default());
        let big = texture(72, 64, 11);

        let prev = crop(&big, 4, 64);
        let next = crop(&big, 2, 64);

        let forward = mean_interior(&est.estimate(&prev, &next).unwrap(), 16);
        assert!((forward.x - 2.0).abs() < 0.5, "{forward:?}");
        assert!(forward.y.abs() < 0.5, "{forward:?}");

        let backward = mean_interior(&est.estimate(&next, &prev).unwrap(), 16);
        assert!((backward.x + 2.0).abs() < 0.5, "{backward:?}");
    }

    #[test]
    fn small_frames_are_finite() {
        let est = FlowEstimator::new(Default::default());

        for (w, h) in [(6, 6), (7, 11), (40, 9)] {
            let a = GrayImage::from_fn(w, h, |x, y| Luma([(x * 30 + y * 11) as u8]));
            let b = GrayImage::from_fn(w, h, |x, y| Luma([(x * 17 + y * 40) as u8]));
            let flow = est.estimate(&a, &b).unwrap();
            assert_eq!(flow.dim(), (w as usize, h as usize));
            assert!(flow.as_slice().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn clip_has_one_field_per_pair() {
        let est = FlowEstimator::new(Default::default());
        let frames = (0..4).map(|s| texture(16, 16, s)).collect::<Vec<_>>();

        assert_eq!(est.estimate_clip(&frames).unwrap().len(), 3);
        assert!(est.estimate_clip(&frames[..1]).unwrap().is_empty());
        assert!(est.estimate_clip(&[]).unwrap().is_empty());
    }

    #[test]
    fn mismatched_frames_zero_flow() {
        let est = FlowEstimator::new(Default::default());
        let flow = est
            .estimate(&texture(8, 8, 1), &texture(9, 8, 1))
            .unwrap();
        assert_eq!(flow.dim(), (8, 8));
        assert!(flow.magnitudes().positive().next().is_none());
    }
}
