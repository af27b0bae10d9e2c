//! # Pipeline configuration
//!
//! Every stage has its own configuration section. By default every 5th frame is kept, blurred
//! with a 5x5 kernel, equalized and differenced. Foreground is cut at 20 with a 0.01 learning
//! rate, and flow runs on a 3 level Farnebäck pyramid.

use crate::properties::{Choice, Properties, PropertyMut};
use anyhow::{bail, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Order of histogram equalization and frame differencing.
///
/// Equalizing changes the dynamic range of the frames, so differencing equalized frames is not
/// the same as differencing the raw gray values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DiffOrder {
    /// Equalize every frame, then difference against the previous output.
    EqualizeThenDiff,
    /// Difference blurred gray frames, then equalize the difference image.
    DiffThenEqualize,
}

impl Default for DiffOrder {
    fn default() -> Self {
        Self::EqualizeThenDiff
    }
}

impl Choice for DiffOrder {
    fn variants() -> &'static [(&'static str, Self)] {
        &[
            ("equalize_then_diff", Self::EqualizeThenDiff),
            ("diff_then_equalize", Self::DiffThenEqualize),
        ]
    }
}

/// Frame that each preprocessed frame is differenced against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DiffReference {
    /// The previous frame before differencing. The first frame of a clip is its own reference,
    /// so static clips difference to zero throughout.
    PreviousFrame,
    /// The previous difference output. The first frame passes through undifferenced, and a
    /// static clip alternates between its frames and zero.
    PreviousOutput,
}

impl Default for DiffReference {
    fn default() -> Self {
        Self::PreviousFrame
    }
}

impl Choice for DiffReference {
    fn variants() -> &'static [(&'static str, Self)] {
        &[
            ("previous_frame", Self::PreviousFrame),
            ("previous_output", Self::PreviousOutput),
        ]
    }
}

/// Frame preprocessing settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PreprocessConfig {
    /// Gaussian blur kernel size. Must be odd, 1 disables blurring.
    pub blur_ksize: usize,
    /// Apply global histogram equalization.
    pub hist_eq: bool,
    /// Replace each frame with its absolute difference from a reference frame.
    pub frame_diff: bool,
    pub diff_order: DiffOrder,
    pub diff_reference: DiffReference,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            blur_ksize: 5,
            hist_eq: true,
            frame_diff: true,
            diff_order: DiffOrder::default(),
            diff_reference: DiffReference::default(),
        }
    }
}

impl Properties for PreprocessConfig {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            ("blur_ksize", PropertyMut::usize(&mut self.blur_ksize, 1, 99)),
            ("hist_eq", PropertyMut::bool(&mut self.hist_eq)),
            ("frame_diff", PropertyMut::bool(&mut self.frame_diff)),
            ("diff_order", PropertyMut::choice(&mut self.diff_order)),
            ("diff_reference", PropertyMut::choice(&mut self.diff_reference)),
        ]
    }
}

/// Background model and foreground mask settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SegmenterConfig {
    /// Background adaptation speed in `[0; 1]`. Negative values select an automatic rate
    /// derived from `history`.
    pub learning_rate: f32,
    /// Mask cutoff. Raw model outputs strictly above this become foreground.
    pub threshold: usize,
    /// Erode once and dilate twice after thresholding.
    pub morph: bool,
    /// Number of frames the automatic learning rate averages over.
    pub history: usize,
    /// Squared Mahalanobis distance under which a pixel is considered background.
    pub var_threshold: f32,
    /// Report shadows (darker, proportional pixels) as a separate, lower mask value.
    pub detect_shadows: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            threshold: 20,
            morph: false,
            history: 500,
            var_threshold: 16.0,
            detect_shadows: true,
        }
    }
}

impl Properties for SegmenterConfig {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            (
                "learning_rate",
                PropertyMut::float(&mut self.learning_rate, -1.0, 1.0),
            ),
            ("threshold", PropertyMut::usize(&mut self.threshold, 0, 254)),
            ("morph", PropertyMut::bool(&mut self.morph)),
            ("history", PropertyMut::usize(&mut self.history, 1, 100000)),
            (
                "var_threshold",
                PropertyMut::float(&mut self.var_threshold, 1.0, 1000.0),
            ),
            ("detect_shadows", PropertyMut::bool(&mut self.detect_shadows)),
        ]
    }
}

/// Farnebäck optical flow settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FlowConfig {
    /// Downscaling factor between pyramid levels.
    pub pyr_scale: f32,
    /// Number of pyramid levels above the full resolution one.
    pub levels: usize,
    /// Averaging window size.
    pub winsize: usize,
    /// Refinement passes per pyramid level.
    pub iterations: usize,
    /// Half-size of the polynomial expansion neighbourhood.
    pub poly_n: usize,
    /// Gaussian sigma weighting the polynomial fit.
    pub poly_sigma: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            winsize: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl Properties for FlowConfig {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            (
                "pyr_scale",
                PropertyMut::float(&mut self.pyr_scale, 0.01, 0.99),
            ),
            ("levels", PropertyMut::usize(&mut self.levels, 0, 16)),
            ("winsize", PropertyMut::usize(&mut self.winsize, 1, 255)),
            ("iterations", PropertyMut::usize(&mut self.iterations, 1, 100)),
            ("poly_n", PropertyMut::usize(&mut self.poly_n, 1, 15)),
            (
                "poly_sigma",
                PropertyMut::float(&mut self.poly_sigma, 0.0, 10.0),
            ),
        ]
    }
}

/// Heatmap overlay settings.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OverlayConfig {
    /// Multiplier applied to magnitudes before they are mapped to colours.
    pub amplification: f32,
    /// Blend weight of the original frame.
    pub frame_weight: f32,
    /// Blend weight of the heatmap.
    pub heatmap_weight: f32,
    pub jpeg_quality: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            amplification: 10.0,
            frame_weight: 0.6,
            heatmap_weight: 0.4,
            jpeg_quality: 95,
        }
    }
}

impl Properties for OverlayConfig {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            (
                "amplification",
                PropertyMut::float(&mut self.amplification, 0.0, 1000.0),
            ),
            (
                "frame_weight",
                PropertyMut::float(&mut self.frame_weight, 0.0, 1.0),
            ),
            (
                "heatmap_weight",
                PropertyMut::float(&mut self.heatmap_weight, 0.0, 1.0),
            ),
            (
                "jpeg_quality",
                PropertyMut::usize(&mut self.jpeg_quality, 1, 100),
            ),
        ]
    }
}

/// Full motion pipeline configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// Keep every n-th decoded frame.
    pub every_nth: usize,
    pub preprocess: PreprocessConfig,
    pub segmenter: SegmenterConfig,
    pub flow: FlowConfig,
    pub overlay: OverlayConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            every_nth: 5,
            preprocess: Default::default(),
            segmenter: Default::default(),
            flow: Default::default(),
            overlay: Default::default(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration with a custom sampling stride.
    pub fn with_stride(every_nth: usize) -> Self {
        Self {
            every_nth,
            ..Default::default()
        }
    }

    /// Reject configurations the pipeline cannot run with.
    ///
    /// This checks every property against its bounds, plus constraints that do not fit a
    /// simple range.
    pub fn validate(&self) -> Result<()> {
        let mut cfg = *self;
        cfg.validate_props()?;

        if cfg.preprocess.blur_ksize % 2 == 0 {
            bail!("blur_ksize must be odd, got {}", cfg.preprocess.blur_ksize);
        }

        Ok(())
    }
}

impl Properties for PipelineConfig {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        let mut props = vec![(
            "every_nth",
            PropertyMut::usize(&mut self.every_nth, 1, 100000),
        )];
        props.extend(self.preprocess.props_mut());
        props.extend(self.segmenter.props_mut());
        props.extend(self.flow.props_mut());
        props.extend(self.overlay.props_mut());
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.every_nth, 5);
        assert_eq!(cfg.preprocess.blur_ksize, 5);
        assert_eq!(cfg.segmenter.threshold, 20);
        assert_eq!(cfg.flow.winsize, 15);
    }

    #[test]
    fn rejects_even_kernel() {
        let mut cfg = PipelineConfig::default();
        cfg.preprocess.blur_ksize = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_stride() {
        assert!(PipelineConfig::with_stride(0).validate().is_err());
        assert!(PipelineConfig::with_stride(1).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_flow() {
        let mut cfg = PipelineConfig::default();
        cfg.flow.pyr_scale = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.flow.iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn flat_property_names() {
        let mut cfg = PipelineConfig::default();
        cfg.set_prop("winsize", "21").unwrap();
        cfg.set_prop("morph", "true").unwrap();
        cfg.set_prop("learning_rate", "0.05").unwrap();
        cfg.set_prop("diff_order", "diff_then_equalize").unwrap();
        cfg.set_prop("diff_reference", "previous_output").unwrap();
        assert_eq!(cfg.flow.winsize, 21);
        assert!(cfg.segmenter.morph);
        assert_eq!(cfg.segmenter.learning_rate, 0.05);
        assert_eq!(cfg.preprocess.diff_order, DiffOrder::DiffThenEqualize);
        assert_eq!(cfg.preprocess.diff_reference, DiffReference::PreviousOutput);
        assert!(cfg.set_prop("diff_order", "sideways").is_err());

        let names = cfg.props().into_iter().map(|(n, _)| n).collect::<Vec<_>>();
        let mut unique = names.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(names.len(), unique.len());
    }
}
