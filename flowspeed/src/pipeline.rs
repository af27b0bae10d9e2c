//! # Motion analysis pipeline
//!
//! Runs all stages over a single clip:
//!
//! 1. Sample every n-th frame from the decoder.
//! 2. Preprocess the frames.
//! 3. Segment foreground and estimate flow between adjacent frames, concurrently.
//! 4. Mask flow magnitudes by the foreground of the later frame and reduce them.
//! 5. Render the last magnitude field over its frame.

use crate::aggregate::{MotionAggregator, SpeedStats};
use crate::config::PipelineConfig;
use crate::decoder::{Decoder, FrameVec};
use crate::flow::FlowEstimator;
use crate::frame::RawFrame;
use crate::motion_field::MagnitudeField;
use crate::preprocess::Preprocessor;
use crate::prelude::v1::Result;
use crate::sampler::{FrameSampler, SampledClip};
use crate::segment::Segmenter;
use crate::visualise::{representative_index, Overlay};
use log::*;
use rayon::prelude::*;

/// Result of analysing a clip.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionReport {
    pub stats: SpeedStats,
    /// JPEG encoded heatmap overlay.
    pub overlay_jpeg: Vec<u8>,
    pub overlay_width: u32,
    pub overlay_height: u32,
    /// Number of frames that went through the analysis.
    pub sampled_frames: usize,
    /// Framerate of the source, if known.
    pub framerate: Option<f64>,
}

/// Configured motion analysis pipeline.
///
/// Holds no per-clip state, every analysis starts from scratch.
#[derive(Clone, Debug)]
pub struct MotionPipeline {
    config: PipelineConfig,
    estimator: FlowEstimator,
}

impl MotionPipeline {
    /// Create a new pipeline.
    ///
    /// Fails if the configuration is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            estimator: FlowEstimator::new(config.flow),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse a clip from a decoder.
    ///
    /// Decoding problems do not fail the analysis, they shorten the clip instead. Errors come
    /// from the image processing stages or the overlay encoding.
    pub fn analyse(&self, decoder: &mut dyn Decoder) -> Result<MotionReport> {
        let clip = FrameSampler::new(self.config.every_nth).sample(decoder);
        self.analyse_clip(clip)
    }

    /// Analyse frames that were already sampled.
    ///
    /// Frames whose size differs from the first one are dropped.
    pub fn analyse_frames(
        &self,
        frames: Vec<RawFrame>,
        framerate: Option<f64>,
    ) -> Result<MotionReport> {
        let mut clip = FrameSampler::new(1).sample(&mut FrameVec::new(frames));
        clip.framerate = framerate;
        self.analyse_clip(clip)
    }

    fn analyse_clip(&self, clip: SampledClip) -> Result<MotionReport> {
        let mut preprocessor = Preprocessor::new(self.config.preprocess);
        let gray = preprocessor.process_clip(&clip.frames)?;

        // The background model stays on the thread that created it.
        let segmenter_config = self.config.segmenter;
        let (masks, flows) = rayon::join(
            || Segmenter::new(segmenter_config).and_then(|mut s| s.apply_clip(&gray)),
            || self.estimator.estimate_clip(&gray),
        );
        let (masks, flows) = (masks?, flows?);

        let magnitudes = flows
            .par_iter()
            .zip(masks.par_iter().skip(1))
            .map(|(flow, mask)| {
                let mut mag = flow.magnitudes();
                mag.apply_mask(mask);
                mag
            })
            .collect::<Vec<_>>();

        let mut aggregator = MotionAggregator::new();
        aggregator.extend(&magnitudes);
        let stats = aggregator.finish();

        debug!(
            "{} frames, {} flow fields, {} speed samples",
            clip.len(),
            flows.len(),
            stats.samples
        );

        let field = magnitudes.into_iter().last().unwrap_or_else(|| {
            let (width, height) = gray
                .first()
                .map(|g| (g.width() as usize, g.height() as usize))
                .unwrap_or((1, 1));
            MagnitudeField::zeros(width, height)
        });

        let frame = representative_index(clip.len(), flows.len()).map(|i| &clip.frames[i]);
        let overlay = Overlay::render(frame, &field, &self.config.overlay)?;
        let overlay_jpeg = overlay.encode_jpeg(self.config.overlay.jpeg_quality as u8)?;

        info!(
            "Speed max {:.3} min {:.3} avg {:.3}",
            stats.max_speed, stats.min_speed, stats.avg_speed
        );

        Ok(MotionReport {
            stats,
            overlay_jpeg,
            overlay_width: overlay.width(),
            overlay_height: overlay.height(),
            sampled_frames: clip.len(),
            framerate: clip.framerate,
        })
    }
}
