//! # Optical Flow Speed Estimation
//!
//! This library estimates apparent motion in a video clip. Frames are sampled from a
//! [`Decoder`](decoder::Decoder), preprocessed, separated into foreground and background,
//! and fed through a dense optical flow estimator. Flow magnitudes within the foreground are
//! reduced to speed statistics, and the last frame is rendered with a motion heatmap.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use flowspeed::prelude::v1::*;
//! ```

pub mod aggregate;
pub mod config;
pub mod decoder;
pub mod flow;
pub mod frame;
pub mod motion_field;
pub mod pipeline;
pub mod preprocess;
pub mod properties;
pub mod sampler;
pub mod segment;
pub mod visualise;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            aggregate::{MotionAggregator, SpeedStats},
            config::{
                DiffOrder, DiffReference, FlowConfig, OverlayConfig, PipelineConfig,
                PreprocessConfig, SegmenterConfig,
            },
            decoder::{Decoder, FrameVec, GifDecoder},
            flow::FlowEstimator,
            frame::{ForegroundMask, GrayFrame, RawFrame},
            motion_field::{FlowField, MagnitudeField},
            pipeline::{MotionPipeline, MotionReport},
            preprocess::Preprocessor,
            properties::{BoundedProp, Choice, Properties, Property, PropertyMut},
            sampler::{FrameSampler, SampledClip},
            segment::Segmenter,
            visualise::Overlay,
        };
        pub use anyhow::{anyhow, bail, Error, Result};
    }
}
