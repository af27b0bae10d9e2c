//! # Frame sampling

use crate::decoder::Decoder;
use crate::frame::RawFrame;
use log::*;

/// Ordered subsequence of a clip's frames.
#[derive(Clone, Debug, Default)]
pub struct SampledClip {
    pub frames: Vec<RawFrame>,
    /// Framerate of the source stream, if the decoder knows it.
    pub framerate: Option<f64>,
}

impl SampledClip {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Keeps every n-th frame of a stream.
#[derive(Clone, Copy, Debug)]
pub struct FrameSampler {
    every_nth: usize,
}

impl FrameSampler {
    /// Create a new sampler.
    ///
    /// # Arguments
    ///
    /// * `every_nth` - stride between kept frames. Values below 1 are treated as 1.
    pub fn new(every_nth: usize) -> Self {
        Self {
            every_nth: every_nth.max(1),
        }
    }

    /// Decode the whole stream, keeping frames whose index is divisible by the stride.
    ///
    /// Decoding errors never propagate. Frames decoded before an error are kept, and
    /// frames whose size differs from the first kept frame are dropped.
    pub fn sample(&self, decoder: &mut dyn Decoder) -> SampledClip {
        let mut frames: Vec<RawFrame> = vec![];
        let mut index = 0usize;

        loop {
            let frame = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("Decoding stopped after {index} frames: {e}");
                    break;
                }
            };

            let keep = index % self.every_nth == 0;
            index += 1;

            if !keep {
                continue;
            }

            if let Some(first) = frames.first() {
                if first.dimensions() != frame.dimensions() {
                    warn!(
                        "Dropping frame {} with size {:?}, expected {:?}",
                        index - 1,
                        frame.dimensions(),
                        first.dimensions()
                    );
                    continue;
                }
            }

            trace!("Sampled frame {}", index - 1);

            frames.push(frame);
        }

        debug!(
            "Sampled {} of {} frames (every {})",
            frames.len(),
            index,
            self.every_nth
        );

        SampledClip {
            frames,
            framerate: decoder.get_framerate(),
        }
    }
}
