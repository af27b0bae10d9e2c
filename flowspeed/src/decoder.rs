//! # Video frame decoding

use crate::frame::{from_rgba, RawFrame};
use crate::prelude::v1::*;
use image::codecs::gif;
use image::AnimationDecoder;
use log::*;
use std::collections::VecDeque;
use std::io::Cursor;

/// Video frame decoder.
pub trait Decoder {
    /// Decode the next frame in the stream.
    ///
    /// Frames are returned in capture order. `Ok(None)` signals the end of the stream, and if
    /// there is an error while decoding, `Err` is returned.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Get the framerate of the stream.
    ///
    /// This will return `Some(framerate)` if it is known. On realtime streams it may
    /// not always be known. In such cases, `None` is returned.
    fn get_framerate(&self) -> Option<f64>;

    /// Get aspect ratio of the stream.
    ///
    /// This will return `Some((width, height))` if the aspect ratio is known. On rare
    /// cases it may not be known, which will then return `None`. Aspect ratio may change
    /// after the first frame is processed.
    fn get_aspect(&self) -> Option<(usize, usize)>;
}

impl<T: Decoder + ?Sized> Decoder for Box<T> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }

    fn get_framerate(&self) -> Option<f64> {
        (**self).get_framerate()
    }

    fn get_aspect(&self) -> Option<(usize, usize)> {
        (**self).get_aspect()
    }
}

/// Frames that are already in memory.
#[derive(Default)]
pub struct FrameVec {
    frames: VecDeque<RawFrame>,
    framerate: Option<f64>,
    aspect: Option<(usize, usize)>,
}

impl FrameVec {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        let aspect = frames
            .first()
            .map(|f| (f.width() as usize, f.height() as usize));

        Self {
            frames: frames.into(),
            framerate: None,
            aspect,
        }
    }

    /// Attach a known framerate to the frames.
    pub fn with_framerate(mut self, framerate: f64) -> Self {
        self.framerate = Some(framerate);
        self
    }
}

impl Decoder for FrameVec {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        Ok(self.frames.pop_front())
    }

    fn get_framerate(&self) -> Option<f64> {
        self.framerate
    }

    fn get_aspect(&self) -> Option<(usize, usize)> {
        self.aspect
    }
}

/// Animated GIF decoder.
///
/// Frames are fully composited, so every frame has the size of the logical screen.
pub struct GifDecoder {
    frames: image::Frames<'static>,
    framerate: Option<f64>,
    aspect: Option<(usize, usize)>,
}

impl GifDecoder {
    /// Whether the stream starts with a GIF signature.
    pub fn has_signature(data: &[u8]) -> bool {
        data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")
    }

    /// Open a GIF stream held in memory.
    pub fn try_new(data: Vec<u8>) -> Result<Self> {
        let decoder = gif::GifDecoder::new(Cursor::new(data))?;

        Ok(Self {
            frames: decoder.into_frames(),
            framerate: None,
            aspect: None,
        })
    }
}

impl Decoder for GifDecoder {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let frame = match self.frames.next() {
            Some(frame) => frame?,
            None => return Ok(None),
        };

        if self.framerate.is_none() {
            let (num, den) = frame.delay().numer_denom_ms();
            if num > 0 {
                self.framerate = Some(1000.0 * den as f64 / num as f64);
            }
        }

        let frame = from_rgba(frame.buffer());
        self.aspect = Some((frame.width() as usize, frame.height() as usize));

        trace!("Decoded {}x{} GIF frame", frame.width(), frame.height());

        Ok(Some(frame))
    }

    fn get_framerate(&self) -> Option<f64> {
        self.framerate
    }

    fn get_aspect(&self) -> Option<(usize, usize)> {
        self.aspect
    }
}
