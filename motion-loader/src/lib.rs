//! Common `Decoder` instance loader.

use av_decoder::AvDecoder;
use flowspeed::prelude::v1::*;
use log::*;
use std::path::Path;

/// Create a decoder depending on the input.
///
/// Animated GIFs are decoded in-process, everything else is handed to FFmpeg.
pub fn create_decoder(data: Vec<u8>) -> Result<Box<dyn Decoder>> {
    if GifDecoder::has_signature(&data) {
        debug!("Decoding {} bytes as GIF", data.len());
        Ok(Box::new(GifDecoder::try_new(data)?))
    } else {
        debug!("Decoding {} bytes with FFmpeg", data.len());
        Ok(Box::new(AvDecoder::from_bytes(&data)?))
    }
}

/// Read a file and create a decoder for its contents.
pub fn open_decoder(path: impl AsRef<Path>) -> Result<Box<dyn Decoder>> {
    let path = path.as_ref();
    let data =
        std::fs::read(path).map_err(|e| anyhow!("Unable to read {}: {e}", path.display()))?;
    create_decoder(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba, RgbaImage};

    fn gif(frames: usize) -> Vec<u8> {
        let mut buf = vec![];
        {
            let mut encoder = GifEncoder::new(&mut buf);
            for i in 0..frames {
                let v = (i * 40) as u8;
                encoder
                    .encode_frame(Frame::from_parts(
                        RgbaImage::from_pixel(5, 3, Rgba([v, v, v, 255])),
                        0,
                        0,
                        Delay::from_numer_denom_ms(100, 1),
                    ))
                    .unwrap();
            }
        }
        buf
    }

    #[test]
    fn picks_gif_decoder() {
        let mut decoder = create_decoder(gif(4)).unwrap();

        let mut count = 0;
        while let Some(frame) = decoder.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (5, 3));
            count += 1;
        }

        assert_eq!(count, 4);
        assert_eq!(decoder.get_aspect(), Some((5, 3)));
    }

    #[test]
    fn unknown_data_fails() {
        assert!(create_decoder(b"\x00\x01 not a clip".to_vec()).is_err());
    }

    #[test]
    fn missing_file_fails() {
        assert!(open_decoder("/nonexistent/clip.mp4").is_err());
    }
}
