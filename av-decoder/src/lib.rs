//! FFmpeg backed frame decoder.
//!
//! The encoded clip is written into a private temporary file, inspected with `ffprobe`, and
//! decoded by an `ffmpeg` child process that streams raw `rgb24` frames over its stdout.

use flowspeed::prelude::v1::*;
use log::*;
use serde::Deserialize;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tempfile::NamedTempFile;

/// Properties of the first video stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub framerate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StreamList {
    #[serde(default)]
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Parse a frame rate of the form `30000/1001` or `29.97`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };

    Some(rate).filter(|r: &f64| r.is_finite() && *r > 0.0)
}

/// Extract stream properties from `ffprobe -print_format json` output.
pub fn parse_stream_info(json: &[u8]) -> Result<StreamInfo> {
    let output: StreamList = serde_json::from_slice(json)?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| anyhow!("No video stream found"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => bail!("Video stream has no frame size"),
    };

    let framerate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(StreamInfo {
        width,
        height,
        framerate,
    })
}

fn query_stream_info(path: &Path) -> Result<StreamInfo> {
    which::which("ffprobe").map_err(|_| anyhow!("ffprobe was not found in PATH"))?;

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()?;

    if !output.status.success() {
        bail!("ffprobe failed with {}", output.status);
    }

    parse_stream_info(&output.stdout)
}

/// Fill the buffer as far as the reader allows, returning the number of bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}

/// Read one packed `rgb24` frame.
///
/// Returns `None` once the stream ends. A trailing partial frame is discarded.
fn read_frame(reader: &mut impl Read, width: u32, height: u32) -> Result<Option<RawFrame>> {
    let mut buf = vec![0u8; width as usize * height as usize * 3];

    let read = read_full(reader, &mut buf)?;

    if read < buf.len() {
        if read > 0 {
            warn!("Discarding truncated frame ({read} of {} bytes)", buf.len());
        }
        return Ok(None);
    }

    RawFrame::from_raw(width, height, buf)
        .map(Some)
        .ok_or_else(|| anyhow!("Frame buffer size mismatch"))
}

/// Build the `ffmpeg` invocation streaming the first video stream of `path` as `rgb24`.
fn decode_command(path: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");

    // Frames must keep the coded size reported by ffprobe, so rotation metadata is ignored.
    cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate"])
        .arg("-i")
        .arg(path)
        .args(["-map", "0:v:0", "-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    cmd
}

/// Decoder for any container and codec FFmpeg understands.
pub struct AvDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    info: StreamInfo,
    finished: bool,
    // Removed on drop, after the child is gone.
    _file: NamedTempFile,
}

impl AvDecoder {
    /// Start decoding an in-memory clip.
    ///
    /// Fails if the FFmpeg tools are unavailable or the data holds no decodable video stream.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        which::which("ffmpeg").map_err(|_| anyhow!("ffmpeg was not found in PATH"))?;

        let mut file = tempfile::Builder::new().prefix("flowspeed-").tempfile()?;
        file.write_all(data)?;
        file.flush()?;

        let info = query_stream_info(file.path())?;

        debug!(
            "Decoding {}x{} stream at {:?} fps",
            info.width, info.height, info.framerate
        );

        let mut child = decode_command(file.path()).spawn()?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("Failed to capture ffmpeg output");
            }
        };

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            info,
            finished: false,
            _file: file,
        })
    }
}

impl Decoder for AvDecoder {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.finished {
            return Ok(None);
        }

        let StreamInfo { width, height, .. } = self.info;

        if let Some(frame) = read_frame(&mut self.stdout, width, height)? {
            return Ok(Some(frame));
        }

        self.finished = true;

        let status = self.child.wait()?;

        if status.success() {
            Ok(None)
        } else {
            Err(anyhow!("ffmpeg exited with {status}"))
        }
    }

    fn get_framerate(&self) -> Option<f64> {
        self.info.framerate
    }

    fn get_aspect(&self) -> Option<(usize, usize)> {
        Some((self.info.width as usize, self.info.height as usize))
    }
}

impl Drop for AvDecoder {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
