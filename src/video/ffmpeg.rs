//! ffmpeg/ffprobe-backed video decoding.
//!
//! Metadata comes from `ffprobe -show_streams -of json`; frames are read as
//! raw rgb24 from an `ffmpeg` child process writing to stdout. Both tools
//! must be on PATH.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use super::{VideoReader, VideoSource};

pub struct FfmpegVideoSource;

impl FfmpegVideoSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FfmpegVideoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
    #[serde(default)]
    r_frame_rate: String,
    #[serde(default)]
    nb_frames: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

/// Parse an ffprobe rational like "30000/1001" into frames per second.
fn parse_frame_rate(rate: &str) -> f64 {
    let mut parts = rate.splitn(2, '/');
    let num: f64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0.0);
    let den: f64 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1.0);
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn probe(path: &Path) -> Result<ProbeStream> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,r_frame_rate,nb_frames,duration")
        .arg("-of")
        .arg("json")
        .arg(path)
        .output()
        .context("Failed to run ffprobe")?;

    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe failed for {:?}: {}",
            path,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let probed: ProbeOutput =
        serde_json::from_slice(&output.stdout).context("Failed to parse ffprobe output")?;

    probed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No video stream in {:?}", path))
}

pub struct FfmpegReader {
    child: Child,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: i64,
}

impl VideoSource for FfmpegVideoSource {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoReader>> {
        let stream = probe(path)?;
        let fps = parse_frame_rate(&stream.r_frame_rate);

        // Some containers omit nb_frames; estimate from duration * fps
        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse::<i64>().ok())
            .or_else(|| {
                stream
                    .duration
                    .as_deref()
                    .and_then(|d| d.parse::<f64>().ok())
                    .map(|d| (d * fps).round() as i64)
            })
            .unwrap_or(0);

        let mut child = Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(path)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("pipe:1")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        if child.stdout.is_none() {
            let _ = child.kill();
            return Err(anyhow!("Failed to capture ffmpeg stdout"));
        }

        Ok(Box::new(FfmpegReader {
            child,
            width: stream.width,
            height: stream.height,
            fps,
            frame_count,
        }))
    }
}

impl VideoReader for FfmpegReader {
    fn frame_count(&self) -> i64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg stdout closed"))?;

        let frame_len = (self.width * self.height * 3) as usize;
        let mut buf = vec![0u8; frame_len];

        let mut read = 0;
        while read < frame_len {
            match stdout.read(&mut buf[read..]) {
                Ok(0) => {
                    // stream ended; a partial trailing frame is dropped
                    return Ok(None);
                }
                Ok(n) => read += n,
                Err(e) => return Err(e).context("Failed to read frame from ffmpeg"),
            }
        }

        let frame = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| anyhow!("Frame buffer size mismatch"))?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
