//! ffmpeg 解码 - 通过子进程管道读取 rgb24 原始帧

use crate::core::config::DEFAULT_MAX_FRAME_PIXELS;
use crate::core::error::{ExtractError, Result};
use crate::core::video::frame::{Frame, CHANNELS};
use crate::core::video::source::{FrameSource, VideoOpener};
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    /// 0.0 when the container does not report a rate.
    pub fps: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
}

impl VideoProbe {
    pub fn run(ffprobe: &Path, video: &Path) -> Result<Self> {
        let output = Command::new(ffprobe)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height,r_frame_rate"])
            .args(["-of", "json"])
            .arg(video)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ExtractError::Decode(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(ExtractError::Decode(format!(
                "ffprobe rejected {}: {}",
                video.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Self::parse(&output.stdout)
    }

    pub fn parse(json: &[u8]) -> Result<Self> {
        let probe: ProbeOutput = serde_json::from_slice(json)?;
        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::Decode("no video stream found".into()))?;

        match (stream.width, stream.height) {
            (Some(width), Some(height)) if width > 0 && height > 0 => Ok(Self {
                width,
                height,
                fps: stream
                    .r_frame_rate
                    .as_deref()
                    .map(parse_rate)
                    .unwrap_or(0.0),
            }),
            _ => Err(ExtractError::Decode(
                "video stream has no usable dimensions".into(),
            )),
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }
}

/// "30000/1001" -> 29.97
fn parse_rate(rate: &str) -> f64 {
    let mut parts = rate.splitn(2, '/');
    let num = parts.next().and_then(|n| n.trim().parse::<f64>().ok());
    let den = parts.next().map_or(Some(1.0), |d| d.trim().parse::<f64>().ok());
    match (num, den) {
        (Some(n), Some(d)) if d > 0.0 && n.is_finite() => n / d,
        _ => 0.0,
    }
}

/// Decodes a video through an `ffmpeg` child process.
#[derive(Debug)]
pub struct FfmpegFrameSource {
    path: PathBuf,
    probe: VideoProbe,
    child: Option<Child>,
    reader: Option<BufReader<ChildStdout>>,
    next_number: u64,
    finished: bool,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path) -> Result<Self> {
        FfmpegOpener::default().open_ffmpeg(path)
    }

    pub fn probe(&self) -> VideoProbe {
        self.probe
    }

    fn timestamp_ms(&self, frame_number: u64) -> u64 {
        if self.probe.fps > 0.0 {
            (frame_number as f64 * 1000.0 / self.probe.fps) as u64
        } else {
            0
        }
    }

    /// Reap the child at end of stream and surface a failed exit.
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(ExtractError::Decode(format!(
                    "ffmpeg exited with {} while decoding {}",
                    status,
                    self.path.display()
                )));
            }
        }
        debug!(
            "🎞️ {}: end of stream after {} frames",
            self.path.display(),
            self.next_number
        );
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };

        let mut buf = vec![0u8; self.probe.frame_len()];
        let read = match read_full(reader, &mut buf) {
            Ok(read) => read,
            Err(e) => {
                self.close();
                return Err(ExtractError::Decode(format!("failed reading frame data: {}", e)));
            }
        };

        if read == 0 {
            self.finish()?;
            return Ok(None);
        }
        if read < buf.len() {
            self.close();
            return Err(ExtractError::Decode(format!(
                "truncated frame {}: got {} of {} bytes",
                self.next_number,
                read,
                buf.len()
            )));
        }

        let number = self.next_number;
        self.next_number += 1;
        Ok(Some(Frame::new(
            self.probe.width,
            self.probe.height,
            buf,
            number,
            self.timestamp_ms(number),
        )))
    }

    fn close(&mut self) {
        self.finished = true;
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                // already exited
                debug!("ffmpeg kill: {}", e);
            }
            if let Err(e) = child.wait() {
                warn!("⚠️ Failed to reap ffmpeg for {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reads until `buf` is full or the stream ends; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Opens videos with the `ffmpeg` / `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Streams whose `width * height` exceeds this are refused.
    pub max_frame_pixels: u64,
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            max_frame_pixels: DEFAULT_MAX_FRAME_PIXELS,
        }
    }
}

impl FfmpegOpener {
    pub fn with_max_frame_pixels(mut self, max_frame_pixels: u64) -> Self {
        self.max_frame_pixels = max_frame_pixels;
        self
    }

    pub fn open_ffmpeg(&self, path: &Path) -> Result<FfmpegFrameSource> {
        // 文件不存在时直接报 IO 错误, 不启动子进程
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(ExtractError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            )));
        }

        let probe = VideoProbe::run(&self.ffprobe, path)?;
        if probe.pixel_count() > self.max_frame_pixels {
            return Err(ExtractError::Decode(format!(
                "{}x{} stream exceeds the {} pixel frame limit",
                probe.width, probe.height, self.max_frame_pixels
            )));
        }
        info!(
            "🎬 Opening {} ({}x{} @ {:.2} fps)",
            path.display(),
            probe.width,
            probe.height,
            probe.fps
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-fps_mode", "passthrough"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExtractError::Decode(format!("failed to start ffmpeg: {}", e)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExtractError::Decode("failed to open ffmpeg stdout".into()));
            }
        };

        Ok(FfmpegFrameSource {
            path: path.to_path_buf(),
            probe,
            reader: Some(BufReader::with_capacity(probe.frame_len().max(8192), stdout)),
            child: Some(child),
            next_number: 0,
            finished: false,
        })
    }
}

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(self.open_ffmpeg(path)?))
    }
}
