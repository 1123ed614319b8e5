use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{ChildStdout, Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::EncoderConfig;
use crate::error::{Result, VideoError};
use crate::video::ffmpeg::{
    AudioOutput, FfmpegCommand, FfmpegInput, Filter, FilterChain, FilterGraph, RunningFfmpeg,
    VideoEncode,
};
use crate::video::types::Frame;

/// Random access to decoded video frames
///
/// Implementations must be shareable across threads: the frame compositor
/// may ask for several instants concurrently.
pub trait FrameSource: Send + Sync {
    fn duration(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    fn frame_rate(&self) -> f64;

    /// Decode the frame shown at `t` seconds
    fn frame_at(&self, t: f64) -> Result<Frame>;
}

/// Read-only handle to a video file and its probed metadata
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    pub path: PathBuf,
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub codec: String,
    pub bit_rate: Option<u64>,
    ffmpeg: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl VideoSource {
    /// Probe `path` with ffprobe
    pub fn probe<P: AsRef<Path>>(path: P, encoder: &EncoderConfig) -> Result<Self> {
        let path = path.as_ref();
        let output = Command::new(&encoder.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_name,width,height,avg_frame_rate,r_frame_rate,bit_rate,duration:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| VideoError::ProbeFailed {
                path: path.display().to_string(),
                reason: format!("Failed to run {}: {}", encoder.ffprobe, e),
            })?;

        if !output.status.success() {
            return Err(VideoError::ProbeFailed {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let source = Self::from_probe_json(path, &json, &encoder.ffmpeg)?;

        info!(
            "Video metadata: {}x{} @ {:.2}fps, {:.1}s, codec {}",
            source.width, source.height, source.frame_rate, source.duration, source.codec
        );
        Ok(source)
    }

    /// Build a source from ffprobe's JSON output
    pub fn from_probe_json(path: &Path, json: &str, ffmpeg: &str) -> Result<Self> {
        let probe_failed = |reason: String| VideoError::ProbeFailed {
            path: path.display().to_string(),
            reason,
        };

        let probe: ProbeOutput =
            serde_json::from_str(json).map_err(|e| probe_failed(format!("Invalid ffprobe output: {}", e)))?;

        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| probe_failed("No video stream".to_string()))?;

        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(probe_failed("Missing frame dimensions".to_string()).into()),
        };

        let duration = probe
            .format
            .and_then(|format| format.duration)
            .or(stream.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| probe_failed("Missing duration".to_string()))?;

        let frame_rate = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(30.0);

        Ok(Self {
            path: path.to_path_buf(),
            duration,
            width,
            height,
            frame_rate,
            codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
            bit_rate: stream.bit_rate.and_then(|b| b.parse().ok()),
            ffmpeg: ffmpeg.to_string(),
        })
    }

    /// Command extracting `[start, end)` into `output` without re-encoding
    pub fn subclip_command(&self, start: f64, end: f64, output: &Path) -> FfmpegCommand {
        let start = start.clamp(0.0, self.duration);
        let end = end.clamp(start, self.duration);

        FfmpegCommand::new(&self.ffmpeg)
            .input(FfmpegInput::file(&self.path).seek(start))
            .video(VideoEncode::copy())
            .audio(AudioOutput::Copy)
            .output_option("-t", format!("{:.3}", end - start))
            .output(output)
    }

    fn single_frame_command(&self, t: f64) -> FfmpegCommand {
        FfmpegCommand::new(&self.ffmpeg)
            .input(FfmpegInput::file(&self.path).seek(t))
            .video(VideoEncode {
                codec: "png".to_string(),
                preset: None,
                crf: None,
                bitrate: None,
                pix_fmt: Some("rgb24".to_string()),
                fps: None,
            })
            .output_option("-frames:v", "1")
            .output_option("-f", "image2pipe")
    }
}

impl FrameSource for VideoSource {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_at(&self, t: f64) -> Result<Frame> {
        // Seeking exactly to the end yields nothing; step back one frame
        let t = t.min(self.duration - 1.0 / self.frame_rate).max(0.0);
        let png = self.single_frame_command(t).run_capture()?;

        let image = image::load_from_memory(&png).map_err(|e| VideoError::DecodingFailed {
            reason: format!("Frame at {:.3}s is not a valid image: {}", t, e),
        })?;

        Ok(Frame::new(image.to_rgb8()))
    }
}

/// Sequential decode of a whole video into raw RGB frames at a fixed rate
pub struct FrameStream {
    process: RunningFfmpeg,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frame_size: usize,
    frames_read: u64,
}

impl FrameStream {
    pub fn open(source: &VideoSource, fps: f64) -> Result<Self> {
        let command = FfmpegCommand::new(&source.ffmpeg)
            .input(FfmpegInput::file(&source.path))
            .filter_graph(FilterGraph::new().chain(FilterChain::new(["0:v"], "v").then(Filter::Fps(fps))))
            .map("[v]")
            .video(VideoEncode {
                codec: "rawvideo".to_string(),
                preset: None,
                crf: None,
                bitrate: None,
                pix_fmt: Some("rgb24".to_string()),
                fps: None,
            })
            .output_option("-f", "rawvideo");

        let mut process = command.spawn(Stdio::null(), Stdio::piped())?;
        let stdout = process.child.stdout.take().ok_or_else(|| VideoError::DecodingFailed {
            reason: "Failed to capture decoder stdout".to_string(),
        })?;

        let frame_size = source.width as usize * source.height as usize * 3;
        debug!(
            "Opened frame stream for {} ({}x{} @ {}fps)",
            source.path.display(),
            source.width,
            source.height,
            fps
        );

        Ok(Self {
            process,
            stdout: BufReader::with_capacity(frame_size * 2, stdout),
            width: source.width,
            height: source.height,
            frame_size,
            frames_read: 0,
        })
    }

    /// Next decoded frame, `None` at end of stream
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut buffer = vec![0u8; self.frame_size];
        let mut filled = 0;

        while filled < self.frame_size {
            let read = self.stdout.read(&mut buffer[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < self.frame_size {
            return Err(VideoError::DecodingFailed {
                reason: format!(
                    "Truncated frame {} ({} of {} bytes)",
                    self.frames_read, filled, self.frame_size
                ),
            }
            .into());
        }

        self.frames_read += 1;
        Frame::from_rgb_bytes(self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| {
                VideoError::DecodingFailed {
                    reason: "Frame buffer size mismatch".to_string(),
                }
                .into()
            })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Kill the decoder when the consumer gives up early
    pub fn abort(self) -> String {
        drop(self.stdout);
        self.process.abort()
    }

    pub fn finish(self) -> Result<()> {
        drop(self.stdout);
        self.process.finish().map_err(|e| {
            VideoError::DecodingFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Parse "30000/1001" or "25"
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "programs": [],
        "streams": [
            {
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30000/1001",
                "bit_rate": "4500000"
            }
        ],
        "format": { "duration": "15.000000" }
    }"#;

    #[test]
    fn test_probe_json_parsing() {
        let source = VideoSource::from_probe_json(Path::new("talk.mp4"), PROBE_JSON, "ffmpeg").unwrap();

        assert_eq!((source.width, source.height), (1920, 1080));
        assert_eq!(source.duration, 15.0);
        assert!((source.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(source.codec, "h264");
        assert_eq!(source.bit_rate, Some(4_500_000));
    }

    #[test]
    fn test_probe_without_stream_fails() {
        let json = r#"{"streams": [], "format": {"duration": "3.0"}}"#;
        assert!(VideoSource::from_probe_json(Path::new("a.mp4"), json, "ffmpeg").is_err());
    }

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_subclip_command_is_clamped_stream_copy() {
        let source = VideoSource::from_probe_json(Path::new("talk.mp4"), PROBE_JSON, "ffmpeg").unwrap();
        let args: Vec<String> = source
            .subclip_command(5.0, 40.0, Path::new("clip.mp4"))
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let joined = args.join(" ");

        assert!(joined.contains("-ss 5.000 -i talk.mp4"));
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-c:a copy"));
        assert!(joined.contains("-t 10.000"));
    }
}
