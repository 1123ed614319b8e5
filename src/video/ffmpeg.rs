//! Typed builder for the external `ffmpeg` invocations.
//!
//! Every encode in the crate goes through [`FfmpegCommand`]: inputs, the
//! filter graph and the codec settings are plain data, rendered once into an
//! argument vector. Paths are passed as separate arguments, never spliced
//! into a shell string.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::config::EncoderConfig;
use crate::error::{CompositorError, Result, VideoError};

/// Keep this many bytes of stderr in error messages
const STDERR_TAIL: usize = 2000;

/// One `-i` input plus the options that must precede it
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegInput {
    options: Vec<OsString>,
    target: OsString,
}

impl FfmpegInput {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            options: Vec::new(),
            target: path.as_ref().as_os_str().to_owned(),
        }
    }

    /// A concat demuxer list (see [`write_concat_list`])
    pub fn concat_list<P: AsRef<Path>>(path: P) -> Self {
        Self::file(path).option("-f", "concat").option("-safe", "0")
    }

    /// Raw RGB24 frames of a fixed size streamed on stdin
    pub fn raw_rgb_stdin(width: u32, height: u32, fps: f64) -> Self {
        Self {
            options: Vec::new(),
            target: OsString::from("pipe:0"),
        }
        .option("-f", "rawvideo")
        .option("-pix_fmt", "rgb24")
        .option("-s", format!("{}x{}", width, height))
        .option("-r", format_number(fps))
    }

    /// Input-side seek, fast and keyframe-accurate enough for stills
    pub fn seek(self, seconds: f64) -> Self {
        self.option("-ss", format!("{:.3}", seconds.max(0.0)))
    }

    fn option<K: Into<OsString>, V: Into<OsString>>(mut self, key: K, value: V) -> Self {
        self.options.push(key.into());
        self.options.push(value.into());
        self
    }
}

/// Dimension argument of the `scale` filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dim {
    Px(u32),
    /// `-1`: derive from the other dimension keeping the aspect ratio
    KeepAspect,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Px(px) => write!(f, "{}", px),
            Dim::KeepAspect => write!(f, "-1"),
        }
    }
}

/// Offset argument of the `pad` filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadPos {
    Px(i64),
    /// Centered in the padded output
    Center,
    /// Centered within the first `n` pixels of the output
    CenterWithin(u32),
}

impl PadPos {
    fn render(&self, axis: char) -> String {
        match self {
            PadPos::Px(px) => px.to_string(),
            PadPos::Center => format!("(o{axis}-i{axis})/2"),
            PadPos::CenterWithin(extent) => format!("({extent}-i{axis})/2"),
        }
    }
}

/// The subset of ffmpeg filters the renderers use
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Scale { width: Dim, height: Dim },
    /// Scale to fit inside the box, keeping the aspect ratio
    ScaleFit { width: u32, height: u32 },
    /// Center-crop the width down to at most `max_width`
    CropWidth { max_width: u32 },
    Pad { width: u32, height: u32, x: PadPos, y: PadPos, color: [u8; 3] },
    SetSar,
    Fps(f64),
    Format(&'static str),
    Overlay { x: i64, y: i64, shortest: bool },
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Scale { width, height } => write!(f, "scale={}:{}", width, height),
            Filter::ScaleFit { width, height } => {
                write!(f, "scale={}:{}:force_original_aspect_ratio=decrease", width, height)
            }
            Filter::CropWidth { max_width } => write!(f, "crop='min(iw,{})':ih", max_width),
            Filter::Pad { width, height, x, y, color } => write!(
                f,
                "pad={}:{}:{}:{}:color={}",
                width,
                height,
                x.render('w'),
                y.render('h'),
                hex_color(*color)
            ),
            Filter::SetSar => write!(f, "setsar=1"),
            Filter::Fps(fps) => write!(f, "fps={}", format_number(*fps)),
            Filter::Format(pix_fmt) => write!(f, "format={}", pix_fmt),
            Filter::Overlay { x, y, shortest } => {
                write!(f, "overlay={}:{}", x, y)?;
                if *shortest {
                    write!(f, ":shortest=1")?;
                }
                Ok(())
            }
        }
    }
}

/// `[in]filter,filter[out]`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<Filter>,
    output: String,
}

impl FilterChain {
    pub fn new<I, S>(inputs: I, output: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            filters: Vec::new(),
            output: output.to_string(),
        }
    }

    pub fn then(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{}]", input)?;
        }
        let filters: Vec<String> = self.filters.iter().map(ToString::to_string).collect();
        if filters.is_empty() {
            write!(f, "null")?;
        } else {
            write!(f, "{}", filters.join(","))?;
        }
        write!(f, "[{}]", self.output)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chains: Vec<String> = self.chains.iter().map(ToString::to_string).collect();
        write!(f, "{}", chains.join(";"))
    }
}

/// Video stream settings of the output
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncode {
    pub codec: String,
    pub preset: Option<String>,
    pub crf: Option<u8>,
    pub bitrate: Option<String>,
    pub pix_fmt: Option<String>,
    pub fps: Option<f64>,
}

impl VideoEncode {
    /// Stream copy, no re-encode
    pub fn copy() -> Self {
        Self {
            codec: "copy".to_string(),
            preset: None,
            crf: None,
            bitrate: None,
            pix_fmt: None,
            fps: None,
        }
    }

    pub fn from_config(encoder: &EncoderConfig, fps: f64) -> Self {
        Self {
            codec: encoder.codec.clone(),
            preset: Some(encoder.preset.clone()),
            crf: Some(encoder.crf),
            bitrate: encoder.video_bitrate.clone(),
            pix_fmt: Some(encoder.pix_fmt.clone()),
            fps: Some(fps),
        }
    }

    fn push_args(&self, args: &mut Vec<OsString>) {
        push_pair(args, "-c:v", &self.codec);
        if self.codec == "copy" {
            return;
        }

        // Rate-control knobs only the x264/x265 software encoders understand
        let software_x26x = self.codec.starts_with("libx26");
        if software_x26x {
            if let Some(preset) = &self.preset {
                push_pair(args, "-preset", preset);
            }
            if self.bitrate.is_none() {
                if let Some(crf) = self.crf {
                    push_pair(args, "-crf", &crf.to_string());
                }
            }
        }
        if let Some(bitrate) = &self.bitrate {
            push_pair(args, "-b:v", bitrate);
        }
        if let Some(pix_fmt) = &self.pix_fmt {
            push_pair(args, "-pix_fmt", pix_fmt);
        }
        if let Some(fps) = self.fps {
            push_pair(args, "-r", &format_number(fps));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioOutput {
    /// `-an`
    Drop,
    Copy,
    Encode { codec: String, bitrate: Option<String> },
    /// Quality-based VBR, as used for mp3 extraction
    EncodeQuality { codec: String, quality: u8 },
}

/// A complete ffmpeg invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegCommand {
    binary: String,
    inputs: Vec<FfmpegInput>,
    filter_graph: Option<FilterGraph>,
    maps: Vec<String>,
    video: Option<VideoEncode>,
    audio: AudioOutput,
    shortest: bool,
    output_options: Vec<OsString>,
    output: OsString,
}

impl FfmpegCommand {
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
            inputs: Vec::new(),
            filter_graph: None,
            maps: Vec::new(),
            video: None,
            audio: AudioOutput::Drop,
            shortest: false,
            output_options: Vec::new(),
            output: OsString::from("pipe:1"),
        }
    }

    pub fn input(mut self, input: FfmpegInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn filter_graph(mut self, graph: FilterGraph) -> Self {
        self.filter_graph = Some(graph);
        self
    }

    /// `-map`, either a filter label (`[out]`) or a stream spec (`1:a?`)
    pub fn map<S: Into<String>>(mut self, spec: S) -> Self {
        self.maps.push(spec.into());
        self
    }

    pub fn video(mut self, video: VideoEncode) -> Self {
        self.video = Some(video);
        self
    }

    pub fn audio(mut self, audio: AudioOutput) -> Self {
        self.audio = audio;
        self
    }

    pub fn shortest(mut self) -> Self {
        self.shortest = true;
        self
    }

    pub fn output_option<K: Into<OsString>, V: Into<OsString>>(mut self, key: K, value: V) -> Self {
        self.output_options.push(key.into());
        self.output_options.push(value.into());
        self
    }

    pub fn output<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.output = path.as_ref().as_os_str().to_owned();
        self
    }

    pub fn video_codec(&self) -> Option<&str> {
        self.video.as_ref().map(|v| v.codec.as_str())
    }

    /// Same command with a different video codec
    pub fn with_codec(&self, codec: &str) -> Self {
        let mut command = self.clone();
        if let Some(video) = command.video.as_mut() {
            video.codec = codec.to_string();
        }
        command
    }

    /// Render the argument vector (without the binary)
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".into());
            args.push(input.target.clone());
        }

        if let Some(graph) = &self.filter_graph {
            push_pair(&mut args, "-filter_complex", &graph.to_string());
        }

        for spec in &self.maps {
            push_pair(&mut args, "-map", spec);
        }

        match &self.video {
            Some(video) => video.push_args(&mut args),
            None => args.push("-vn".into()),
        }

        match &self.audio {
            AudioOutput::Drop => args.push("-an".into()),
            AudioOutput::Copy => push_pair(&mut args, "-c:a", "copy"),
            AudioOutput::Encode { codec, bitrate } => {
                push_pair(&mut args, "-c:a", codec);
                if let Some(bitrate) = bitrate {
                    push_pair(&mut args, "-b:a", bitrate);
                }
            }
            AudioOutput::EncodeQuality { codec, quality } => {
                push_pair(&mut args, "-c:a", codec);
                push_pair(&mut args, "-q:a", &quality.to_string());
            }
        }

        if self.shortest {
            args.push("-shortest".into());
        }

        args.extend(self.output_options.iter().cloned());
        args.push(self.output.clone());
        args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args());
        cmd
    }

    /// Run to completion; non-zero exit becomes `EncodingFailed` with stderr
    pub fn run(&self) -> Result<()> {
        self.run_capture().map(|_| ())
    }

    /// Run to completion and return stdout
    pub fn run_capture(&self) -> Result<Vec<u8>> {
        debug!(args = ?self.args(), "Running {}", self.binary);

        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VideoError::EncodingFailed {
                reason: format!("Failed to spawn {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(VideoError::EncodingFailed {
                reason: format!(
                    "{} exited with {}: {}",
                    self.binary,
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            }
            .into());
        }

        Ok(output.stdout)
    }

    /// Run, retrying once with the configured fallback codec on failure
    pub fn run_with_fallback(&self, encoder: &EncoderConfig) -> Result<()> {
        with_codec_fallback(encoder, |codec| self.with_codec(codec).run())
    }

    /// Spawn with the given stdin/stdout wiring and stderr drained on a thread
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio) -> Result<RunningFfmpeg> {
        debug!(args = ?self.args(), "Spawning {}", self.binary);

        let mut child = self
            .command()
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VideoError::EncodingFailed {
                reason: format!("Failed to spawn {}: {}", self.binary, e),
            })?;

        let mut stderr = child.stderr.take().ok_or_else(|| VideoError::EncodingFailed {
            reason: "Failed to capture ffmpeg stderr".to_string(),
        })?;

        // A full stderr pipe would block ffmpeg
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = stderr.read_to_end(&mut bytes);
            bytes
        });

        Ok(RunningFfmpeg {
            child,
            stderr_drain: Some(stderr_drain),
        })
    }
}

/// A spawned ffmpeg whose stdin/stdout the caller drives
pub struct RunningFfmpeg {
    pub child: Child,
    stderr_drain: Option<std::thread::JoinHandle<Vec<u8>>>,
}

impl RunningFfmpeg {
    /// Close stdin, wait, and turn a non-zero exit into `EncodingFailed`
    pub fn finish(mut self) -> Result<()> {
        drop(self.child.stdin.take());

        let status = self.child.wait()?;
        let stderr = self
            .stderr_drain
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(VideoError::EncodingFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr_tail(&stderr)),
            }
            .into());
        }
        Ok(())
    }

    /// Kill the process after an error on our side
    pub fn abort(mut self) -> String {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let stderr = self
            .stderr_drain
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        stderr_tail(&stderr)
    }
}

/// Run `attempt` with the primary codec, then once more with the fallback
///
/// Only `EncodingFailed` triggers the retry; a second failure is returned
/// as is.
pub fn with_codec_fallback<T, F>(encoder: &EncoderConfig, mut attempt: F) -> Result<T>
where
    F: FnMut(&str) -> Result<T>,
{
    match attempt(&encoder.codec) {
        Err(CompositorError::Video(VideoError::EncodingFailed { reason })) => {
            match encoder.fallback_codec.as_deref() {
                Some(fallback) if fallback != encoder.codec => {
                    warn!(
                        codec = %encoder.codec,
                        fallback = %fallback,
                        "Encoding failed, retrying with fallback codec: {}",
                        reason
                    );
                    attempt(fallback)
                }
                _ => Err(VideoError::EncodingFailed { reason }.into()),
            }
        }
        other => other,
    }
}

/// Write a concat demuxer list holding each still for its duration
///
/// The last file is repeated without a duration so the demuxer honours the
/// final segment's length.
pub fn write_concat_list(list_path: &Path, entries: &[(PathBuf, f64)]) -> Result<()> {
    use std::io::Write;

    let mut file = std::io::BufWriter::new(std::fs::File::create(list_path)?);
    writeln!(file, "ffconcat version 1.0")?;

    for (path, duration) in entries {
        let absolute_path = path.canonicalize().unwrap_or_else(|_| path.clone());
        writeln!(file, "file {}", quote_concat_path(&absolute_path))?;
        writeln!(file, "duration {:.6}", duration)?;
    }

    if let Some((last, _)) = entries.last() {
        let absolute_path = last.canonicalize().unwrap_or_else(|_| last.clone());
        writeln!(file, "file {}", quote_concat_path(&absolute_path))?;
    }

    file.flush()?;
    Ok(())
}

fn quote_concat_path(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn push_pair(args: &mut Vec<OsString>, key: &str, value: &str) {
    args.push(key.into());
    args.push(value.into());
}

fn hex_color(color: [u8; 3]) -> String {
    format!("0x{:02X}{:02X}{:02X}", color[0], color[1], color[2])
}

/// `30` rather than `30.0`, `29.97` as is
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_filter_rendering() {
        let chain = FilterChain::new(["1:v"], "ov")
            .then(Filter::Scale { width: Dim::Px(480), height: Dim::Px(270) })
            .then(Filter::Pad {
                width: 486,
                height: 276,
                x: PadPos::Px(3),
                y: PadPos::Px(3),
                color: [255, 255, 255],
            });

        assert_eq!(
            chain.to_string(),
            "[1:v]scale=480:270,pad=486:276:3:3:color=0xFFFFFF[ov]"
        );

        let graph = FilterGraph::new()
            .chain(chain)
            .chain(FilterChain::new(["bg", "ov"], "out").then(Filter::Overlay {
                x: 1417,
                y: 787,
                shortest: true,
            }));
        assert!(graph.to_string().ends_with(";[bg][ov]overlay=1417:787:shortest=1[out]"));
    }

    #[test]
    fn test_pad_positions() {
        let pad = Filter::Pad {
            width: 1920,
            height: 1080,
            x: PadPos::CenterWithin(1344),
            y: PadPos::Center,
            color: [0, 0, 0],
        };
        assert_eq!(pad.to_string(), "pad=1920:1080:(1344-iw)/2:(oh-ih)/2:color=0x000000");
    }

    #[test]
    fn test_command_args_order() {
        let command = FfmpegCommand::new("ffmpeg")
            .input(FfmpegInput::concat_list("slides.txt"))
            .input(FfmpegInput::file("talk.mp4"))
            .map("[out]")
            .map("1:a?")
            .video(VideoEncode {
                codec: "libx264".to_string(),
                preset: Some("veryfast".to_string()),
                crf: Some(23),
                bitrate: None,
                pix_fmt: Some("yuv420p".to_string()),
                fps: Some(30.0),
            })
            .audio(AudioOutput::Encode { codec: "aac".to_string(), bitrate: None })
            .output("out.mp4");

        let args = strings(command.args());
        let joined = args.join(" ");

        assert!(joined.contains("-f concat -safe 0 -i slides.txt -i talk.mp4"));
        assert!(joined.contains("-map [out] -map 1:a?"));
        assert!(joined.contains("-c:v libx264 -preset veryfast -crf 23 -pix_fmt yuv420p -r 30"));
        assert!(joined.contains("-c:a aac"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_hardware_codec_skips_x264_options() {
        let command = FfmpegCommand::new("ffmpeg")
            .input(FfmpegInput::file("in.mp4"))
            .video(VideoEncode {
                codec: "h264_videotoolbox".to_string(),
                preset: Some("veryfast".to_string()),
                crf: Some(23),
                bitrate: Some("6M".to_string()),
                pix_fmt: None,
                fps: None,
            })
            .output("out.mp4");

        let args = strings(command.args());
        assert!(!args.contains(&"-preset".to_string()));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(args.contains(&"6M".to_string()));
    }

    #[test]
    fn test_with_codec_replaces_video_codec_only() {
        let command = FfmpegCommand::new("ffmpeg")
            .input(FfmpegInput::file("in.mp4"))
            .video(VideoEncode::copy())
            .audio(AudioOutput::Copy)
            .output("out.mp4");

        let swapped = command.with_codec("mpeg4");
        assert_eq!(swapped.video_codec(), Some("mpeg4"));
        assert_eq!(swapped.audio, AudioOutput::Copy);
    }

    #[test]
    fn test_fallback_retries_once_with_alternate_codec() {
        let encoder = EncoderConfig {
            codec: "h264_nvenc".to_string(),
            fallback_codec: Some("libx264".to_string()),
            ..EncoderConfig::default()
        };
        let tried = RefCell::new(Vec::new());

        let result = with_codec_fallback(&encoder, |codec| {
            tried.borrow_mut().push(codec.to_string());
            if codec == "h264_nvenc" {
                Err(VideoError::EncodingFailed { reason: "no device".into() }.into())
            } else {
                Ok(codec.len())
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(*tried.borrow(), vec!["h264_nvenc", "libx264"]);
    }

    #[test]
    fn test_fallback_failure_is_fatal() {
        let encoder = EncoderConfig {
            codec: "h264_nvenc".to_string(),
            fallback_codec: Some("libx264".to_string()),
            ..EncoderConfig::default()
        };
        let mut attempts = 0;

        let result: Result<()> = with_codec_fallback(&encoder, |_| {
            attempts += 1;
            Err(VideoError::EncodingFailed { reason: "broken".into() }.into())
        });

        assert_eq!(attempts, 2);
        assert!(matches!(
            result,
            Err(CompositorError::Video(VideoError::EncodingFailed { .. }))
        ));
    }

    #[test]
    fn test_other_errors_do_not_trigger_fallback() {
        let encoder = EncoderConfig::default();
        let mut attempts = 0;

        let result: Result<()> = with_codec_fallback(&encoder, |_| {
            attempts += 1;
            Err(CompositorError::generic("disk full"))
        });

        assert_eq!(attempts, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_concat_list_format() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        let entries = vec![
            (PathBuf::from("/slides/0.png"), 5.0),
            (PathBuf::from("/slides/it's.png"), 7.5),
        ];

        write_concat_list(&list, &entries).unwrap();
        let content = std::fs::read_to_string(&list).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "ffconcat version 1.0");
        assert_eq!(lines[1], "file '/slides/0.png'");
        assert_eq!(lines[2], "duration 5.000000");
        assert_eq!(lines[3], r"file '/slides/it'\''s.png'");
        assert_eq!(lines[4], "duration 7.500000");
        assert_eq!(lines[5], r"file '/slides/it'\''s.png'");
    }

    #[test]
    fn test_stderr_tail_keeps_the_end() {
        let long = "x".repeat(STDERR_TAIL + 50) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("END"));
        assert!(tail.len() <= STDERR_TAIL + 1);
    }
}
