//! Per-frame compositing.
//!
//! [`FrameCompositor`] is a pure function of `(t, timeline, video frame,
//! spec)`: slides are decoded and scaled once up front, after which any
//! number of instants can be composed concurrently and in any order.
//! [`FrameStrategy`] drives it across a whole video, decoding the source
//! once and streaming composed frames into the encoder.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use image::{imageops, imageops::FilterType, RgbImage};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    composition::{
        layout::{CompositionSpec, Rect},
        strategy::{RenderJob, RenderStrategy},
    },
    error::{CompositionError, CompositorError, Result, VideoError},
    talk::logging::TraceContext,
    timeline::Timeline,
    video::{
        ffmpeg::{with_codec_fallback, AudioOutput, FfmpegCommand, FfmpegInput, VideoEncode},
        source::{FrameSource, FrameStream},
        types::Frame,
    },
};

/// A slide already scaled to its on-canvas size
#[derive(Debug)]
struct PreparedSlide {
    image: RgbImage,
    rect: Rect,
}

/// Composes one output frame for any instant of the timeline
#[derive(Debug)]
pub struct FrameCompositor {
    timeline: Timeline,
    spec: CompositionSpec,
    slides: HashMap<PathBuf, PreparedSlide>,
    video_rect: Rect,
    border_rect: Option<Rect>,
    frame_period: f64,
}

impl FrameCompositor {
    /// Prepare a compositor for a video of `video_size` rendered at `fps`
    ///
    /// Every distinct slide is decoded and scaled here, in parallel.
    pub fn new(timeline: Timeline, spec: CompositionSpec, video_size: (u32, u32), fps: f64) -> Result<Self> {
        spec.validate()?;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(CompositionError::InvalidLayout {
                details: format!("frame rate must be positive, got {}", fps),
            }
            .into());
        }

        let slides = timeline
            .unique_slides()
            .par_iter()
            .map(|slide| -> Result<(PathBuf, PreparedSlide)> {
                let image = slide.load_image()?;
                let rect = spec.slide_rect(image.width(), image.height());
                let image = resize_if_needed(&image, rect.width, rect.height);
                Ok((slide.path.clone(), PreparedSlide { image, rect }))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let video_rect = spec.video_rect(video_size.0, video_size.1);
        let border_rect = spec.border_rect(video_rect);

        debug!(
            slides = slides.len(),
            "Frame compositor ready: video at {:?}, border {:?}",
            video_rect,
            border_rect
        );

        Ok(Self {
            timeline,
            spec,
            slides,
            video_rect,
            border_rect,
            frame_period: 1.0 / fps,
        })
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.spec.canvas()
    }

    /// Compose the frame at `t` from an already decoded video frame
    pub fn compose_with(&self, t: f64, video_frame: &Frame) -> Result<Frame> {
        self.check_range(t)?;

        let interval = self.timeline.interval_at(t);
        let slide = self
            .slides
            .get(&interval.slide.path)
            .ok_or_else(|| CompositionError::SlideLoadFailed {
                path: interval.slide.path.display().to_string(),
                reason: "slide was not prepared".to_string(),
            })?;

        let (canvas_w, canvas_h) = self.spec.canvas();
        let mut canvas = Frame::new_black(canvas_w, canvas_h);
        canvas.blit(&slide.image, slide.rect.x, slide.rect.y);

        if let Some(border) = self.border_rect {
            canvas.fill_rect(border, self.spec.border_color);
        }

        let video = resize_if_needed(video_frame.as_image(), self.video_rect.width, self.video_rect.height);
        canvas.blit(&video, self.video_rect.x, self.video_rect.y);

        Ok(canvas)
    }

    /// Decode the video frame at `t` from `source` and compose it
    pub fn compose_at(&self, t: f64, source: &dyn FrameSource) -> Result<Frame> {
        self.check_range(t)?;
        let video_frame = source.frame_at(t)?;
        self.compose_with(t, &video_frame)
    }

    fn check_range(&self, t: f64) -> Result<()> {
        let duration = self.timeline.duration();
        if !t.is_finite() || t < 0.0 || t > duration + self.frame_period {
            return Err(CompositionError::FrameOutOfRange { t, duration }.into());
        }
        Ok(())
    }
}

fn resize_if_needed(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    }
}

/// Renders by composing every output frame and piping it to the encoder
///
/// O(frames) raster work, but the layout may vary per instant.
pub struct FrameStrategy;

impl FrameStrategy {
    pub fn new() -> Self {
        Self
    }

    fn render_pass(&self, job: &RenderJob, compositor: &FrameCompositor, pool: &rayon::ThreadPool, codec: &str) -> Result<u64> {
        let fps = job.render.fps;
        let (canvas_w, canvas_h) = compositor.canvas_size();

        let encoder = FfmpegCommand::new(&job.encoder.ffmpeg)
            .input(FfmpegInput::raw_rgb_stdin(canvas_w, canvas_h, fps))
            .input(FfmpegInput::file(&job.video.path))
            .map("0:v")
            .map("1:a?")
            .video(VideoEncode::from_config(&job.encoder, fps))
            .audio(AudioOutput::Encode {
                codec: job.encoder.audio_codec.clone(),
                bitrate: job.encoder.audio_bitrate.clone(),
            })
            .shortest()
            .output(&job.output)
            .with_codec(codec);

        let mut decoder = FrameStream::open(&job.video, fps)?;
        let mut encoder = match encoder.spawn(Stdio::piped(), Stdio::null()) {
            Ok(encoder) => encoder,
            Err(e) => {
                decoder.abort();
                return Err(e);
            }
        };
        let Some(mut stdin) = encoder.child.stdin.take() else {
            decoder.abort();
            encoder.abort();
            return Err(VideoError::EncodingFailed {
                reason: "Failed to open encoder stdin".to_string(),
            }
            .into());
        };

        let streamed = self.stream_frames(job, compositor, pool, &mut decoder, &mut stdin);
        drop(stdin);

        let written = match streamed {
            Ok(written) => written,
            Err(e) => {
                decoder.abort();
                let stderr = encoder.abort();
                return Err(match e {
                    CompositorError::Video(VideoError::EncodingFailed { reason }) => {
                        VideoError::EncodingFailed {
                            reason: format!("{}: {}", reason, stderr),
                        }
                        .into()
                    }
                    other => other,
                });
            }
        };

        // A decoder that died midway looks like a short video
        if let Err(e) = decoder.finish() {
            encoder.abort();
            return Err(e);
        }
        encoder.finish()?;
        Ok(written)
    }

    /// Decode, compose and write frames until the decoder runs dry
    fn stream_frames(
        &self,
        job: &RenderJob,
        compositor: &FrameCompositor,
        pool: &rayon::ThreadPool,
        decoder: &mut FrameStream,
        stdin: &mut impl Write,
    ) -> Result<u64> {
        let fps = job.render.fps;
        let batch_size = job.render.frame_batch.max(1);
        let duration = job.timeline.duration();
        let context = TraceContext::current();
        let mut written: u64 = 0;

        loop {
            // ====================================================================
            // Decode a batch in order
            // ====================================================================
            let mut batch: Vec<(f64, Frame)> = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                let index = decoder.frames_read();
                match decoder.next_frame()? {
                    Some(frame) => batch.push(((index as f64 / fps).min(duration), frame)),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }

            // ====================================================================
            // Compose in parallel, write in order
            // ====================================================================
            let composed = pool.install(|| {
                batch
                    .par_iter()
                    .map(|(t, frame)| context.in_scope(|| compositor.compose_with(*t, frame)))
                    .collect::<Result<Vec<Frame>>>()
            })?;

            for frame in &composed {
                stdin.write_all(frame.as_rgb_bytes()).map_err(|e| VideoError::EncodingFailed {
                    reason: format!("Encoder stopped accepting frames ({})", e),
                })?;
            }
            written += composed.len() as u64;

            if written % (batch_size as u64 * 30) < batch_size as u64 {
                debug!("Composed {} frames ({:.1}s)", written, written as f64 / fps);
            }
        }

        Ok(written)
    }
}

impl Default for FrameStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStrategy for FrameStrategy {
    fn name(&self) -> &str {
        "frame"
    }

    fn description(&self) -> &str {
        "Composes every frame in memory and streams it to the encoder"
    }

    fn render(&self, job: &RenderJob) -> Result<()> {
        let compositor = FrameCompositor::new(
            job.timeline.clone(),
            job.spec.clone(),
            job.video.dimensions(),
            job.render.fps,
        )?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(job.render.threads.max(1))
            .build()
            .map_err(|e| CompositorError::generic(format!("Failed to build worker pool: {}", e)))?;

        let frames = with_codec_fallback(&job.encoder, |codec| {
            info!(codec = %codec, "Rendering {} frames per batch", job.render.frame_batch);
            self.render_pass(job, &compositor, &pool, codec)
        })?;

        info!(strategy = "frame", "Encoded {} frames to {}", frames, job.output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{composition::layout::LayoutMode, slides::SlideAsset, timeline::TimelineBuilder};
    use image::Rgb;
    use tempfile::tempdir;

    const RED: [u8; 3] = [255, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 255];
    const GREEN: [u8; 3] = [0, 255, 0];
    const WHITE: [u8; 3] = [255, 255, 255];

    struct SolidSource {
        duration: f64,
    }

    impl FrameSource for SolidSource {
        fn duration(&self) -> f64 {
            self.duration
        }

        fn dimensions(&self) -> (u32, u32) {
            (64, 36)
        }

        fn frame_rate(&self) -> f64 {
            25.0
        }

        fn frame_at(&self, _t: f64) -> Result<Frame> {
            Ok(Frame::new_filled(64, 36, GREEN))
        }
    }

    fn small_spec() -> CompositionSpec {
        CompositionSpec {
            layout_mode: LayoutMode::Inset,
            overlay_scale: 0.25,
            margin_px: 2,
            border_px: 1,
            border_color: WHITE,
            slide_ratio: None,
            canvas_width: 160,
            canvas_height: 90,
        }
    }

    fn write_slide(dir: &std::path::Path, ms: u64, color: [u8; 3]) -> SlideAsset {
        let path = dir.join(format!("{}.png", ms));
        RgbImage::from_pixel(160, 90, Rgb(color)).save(&path).unwrap();
        SlideAsset::new(path, ms)
    }

    fn compositor(dir: &std::path::Path) -> FrameCompositor {
        let slides = vec![write_slide(dir, 5000, BLUE), write_slide(dir, 0, RED)];
        let timeline = TimelineBuilder::build(slides, 10.0).unwrap();
        FrameCompositor::new(timeline, small_spec(), (64, 36), 25.0).unwrap()
    }

    #[test]
    fn test_active_slide_and_overlay() {
        let dir = tempdir().unwrap();
        let compositor = compositor(dir.path());
        let source = SolidSource { duration: 10.0 };

        // Overlay is 40x23 at (118, 65)
        let first = compositor.compose_at(1.0, &source).unwrap();
        assert_eq!((first.width(), first.height()), (160, 90));
        assert_eq!(first.get_pixel(10, 10), RED);
        assert_eq!(first.get_pixel(130, 75), GREEN);
        assert_eq!(first.get_pixel(117, 64), WHITE);
        assert_eq!(first.get_pixel(115, 62), RED);

        let second = compositor.compose_at(6.0, &source).unwrap();
        assert_eq!(second.get_pixel(10, 10), BLUE);
    }

    #[test]
    fn test_final_instant_clamps_to_last_slide() {
        let dir = tempdir().unwrap();
        let compositor = compositor(dir.path());
        let source = SolidSource { duration: 10.0 };

        let last = compositor.compose_at(10.0, &source).unwrap();
        assert_eq!(last.get_pixel(10, 10), BLUE);
    }

    #[test]
    fn test_out_of_range() {
        let dir = tempdir().unwrap();
        let compositor = compositor(dir.path());
        let source = SolidSource { duration: 10.0 };

        for t in [-0.5, 10.5, f64::NAN] {
            let err = compositor.compose_at(t, &source).unwrap_err();
            assert!(matches!(
                err,
                CompositorError::Composition(CompositionError::FrameOutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let dir = tempdir().unwrap();
        let compositor = compositor(dir.path());
        let video = Frame::new_filled(64, 36, GREEN);
        let instants: Vec<f64> = (0..40).rev().map(|i| i as f64 * 0.25).collect();

        let sequential: Vec<Frame> = instants
            .iter()
            .map(|t| compositor.compose_with(*t, &video).unwrap())
            .collect();
        let parallel: Vec<Frame> = instants
            .par_iter()
            .map(|t| compositor.compose_with(*t, &video).unwrap())
            .collect();

        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_missing_slide_file_fails() {
        let dir = tempdir().unwrap();
        let slides = vec![SlideAsset::new(dir.path().join("0.png"), 0)];
        let timeline = TimelineBuilder::build(slides, 5.0).unwrap();

        let err = FrameCompositor::new(timeline, small_spec(), (64, 36), 25.0).unwrap_err();
        assert!(matches!(
            err,
            CompositorError::Composition(CompositionError::SlideLoadFailed { .. })
        ));
    }

    #[cfg(unix)]
    fn stand_in_ffmpeg(dir: &std::path::Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    /// 4x2 source frames from a stand-in decoder into a stand-in encoder
    #[cfg(unix)]
    fn run_tiny_render(decoder_body: &str, encoder_body: &str, frame_batch: usize) -> Result<u64> {
        use crate::{
            config::{EncoderConfig, RenderConfig},
            video::VideoSource,
        };

        let dir = tempdir().unwrap();
        let decoder = stand_in_ffmpeg(dir.path(), "decoder", decoder_body);
        let encoder = stand_in_ffmpeg(dir.path(), "encoder", encoder_body);

        let json = r#"{
            "streams": [{"codec_name": "h264", "width": 4, "height": 2, "avg_frame_rate": "25/1"}],
            "format": {"duration": "10.0"}
        }"#;
        let video = VideoSource::from_probe_json(&dir.path().join("talk.mp4"), json, &decoder).unwrap();

        let slides = vec![write_slide(dir.path(), 0, RED)];
        let timeline = TimelineBuilder::build(slides, 10.0).unwrap();
        let compositor = FrameCompositor::new(timeline.clone(), small_spec(), (4, 2), 25.0).unwrap();

        let job = RenderJob {
            video,
            timeline,
            spec: small_spec(),
            render: RenderConfig {
                fps: 25.0,
                frame_batch,
                threads: 2,
                ..RenderConfig::default()
            },
            encoder: EncoderConfig {
                ffmpeg: encoder,
                ..EncoderConfig::default()
            },
            output: dir.path().join("out.mp4"),
            work_dir: dir.path().to_path_buf(),
        };
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        FrameStrategy::new().render_pass(&job, &compositor, &pool, "libx264")
    }

    #[cfg(unix)]
    #[test]
    fn test_clean_decode_streams_every_frame() {
        let written = run_tiny_render("head -c 48 /dev/zero", "cat > /dev/null", 4).unwrap();
        assert_eq!(written, 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_dying_midway_is_an_error() {
        // Two frames, then the decoder crashes
        let err = run_tiny_render("head -c 48 /dev/zero\nexit 1", "cat > /dev/null", 4).unwrap_err();
        assert!(matches!(
            err,
            CompositorError::Video(VideoError::DecodingFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_exit_kills_decoder() {
        let started = std::time::Instant::now();

        // The decoder would stall for a minute if it were left waiting
        let err = run_tiny_render("head -c 48 /dev/zero\nexec sleep 60", "exit 1", 1).unwrap_err();

        assert!(matches!(
            err,
            CompositorError::Video(VideoError::EncodingFailed { .. })
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(30));
    }
}
