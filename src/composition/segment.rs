//! Segment-based rendering.
//!
//! Builds the slide track as a run of freeze-frame segments through the
//! concat demuxer, then merges the resized original video on top in a single
//! overlay pass. Two encodes regardless of length, where the frame strategy
//! composes every frame; the price is a layout that cannot change over time.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{
    composition::{
        layout::{CompositionSpec, LayoutMode},
        strategy::{RenderJob, RenderStrategy},
    },
    error::Result,
    timeline::Timeline,
    video::ffmpeg::{
        write_concat_list, AudioOutput, Dim, FfmpegCommand, FfmpegInput, Filter, FilterChain,
        FilterGraph, PadPos, VideoEncode,
    },
};

/// Name of the slide-only intermediate inside the work directory
pub const SLIDE_TRACK_FILE: &str = "slide_track.mp4";
const CONCAT_LIST_FILE: &str = "slides_concat.txt";

/// One slide held still for `duration` seconds
#[derive(Debug, Clone, PartialEq)]
pub struct SlideSegment {
    pub path: PathBuf,
    pub duration: f64,
}

/// The slide track as an ordered list of freeze-frame segments
#[derive(Debug, Clone, PartialEq)]
pub struct SlideTrack {
    segments: Vec<SlideSegment>,
}

impl SlideTrack {
    /// One segment per interval, in timeline order
    ///
    /// Boundaries are rounded to whole microseconds (the precision of the
    /// concat list) and each duration is the difference of two rounded
    /// boundaries, so the durations telescope to the rounded video length.
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let micros = |seconds: f64| (seconds * 1_000_000.0).round() as i64;

        let segments = timeline
            .intervals()
            .iter()
            .map(|interval| SlideSegment {
                path: interval.slide.path.clone(),
                duration: (micros(interval.end_time) - micros(interval.start_time)) as f64 / 1_000_000.0,
            })
            .collect();

        Self { segments }
    }

    pub fn segments(&self) -> &[SlideSegment] {
        &self.segments
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    fn concat_entries(&self) -> Vec<(PathBuf, f64)> {
        self.segments
            .iter()
            .map(|s| (s.path.clone(), s.duration))
            .collect()
    }
}

/// Filters turning raw slide images into canvas-sized frames
fn slide_chain(spec: &CompositionSpec, fps: f64) -> FilterChain {
    let (canvas_w, canvas_h) = spec.canvas();
    let black = [0, 0, 0];

    let chain = FilterChain::new(["0:v"], "slides");
    let chain = match spec.layout_mode {
        LayoutMode::Inset => chain
            .then(Filter::Scale { width: Dim::KeepAspect, height: Dim::Px(canvas_h) })
            .then(Filter::CropWidth { max_width: canvas_w })
            .then(Filter::Pad {
                width: canvas_w,
                height: canvas_h,
                x: PadPos::Center,
                y: PadPos::Center,
                color: black,
            }),
        LayoutMode::FullWithOverlay => chain
            .then(Filter::ScaleFit { width: canvas_w, height: canvas_h })
            .then(Filter::Pad {
                width: canvas_w,
                height: canvas_h,
                x: PadPos::Center,
                y: PadPos::Center,
                color: black,
            }),
        LayoutMode::SideBySide => {
            let region = spec.slide_region_width();
            chain
                .then(Filter::ScaleFit { width: region, height: canvas_h })
                .then(Filter::Pad {
                    width: canvas_w,
                    height: canvas_h,
                    x: PadPos::CenterWithin(region),
                    y: PadPos::Center,
                    color: black,
                })
        }
    };

    chain
        .then(Filter::SetSar)
        .then(Filter::Fps(fps))
        .then(Filter::Format("yuv420p"))
}

/// Pass 1: encode the freeze-frame slide track
pub fn slide_track_command(job: &RenderJob, concat_list: &Path, output: &Path) -> FfmpegCommand {
    let fps = job.render.fps;

    FfmpegCommand::new(&job.encoder.ffmpeg)
        .input(FfmpegInput::concat_list(concat_list))
        .filter_graph(FilterGraph::new().chain(slide_chain(&job.spec, fps)))
        .map("[slides]")
        .video(VideoEncode::from_config(&job.encoder, fps))
        .audio(AudioOutput::Drop)
        .output(output)
}

/// Pass 2: overlay the resized original video onto the slide track
///
/// The overlay position is fixed for the whole output. Audio comes only from
/// the original video.
pub fn merge_command(job: &RenderJob, slide_track: &Path) -> FfmpegCommand {
    let spec = &job.spec;
    let video_rect = spec.video_rect(job.video.width, job.video.height);

    let mut overlay = FilterChain::new(["1:v"], "overlay").then(Filter::Scale {
        width: Dim::Px(video_rect.width),
        height: Dim::Px(video_rect.height),
    });
    let position = match spec.border_rect(video_rect) {
        Some(border) => {
            overlay = overlay.then(Filter::Pad {
                width: border.width,
                height: border.height,
                x: PadPos::Px(spec.border_px as i64),
                y: PadPos::Px(spec.border_px as i64),
                color: spec.border_color,
            });
            (border.x, border.y)
        }
        None => (video_rect.x, video_rect.y),
    };
    let overlay = overlay.then(Filter::SetSar);

    let merge = FilterChain::new(["0:v", "overlay"], "out").then(Filter::Overlay {
        x: position.0,
        y: position.1,
        shortest: true,
    });

    FfmpegCommand::new(&job.encoder.ffmpeg)
        .input(FfmpegInput::file(slide_track))
        .input(FfmpegInput::file(&job.video.path))
        .filter_graph(FilterGraph::new().chain(overlay).chain(merge))
        .map("[out]")
        .map("1:a?")
        .video(VideoEncode::from_config(&job.encoder, job.render.fps))
        .audio(AudioOutput::Encode {
            codec: job.encoder.audio_codec.clone(),
            bitrate: job.encoder.audio_bitrate.clone(),
        })
        .output(&job.output)
}

/// Renders with two bulk encodes: slide track, then overlay merge
pub struct SegmentStrategy;

impl SegmentStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SegmentStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStrategy for SegmentStrategy {
    fn name(&self) -> &str {
        "segment"
    }

    fn description(&self) -> &str {
        "Concatenates freeze-frame slide segments and overlays the video in one pass"
    }

    fn render(&self, job: &RenderJob) -> Result<()> {
        std::fs::create_dir_all(&job.work_dir)?;

        // ====================================================================
        // Step 1: Slide track, ordered by timestamp before anything is encoded
        // ====================================================================
        let track = SlideTrack::from_timeline(&job.timeline);
        debug!(
            "Slide track: {} segments, {:.3}s (video {:.3}s)",
            track.segments().len(),
            track.total_duration(),
            job.timeline.duration()
        );

        let list_path = job.work_dir.join(CONCAT_LIST_FILE);
        write_concat_list(&list_path, &track.concat_entries())?;

        let slides_path = job.work_dir.join(SLIDE_TRACK_FILE);
        info!(strategy = "segment", "Encoding slide track to {}", slides_path.display());
        slide_track_command(job, &list_path, &slides_path).run_with_fallback(&job.encoder)?;

        // ====================================================================
        // Step 2: Overlay merge
        // ====================================================================
        info!(strategy = "segment", "Merging video overlay into {}", job.output.display());
        merge_command(job, &slides_path).run_with_fallback(&job.encoder)?;

        if !job.render.keep_intermediates {
            for path in [&list_path, &slides_path] {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove intermediate {}: {}", path.display(), e);
                }
            }
        }

        Ok(())
    }
}
