use std::path::Path;

use tracing::info;

use crate::{
    composition::layout::{CompositionSpec, LayoutMode},
    config::EncoderConfig,
    error::Result,
    video::{
        ffmpeg::{AudioOutput, Dim, FfmpegCommand, FfmpegInput, Filter, FilterChain, FilterGraph, PadPos, VideoEncode},
        VideoSource,
    },
};

/// Picture-in-picture of one video over another
///
/// The secondary video is scaled to `scale` of the main video's width,
/// framed, and pinned bottom-right. Audio comes from the main video.
#[derive(Debug, Clone, PartialEq)]
pub struct PipOverlay {
    pub scale: f32,
    pub margin_px: u32,
    pub border_px: u32,
    pub border_color: [u8; 3],
}

impl Default for PipOverlay {
    fn default() -> Self {
        Self {
            scale: 0.25,
            margin_px: 20,
            border_px: 3,
            border_color: [255, 255, 255],
        }
    }
}

impl PipOverlay {
    /// Geometry on a canvas the size of the main video
    fn layout(&self, main: &VideoSource) -> CompositionSpec {
        CompositionSpec {
            layout_mode: LayoutMode::Inset,
            overlay_scale: self.scale,
            margin_px: self.margin_px,
            border_px: self.border_px,
            border_color: self.border_color,
            slide_ratio: None,
            canvas_width: main.width,
            canvas_height: main.height,
        }
    }

    pub fn command(&self, main: &VideoSource, secondary: &VideoSource, output: &Path, encoder: &EncoderConfig) -> FfmpegCommand {
        let layout = self.layout(main);
        let rect = layout.video_rect(secondary.width, secondary.height);

        let mut pip = FilterChain::new(["1:v"], "pip").then(Filter::Scale {
            width: Dim::Px(rect.width),
            height: Dim::Px(rect.height),
        });
        let (x, y) = match layout.border_rect(rect) {
            Some(border) => {
                pip = pip.then(Filter::Pad {
                    width: border.width,
                    height: border.height,
                    x: PadPos::Px(self.border_px as i64),
                    y: PadPos::Px(self.border_px as i64),
                    color: self.border_color,
                });
                (border.x, border.y)
            }
            None => (rect.x, rect.y),
        };

        let merge = FilterChain::new(["0:v", "pip"], "out").then(Filter::Overlay { x, y, shortest: true });

        FfmpegCommand::new(&encoder.ffmpeg)
            .input(FfmpegInput::file(&main.path))
            .input(FfmpegInput::file(&secondary.path))
            .filter_graph(FilterGraph::new().chain(pip).chain(merge))
            .map("[out]")
            .map("0:a?")
            .video(VideoEncode::from_config(encoder, main.frame_rate))
            .audio(AudioOutput::Encode {
                codec: encoder.audio_codec.clone(),
                bitrate: encoder.audio_bitrate.clone(),
            })
            .output(output)
    }

    /// Probe both inputs and encode the overlay, with codec fallback
    pub fn run(&self, main: &Path, secondary: &Path, output: &Path, encoder: &EncoderConfig) -> Result<()> {
        let main = VideoSource::probe(main, encoder)?;
        let secondary = VideoSource::probe(secondary, encoder)?;

        info!(
            "Overlaying {} onto {} -> {}",
            secondary.path.display(),
            main.path.display(),
            output.display()
        );
        self.command(&main, &secondary, output, encoder).run_with_fallback(encoder)
    }
}
