use serde::{Deserialize, Serialize};

use crate::error::{CompositionError, Result};

/// How slides and the speaker video share the output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Slide fills the frame height, video in the bottom-right corner
    Inset,
    /// Slides on the left, video on the right
    SideBySide,
    /// Slide letterboxed into the frame, video in the bottom-right corner
    FullWithOverlay,
}

impl std::str::FromStr for LayoutMode {
    type Err = CompositionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "inset" | "pip" => Ok(Self::Inset),
            "side_by_side" | "side-by-side" => Ok(Self::SideBySide),
            "full_with_overlay" | "full" => Ok(Self::FullWithOverlay),
            other => Err(CompositionError::InvalidLayout {
                details: format!("unknown layout mode '{}'", other),
            }),
        }
    }
}

/// Axis-aligned rectangle on the output canvas
///
/// The origin may be negative when content is wider than the canvas and
/// gets center-cropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// The same rectangle grown by `by` pixels on every side
    pub fn expand(&self, by: u32) -> Self {
        Self {
            x: self.x - by as i64,
            y: self.y - by as i64,
            width: self.width + 2 * by,
            height: self.height + 2 * by,
        }
    }
}

/// Geometry of the composited output; nothing else influences placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionSpec {
    pub layout_mode: LayoutMode,

    /// Overlay width as a fraction of the canvas width (0.0-1.0]
    pub overlay_scale: f32,

    /// Distance between the overlay and the canvas edges (or between the
    /// two regions in side-by-side mode)
    pub margin_px: u32,

    /// Border drawn around the overlay; 0 disables it
    pub border_px: u32,

    pub border_color: [u8; 3],

    /// Side-by-side only: fraction of the width given to slides.
    /// Falls back to `overlay_scale` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_ratio: Option<f32>,

    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for CompositionSpec {
    fn default() -> Self {
        Self {
            layout_mode: LayoutMode::Inset,
            overlay_scale: 0.25,
            margin_px: 20,
            border_px: 3,
            border_color: [255, 255, 255],
            slide_ratio: Some(0.7),
            canvas_width: 1920,
            canvas_height: 1080,
        }
    }
}

impl CompositionSpec {
    pub fn validate(&self) -> Result<()> {
        let invalid = |details: String| -> Result<()> { Err(CompositionError::InvalidLayout { details }.into()) };

        if !(self.overlay_scale > 0.0 && self.overlay_scale <= 1.0) {
            return invalid(format!("overlay_scale must be in (0, 1], got {}", self.overlay_scale));
        }
        if let Some(ratio) = self.slide_ratio {
            if !(ratio > 0.0 && ratio < 1.0) {
                return invalid(format!("slide_ratio must be in (0, 1), got {}", ratio));
            }
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return invalid("canvas must not be empty".to_string());
        }
        // yuv420p needs even dimensions
        if self.canvas_width % 2 != 0 || self.canvas_height % 2 != 0 {
            return invalid(format!(
                "canvas {}x{} must have even dimensions",
                self.canvas_width, self.canvas_height
            ));
        }
        if self.layout_mode == LayoutMode::SideBySide && self.margin_px >= self.canvas_width / 2 {
            return invalid(format!("margin {}px leaves no room for content", self.margin_px));
        }
        Ok(())
    }

    pub fn canvas(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }

    /// Width reserved for slides in side-by-side mode
    pub fn slide_region_width(&self) -> u32 {
        let ratio = self.slide_ratio.unwrap_or(self.overlay_scale) as f64;
        round_px(self.canvas_width as f64 * ratio)
    }

    /// Where a slide of the given size lands on the canvas
    pub fn slide_rect(&self, slide_width: u32, slide_height: u32) -> Rect {
        let (canvas_w, canvas_h) = self.canvas();

        match self.layout_mode {
            LayoutMode::Inset => {
                let width = round_px(slide_width as f64 * canvas_h as f64 / slide_height.max(1) as f64);
                let x = (canvas_w as i64 - width as i64) / 2;
                Rect::new(x, 0, width, canvas_h)
            }
            LayoutMode::FullWithOverlay => {
                let (width, height) = fit_within(slide_width, slide_height, canvas_w, canvas_h);
                centered(width, height, 0, canvas_w, canvas_h)
            }
            LayoutMode::SideBySide => {
                let region = self.slide_region_width();
                let (width, height) = fit_within(slide_width, slide_height, region, canvas_h);
                centered(width, height, 0, region, canvas_h)
            }
        }
    }

    /// Where the video lands for a source of the given size
    ///
    /// Corner layouts scale the video to `overlay_scale` of the canvas width
    /// keeping its aspect ratio, then place it bottom-right, `margin_px` in
    /// from both edges.
    pub fn video_rect(&self, video_width: u32, video_height: u32) -> Rect {
        let (canvas_w, canvas_h) = self.canvas();

        match self.layout_mode {
            LayoutMode::Inset | LayoutMode::FullWithOverlay => {
                let (width, height) = self.overlay_size(video_width, video_height);
                let x = canvas_w as i64 - width as i64 - self.margin_px as i64;
                let y = canvas_h as i64 - height as i64 - self.margin_px as i64;
                Rect::new(x.max(0), y.max(0), width, height)
            }
            LayoutMode::SideBySide => {
                let start = self.slide_region_width() + self.margin_px;
                let region = canvas_w.saturating_sub(start).max(1);
                let (width, height) = fit_within(video_width, video_height, region, canvas_h);
                centered(width, height, start as i64, region, canvas_h)
            }
        }
    }

    /// Overlay dimensions for corner layouts
    pub fn overlay_size(&self, video_width: u32, video_height: u32) -> (u32, u32) {
        let width = round_px(self.canvas_width as f64 * self.overlay_scale as f64);
        let height = round_px(width as f64 * video_height as f64 / video_width.max(1) as f64);
        (width, height)
    }

    /// Border rectangle behind the overlay, if one is drawn
    pub fn border_rect(&self, video_rect: Rect) -> Option<Rect> {
        match self.layout_mode {
            LayoutMode::SideBySide => None,
            _ if self.border_px == 0 => None,
            _ => Some(video_rect.expand(self.border_px)),
        }
    }
}

/// Largest size with the source aspect ratio fitting inside the box
pub fn fit_within(src_width: u32, src_height: u32, box_width: u32, box_height: u32) -> (u32, u32) {
    let scale = f64::min(
        box_width as f64 / src_width.max(1) as f64,
        box_height as f64 / src_height.max(1) as f64,
    );
    (
        round_px(src_width as f64 * scale).min(box_width),
        round_px(src_height as f64 * scale).min(box_height),
    )
}

fn centered(width: u32, height: u32, region_x: i64, region_width: u32, region_height: u32) -> Rect {
    Rect::new(
        region_x + (region_width as i64 - width as i64) / 2,
        (region_height as i64 - height as i64) / 2,
        width,
        height,
    )
}

/// Pixel sizes are rounded, never truncated, and never zero
fn round_px(value: f64) -> u32 {
    (value.round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inset_overlay_scenario() {
        let spec = CompositionSpec::default();

        assert_eq!(spec.overlay_size(1920, 1080), (480, 270));
        assert_eq!(spec.video_rect(1920, 1080), Rect::new(1420, 790, 480, 270));
        assert_eq!(
            spec.border_rect(spec.video_rect(1920, 1080)),
            Some(Rect::new(1417, 787, 486, 276))
        );
    }

    #[test]
    fn test_overlay_keeps_video_aspect() {
        let spec = CompositionSpec::default();
        // 4:3 source
        assert_eq!(spec.overlay_size(640, 480), (480, 360));
    }

    #[test]
    fn test_inset_slide_fills_height() {
        let spec = CompositionSpec::default();

        // 4:3 slide: pillarboxed
        assert_eq!(spec.slide_rect(768, 576), Rect::new(240, 0, 1440, 1080));
        // Wider than 16:9: center-cropped
        assert_eq!(spec.slide_rect(2400, 1000), Rect::new(-336, 0, 2592, 1080));
    }

    #[test]
    fn test_full_with_overlay_letterboxes() {
        let spec = CompositionSpec {
            layout_mode: LayoutMode::FullWithOverlay,
            ..CompositionSpec::default()
        };

        assert_eq!(spec.slide_rect(2400, 1000), Rect::new(0, 140, 1920, 800));
        assert_eq!(spec.video_rect(1920, 1080), Rect::new(1420, 790, 480, 270));
    }

    #[test]
    fn test_side_by_side_regions() {
        let spec = CompositionSpec {
            layout_mode: LayoutMode::SideBySide,
            ..CompositionSpec::default()
        };

        let slide = spec.slide_rect(1920, 1080);
        let video = spec.video_rect(1920, 1080);

        // 70% of 1920 for slides, 20px gutter, the rest for video
        assert_eq!(slide.width, 1344);
        assert!(slide.x + slide.width as i64 <= 1344);
        assert_eq!(video.x, 1364 + (556 - video.width as i64) / 2);
        assert_eq!(video.width, 556);
        assert!(spec.border_rect(video).is_none());
    }

    #[test]
    fn test_side_by_side_falls_back_to_overlay_scale() {
        let spec = CompositionSpec {
            layout_mode: LayoutMode::SideBySide,
            slide_ratio: None,
            overlay_scale: 0.5,
            ..CompositionSpec::default()
        };
        assert_eq!(spec.slide_rect(1920, 1080).width, 960);
    }

    #[test]
    fn test_geometry_is_recomputed_not_accumulated() {
        let spec = CompositionSpec::default();
        let first = spec.video_rect(1280, 720);
        for _ in 0..1000 {
            assert_eq!(spec.video_rect(1280, 720), first);
        }
    }

    #[test]
    fn test_validation() {
        assert!(CompositionSpec::default().validate().is_ok());

        let bad_scale = CompositionSpec { overlay_scale: 0.0, ..CompositionSpec::default() };
        assert!(bad_scale.validate().is_err());

        let odd_canvas = CompositionSpec { canvas_width: 1919, ..CompositionSpec::default() };
        assert!(odd_canvas.validate().is_err());
    }

    #[test]
    fn test_layout_mode_parsing() {
        assert_eq!("inset".parse::<LayoutMode>().unwrap(), LayoutMode::Inset);
        assert_eq!("side-by-side".parse::<LayoutMode>().unwrap(), LayoutMode::SideBySide);
        assert!("mosaic".parse::<LayoutMode>().is_err());
    }
}
