//! # Talk-Compositor
//!
//! Turn a recorded conference talk and its timestamped slides into a single
//! composited video.
//!
//! The library reconciles a sparse, irregular sequence of slide images with
//! the continuous video timeline and renders the result with one of two
//! strategies: per-frame compositing or segment-based concatenation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use talk_compositor::{composition::CompositorDriver, config::Config};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.render.strategy = "segment".to_string();
//!
//! let mut driver = CompositorDriver::new(config);
//! let rendered = driver
//!     .compose("talk/initialdownload.mp4", "talk/slides", "talk/finalvideo.mp4")
//!     .await?;
//! println!("{} ({} bytes)", rendered.path.display(), rendered.file_size);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`timeline`] - Slide timeline construction and lookup
//! - [`composition`] - Layout geometry, render strategies and the driver
//! - [`video`] - Probing, decoding and the typed ffmpeg command builder
//! - [`slides`] - Slide discovery on disk and concurrent download
//! - [`talk`] - Stream discovery, download and the batch pipeline
//! - [`config`] - Configuration management
//!
//! ## Custom Strategies
//!
//! Strategies are looked up by name, so new ones can be registered next to
//! the built-in `segment` and `frame`:
//!
//! ```rust,no_run
//! use talk_compositor::composition::{RenderJob, RenderStrategy, StrategyRegistry};
//! use talk_compositor::Result;
//!
//! struct DryRun;
//!
//! impl RenderStrategy for DryRun {
//!     fn name(&self) -> &str {
//!         "dry-run"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Logs the timeline without encoding"
//!     }
//!
//!     fn render(&self, job: &RenderJob) -> Result<()> {
//!         println!("{} intervals", job.timeline.len());
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = StrategyRegistry::new();
//! registry.register("dry-run", || Box::new(DryRun));
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod slides;
pub mod talk;
pub mod timeline;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompositionSpec, CompositorDriver, LayoutMode, RenderStrategy, StrategyRegistry},
    config::Config,
    error::{CompositorError, ErrorKind, Result},
    slides::SlideAsset,
    timeline::{Timeline, TimelineBuilder, TimelineInterval},
};
