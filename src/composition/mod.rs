//! # Composition
//!
//! Turns a slide timeline and a talk video into one composited video.
//! Two interchangeable strategies sit behind [`RenderStrategy`]: per-frame
//! compositing and segment-based concatenation. [`CompositorDriver`] picks
//! one by name and runs it.

pub mod engine;
pub mod frame;
pub mod layout;
pub mod pip;
pub mod segment;
pub mod strategy;

// Re-exports for convenience
pub use engine::{CompositorDriver, DriverState, RenderedOutput};
pub use frame::{FrameCompositor, FrameStrategy};
pub use layout::{CompositionSpec, LayoutMode, Rect};
pub use pip::PipOverlay;
pub use segment::{SegmentStrategy, SlideTrack};
pub use strategy::{RenderJob, RenderStrategy, StrategyRegistry};
