//! # Slide Timeline
//!
//! Turns an unordered set of timestamped slides into contiguous half-open
//! intervals covering the whole video, and answers "which slide is showing
//! at `t`".

pub mod builder;

pub use builder::{Timeline, TimelineBuilder, TimelineInterval};
