//! # Video Processing Module
//!
//! Frame buffers, probing and decoding of the talk video, and the typed
//! ffmpeg command builder every encode goes through.

pub mod ffmpeg;
pub mod source;
pub mod types;

pub use ffmpeg::{FfmpegCommand, FfmpegInput, FilterGraph};
pub use source::{FrameSource, FrameStream, VideoSource};
pub use types::Frame;
