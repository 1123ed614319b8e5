//! # Talk Processing
//!
//! Everything around the compositor for a real talk: finding the stream,
//! downloading it, fetching slides, and running talks in batches with a
//! log file per talk.

pub mod discovery;
pub mod download;
pub mod logging;
pub mod pipeline;

pub use discovery::{StreamDiscovery, TalkPage};
pub use download::VideoDownloader;
pub use logging::{spawn_blocking_traced, TalkLogLayer, TraceContext};
pub use pipeline::{resolve_inputs, BatchSummary, Stage, TalkFailure, TalkOutcome, TalkPipeline};
