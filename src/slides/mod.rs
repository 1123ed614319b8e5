//! # Slide Assets
//!
//! Slide images tagged with the millisecond offset at which they appear,
//! the directory scan that discovers them, and the concurrent fetcher that
//! downloads them.

pub mod fetcher;
pub mod types;

pub use fetcher::{FetchReport, SlideFetcher};
pub use types::{SlideAsset, SlideDescriptor, SlideDirectory};
