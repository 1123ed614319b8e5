use thiserror::Error;

/// Main error type for the Talk-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Errors raised while turning slide assets into a timeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    #[error("No slide assets supplied")]
    Empty,

    #[error("Slide name is not a millisecond timestamp: {name}")]
    MalformedTimestamp { name: String },

    #[error("Two slides share timestamp {timestamp_ms}ms")]
    DuplicateTimestamp { timestamp_ms: u64 },

    #[error("Video duration must be positive, got {duration}")]
    InvalidDuration { duration: f64 },
}

/// Errors raised by the compositors themselves
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("Frame at {t:.3}s is outside the video ({duration:.3}s)")]
    FrameOutOfRange { t: f64, duration: f64 },

    #[error("Invalid layout: {details}")]
    InvalidLayout { details: String },

    #[error("Unknown render strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("Failed to load slide {path}: {reason}")]
    SlideLoadFailed { path: String, reason: String },
}

/// Errors from the external encoder/prober
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Video encoding failed: {reason}")]
    EncodingFailed { reason: String },

    #[error("Failed to probe {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },
}

/// Errors from the network side: slide and stream retrieval
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch slide {name}: {reason}")]
    AssetFetchFailed { name: String, reason: String },

    #[error("No video stream found for {url}: {reason}")]
    StreamDiscoveryFailed { url: String, reason: String },

    #[error("Failed to fetch slide metadata: {reason}")]
    MetadataFailed { reason: String },

    #[error("Video download failed: {reason}")]
    DownloadFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Coarse classification of a [`CompositorError`], one tag per failure kind
/// the pipeline distinguishes when reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyTimeline,
    MalformedTimestamp,
    FrameOutOfRange,
    EncodingFailed,
    AssetFetchFailed,
    StreamDiscoveryFailed,
    Other,
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeline(TimelineError::Empty) => ErrorKind::EmptyTimeline,
            Self::Timeline(TimelineError::MalformedTimestamp { .. }) => ErrorKind::MalformedTimestamp,
            Self::Composition(CompositionError::FrameOutOfRange { .. }) => ErrorKind::FrameOutOfRange,
            Self::Video(VideoError::EncodingFailed { .. }) => ErrorKind::EncodingFailed,
            Self::Fetch(FetchError::AssetFetchFailed { .. }) => ErrorKind::AssetFetchFailed,
            Self::Fetch(FetchError::StreamDiscoveryFailed { .. }) => ErrorKind::StreamDiscoveryFailed,
            _ => ErrorKind::Other,
        }
    }

    /// Per-asset fetch failures are skipped; everything else aborts the talk
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::AssetFetchFailed
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeline(TimelineError::Empty) => {
                "No slides were available, so there is nothing to compose.".to_string()
            }
            Self::Fetch(FetchError::StreamDiscoveryFailed { url, .. }) => {
                format!("Could not find a video stream on '{}'.", url)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: CompositorError = TimelineError::Empty.into();
        assert_eq!(err.kind(), ErrorKind::EmptyTimeline);

        let err: CompositorError = VideoError::EncodingFailed { reason: "x".into() }.into();
        assert_eq!(err.kind(), ErrorKind::EncodingFailed);

        let err: CompositorError = TimelineError::InvalidDuration { duration: 0.0 }.into();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_only_asset_failures_are_recoverable() {
        let asset: CompositorError = FetchError::AssetFetchFailed {
            name: "s1".into(),
            reason: "timeout".into(),
        }
        .into();
        assert!(asset.is_recoverable());

        let stream: CompositorError = FetchError::StreamDiscoveryFailed {
            url: "https://example.com".into(),
            reason: "no playlist".into(),
        }
        .into();
        assert!(!stream.is_recoverable());
    }
}
