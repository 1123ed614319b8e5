use std::collections::HashMap;
use std::path::PathBuf;

use crate::{
    composition::{frame::FrameStrategy, layout::CompositionSpec, segment::SegmentStrategy},
    config::{EncoderConfig, RenderConfig},
    error::Result,
    timeline::Timeline,
    video::VideoSource,
};

/// Everything a strategy needs to turn a timeline into an encoded video
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub video: VideoSource,
    pub timeline: Timeline,
    pub spec: CompositionSpec,
    pub render: RenderConfig,
    pub encoder: EncoderConfig,
    pub output: PathBuf,

    /// Scratch space for concat lists and intermediate tracks
    pub work_dir: PathBuf,
}

/// A way of producing the composite video for a whole timeline
///
/// Implementations are synchronous; the driver runs them off the async
/// scheduler.
pub trait RenderStrategy: Send + Sync {
    /// Returns the unique name of this strategy
    fn name(&self) -> &str;

    /// Returns a human-readable description of this strategy
    fn description(&self) -> &str;

    /// Render `job` to `job.output`
    ///
    /// Encoder failures are retried once with the fallback codec before
    /// `EncodingFailed` is returned.
    fn render(&self, job: &RenderJob) -> Result<()>;
}

type StrategyFactory = Box<dyn Fn() -> Box<dyn RenderStrategy> + Send + Sync>;

/// Registry for managing available render strategies
pub struct StrategyRegistry {
    strategies: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub const DEFAULT: &'static str = "segment";

    /// Create a new registry with both built-in strategies
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };

        registry.register("segment", || Box::new(SegmentStrategy::new()));
        registry.register("frame", || Box::new(FrameStrategy::new()));
        registry
    }

    /// Register a custom strategy
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn RenderStrategy> + Send + Sync + 'static,
    {
        self.strategies.insert(name.to_string(), Box::new(factory));
    }

    /// Get a fresh instance of a strategy by name
    pub fn get(&self, name: &str) -> Option<Box<dyn RenderStrategy>> {
        self.strategies.get(name).map(|factory| factory())
    }

    /// Get all available strategy names, sorted
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullStrategy;

    impl RenderStrategy for NullStrategy {
        fn name(&self) -> &str {
            "null"
        }

        fn description(&self) -> &str {
            "Renders nothing"
        }

        fn render(&self, _job: &RenderJob) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_strategies_available() {
        let registry = StrategyRegistry::new();

        assert!(registry.has("segment"));
        assert!(registry.has("frame"));
        assert!(registry.has(StrategyRegistry::DEFAULT));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.available(), vec!["frame".to_string(), "segment".to_string()]);
    }

    #[test]
    fn test_get_strategy() {
        let registry = StrategyRegistry::new();

        assert_eq!(registry.get("frame").unwrap().name(), "frame");
        assert_eq!(registry.get("segment").unwrap().name(), "segment");
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_custom_strategy_registration() {
        let mut registry = StrategyRegistry::new();
        registry.register("null", || Box::new(NullStrategy));

        assert!(registry.has("null"));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("null").unwrap().description(), "Renders nothing");
    }
}
