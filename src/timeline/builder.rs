use tracing::{debug, info, warn};

use crate::error::{Result, TimelineError};
use crate::slides::SlideAsset;

/// Half-open range `[start_time, end_time)` during which one slide is shown
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineInterval {
    pub start_time: f64,
    pub end_time: f64,
    pub slide: SlideAsset,
}

impl TimelineInterval {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start_time <= t && t < self.end_time
    }
}

/// Immutable, gap-free interval sequence covering `[0, duration)`
///
/// Never empty: construction through [`TimelineBuilder`] rejects empty
/// input.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    intervals: Vec<TimelineInterval>,
    duration: f64,
}

impl Timeline {
    pub fn intervals(&self) -> &[TimelineInterval] {
        &self.intervals
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Index of the interval active at `t`
    ///
    /// Binary search over the start times. Instants at or past the end of
    /// the video clamp to the last interval, instants before zero to the
    /// first.
    pub fn index_at(&self, t: f64) -> usize {
        let after = self.intervals.partition_point(|interval| interval.start_time <= t);
        after.saturating_sub(1).min(self.intervals.len() - 1)
    }

    pub fn interval_at(&self, t: f64) -> &TimelineInterval {
        &self.intervals[self.index_at(t)]
    }

    /// Unique slides in display order, deduplicated by path
    pub fn unique_slides(&self) -> Vec<&SlideAsset> {
        let mut slides: Vec<&SlideAsset> = Vec::new();
        for interval in &self.intervals {
            if !slides.iter().any(|s| s.path == interval.slide.path) {
                slides.push(&interval.slide);
            }
        }
        slides
    }
}

/// Builds a [`Timeline`] from slide assets and the video duration
pub struct TimelineBuilder;

impl TimelineBuilder {
    /// Sort `assets` by timestamp and bind each to the range that ends where
    /// the next one starts; the last slide carries forward to `duration`.
    ///
    /// The first interval always starts at zero, even when the first slide
    /// appears later. Slides starting at or after `duration` are dropped
    /// (the first slide is always kept), so no interval is ever empty or
    /// negative.
    pub fn build(mut assets: Vec<SlideAsset>, duration: f64) -> Result<Timeline> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TimelineError::InvalidDuration { duration }.into());
        }

        if assets.is_empty() {
            return Err(TimelineError::Empty.into());
        }

        // Stable: equal keys would keep discovery order, but they are rejected below
        assets.sort_by_key(|asset| asset.timestamp_ms);

        if let Some(pair) = assets.windows(2).find(|w| w[0].timestamp_ms == w[1].timestamp_ms) {
            return Err(TimelineError::DuplicateTimestamp {
                timestamp_ms: pair[0].timestamp_ms,
            }
            .into());
        }

        let total = assets.len();
        let mut kept: Vec<SlideAsset> = Vec::with_capacity(total);
        for (i, asset) in assets.into_iter().enumerate() {
            if i > 0 && asset.start_seconds() >= duration {
                warn!(
                    "Slide at {:.3}s starts after the video ends ({:.3}s), dropping it",
                    asset.start_seconds(),
                    duration
                );
                continue;
            }
            kept.push(asset);
        }

        let mut intervals = Vec::with_capacity(kept.len());
        for (i, slide) in kept.iter().enumerate() {
            let start_time = if i == 0 { 0.0 } else { slide.start_seconds() };
            let end_time = kept
                .get(i + 1)
                .map(SlideAsset::start_seconds)
                .unwrap_or(duration);

            debug!("Interval {}: [{:.3}, {:.3}) -> {}", i, start_time, end_time, slide.path.display());

            intervals.push(TimelineInterval {
                start_time,
                end_time,
                slide: slide.clone(),
            });
        }

        info!(
            "Built timeline: {} intervals over {:.1}s ({} slides dropped)",
            intervals.len(),
            duration,
            total - intervals.len()
        );

        Ok(Timeline { intervals, duration })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;
    use proptest::prelude::*;

    fn slide(name: &str, ms: u64) -> SlideAsset {
        SlideAsset::new(format!("slides/{}.png", name), ms)
    }

    #[test]
    fn test_three_slides_scenario() {
        let assets = vec![slide("C", 12000), slide("A", 0), slide("B", 5000)];
        let timeline = TimelineBuilder::build(assets, 15.0).unwrap();

        let spans: Vec<(f64, f64, String)> = timeline
            .intervals()
            .iter()
            .map(|i| (i.start_time, i.end_time, i.slide.path.display().to_string()))
            .collect();

        assert_eq!(
            spans,
            vec![
                (0.0, 5.0, "slides/A.png".to_string()),
                (5.0, 12.0, "slides/B.png".to_string()),
                (12.0, 15.0, "slides/C.png".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_input_fails() {
        let err = TimelineBuilder::build(Vec::new(), 10.0).unwrap_err();
        assert!(matches!(err, CompositorError::Timeline(TimelineError::Empty)));
    }

    #[test]
    fn test_duplicate_timestamps_fail() {
        let assets = vec![slide("a", 1000), slide("b", 1000)];
        let err = TimelineBuilder::build(assets, 10.0).unwrap_err();
        assert!(matches!(
            err,
            CompositorError::Timeline(TimelineError::DuplicateTimestamp { timestamp_ms: 1000 })
        ));
    }

    #[test]
    fn test_invalid_duration_fails() {
        assert!(TimelineBuilder::build(vec![slide("a", 0)], 0.0).is_err());
        assert!(TimelineBuilder::build(vec![slide("a", 0)], f64::NAN).is_err());
    }

    #[test]
    fn test_late_first_slide_covers_from_zero() {
        let timeline = TimelineBuilder::build(vec![slide("a", 2500), slide("b", 4000)], 6.0).unwrap();
        assert_eq!(timeline.intervals()[0].start_time, 0.0);
        assert_eq!(timeline.intervals()[0].end_time, 4.0);
    }

    #[test]
    fn test_slides_past_the_end_are_clamped() {
        let assets = vec![slide("a", 0), slide("b", 9000), slide("c", 20000)];
        let timeline = TimelineBuilder::build(assets, 10.0).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.intervals()[1].end_time, 10.0);

        // A lone slide past the end still covers the whole video
        let timeline = TimelineBuilder::build(vec![slide("z", 30000)], 10.0).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline.intervals()[0].duration(), 10.0);
    }

    #[test]
    fn test_lookup_clamps_at_the_end() {
        let assets = vec![slide("A", 0), slide("B", 5000), slide("C", 12000)];
        let timeline = TimelineBuilder::build(assets, 15.0).unwrap();

        assert_eq!(timeline.index_at(0.0), 0);
        assert_eq!(timeline.index_at(4.999), 0);
        assert_eq!(timeline.index_at(5.0), 1);
        assert_eq!(timeline.index_at(14.99), 2);
        assert_eq!(timeline.index_at(15.0), 2);
        assert_eq!(timeline.index_at(99.0), 2);
    }

    #[test]
    fn test_unique_slides_in_order() {
        let assets = vec![slide("A", 0), slide("B", 5000)];
        let timeline = TimelineBuilder::build(assets, 8.0).unwrap();
        let unique: Vec<u64> = timeline.unique_slides().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(unique, vec![0, 5000]);
    }

    fn distinct_slides() -> impl Strategy<Value = (Vec<SlideAsset>, f64)> {
        (prop::collection::btree_set(0u64..600_000, 1..40), 0u64..120_000).prop_map(
            |(stamps, extra_ms)| {
                let max = *stamps.iter().max().unwrap_or(&0);
                let duration = (max + extra_ms + 1) as f64 / 1000.0;
                let assets = stamps
                    .into_iter()
                    .rev()
                    .map(|ms| SlideAsset::new(format!("{}.png", ms), ms))
                    .collect();
                (assets, duration)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_intervals_cover_video_exactly((assets, duration) in distinct_slides()) {
            let timeline = TimelineBuilder::build(assets, duration).unwrap();
            let intervals = timeline.intervals();

            prop_assert_eq!(intervals[0].start_time, 0.0);
            prop_assert_eq!(intervals[intervals.len() - 1].end_time, duration);
            for pair in intervals.windows(2) {
                prop_assert_eq!(pair[0].end_time, pair[1].start_time);
            }
            for interval in intervals {
                prop_assert!(interval.start_time < interval.end_time);
            }
        }

        #[test]
        fn prop_build_is_idempotent((assets, duration) in distinct_slides()) {
            let first = TimelineBuilder::build(assets.clone(), duration).unwrap();
            let second = TimelineBuilder::build(assets, duration).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_lookup_is_unique(
            (assets, duration) in distinct_slides(),
            fraction in 0.0f64..1.0,
        ) {
            let timeline = TimelineBuilder::build(assets, duration).unwrap();
            let t = fraction * duration;
            prop_assume!(t < duration);
            let containing: Vec<usize> = timeline
                .intervals()
                .iter()
                .enumerate()
                .filter(|(_, interval)| interval.contains(t))
                .map(|(i, _)| i)
                .collect();

            prop_assert_eq!(containing.len(), 1);
            prop_assert_eq!(containing[0], timeline.index_at(t));
        }
    }
}
