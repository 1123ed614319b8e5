use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::{
    composition::{
        frame::FrameCompositor,
        strategy::{RenderJob, StrategyRegistry},
    },
    config::Config,
    error::{CompositionError, CompositorError, ErrorKind, Result},
    slides::{SlideAsset, SlideDirectory},
    talk::logging::spawn_blocking_traced,
    timeline::{Timeline, TimelineBuilder},
    video::VideoSource,
};

/// Where the driver is in a composition run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    TimelineBuilt,
    Rendering,
    Done,
    /// Carries the kind of the error that was returned to the caller
    Failed(ErrorKind),
}

/// The encoded artifact; the caller owns the file from here on
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    pub path: PathBuf,
    pub duration: f64,
    pub file_size: u64,
    pub strategy: String,
}

/// Drives one composition: timeline, strategy dispatch, output
///
/// The pipeline is:
/// 1. Timeline - Snapshot the slide directory and build the interval sequence
/// 2. Strategy - Resolve the configured render strategy by name
/// 3. Render - Run the strategy on a blocking worker
/// 4. Output - Hand the finished file back as a [`RenderedOutput`]
///
/// Any error moves the driver to [`DriverState::Failed`] and is returned
/// unchanged.
pub struct CompositorDriver {
    config: Config,
    registry: StrategyRegistry,
    state: DriverState,
}

impl CompositorDriver {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, StrategyRegistry::new())
    }

    /// Use a custom set of strategies
    pub fn with_registry(config: Config, registry: StrategyRegistry) -> Self {
        Self {
            config,
            registry,
            state: DriverState::Idle,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Probe `video`, scan `slides_dir`, and render to `output`
    pub async fn compose<P: AsRef<Path>>(&mut self, video: P, slides_dir: P, output: P) -> Result<RenderedOutput> {
        let video = video.as_ref().to_path_buf();
        let slides_dir = slides_dir.as_ref().to_path_buf();
        let output = output.as_ref();

        self.state = DriverState::Idle;
        info!("🎬 Composing {} with slides from {}", video.display(), slides_dir.display());

        let encoder = self.config.encoder.clone();
        let prepared = spawn_blocking_traced(move || -> Result<(VideoSource, Vec<SlideAsset>)> {
            let source = VideoSource::probe(&video, &encoder)?;
            let slides = SlideDirectory::scan(&slides_dir)?;
            Ok((source, slides))
        })
        .await
        .map_err(join_error)
        .and_then(|prepared| prepared);

        match prepared {
            Ok((source, slides)) => self.compose_source(source, slides, output).await,
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Render an already probed video with an already scanned slide set
    pub async fn compose_source(
        &mut self,
        video: VideoSource,
        slides: Vec<SlideAsset>,
        output: &Path,
    ) -> Result<RenderedOutput> {
        match self.run(video, slides, output).await {
            Ok(rendered) => {
                self.state = DriverState::Done;
                info!(
                    strategy = %rendered.strategy,
                    "🎉 Composition complete: {} ({:.1} MB)",
                    rendered.path.display(),
                    rendered.file_size as f64 / 1_048_576.0
                );
                Ok(rendered)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn run(&mut self, video: VideoSource, slides: Vec<SlideAsset>, output: &Path) -> Result<RenderedOutput> {
        // ==========================================
        // STEP 1: TIMELINE
        // ==========================================
        let timeline = self.build_timeline(&video, slides)?;

        // ==========================================
        // STEP 2: STRATEGY
        // ==========================================
        let name = self.config.render.strategy.clone();
        let strategy = self
            .registry
            .get(&name)
            .ok_or_else(|| CompositionError::UnknownStrategy { name: name.clone() })?;
        debug!("Using {} strategy: {}", strategy.name(), strategy.description());

        // ==========================================
        // STEP 3: RENDER
        // ==========================================
        self.state = DriverState::Rendering;
        let work_dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let job = RenderJob {
            video,
            timeline,
            spec: self.config.composition.clone(),
            render: self.config.render.clone(),
            encoder: self.config.encoder.clone(),
            output: output.to_path_buf(),
            work_dir,
        };
        let duration = job.timeline.duration();

        spawn_blocking_traced(move || strategy.render(&job))
            .await
            .map_err(join_error)??;

        // ==========================================
        // STEP 4: OUTPUT
        // ==========================================
        let file_size = std::fs::metadata(output)?.len();

        Ok(RenderedOutput {
            path: output.to_path_buf(),
            duration,
            file_size,
            strategy: name,
        })
    }

    /// Idle → TimelineBuilt
    pub fn build_timeline(&mut self, video: &VideoSource, slides: Vec<SlideAsset>) -> Result<Timeline> {
        info!("⏱️  Building timeline from {} slides", slides.len());
        let timeline = TimelineBuilder::build(slides, video.duration)?;
        self.state = DriverState::TimelineBuilt;
        Ok(timeline)
    }

    /// Render a single composited frame at `t` to a PNG
    pub async fn preview<P: AsRef<Path>>(&mut self, video: P, slides_dir: P, t: f64, output: P) -> Result<()> {
        let video = video.as_ref().to_path_buf();
        let slides_dir = slides_dir.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let config = self.config.clone();

        let result = spawn_blocking_traced(move || -> Result<()> {
            let source = VideoSource::probe(&video, &config.encoder)?;
            let slides = SlideDirectory::scan(&slides_dir)?;
            let timeline = TimelineBuilder::build(slides, source.duration)?;

            let compositor = FrameCompositor::new(
                timeline,
                config.composition.clone(),
                (source.width, source.height),
                config.render.fps,
            )?;
            let frame = compositor.compose_at(t, &source)?;
            frame
                .save_png(&output)
                .map_err(|e| CompositorError::generic(format!("Failed to write {}: {}", output.display(), e)))?;

            info!("🖼️  Preview at {:.3}s written to {}", t, output.display());
            Ok(())
        })
        .await
        .map_err(join_error)
        .and_then(|result| result);

        match result {
            Ok(()) => {
                self.state = DriverState::Done;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, e: CompositorError) -> CompositorError {
        error!(kind = ?e.kind(), "Composition failed: {}", e);
        self.state = DriverState::Failed(e.kind());
        e
    }
}

fn join_error(e: tokio::task::JoinError) -> CompositorError {
    CompositorError::generic(format!("Render worker failed: {}", e))
}
