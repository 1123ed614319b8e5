use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    composition::{CompositorDriver, PipOverlay},
    config::Config,
    error::{CompositorError, ErrorKind, Result, TimelineError},
    slides::SlideFetcher,
    talk::{
        discovery::{StreamDiscovery, TalkPage},
        download::VideoDownloader,
        logging::spawn_blocking_traced,
    },
};

pub const SLIDES_DIR: &str = "slides";
pub const COMPOSED_FILE: &str = "createdslides.mp4";
pub const FINAL_FILE: &str = "finalvideo.mp4";
pub const LOG_FILE: &str = "processing.log";

/// Pipeline step a talk was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Discover,
    Download,
    FetchSlides,
    Compose,
    Pip,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Discover => "discover",
            Stage::Download => "download",
            Stage::FetchSlides => "fetch-slides",
            Stage::Compose => "compose",
            Stage::Pip => "pip",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TalkFailure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl TalkFailure {
    fn new(stage: Stage, error: &CompositorError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.user_message(),
        }
    }
}

/// Result of processing one talk
#[derive(Debug, Clone, PartialEq)]
pub struct TalkOutcome {
    pub url: String,
    pub talk_dir: Option<PathBuf>,
    /// The final video, or where and why processing stopped
    pub result: std::result::Result<PathBuf, TalkFailure>,
}

impl TalkOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-talk results of a batch, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub outcomes: Vec<TalkOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn log(&self) {
        info!("📊 Batch finished: {} succeeded, {} failed", self.succeeded(), self.failed());
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(path) => info!("   ✅ {} -> {}", outcome.url, path.display()),
                Err(failure) => error!(
                    "   ❌ {} failed at {} ({:?}): {}",
                    outcome.url, failure.stage, failure.kind, failure.message
                ),
            }
        }
    }
}

/// Runs discover → download → fetch slides → compose → PiP per talk
#[derive(Clone)]
pub struct TalkPipeline {
    config: Arc<Config>,
}

impl TalkPipeline {
    pub fn new(config: Config) -> Self {
        Self { config: Arc::new(config) }
    }

    /// `<output_root>/talk_<id>_<title>`
    pub fn talk_dir(&self, page: &TalkPage) -> PathBuf {
        Path::new(&self.config.batch.output_root).join(format!("talk_{}_{}", page.talk_id, page.title))
    }

    /// Process one talk; never panics or returns early, failures end up in the outcome
    pub async fn process(&self, url: &str) -> TalkOutcome {
        info!("Starting processing for talk: {}", url);

        let page = match self.discover(url).await {
            Ok(page) => page,
            Err(e) => {
                error!(stage = %Stage::Discover, "Error processing talk {}: {}", url, e);
                return TalkOutcome {
                    url: url.to_string(),
                    talk_dir: None,
                    result: Err(TalkFailure::new(Stage::Discover, &e)),
                };
            }
        };

        let talk_dir = self.talk_dir(&page);
        if let Err(e) = tokio::fs::create_dir_all(&talk_dir).await {
            let e = CompositorError::from(e);
            error!(stage = %Stage::Setup, "Cannot create {}: {}", talk_dir.display(), e);
            return TalkOutcome {
                url: url.to_string(),
                talk_dir: Some(talk_dir),
                result: Err(TalkFailure::new(Stage::Setup, &e)),
            };
        }

        let log_file = talk_dir.join(LOG_FILE);
        let span = info_span!("talk", talk = %page.talk_id, log_file = %log_file.display());

        let result = async {
            info!("Starting processing for talk: {}", url);
            match self.run_stages(&page, &talk_dir).await {
                Ok(final_video) => {
                    info!(
                        "Successfully processed talk {}. Final output: {}",
                        page.talk_id,
                        final_video.display()
                    );
                    Ok(final_video)
                }
                Err((stage, e)) => {
                    error!(stage = %stage, kind = ?e.kind(), "Error processing talk {}: {}", url, e);
                    Err(TalkFailure::new(stage, &e))
                }
            }
        }
        .instrument(span)
        .await;

        TalkOutcome {
            url: url.to_string(),
            talk_dir: Some(talk_dir),
            result,
        }
    }

    async fn discover(&self, url: &str) -> Result<TalkPage> {
        StreamDiscovery::new(&self.config.fetch)?.discover(url).await
    }

    async fn run_stages(&self, page: &TalkPage, talk_dir: &Path) -> std::result::Result<PathBuf, (Stage, CompositorError)> {
        let config = &self.config;

        // ==========================================
        // STEP 1: VIDEO
        // ==========================================
        info!(stage = %Stage::Download, "Downloading video...");
        let video_path = VideoDownloader::new(&config.batch, &config.encoder)
            .download(&page.playlist_url, talk_dir)
            .await
            .map_err(|e| (Stage::Download, e))?;

        // ==========================================
        // STEP 2: SLIDES
        // ==========================================
        info!(stage = %Stage::FetchSlides, "Downloading slides...");
        let slides_dir = talk_dir.join(SLIDES_DIR);
        let fetcher = SlideFetcher::new(config.fetch.clone()).map_err(|e| (Stage::FetchSlides, e))?;
        let report = fetcher
            .fetch_all(&page.talk_id, &slides_dir)
            .await
            .map_err(|e| (Stage::FetchSlides, e))?;

        if report.is_empty() {
            return Err((Stage::FetchSlides, TimelineError::Empty.into()));
        }
        if !report.failed.is_empty() {
            warn!(
                "Continuing with {} slides, {} could not be fetched",
                report.downloaded.len(),
                report.failed.len()
            );
        }

        // ==========================================
        // STEP 3: COMPOSE
        // ==========================================
        let final_path = talk_dir.join(FINAL_FILE);
        let composed_path = if config.batch.final_pip {
            talk_dir.join(COMPOSED_FILE)
        } else {
            final_path.clone()
        };

        info!(stage = %Stage::Compose, "Creating presentation video...");
        let mut driver = CompositorDriver::new(Config::clone(config));
        driver
            .compose(video_path.clone(), slides_dir, composed_path.clone())
            .await
            .map_err(|e| (Stage::Compose, e))?;

        // ==========================================
        // STEP 4: PIP
        // ==========================================
        if config.batch.final_pip {
            info!(stage = %Stage::Pip, "Creating final PiP video...");
            let encoder = config.encoder.clone();
            let output = final_path.clone();
            spawn_blocking_traced(move || {
                PipOverlay::default().run(&composed_path, &video_path, &output, &encoder)
            })
            .await
            .map_err(|e| CompositorError::generic(format!("PiP worker failed: {}", e)))
            .and_then(|result| result)
            .map_err(|e| (Stage::Pip, e))?;
        }

        Ok(final_path)
    }

    /// Process every URL, at most `batch.max_concurrent_talks` at a time
    ///
    /// A failing talk never stops the others.
    pub async fn process_batch(&self, urls: Vec<String>) -> BatchSummary {
        let semaphore = Arc::new(Semaphore::new(self.config.batch.max_concurrent_talks.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            "Processing {} talks, {} at a time",
            urls.len(),
            self.config.batch.max_concurrent_talks
        );

        for (index, url) in urls.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = self.clone();

            tasks.spawn(async move {
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => pipeline.process(&url).await,
                    Err(e) => TalkOutcome {
                        url: url.clone(),
                        talk_dir: None,
                        result: Err(TalkFailure::new(Stage::Setup, &CompositorError::generic(e.to_string()))),
                    },
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<TalkOutcome>> = vec![None; urls.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!("Talk task aborted: {}", e),
            }
        }

        let outcomes = outcomes
            .into_iter()
            .zip(urls)
            .map(|(outcome, url)| {
                outcome.unwrap_or_else(|| TalkOutcome {
                    url,
                    talk_dir: None,
                    result: Err(TalkFailure {
                        stage: Stage::Setup,
                        kind: ErrorKind::Other,
                        message: "task aborted".to_string(),
                    }),
                })
            })
            .collect();

        BatchSummary { outcomes }
    }
}

/// A single URL, or the non-blank lines of a URL list file
pub async fn resolve_inputs(input: &str) -> Result<Vec<String>> {
    let path = Path::new(input);
    if tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false) {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(parse_url_list(&content))
    } else {
        Ok(vec![input.trim().to_string()])
    }
}

pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
