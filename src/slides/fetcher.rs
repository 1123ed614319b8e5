use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::FetchConfig;
use crate::error::{CompositorError, FetchError, Result};
use crate::slides::types::{SlideAsset, SlidesDocument};

/// Outcome of downloading a presentation's slides
///
/// Individual failures never abort the batch; they are collected here so
/// the caller can decide whether what arrived is enough.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub downloaded: Vec<SlideAsset>,
    pub failed: Vec<FetchError>,
}

impl FetchReport {
    pub fn is_empty(&self) -> bool {
        self.downloaded.is_empty()
    }
}

/// Downloads slide metadata and images over HTTP
pub struct SlideFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl SlideFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::MetadataFailed {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Fetch and parse the slide descriptor document for a presentation
    pub async fn fetch_document(&self, presentation_id: &str) -> Result<SlidesDocument> {
        let url = self.config.slides_json_url.replace("{id}", presentation_id);
        debug!("Fetching slide metadata from {}", url);

        let body = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| FetchError::MetadataFailed { reason: e.to_string() })?
            .text()
            .await
            .map_err(|e| FetchError::MetadataFailed { reason: e.to_string() })?;

        let document: SlidesDocument = serde_json::from_str(&body)
            .map_err(|e| FetchError::MetadataFailed {
                reason: format!("Invalid slide metadata: {}", e),
            })?;

        if document.slides.is_empty() {
            warn!("Slide metadata for {} lists no slides", presentation_id);
        }

        Ok(document)
    }

    /// Download every image slide of `presentation_id` into `output_dir`
    pub async fn fetch_all(&self, presentation_id: &str, output_dir: &Path) -> Result<FetchReport> {
        let document = self.fetch_document(presentation_id).await?;
        let slides = document.image_slides();
        info!("Downloading {} slides for presentation {}", slides.len(), presentation_id);

        let client = self.client.clone();
        let template = self.config.slide_image_url.clone();
        let id = presentation_id.to_string();

        download_bounded(slides, output_dir, self.config.max_concurrent, move |name: String| {
            let client = client.clone();
            let url = template.replace("{id}", &id).replace("{name}", &name);
            async move {
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| FetchError::AssetFetchFailed {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;

                let bytes = response.bytes().await.map_err(|e| FetchError::AssetFetchFailed {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;

                Ok(bytes.to_vec())
            }
        })
        .await
    }
}

/// Download `slides` with at most `max_concurrent` fetches in flight
///
/// Each slide is saved as `<timestamp>.png` in `output_dir`. `fetch` maps an
/// image name to its bytes.
pub async fn download_bounded<F, Fut>(
    slides: Vec<(String, u64)>,
    output_dir: &Path,
    max_concurrent: usize,
    fetch: F,
) -> Result<FetchReport>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    tokio::fs::create_dir_all(output_dir).await?;

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let fetch = Arc::new(fetch);
    let mut tasks = JoinSet::new();

    for (name, timestamp_ms) in slides {
        let semaphore = Arc::clone(&semaphore);
        let fetch = Arc::clone(&fetch);
        let path = output_dir.join(format!("{}.png", timestamp_ms));

        tasks.spawn(
            async move {
                let result = fetch_one(&semaphore, fetch.as_ref(), &name, &path).await;
                (name, timestamp_ms, path, result)
            }
            .in_current_span(),
        );
    }

    let mut report = FetchReport::default();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, timestamp_ms, path, Ok(()))) => {
                debug!("Downloaded slide {} for timestamp {}", name, timestamp_ms);
                report.downloaded.push(SlideAsset::new(path, timestamp_ms));
            }
            Ok((name, _, _, Err(e))) => {
                error!("Error downloading slide {}: {}", name, e);
                let failure = match e {
                    CompositorError::Fetch(fetch_error) => fetch_error,
                    other => FetchError::AssetFetchFailed {
                        name,
                        reason: other.to_string(),
                    },
                };
                report.failed.push(failure);
            }
            Err(e) => {
                error!("Slide download task aborted: {}", e);
                report.failed.push(FetchError::AssetFetchFailed {
                    name: "<unknown>".to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report.downloaded.sort_by_key(|asset| asset.timestamp_ms);

    if report.failed.is_empty() {
        info!("Downloaded all {} slides to {}", report.downloaded.len(), output_dir.display());
    } else {
        warn!(
            "Downloaded {} slides, {} failed",
            report.downloaded.len(),
            report.failed.len()
        );
    }

    Ok(report)
}

async fn fetch_one<F, Fut>(semaphore: &Semaphore, fetch: &F, name: &str, path: &Path) -> Result<()>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    let _permit = semaphore
        .acquire()
        .await
        .map_err(|e| FetchError::AssetFetchFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    let bytes = fetch(name.to_string()).await?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
