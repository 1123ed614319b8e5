use std::path::{Path, PathBuf};

use image::{io::Reader as ImageReader, RgbImage};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{CompositionError, Result, TimelineError};

/// A single slide image and the offset at which it becomes active
///
/// The image itself stays on disk until a renderer asks for the pixels;
/// the segment renderer only ever needs the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideAsset {
    /// Path to the raster image
    pub path: PathBuf,

    /// Milliseconds since talk start (parsed from the file stem)
    pub timestamp_ms: u64,
}

impl SlideAsset {
    pub fn new<P: Into<PathBuf>>(path: P, timestamp_ms: u64) -> Self {
        Self {
            path: path.into(),
            timestamp_ms,
        }
    }

    /// Parse the timestamp from a filename like "12000.png"
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let timestamp_ms = stem
            .parse::<u64>()
            .map_err(|_| TimelineError::MalformedTimestamp {
                name: path.display().to_string(),
            })?;

        Ok(Self::new(path, timestamp_ms))
    }

    pub fn start_seconds(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }

    /// Decode the slide into RGB pixels
    ///
    /// The format is sniffed from the content; fetched slides are named
    /// `.png` whatever the server actually sent.
    pub fn load_image(&self) -> Result<RgbImage> {
        let load_failed = |reason: String| CompositionError::SlideLoadFailed {
            path: self.path.display().to_string(),
            reason,
        };

        let image = ImageReader::open(&self.path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|e| load_failed(e.to_string()))?
            .decode()
            .map_err(|e| load_failed(e.to_string()))?;
        Ok(image.to_rgb8())
    }
}

/// One-shot snapshot of a directory of timestamp-named slide images
pub struct SlideDirectory;

impl SlideDirectory {
    /// List every raster file in `directory`, in discovery order
    pub fn scan<P: AsRef<Path>>(directory: P) -> Result<Vec<SlideAsset>> {
        let directory = directory.as_ref();
        let mut assets = Vec::new();

        if !directory.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Slides directory not found: {}", directory.display()),
            )
            .into());
        }

        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();

            if !path.is_file() || Self::is_hidden_file(&path) || !Self::is_supported(&path) {
                continue;
            }

            let asset = SlideAsset::from_path(&path)?;
            debug!("Found slide {} at {}ms", path.display(), asset.timestamp_ms);
            assets.push(asset);
        }

        info!("Scanned {} slides from {}", assets.len(), directory.display());
        Ok(assets)
    }

    pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
        matches!(
            path.as_ref().extension().and_then(|ext| ext.to_str()),
            Some(ext) if matches!(
                ext.to_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "webp"
            )
        )
    }

    fn is_hidden_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
    }
}

/// Entry of the remote slide metadata document
#[derive(Debug, Clone, Deserialize)]
pub struct SlideDescriptor {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub image: Option<SlideImageRef>,

    /// Milliseconds since talk start
    pub time: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlideImageRef {
    pub name: String,
}

impl SlideDescriptor {
    /// Image name, only for `type == "image"` entries
    pub fn image_name(&self) -> Option<&str> {
        if self.kind != "image" {
            return None;
        }
        self.image.as_ref().map(|image| image.name.as_str())
    }
}

/// Top-level shape of the slide metadata document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlidesDocument {
    #[serde(default)]
    pub slides: Vec<SlideDescriptor>,
}

impl SlidesDocument {
    /// `(image name, timestamp)` pairs for the image slides only
    pub fn image_slides(&self) -> Vec<(String, u64)> {
        self.slides
            .iter()
            .filter_map(|slide| slide.image_name().map(|name| (name.to_string(), slide.time)))
            .collect()
    }
}
