use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    config::{BatchConfig, EncoderConfig},
    error::{CompositorError, FetchError, Result},
    talk::logging::spawn_blocking_traced,
    video::{
        ffmpeg::{AudioOutput, FfmpegCommand, FfmpegInput},
        VideoSource,
    },
};

/// File names inside a talk directory
pub const VIDEO_FILE: &str = "initialdownload.mp4";
pub const DOWNLOAD_LOG_FILE: &str = "download.log";
pub const AUDIO_FILE: &str = "audio.mp3";

/// Fetches the talk video through an external HLS downloader
pub struct VideoDownloader {
    downloader: String,
    encoder: EncoderConfig,
    extract_audio: bool,
}

impl VideoDownloader {
    pub fn new(batch: &BatchConfig, encoder: &EncoderConfig) -> Self {
        Self {
            downloader: batch.downloader.clone(),
            encoder: encoder.clone(),
            extract_audio: batch.extract_audio,
        }
    }

    fn download_args(&self, playlist_url: &str, talk_dir: &Path) -> Vec<String> {
        let template = talk_dir.join("initialdownload.%(ext)s");
        vec![
            "-o".to_string(),
            template.display().to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            playlist_url.to_string(),
        ]
    }

    fn audio_command(&self, video: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.encoder.ffmpeg)
            .input(FfmpegInput::file(video))
            .audio(AudioOutput::EncodeQuality {
                codec: "libmp3lame".to_string(),
                quality: 2,
            })
            .output(output)
    }

    /// Download `playlist_url` into `talk_dir/initialdownload.mp4`
    ///
    /// The downloader's stdout goes to `download.log`. Metadata probing and
    /// audio extraction afterwards are best effort.
    pub async fn download(&self, playlist_url: &str, talk_dir: &Path) -> Result<PathBuf> {
        let video_path = talk_dir.join(VIDEO_FILE);
        let log = File::create(talk_dir.join(DOWNLOAD_LOG_FILE))?;

        info!("Downloading {} with {}", playlist_url, self.downloader);
        let output = Command::new(&self.downloader)
            .args(self.download_args(playlist_url, talk_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| FetchError::DownloadFailed {
                reason: format!("Failed to run {}: {}", self.downloader, e),
            })?;

        if !output.status.success() {
            return Err(FetchError::DownloadFailed {
                reason: format!(
                    "{} failed: {}",
                    self.downloader,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }

        let size = tokio::fs::metadata(&video_path)
            .await
            .map_err(|_| FetchError::DownloadFailed {
                reason: format!("Video file not found: {}", video_path.display()),
            })?
            .len();
        info!("Downloaded video size: {:.1} MB", size as f64 / (1024.0 * 1024.0));

        self.log_details(&video_path).await;

        if self.extract_audio {
            self.extract_audio(&video_path, &talk_dir.join(AUDIO_FILE)).await;
        }

        Ok(video_path)
    }

    async fn log_details(&self, video_path: &Path) {
        let path = video_path.to_path_buf();
        let encoder = self.encoder.clone();
        let probed = spawn_blocking_traced(move || VideoSource::probe(&path, &encoder)).await;

        match probed {
            Ok(Ok(source)) => {
                info!("Video details:");
                info!("Resolution: {}x{}", source.width, source.height);
                info!("Codec: {}", source.codec);
                info!("Bitrate: {:.0} kbps", source.bit_rate.unwrap_or(0) as f64 / 1000.0);
                info!("Frame rate: {:.3}", source.frame_rate);
            }
            Ok(Err(e)) => warn!("Could not get detailed video info: {}", e),
            Err(e) => warn!("Could not get detailed video info: {}", e),
        }
    }

    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) {
        info!("Extracting audio to {}...", audio_path.display());
        let command = self.audio_command(video_path, audio_path);

        let result = spawn_blocking_traced(move || command.run())
            .await
            .map_err(|e| CompositorError::generic(e.to_string()))
            .and_then(|result| result);

        match result {
            Ok(()) => info!("Audio extraction complete"),
            Err(e) => warn!("Could not extract audio: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloader() -> VideoDownloader {
        VideoDownloader::new(&BatchConfig::default(), &EncoderConfig::default())
    }

    #[test]
    fn test_download_args() {
        let args = downloader().download_args("https://cdn.example.com/master.m3u8", Path::new("talks/t1"));

        assert_eq!(args[0], "-o");
        assert!(args[1].ends_with("initialdownload.%(ext)s"));
        assert_eq!(args.last().map(String::as_str), Some("https://cdn.example.com/master.m3u8"));
    }

    #[test]
    fn test_audio_extraction_command() {
        let command = downloader().audio_command(Path::new("in.mp4"), Path::new("audio.mp3"));
        let args: Vec<String> = command.args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let joined = args.join(" ");

        assert!(joined.contains("-i in.mp4 -vn -c:a libmp3lame -q:a 2 audio.mp3"));
    }

    #[tokio::test]
    async fn test_missing_downloader_fails() {
        let dir = tempfile::tempdir().unwrap();
        let batch = BatchConfig {
            downloader: "definitely-not-a-real-downloader".to_string(),
            ..BatchConfig::default()
        };
        let downloader = VideoDownloader::new(&batch, &EncoderConfig::default());

        let err = downloader
            .download("https://cdn.example.com/master.m3u8", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CompositorError::Fetch(FetchError::DownloadFailed { .. })));
    }
}
