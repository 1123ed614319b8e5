use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info};

use crate::{
    config::FetchConfig,
    error::{FetchError, Result},
};

const PLAYLIST_PATTERN: &str = r#"(https?://[^\s<>"']+?master\.m3u8[^\s<>"']*)"#;
const TITLE_PATTERN: &str = r"(?is)<title[^>]*>(.*?)</title>";
const EMBED_PATTERN: &str =
    r#"(?is)<div[^>]*\bid=["']presentation-embed[^"']*["'][^>]*>.*?<iframe[^>]*\bsrc=["']([^"']+)["']"#;

type CachedRegex = LazyLock<std::result::Result<Regex, regex::Error>>;

static PLAYLIST_RE: CachedRegex = LazyLock::new(|| Regex::new(PLAYLIST_PATTERN));
static TITLE_RE: CachedRegex = LazyLock::new(|| Regex::new(TITLE_PATTERN));
static EMBED_RE: CachedRegex = LazyLock::new(|| Regex::new(EMBED_PATTERN));
static UNSAFE_TITLE_CHARS_RE: CachedRegex = LazyLock::new(|| Regex::new(r"[^\w\s-]"));
static WHITESPACE_RE: CachedRegex = LazyLock::new(|| Regex::new(r"\s+"));

/// What the talk page tells us about the talk
#[derive(Debug, Clone, PartialEq)]
pub struct TalkPage {
    pub url: String,
    pub talk_id: String,
    pub title: String,
    pub playlist_url: String,
}

/// Finds the HLS master playlist behind a talk page
pub struct StreamDiscovery {
    client: reqwest::Client,
}

impl StreamDiscovery {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::StreamDiscoveryFailed {
                url: String::new(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Look for the playlist in the page, then in the presentation embed
    pub async fn discover(&self, url: &str) -> Result<TalkPage> {
        let html = self.get(url, url).await?;
        let title = extract_title(&html)?.unwrap_or_else(|| "video".to_string());

        let playlist_url = match find_playlist(&html)? {
            Some(playlist) => playlist,
            None => {
                let embed = find_embed_src(&html)?.ok_or_else(|| FetchError::StreamDiscoveryFailed {
                    url: url.to_string(),
                    reason: "no master.m3u8 in page and no presentation embed".to_string(),
                })?;
                let embed_url = resolve_url(url, &embed);
                debug!("Playlist not in page, following embed {}", embed_url);

                let embed_html = self.get(&embed_url, url).await?;
                find_playlist(&embed_html)?.ok_or_else(|| FetchError::StreamDiscoveryFailed {
                    url: url.to_string(),
                    reason: "could not find master.m3u8 in page or embedded frame".to_string(),
                })?
            }
        };

        info!("Found M3U8 URL: {}", playlist_url);

        Ok(TalkPage {
            url: url.to_string(),
            talk_id: talk_id(url),
            title,
            playlist_url,
        })
    }

    async fn get(&self, url: &str, talk_url: &str) -> Result<String> {
        let failed = |e: reqwest::Error| FetchError::StreamDiscoveryFailed {
            url: talk_url.to_string(),
            reason: format!("GET {}: {}", url, e),
        };

        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(failed)?
            .text()
            .await
            .map_err(failed)?;
        Ok(body)
    }
}

fn compiled(regex: &'static CachedRegex) -> Result<&'static Regex> {
    regex.as_ref().map_err(|e| {
        FetchError::StreamDiscoveryFailed {
            url: String::new(),
            reason: format!("Regex error: {}", e),
        }
        .into()
    })
}

/// First `…master.m3u8…` URL in the markup
pub fn find_playlist(html: &str) -> Result<Option<String>> {
    let re = compiled(&PLAYLIST_RE)?;
    Ok(re.captures(html).and_then(|caps| caps.get(1)).map(|m| m.as_str().replace("&amp;", "&")))
}

/// `src` of the iframe inside the `presentation-embed*` container
pub fn find_embed_src(html: &str) -> Result<Option<String>> {
    let re = compiled(&EMBED_RE)?;
    Ok(re.captures(html).and_then(|caps| caps.get(1)).map(|m| m.as_str().replace("&amp;", "&")))
}

/// The page `<title>`, reduced to characters safe in a directory name
pub fn extract_title(html: &str) -> Result<Option<String>> {
    let re = compiled(&TITLE_RE)?;
    let raw = match re.captures(html).and_then(|caps| caps.get(1)) {
        Some(m) => decode_entities(m.as_str()),
        None => return Ok(None),
    };

    let title = sanitize_title(&raw)?;
    Ok((!title.is_empty()).then_some(title))
}

/// Keep word characters, whitespace and hyphens
pub fn sanitize_title(raw: &str) -> Result<String> {
    let cleaned = compiled(&UNSAFE_TITLE_CHARS_RE)?.replace_all(raw, "");
    let collapsed = compiled(&WHITESPACE_RE)?.replace_all(cleaned.trim(), " ");
    Ok(collapsed.into_owned())
}

/// Last path segment of the talk URL
pub fn talk_id(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn resolve_url(base: &str, link: &str) -> String {
    reqwest::Url::parse(base)
        .and_then(|base| base.join(link))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| link.to_string())
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile_once() {
        for regex in [&PLAYLIST_RE, &TITLE_RE, &EMBED_RE, &UNSAFE_TITLE_CHARS_RE, &WHITESPACE_RE] {
            let first = compiled(regex).unwrap();
            let second = compiled(regex).unwrap();
            assert!(std::ptr::eq(first, second));
        }
    }

    #[test]
    fn test_playlist_in_page() {
        let html = r#"<script>var cfg = {"hls": "https://cdn.example.com/v/abc/master.m3u8?token=1"};</script>"#;
        assert_eq!(
            find_playlist(html).unwrap().as_deref(),
            Some("https://cdn.example.com/v/abc/master.m3u8?token=1")
        );
        assert_eq!(find_playlist("<html></html>").unwrap(), None);
    }

    #[test]
    fn test_embed_iframe_src() {
        let html = r#"
            <div class="player">
              <div id="presentation-embed-38954">
                <iframe width="100%" src="https://embed.example.com/p/38954?x=1&amp;y=2"></iframe>
              </div>
            </div>"#;
        assert_eq!(
            find_embed_src(html).unwrap().as_deref(),
            Some("https://embed.example.com/p/38954?x=1&y=2")
        );
    }

    #[test]
    fn test_title_is_sanitized() {
        let html = "<html><head><title>Rust: Fast &amp; Safe! (Keynote)</title></head></html>";
        assert_eq!(
            extract_title(html).unwrap().as_deref(),
            Some("Rust Fast Safe Keynote")
        );
        assert_eq!(extract_title("<title>???</title>").unwrap(), None);
        assert_eq!(extract_title("<p>no title</p>").unwrap(), None);
    }

    #[test]
    fn test_talk_id() {
        assert_eq!(talk_id("https://slideslive.com/38954321"), "38954321");
        assert_eq!(talk_id("https://slideslive.com/38954321/"), "38954321");
        assert_eq!(talk_id("https://slideslive.com/38954321?ref=home"), "38954321");
    }

    #[test]
    fn test_relative_embed_resolution() {
        assert_eq!(
            resolve_url("https://example.com/talks/1", "/embed/1"),
            "https://example.com/embed/1"
        );
    }
}
