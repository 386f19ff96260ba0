//! One-shot page sampling and the identifier resolution cascades.
//!
//! A [`PageSample`] is collected once per detection cycle; every field read
//! is best-effort and a failed read is simply an absent field. Identifier
//! resolution then runs as pure cascades over the sample, in strict source
//! precedence order, so the precedence policy is testable without a page.

use serde_json::Value;
use url::Url;

use adwatch_core_types::{AdId, VideoId};
use page_locator::{resolve_first, soften, PagePort, Resolver};

/// Point-in-time snapshot of the page fields the cascades read.
#[derive(Clone, Debug, Default)]
pub struct PageSample {
    pub player_config: Option<Value>,
    pub debug_text: Option<String>,
    pub initial_response: Option<Value>,
    pub page_url: Option<String>,
    pub metadata: Option<Value>,
}

impl PageSample {
    /// Collect every source field, converting any single failure into
    /// "field absent" without aborting the pass.
    pub async fn collect(port: &dyn PagePort) -> Self {
        Self {
            player_config: soften("player-config", port.player_config().await),
            debug_text: soften("debug-text", port.debug_text().await),
            initial_response: soften("initial-response", port.initial_response().await),
            page_url: soften("page-url", port.page_url().await),
            metadata: soften("page-metadata", port.page_metadata().await),
        }
    }
}

/// Extract a `key=token` (or `key:token`) value from free debug text.
///
/// Token boundaries are alphanumerics plus `-` and `_`; the key must sit at
/// a word boundary so `ad=` never matches inside `load=`.
fn scan_token(text: &str, key: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(key) {
        let start = search_from + rel;
        search_from = start + key.len();

        if start > 0 {
            let prev = bytes[start - 1] as char;
            if prev.is_ascii_alphanumeric() || prev == '_' || prev == '-' {
                continue;
            }
        }
        let rest = &text[start + key.len()..];
        let rest = match rest.strip_prefix('=').or_else(|| rest.strip_prefix(':')) {
            Some(rest) => rest,
            None => continue,
        };
        let token: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if !token.is_empty() {
            return Some(token);
        }
    }
    None
}

fn json_str(value: &Option<Value>, path: &[&str]) -> Option<String> {
    let mut cursor = value.as_ref()?;
    for key in path {
        cursor = cursor.get(key)?;
    }
    cursor.as_str().map(str::to_string).filter(|s| !s.is_empty())
}

fn video_from_config(sample: &PageSample) -> Option<String> {
    json_str(&sample.player_config, &["debugVideoId"])
}

fn video_from_debug_text(sample: &PageSample) -> Option<String> {
    scan_token(sample.debug_text.as_deref()?, "vid")
}

fn video_from_initial_response(sample: &PageSample) -> Option<String> {
    json_str(&sample.initial_response, &["videoDetails", "videoId"])
}

fn video_from_url(sample: &PageSample) -> Option<String> {
    let url = Url::parse(sample.page_url.as_deref()?).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

fn video_from_metadata(sample: &PageSample) -> Option<String> {
    json_str(&sample.metadata, &["videoId"])
}

fn ad_from_config(sample: &PageSample) -> Option<String> {
    json_str(&sample.player_config, &["debugAdId"])
}

fn ad_from_debug_text(sample: &PageSample) -> Option<String> {
    scan_token(sample.debug_text.as_deref()?, "ad")
}

fn ad_from_initial_response(sample: &PageSample) -> Option<String> {
    json_str(&sample.initial_response, &["adResponse", "adId"])
}

fn video_chain() -> Vec<Resolver<PageSample, String>> {
    vec![
        Resolver::new("player-config", video_from_config),
        Resolver::new("debug-text", video_from_debug_text),
        Resolver::new("initial-response", video_from_initial_response),
        Resolver::new("page-url", video_from_url),
        Resolver::new("page-metadata", video_from_metadata),
    ]
}

fn ad_chain() -> Vec<Resolver<PageSample, String>> {
    vec![
        Resolver::new("player-config", ad_from_config),
        Resolver::new("debug-text", ad_from_debug_text),
        Resolver::new("initial-response", ad_from_initial_response),
    ]
}

/// Resolve the current video identifier; first non-null source wins.
pub fn resolve_video_id(sample: &PageSample) -> Option<(VideoId, &'static str)> {
    resolve_first("video-id", sample, &video_chain())
        .map(|(id, source)| (VideoId::new(id), source))
}

/// Resolve the current ad identifier; placeholder sentinels count as absent.
pub fn resolve_ad_id(sample: &PageSample) -> Option<(AdId, &'static str)> {
    resolve_first("ad-id", sample, &ad_chain())
        .map(|(id, source)| (AdId::new(id), source))
        .filter(|(id, _)| !id.is_placeholder())
}
