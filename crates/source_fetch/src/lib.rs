//! Recognising post URLs and fetching the post behind them.

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

mod syndication;

pub use syndication::{SyndicationClient, DEFAULT_SYNDICATION_BASE_URL};

use shared::domain::SourcedPost;

const POST_HOSTS: [&str; 2] = ["twitter.com", "x.com"];
const MAX_POST_ID_DIGITS: usize = 25;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("post {0} not found")]
    NotFound(String),
    #[error("upstream request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("upstream answered with status {0}")]
    UnexpectedStatus(u16),
    #[error("upstream returned an unreadable post: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PostFetcher: Send + Sync {
    async fn fetch_post(&self, post_id: &str) -> Result<SourcedPost, FetchError>;
}

/// Extracts the numeric post id from `<twitter|x>.com/<anything>/status/<digits>`.
///
/// The scheme is optional and `www.` / `mobile.` prefixes are accepted.
/// Anything else, including look-alike hosts, yields `None`.
pub fn extract_post_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = if raw.contains("://") {
        Url::parse(raw).ok()?
    } else {
        Url::parse(&format!("https://{raw}")).ok()?
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }

    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("mobile."))
        .unwrap_or(&host);
    if !POST_HOSTS.contains(&host) {
        return None;
    }

    let segments: Vec<&str> = parsed.path_segments()?.collect();
    segments
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, segment)| **segment == "status")
        .and_then(|(at, _)| segments.get(at + 1))
        .filter(|id| is_post_id(id))
        .map(|id| id.to_string())
}

fn is_post_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_POST_ID_DIGITS
        && candidate.bytes().all(|b| b.is_ascii_digit())
}
