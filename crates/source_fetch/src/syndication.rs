use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use shared::domain::{MediaAttachment, MediaKind, PostAuthor, PostStats, SourcedPost};
use tracing::debug;

use crate::{FetchError, PostFetcher};

pub const DEFAULT_SYNDICATION_BASE_URL: &str = "https://cdn.syndication.twimg.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches posts from the public embed syndication endpoint.
#[derive(Clone)]
pub struct SyndicationClient {
    http: reqwest::Client,
    base_url: String,
}

impl SyndicationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PostFetcher for SyndicationClient {
    async fn fetch_post(&self, post_id: &str) -> Result<SourcedPost, FetchError> {
        let url = format!("{}/tweet-result", self.base_url);
        debug!(%url, post_id, "fetching post");
        let response = self
            .http
            .get(&url)
            .query(&[("id", post_id), ("token", "x")])
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(post_id.to_string())),
            status if !status.is_success() => {
                return Err(FetchError::UnexpectedStatus(status.as_u16()))
            }
            _ => {}
        }
        let body = response.bytes().await?;
        let raw: RawPost =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        raw.into_post(post_id)
    }
}

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(default, rename = "__typename")]
    typename: Option<String>,
    #[serde(default)]
    id_str: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    favorite_count: u64,
    #[serde(default)]
    conversation_count: u64,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default, rename = "mediaDetails")]
    media_details: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: String,
    screen_name: String,
    #[serde(default)]
    profile_image_url_https: Option<String>,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    is_blue_verified: bool,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(rename = "type")]
    kind: String,
    media_url_https: String,
}

impl RawPost {
    fn into_post(self, requested_id: &str) -> Result<SourcedPost, FetchError> {
        if self.typename.as_deref() == Some("TweetTombstone") {
            return Err(FetchError::NotFound(requested_id.to_string()));
        }
        let Some(user) = self.user else {
            return Err(FetchError::NotFound(requested_id.to_string()));
        };
        let source_id = self.id_str.unwrap_or_else(|| requested_id.to_string());
        let source_url = format!("https://x.com/{}/status/{}", user.screen_name, source_id);
        let media = self
            .media_details
            .into_iter()
            .filter_map(|media| {
                let kind = match media.kind.as_str() {
                    "photo" => MediaKind::Photo,
                    "video" => MediaKind::Video,
                    "animated_gif" => MediaKind::AnimatedGif,
                    _ => return None,
                };
                Some(MediaAttachment {
                    kind,
                    url: media.media_url_https,
                })
            })
            .collect();

        Ok(SourcedPost {
            source_id,
            source_url: Some(source_url),
            author: PostAuthor {
                name: user.name,
                username: user.screen_name,
                avatar_url: user.profile_image_url_https,
                verified: user.verified || user.is_blue_verified,
            },
            text: self.text.unwrap_or_default(),
            media,
            created_at: self.created_at,
            stats: PostStats {
                likes: self.favorite_count,
                replies: self.conversation_count,
            },
        })
    }
}

#[cfg(test)]
#[path = "tests/syndication_tests.rs"]
mod tests;
