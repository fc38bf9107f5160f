//! HTTP implementation of the social API
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - Translating cursors and bookmarks into query parameters
//! - Classifying responses into the closed set of [`ApiError`] classes

use crate::api::{ApiError, ApiResult, ContentId, Cursor, EntityId, Page, Post, Profile, SocialApi};
use crate::config::ApiConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const RELATIONS_PATH: &str = "friends/list.json";
const RELATION_IDS_PATH: &str = "friends/ids.json";
const CONTENT_PATH: &str = "statuses/user_timeline.json";

/// Cursor value the API understands as "first page"
const START_CURSOR: &str = "-1";

/// Cursor value the API returns after the last page
const END_CURSOR: i64 = 0;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The API configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct IdsResponse {
    ids: Vec<EntityId>,
    #[serde(default)]
    next_cursor: i64,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    users: Vec<Profile>,
    #[serde(default)]
    next_cursor: i64,
}

/// Social API client speaking the v1.1-style REST surface
pub struct HttpApi {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpApi {
    /// Creates a client for the API rooted at `base_url`
    pub fn new(client: Client, base_url: &str, bearer_token: Option<String>) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;

        // Url::join replaces the last segment unless the path ends in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            bearer_token,
        })
    }

    /// Builds a client straight from configuration
    pub fn from_config(config: &ApiConfig) -> crate::Result<Self> {
        let client = build_http_client(config)?;
        Ok(Self::new(client, &config.base_url, config.bearer_token.clone())?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> ApiResult<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::Transient(format!("Bad endpoint {}: {}", path, e)))?;

        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Transient(format!("Request timeout on {}", path))
            } else if e.is_connect() {
                ApiError::Transient(format!("Connection failed on {}: {}", path, e))
            } else {
                ApiError::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if let Some(error) = classify_status(status, path) {
            return Err(error);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transient(format!("Failed to read body of {}: {}", path, e)))?;

        serde_json::from_str(&body)
            .map_err(|e| ApiError::Transient(format!("Malformed response from {}: {}", path, e)))
    }
}

/// Maps an HTTP status to an error class, or `None` on success
fn classify_status(status: StatusCode, path: &str) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }

    let error = match status {
        // 420 is the legacy "enhance your calm" rate-limit status
        StatusCode::TOO_MANY_REQUESTS => ApiError::QuotaExhausted,
        s if s.as_u16() == 420 => ApiError::QuotaExhausted,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ApiError::Unauthorized(format!("HTTP {} on {}", status.as_u16(), path))
        }
        StatusCode::NOT_FOUND => ApiError::NotFound(format!("HTTP 404 on {}", path)),
        _ => ApiError::Transient(format!("HTTP {} on {}", status.as_u16(), path)),
    };

    Some(error)
}

fn cursor_param(cursor: &Cursor) -> String {
    match cursor {
        Cursor::Start | Cursor::End => START_CURSOR.to_string(),
        Cursor::Token(token) => token.clone(),
    }
}

fn next_cursor(raw: i64) -> Cursor {
    if raw == END_CURSOR {
        Cursor::End
    } else {
        Cursor::Token(raw.to_string())
    }
}

#[async_trait]
impl SocialApi for HttpApi {
    async fn list_relations(
        &self,
        entity: EntityId,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<Profile>> {
        if cursor.is_end() {
            return Ok(Page::last_empty());
        }

        let response: UsersResponse = self
            .get(
                RELATIONS_PATH,
                &[
                    ("user_id", entity.to_string()),
                    ("count", page_size.to_string()),
                    ("cursor", cursor_param(&cursor)),
                    ("skip_status", "true".to_string()),
                ],
            )
            .await?;

        Ok(Page::new(response.users, next_cursor(response.next_cursor)))
    }

    async fn list_relation_ids(
        &self,
        entity: EntityId,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<EntityId>> {
        if cursor.is_end() {
            return Ok(Page::last_empty());
        }

        let response: IdsResponse = self
            .get(
                RELATION_IDS_PATH,
                &[
                    ("user_id", entity.to_string()),
                    ("count", page_size.to_string()),
                    ("cursor", cursor_param(&cursor)),
                ],
            )
            .await?;

        Ok(Page::new(response.ids, next_cursor(response.next_cursor)))
    }

    async fn list_content(
        &self,
        entity: EntityId,
        since: Option<ContentId>,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<Post>> {
        if cursor.is_end() {
            return Ok(Page::last_empty());
        }

        let mut query = vec![
            ("user_id", entity.to_string()),
            ("count", page_size.to_string()),
            ("tweet_mode", "extended".to_string()),
            ("include_rts", "true".to_string()),
        ];

        // since_id is exclusive; ask for one below so the bookmark itself comes back
        if let Some(bookmark) = since {
            if bookmark.0 > 0 {
                query.push(("since_id", (bookmark.0 - 1).to_string()));
            }
        }

        if let Cursor::Token(max_id) = &cursor {
            query.push(("max_id", max_id.clone()));
        }

        let posts: Vec<Post> = self.get(CONTENT_PATH, &query).await?;
        let next = timeline_next(&posts, page_size, cursor);

        Ok(Page::new(posts, next))
    }
}

/// Cursor for the timeline page after `posts`
///
/// A short page is the bottom of the timeline. Otherwise the walk continues
/// strictly below the oldest post seen. An empty page keeps `cursor`.
fn timeline_next(posts: &[Post], page_size: u32, cursor: Cursor) -> Cursor {
    match posts.iter().map(|p| p.id).min() {
        None => cursor,
        Some(_) if posts.len() < page_size as usize => Cursor::End,
        Some(ContentId(0)) => Cursor::End,
        Some(oldest) => Cursor::Token((oldest.0 - 1).to_string()),
    }
}
