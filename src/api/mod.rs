//! Remote API surface consumed by the crawler
//!
//! The crawler talks to exactly three paginated operations. Every call
//! resolves to either a [`Page`] or one of four [`ApiError`] classes; the
//! backoff policy decides what to do with each class.

mod http;
mod types;

pub use http::{build_http_client, HttpApi};
pub use types::{ContentId, Cursor, EntityId, Page, Post, Profile};

use async_trait::async_trait;
use thiserror::Error;

/// Failure classes of a single remote call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Network failure, server error or malformed response; worth retrying
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The call budget of the current quota window is spent
    #[error("Call quota exhausted for the current window")]
    QuotaExhausted,

    /// The target account is protected or the credentials were refused
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The target account does not exist (any more)
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type for remote calls
pub type ApiResult<T> = Result<T, ApiError>;

/// The paginated operations of the social API
///
/// Implementations perform exactly one request per call; retrying and
/// pagination are the caller's business.
#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Lists the profiles an entity follows
    async fn list_relations(
        &self,
        entity: EntityId,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<Profile>>;

    /// Lists the ids of the accounts an entity follows
    async fn list_relation_ids(
        &self,
        entity: EntityId,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<EntityId>>;

    /// Lists an entity's posts, newest first, down to (and including) `since`
    async fn list_content(
        &self,
        entity: EntityId,
        since: Option<ContentId>,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<Post>>;
}
