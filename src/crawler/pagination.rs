//! Paginated fetch controller
//!
//! Drives one remote call family page by page through the backoff policy.
//! Two walks exist:
//! - [`collect_pages`] follows API cursors until `End` (relation listings)
//! - [`collect_content`] walks a timeline backward from the newest post down
//!   to the stored bookmark

use crate::api::{ApiError, ApiResult, ContentId, Cursor, EntityId, Page, Post, SocialApi};
use crate::crawler::backoff::{BackoffPolicy, CallOutcome};
use std::future::Future;
use tokio::time::Instant;

/// Result of walking a paginated result set
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    /// Every page was retrieved
    Complete { items: Vec<T>, pages: u32 },

    /// Quota ran out before the walk finished
    QuotaExhausted {
        /// Items of the pages consumed so far
        items: Vec<T>,
        /// Cursor of the first page not yet consumed
        resume: Cursor,
    },

    /// The entity cannot be fetched (protected, suspended or deleted)
    Unavailable { reason: ApiError },

    /// A page kept failing with transient errors
    RetriesExhausted { attempts: u32, last_error: ApiError },
}

impl<T> Fetched<T> {
    /// Converts the collected items, keeping the outcome
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> Fetched<U> {
        match self {
            Self::Complete { items, pages } => Fetched::Complete {
                items: items.into_iter().map(f).collect(),
                pages,
            },
            Self::QuotaExhausted { items, resume } => Fetched::QuotaExhausted {
                items: items.into_iter().map(f).collect(),
                resume,
            },
            Self::Unavailable { reason } => Fetched::Unavailable { reason },
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => Fetched::RetriesExhausted {
                attempts,
                last_error,
            },
        }
    }
}

/// Collects every page of a cursor-paginated listing
///
/// # Arguments
///
/// * `policy` - Retry and quota policy applied to each page request
/// * `start` - Cursor to begin from; pass a previous `resume` cursor to continue
/// * `page_size` - Requested items per page
/// * `deadline` - Quota waits ending after this instant yield instead
/// * `fetch` - Issues one page request for `(page_size, cursor)`
///
/// # Returns
///
/// The concatenated items in cursor order, or how far the walk got.
/// A failing page is always retried with the same cursor.
pub async fn collect_pages<T, F, Fut>(
    policy: &BackoffPolicy,
    start: Cursor,
    page_size: u32,
    deadline: Option<Instant>,
    mut fetch: F,
) -> Fetched<T>
where
    F: FnMut(u32, Cursor) -> Fut,
    Fut: Future<Output = ApiResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = start;
    let mut pages = 0;

    while !cursor.is_end() {
        let outcome = policy
            .call(deadline, || fetch(page_size, cursor.clone()))
            .await;

        match outcome {
            CallOutcome::Success(page) => {
                pages += 1;
                tracing::trace!("Page {} at {}: {} items", pages, cursor, page.items.len());
                items.extend(page.items);
                cursor = page.next;
            }
            CallOutcome::QuotaExhausted => {
                return Fetched::QuotaExhausted {
                    items,
                    resume: cursor,
                }
            }
            CallOutcome::Terminal(reason) => return Fetched::Unavailable { reason },
            CallOutcome::RetriesExhausted {
                attempts,
                last_error,
            } => {
                return Fetched::RetriesExhausted {
                    attempts,
                    last_error,
                }
            }
        }
    }

    Fetched::Complete { items, pages }
}

/// Collects the posts of `entity` newer than `bookmark`
///
/// Walks pages newest-first and stops when:
/// - a page reaches down to the bookmark
/// - the API signals `End`
/// - two consecutive pages come back empty (the first is retried as is)
/// - `max_pages` requests were made, on a first fetch without a bookmark
///
/// Once a bookmark exists the walk never stops short of it, so committing the
/// newest post as the next bookmark cannot leave a gap behind. Posts at or
/// below the bookmark are dropped.
pub async fn collect_content<A>(
    api: &A,
    policy: &BackoffPolicy,
    entity: EntityId,
    bookmark: Option<ContentId>,
    page_size: u32,
    max_pages: u32,
    deadline: Option<Instant>,
) -> Fetched<Post>
where
    A: SocialApi + ?Sized,
{
    let mut items: Vec<Post> = Vec::new();
    let mut cursor = Cursor::Start;
    let mut pages = 0;
    let mut empty_streak = 0;

    while !cursor.is_end() {
        if bookmark.is_none() && pages >= max_pages {
            tracing::info!(
                "First fetch of {} stopped at the {}-page history depth",
                entity,
                max_pages
            );
            break;
        }

        let outcome = policy
            .call(deadline, || {
                api.list_content(entity, bookmark, page_size, cursor.clone())
            })
            .await;

        let page = match outcome {
            CallOutcome::Success(page) => page,
            CallOutcome::QuotaExhausted => {
                return Fetched::QuotaExhausted {
                    items,
                    resume: cursor,
                }
            }
            CallOutcome::Terminal(reason) => return Fetched::Unavailable { reason },
            CallOutcome::RetriesExhausted {
                attempts,
                last_error,
            } => {
                return Fetched::RetriesExhausted {
                    attempts,
                    last_error,
                }
            }
        };
        pages += 1;

        if page.items.is_empty() {
            empty_streak += 1;
            if empty_streak >= 2 {
                tracing::debug!("Two empty pages in a row for {}, stopping", entity);
                break;
            }
            continue;
        }
        empty_streak = 0;

        let reached_bookmark = match (bookmark, page.items.iter().map(|p| p.id).min()) {
            (Some(bookmark), Some(oldest)) => oldest <= bookmark,
            _ => false,
        };

        items.extend(
            page.items
                .into_iter()
                .filter(|post| bookmark.map_or(true, |b| post.id > b)),
        );

        if reached_bookmark {
            tracing::trace!("Reached bookmark for {} after {} pages", entity, pages);
            break;
        }
        cursor = page.next;
    }

    Fetched::Complete { items, pages }
}
