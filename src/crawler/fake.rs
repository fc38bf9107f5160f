//! In-memory social API used by the crawler unit tests

use crate::api::{ApiError, ApiResult, ContentId, Cursor, EntityId, Page, Post, Profile, SocialApi};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Scripted API: fixed timelines and relation lists, plus queued failures
#[derive(Default)]
pub(crate) struct FakeApi {
    timelines: HashMap<EntityId, Vec<ContentId>>,
    relations: HashMap<EntityId, Vec<EntityId>>,
    failures: Mutex<HashMap<EntityId, VecDeque<ApiError>>>,
    calls: Mutex<Vec<(EntityId, Cursor)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeline(mut self, entity: u64, ids: impl IntoIterator<Item = u64>) -> Self {
        let mut ids: Vec<ContentId> = ids.into_iter().map(ContentId).collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        self.timelines.insert(EntityId(entity), ids);
        self
    }

    pub fn with_relations(mut self, entity: u64, ids: impl IntoIterator<Item = u64>) -> Self {
        self.relations
            .insert(EntityId(entity), ids.into_iter().map(EntityId).collect());
        self
    }

    /// Queues errors returned, in order, by the next calls for `entity`
    pub fn failing(self, entity: u64, errors: Vec<ApiError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(EntityId(entity))
            .or_default()
            .extend(errors);
        self
    }

    /// Every request made so far, in order
    pub fn calls(&self) -> Vec<(EntityId, Cursor)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, entity: EntityId, cursor: &Cursor) -> ApiResult<()> {
        self.calls.lock().unwrap().push((entity, cursor.clone()));
        match self.failures.lock().unwrap().get_mut(&entity).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn offset_page<T: Clone>(items: &[T], page_size: u32, cursor: &Cursor) -> Page<T> {
        let offset = match cursor {
            Cursor::Token(token) => token.parse::<usize>().unwrap(),
            _ => 0,
        };
        let end = (offset + page_size as usize).min(items.len());
        let next = if end >= items.len() {
            Cursor::End
        } else {
            Cursor::Token(end.to_string())
        };
        Page::new(items[offset.min(end)..end].to_vec(), next)
    }
}

pub(crate) fn post(id: u64) -> Post {
    Post {
        id: ContentId(id),
        text: format!("post {}", id),
        created_at: None,
    }
}

#[async_trait]
impl SocialApi for FakeApi {
    async fn list_relations(
        &self,
        entity: EntityId,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<Profile>> {
        self.record(entity, &cursor)?;
        let profiles: Vec<Profile> = self
            .relations
            .get(&entity)
            .map(|ids| {
                ids.iter()
                    .map(|id| Profile {
                        id: *id,
                        screen_name: format!("user{}", id),
                        name: format!("User {}", id),
                        description: None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self::offset_page(&profiles, page_size, &cursor))
    }

    async fn list_relation_ids(
        &self,
        entity: EntityId,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<EntityId>> {
        self.record(entity, &cursor)?;
        let ids = self.relations.get(&entity).cloned().unwrap_or_default();
        Ok(Self::offset_page(&ids, page_size, &cursor))
    }

    async fn list_content(
        &self,
        entity: EntityId,
        since: Option<ContentId>,
        page_size: u32,
        cursor: Cursor,
    ) -> ApiResult<Page<Post>> {
        self.record(entity, &cursor)?;
        let max_id = match &cursor {
            Cursor::Token(token) => token.parse::<u64>().unwrap(),
            _ => u64::MAX,
        };

        let visible: Vec<ContentId> = self
            .timelines
            .get(&entity)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| id.0 <= max_id && since.map_or(true, |s| *id >= s))
                    .collect()
            })
            .unwrap_or_default();

        let page: Vec<ContentId> = visible.iter().copied().take(page_size as usize).collect();
        let next = match page.last() {
            None => cursor,
            Some(_) if page.len() == visible.len() => Cursor::End,
            Some(oldest) => Cursor::Token((oldest.0 - 1).to_string()),
        };

        Ok(Page::new(page.into_iter().map(|id| post(id.0)).collect(), next))
    }
}
