//! Identifier newtypes and the records returned by the remote API

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of an account in the social graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

/// Identifier of a content item (post). Ids grow with posting time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position inside a paginated result set
///
/// `Start` and `End` are sentinels; `Token` is an opaque continuation value
/// handed out by the API. A cursor is only meaningful for the call family
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Cursor {
    #[default]
    Start,
    Token(String),
    End,
}

impl Cursor {
    /// Returns true if there is nothing left to fetch
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "<start>"),
            Self::Token(token) => write!(f, "{}", token),
            Self::End => write!(f, "<end>"),
        }
    }
}

/// One page of results together with the cursor of the following page
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Cursor,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Cursor) -> Self {
        Self { items, next }
    }

    /// A page with no items and no continuation
    pub fn last_empty() -> Self {
        Self {
            items: Vec::new(),
            next: Cursor::End,
        }
    }
}

/// Account profile as returned by the relation listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: EntityId,

    #[serde(default)]
    pub screen_name: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,
}

/// A single post from an account's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: ContentId,

    #[serde(default, alias = "full_text")]
    pub text: String,

    #[serde(default)]
    pub created_at: Option<String>,
}
