use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::entity::EntityKind;

/// Names an ordered view over entity ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "list", content = "id", rename_all = "snake_case")]
pub enum ListKey {
    HomeTimeline,
    PublicTimeline { local: bool },
    AccountStatuses(String),
    Quotes(String),
    FavouritedBy(String),
    RebloggedBy(String),
    Followers(String),
    Following(String),
    GroupMembers(String),
    Bookmarks,
    Favourites,
}

impl ListKey {
    /// API path of the first page of this list, relative to the instance root.
    pub fn endpoint(&self) -> String {
        match self {
            ListKey::HomeTimeline => "/api/v1/timelines/home".to_owned(),
            ListKey::PublicTimeline { local } => {
                format!("/api/v1/timelines/public?local={local}")
            }
            ListKey::AccountStatuses(id) => format!("/api/v1/accounts/{id}/statuses"),
            ListKey::Quotes(id) => format!("/api/v1/pleroma/statuses/{id}/quotes"),
            ListKey::FavouritedBy(id) => format!("/api/v1/statuses/{id}/favourited_by"),
            ListKey::RebloggedBy(id) => format!("/api/v1/statuses/{id}/reblogged_by"),
            ListKey::Followers(id) => format!("/api/v1/accounts/{id}/followers"),
            ListKey::Following(id) => format!("/api/v1/accounts/{id}/following"),
            ListKey::GroupMembers(id) => format!("/api/v1/groups/{id}/memberships"),
            ListKey::Bookmarks => "/api/v1/bookmarks".to_owned(),
            ListKey::Favourites => "/api/v1/favourites".to_owned(),
        }
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKey::HomeTimeline => f.write_str("home"),
            ListKey::PublicTimeline { local: true } => f.write_str("public:local"),
            ListKey::PublicTimeline { local: false } => f.write_str("public"),
            ListKey::AccountStatuses(id) => write!(f, "account:{id}"),
            ListKey::Quotes(id) => write!(f, "quotes:{id}"),
            ListKey::FavouritedBy(id) => write!(f, "favourited_by:{id}"),
            ListKey::RebloggedBy(id) => write!(f, "reblogged_by:{id}"),
            ListKey::Followers(id) => write!(f, "followers:{id}"),
            ListKey::Following(id) => write!(f, "following:{id}"),
            ListKey::GroupMembers(id) => write!(f, "group_members:{id}"),
            ListKey::Bookmarks => f.write_str("bookmarks"),
            ListKey::Favourites => f.write_str("favourites"),
        }
    }
}

/// Where newly imported ids go relative to the existing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Start,
    #[default]
    End,
}

/// Pagination and fetch state of one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListState {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub total_count: Option<u64>,
    pub error: Option<String>,
    pub fetched: bool,
    pub fetching: bool,
    pub invalid: bool,
    /// The server answered with an incomplete page (HTTP 206).
    pub partial: bool,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Fields to merge into a [`ListState`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListStatePatch {
    pub next: Option<Option<String>>,
    pub prev: Option<Option<String>>,
    pub total_count: Option<Option<u64>>,
    pub error: Option<Option<String>>,
    pub fetched: Option<bool>,
    pub fetching: Option<bool>,
    pub invalid: Option<bool>,
    pub partial: Option<bool>,
    pub last_fetched_at: Option<Option<DateTime<Utc>>>,
}

impl ListState {
    pub fn merge(&mut self, patch: ListStatePatch) {
        if let Some(next) = patch.next {
            self.next = next;
        }
        if let Some(prev) = patch.prev {
            self.prev = prev;
        }
        if let Some(total_count) = patch.total_count {
            self.total_count = total_count;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(fetched) = patch.fetched {
            self.fetched = fetched;
        }
        if let Some(fetching) = patch.fetching {
            self.fetching = fetching;
        }
        if let Some(invalid) = patch.invalid {
            self.invalid = invalid;
        }
        if let Some(partial) = patch.partial {
            self.partial = partial;
        }
        if let Some(last_fetched_at) = patch.last_fetched_at {
            self.last_fetched_at = last_fetched_at;
        }
    }

    /// Whether the list is worth (re)fetching at `now`.
    pub fn should_fetch(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        if self.fetching {
            return false;
        }
        if !self.fetched || self.invalid {
            return true;
        }
        match self.last_fetched_at {
            Some(at) => now - at >= stale_time,
            None => true,
        }
    }
}

/// Ordered ids plus state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityList {
    pub ids: Vec<String>,
    pub state: ListState,
}

impl EntityList {
    /// Merge `new_ids` in at `position`, keeping the first occurrence of each id.
    pub fn insert_ids(&mut self, new_ids: &[String], position: Position) {
        let combined: Vec<&String> = match position {
            Position::Start => new_ids.iter().chain(self.ids.iter()).collect(),
            Position::End => self.ids.iter().chain(new_ids.iter()).collect(),
        };
        self.ids = dedupe(combined);
    }

    pub fn replace_ids(&mut self, new_ids: &[String]) {
        self.ids = dedupe(new_ids.iter().collect());
    }

    pub fn remove_ids(&mut self, ids: &HashSet<&str>) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| !ids.contains(id.as_str()));
        self.ids.len() != before
    }
}

fn dedupe(ids: Vec<&String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Every list, keyed by the kind of entity it orders and its name.
#[derive(Debug, Default)]
pub struct ListStore {
    lists: HashMap<(EntityKind, ListKey), EntityList>,
}

impl ListStore {
    pub fn get(&self, kind: EntityKind, key: &ListKey) -> Option<&EntityList> {
        self.lists.get(&(kind, key.clone()))
    }

    pub fn entry(&mut self, kind: EntityKind, key: &ListKey) -> &mut EntityList {
        self.lists.entry((kind, key.clone())).or_default()
    }

    /// All lists ordering entities of `kind`.
    pub fn of_kind_mut(
        &mut self,
        kind: EntityKind,
    ) -> impl Iterator<Item = (&ListKey, &mut EntityList)> {
        self.lists
            .iter_mut()
            .filter(move |((k, _), _)| *k == kind)
            .map(|((_, key), list)| (key, list))
    }
}
