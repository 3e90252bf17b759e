use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::types::{Account, EmojiReaction, FilterResult, Group, Poll, Relationship};
use crate::store::transaction::{Transaction, Updater};

/// Every kind of entity the cache holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Accounts,
    Statuses,
    Polls,
    Groups,
    Relationships,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Accounts => "accounts",
            EntityKind::Statuses => "statuses",
            EntityKind::Polls => "polls",
            EntityKind::Groups => "groups",
            EntityKind::Relationships => "relationships",
        };
        f.write_str(name)
    }
}

/// A flattened status: nested objects are replaced by the ids they were
/// imported under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: String,
    pub account_id: String,
    pub content: String,
    pub spoiler_text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub in_reply_to_id: Option<String>,
    pub in_reply_to_account_id: Option<String>,
    pub visibility: Option<String>,
    pub url: Option<String>,
    pub reblog_id: Option<String>,
    pub quote_id: Option<String>,
    pub poll_id: Option<String>,
    pub group_id: Option<String>,
    pub favourited: bool,
    pub reblogged: bool,
    pub replies_count: u64,
    pub favourites_count: u64,
    pub reblogs_count: u64,
    pub reactions: Vec<EmojiReaction>,
    pub filtered: Vec<FilterResult>,
}

impl Status {
    pub fn reaction(&self, name: &str) -> Option<&EmojiReaction> {
        self.reactions.iter().find(|r| r.name == name)
    }

    /// Reactions the authenticated user has applied.
    pub fn own_reactions(&self) -> impl Iterator<Item = &EmojiReaction> {
        self.reactions.iter().filter(|r| r.me)
    }
}

/// A stored entity type. Each kind owns one table in [`EntityStore`] and one
/// updater list in [`Transaction`].
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn table(store: &EntityStore) -> &Table<Self>;
    fn table_mut(store: &mut EntityStore) -> &mut Table<Self>;
    fn updaters(tx: &mut Transaction) -> &mut Vec<(String, Updater<Self>)>;
}

macro_rules! impl_entity {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn table(store: &EntityStore) -> &Table<Self> {
                &store.$field
            }

            fn table_mut(store: &mut EntityStore) -> &mut Table<Self> {
                &mut store.$field
            }

            fn updaters(tx: &mut Transaction) -> &mut Vec<(String, Updater<Self>)> {
                &mut tx.$field
            }
        }
    };
}

impl_entity!(Account, EntityKind::Accounts, accounts);
impl_entity!(Status, EntityKind::Statuses, statuses);
impl_entity!(Poll, EntityKind::Polls, polls);
impl_entity!(Group, EntityKind::Groups, groups);
impl_entity!(Relationship, EntityKind::Relationships, relationships);

/// Id → snapshot map for one entity kind. Values are shared snapshots: a
/// write swaps the `Arc`, so readers holding an older one keep a valid copy.
#[derive(Debug)]
pub struct Table<T> {
    rows: HashMap<String, Arc<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    pub fn get(&self, id: &str) -> Option<&Arc<T>> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn insert(&mut self, id: String, value: T) {
        self.rows.insert(id, Arc::new(value));
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<T>> {
        self.rows.remove(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Canonical copies of every entity, one table per kind.
#[derive(Debug, Default)]
pub struct EntityStore {
    pub accounts: Table<Account>,
    pub statuses: Table<Status>,
    pub polls: Table<Poll>,
    pub groups: Table<Group>,
    pub relationships: Table<Relationship>,
}

impl EntityStore {
    pub fn get<T: Entity>(&self, id: &str) -> Option<&Arc<T>> {
        T::table(self).get(id)
    }

    /// Write `entity` under its own id, replacing any previous value whole.
    pub fn put<T: Entity>(&mut self, entity: T) {
        let id = entity.id().to_owned();
        T::table_mut(self).insert(id, entity);
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Accounts => self.accounts.contains(id),
            EntityKind::Statuses => self.statuses.contains(id),
            EntityKind::Polls => self.polls.contains(id),
            EntityKind::Groups => self.groups.contains(id),
            EntityKind::Relationships => self.relationships.contains(id),
        }
    }

    /// Remove an entity by kind and id; returns whether anything was removed.
    pub fn remove(&mut self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Accounts => self.accounts.remove(id).is_some(),
            EntityKind::Statuses => self.statuses.remove(id).is_some(),
            EntityKind::Polls => self.polls.remove(id).is_some(),
            EntityKind::Groups => self.groups.remove(id).is_some(),
            EntityKind::Relationships => self.relationships.remove(id).is_some(),
        }
    }
}
