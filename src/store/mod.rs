//! Normalized entity cache.
//!
//! [`EntityCache`] is constructed once and handed to every consumer; clones
//! share the same state. Writes are whole-value replacements serialized by
//! a lock, later write wins, and each write call publishes exactly one
//! [`CacheEvent`].

pub mod entity;
pub mod importer;
pub mod list;
pub mod transaction;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};
use tokio::sync::broadcast;

use crate::api::types::{Account, ContextPayload, Group, Poll, Relationship, StatusPayload};
use crate::pending::{PendingStatus, PendingStatuses};
use crate::thread::{ThreadContext, ThreadEntry};
use entity::{Entity, EntityKind, EntityStore, Status};
use list::{ListKey, ListState, ListStatePatch, ListStore, Position};
use transaction::Transaction;

// ---------------------------------------------------------------------------
// State & change events
// ---------------------------------------------------------------------------

/// Everything the cache holds, one field per concern.
#[derive(Debug, Default)]
pub struct CacheState {
    pub entities: EntityStore,
    pub lists: ListStore,
    pub context: ThreadContext,
    pub pending: PendingStatuses,
}

/// What one write touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEvent {
    pub entities: Vec<(EntityKind, String)>,
    pub lists: Vec<(EntityKind, ListKey)>,
    pub context: bool,
    pub pending: bool,
}

impl CacheEvent {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.lists.is_empty() && !self.context && !self.pending
    }

    pub fn touches(&self, kind: EntityKind, id: &str) -> bool {
        self.entities.iter().any(|(k, i)| *k == kind && i == id)
    }

    pub fn touches_list(&self, kind: EntityKind, key: &ListKey) -> bool {
        self.lists.iter().any(|(k, l)| *k == kind && l == key)
    }
}

const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Import targets
// ---------------------------------------------------------------------------

/// Where (and how) imported ids land in a list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListImport {
    pub key: ListKey,
    pub position: Position,
    pub meta: Option<ListStatePatch>,
    /// Replace the list's ids instead of merging into them.
    pub overwrite: bool,
}

impl ListImport {
    pub fn new(key: ListKey) -> Self {
        Self {
            key,
            position: Position::End,
            meta: None,
            overwrite: false,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_meta(mut self, meta: ListStatePatch) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Something that can be written into the store: an entity as-is, or a
/// payload that normalizes into several entities.
pub trait Importable: Send + 'static {
    /// Kind of the top-level entities, and of the list they are ordered in.
    const KIND: EntityKind;

    /// Write `batch` and return the ids of accepted top-level entities.
    fn import_into(batch: Vec<Self>, state: &mut CacheState, event: &mut CacheEvent) -> Vec<String>
    where
        Self: Sized;
}

macro_rules! importable_entity {
    ($($ty:ty),*) => {
        $(
            impl Importable for $ty {
                const KIND: EntityKind = <$ty as Entity>::KIND;

                fn import_into(
                    batch: Vec<Self>,
                    state: &mut CacheState,
                    event: &mut CacheEvent,
                ) -> Vec<String> {
                    put_all(&mut state.entities, batch, event)
                }
            }
        )*
    };
}

importable_entity!(Account, Poll, Group, Relationship);

impl Importable for StatusPayload {
    const KIND: EntityKind = EntityKind::Statuses;

    fn import_into(batch: Vec<Self>, state: &mut CacheState, event: &mut CacheEvent) -> Vec<String> {
        let normalized = importer::normalize_statuses(batch);
        for status in &normalized.statuses {
            state
                .context
                .register(&status.id, status.in_reply_to_id.as_deref());
        }
        event.context |= !normalized.statuses.is_empty();
        put_all(&mut state.entities, normalized.accounts, event);
        put_all(&mut state.entities, normalized.polls, event);
        put_all(&mut state.entities, normalized.groups, event);
        put_all(&mut state.entities, normalized.statuses, event);
        normalized.root_ids
    }
}

fn put_all<T: Entity>(store: &mut EntityStore, batch: Vec<T>, event: &mut CacheEvent) -> Vec<String> {
    let mut ids = Vec::with_capacity(batch.len());
    for entity in batch {
        let id = entity.id().to_owned();
        event.entities.push((T::KIND, id.clone()));
        store.put(entity);
        ids.push(id);
    }
    ids
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EntityCache {
    state: Arc<RwLock<CacheState>>,
    events: broadcast::Sender<CacheEvent>,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            events,
        }
    }

    /// Receive one [`CacheEvent`] per write made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Run `f` against a consistent view of the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&CacheState) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut CacheState, &mut CacheEvent) -> R) -> R {
        let mut event = CacheEvent::default();
        let out = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard, &mut event)
        };
        if !event.is_empty() && self.events.send(event).is_err() {
            tracing::trace!("no subscribers for cache event");
        }
        out
    }

    // -- Selectors ----------------------------------------------------------

    pub fn select_entity<T: Entity>(&self, id: &str) -> Option<Arc<T>> {
        self.read(|s| s.entities.get::<T>(id).cloned())
    }

    /// Entities of list `key` in list order; ids whose entity is gone are skipped.
    pub fn select_entities<T: Entity>(&self, key: &ListKey) -> Vec<Arc<T>> {
        self.read(|s| {
            s.lists
                .get(T::KIND, key)
                .map(|list| {
                    list.ids
                        .iter()
                        .filter_map(|id| s.entities.get::<T>(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Raw ids of a list, including placeholders for deleted entities.
    pub fn select_list_ids(&self, kind: EntityKind, key: &ListKey) -> Vec<String> {
        self.read(|s| {
            s.lists
                .get(kind, key)
                .map(|list| list.ids.clone())
                .unwrap_or_default()
        })
    }

    pub fn select_list_state(&self, kind: EntityKind, key: &ListKey) -> ListState {
        self.read(|s| {
            s.lists
                .get(kind, key)
                .map(|list| list.state.clone())
                .unwrap_or_default()
        })
    }

    pub fn is_fetching(&self, kind: EntityKind, key: &ListKey) -> bool {
        self.select_list_state(kind, key).fetching
    }

    pub fn should_fetch(&self, kind: EntityKind, key: &ListKey, stale_time: Duration) -> bool {
        self.select_list_state(kind, key)
            .should_fetch(Utc::now(), stale_time)
    }

    // -- Imports ------------------------------------------------------------

    /// Write `items` into the store and, if `list` is given, merge their ids
    /// into that list and its state. Returns the accepted top-level ids.
    pub fn import_entities<I: Importable>(
        &self,
        items: Vec<I>,
        list: Option<ListImport>,
    ) -> Vec<String> {
        self.write(|state, event| {
            let ids = I::import_into(items, state, event);
            if let Some(list) = list {
                apply_list_import(state, event, I::KIND, &ids, list);
            }
            ids
        })
    }

    /// Convenience for the common status case.
    pub fn import_statuses(
        &self,
        payloads: Vec<StatusPayload>,
        list: Option<ListImport>,
    ) -> Vec<String> {
        self.import_entities(payloads, list)
    }

    // -- List fetch lifecycle -----------------------------------------------

    pub fn fetch_entities_request(&self, kind: EntityKind, key: &ListKey) {
        self.patch_list(
            kind,
            key,
            ListStatePatch {
                fetching: Some(true),
                ..Default::default()
            },
        );
    }

    /// Mark the list as fetching unless a fetch is already in flight.
    ///
    /// Returns the list state as it was just before marking, or `None` when
    /// the fetch must be suppressed. Check and mark happen under one write.
    pub fn try_begin_fetch(&self, kind: EntityKind, key: &ListKey) -> Option<ListState> {
        self.write(|state, event| {
            let list = state.lists.entry(kind, key);
            if list.state.fetching {
                return None;
            }
            let before = list.state.clone();
            list.state.fetching = true;
            event.lists.push((kind, key.clone()));
            Some(before)
        })
    }

    /// Import a fetched page and mark the list fetched. `import.meta` carries
    /// the cursors of the page.
    pub fn fetch_entities_success<I: Importable>(
        &self,
        items: Vec<I>,
        import: ListImport,
    ) -> Vec<String> {
        let mut meta = import.meta.clone().unwrap_or_default();
        meta.fetched = Some(true);
        meta.fetching = Some(false);
        meta.error = Some(None);
        meta.invalid = Some(false);
        meta.last_fetched_at = Some(Some(Utc::now()));
        self.import_entities(items, Some(import.with_meta(meta)))
    }

    /// Record a failed fetch; the list's ids are left alone.
    pub fn fetch_entities_fail(&self, kind: EntityKind, key: &ListKey, error: impl Into<String>) {
        self.patch_list(
            kind,
            key,
            ListStatePatch {
                fetching: Some(false),
                error: Some(Some(error.into())),
                ..Default::default()
            },
        );
    }

    pub fn patch_list(&self, kind: EntityKind, key: &ListKey, patch: ListStatePatch) {
        self.write(|state, event| {
            state.lists.entry(kind, key).state.merge(patch);
            event.lists.push((kind, key.clone()));
        });
    }

    /// Mark a list so the next staleness check asks for a refetch.
    pub fn invalidate_list(&self, kind: EntityKind, key: &ListKey) {
        self.patch_list(
            kind,
            key,
            ListStatePatch {
                invalid: Some(true),
                ..Default::default()
            },
        );
    }

    /// Shift a list's known total by `diff`, never below zero.
    pub fn increment_list_total(&self, kind: EntityKind, key: &ListKey, diff: i64) {
        self.write(|state, event| {
            let list = state.lists.entry(kind, key);
            let current = list.state.total_count.unwrap_or(0);
            list.state.total_count = Some(current.saturating_add_signed(diff));
            event.lists.push((kind, key.clone()));
        });
    }

    // -- Removal ------------------------------------------------------------

    /// Remove entities from the store. Unless `preserve_lists`, their ids are
    /// also removed from every list of `kind`.
    pub fn delete_entities(&self, kind: EntityKind, ids: &[String], preserve_lists: bool) {
        self.write(|state, event| {
            for id in ids {
                if state.entities.remove(kind, id) {
                    event.entities.push((kind, id.clone()));
                }
                if kind == EntityKind::Statuses {
                    state.context.remove(id);
                    event.context = true;
                }
            }
            if preserve_lists {
                return;
            }
            let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
            for (key, list) in state.lists.of_kind_mut(kind) {
                if list.remove_ids(&doomed) {
                    tracing::debug!(%kind, list = %key, "removed deleted ids from list");
                    event.lists.push((kind, key.clone()));
                }
            }
        });
    }

    /// Remove ids from one list only; the entities stay in the store.
    pub fn dismiss_entities(&self, kind: EntityKind, ids: &[String], key: &ListKey) {
        self.write(|state, event| {
            let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
            if state.lists.entry(kind, key).remove_ids(&doomed) {
                event.lists.push((kind, key.clone()));
            }
        });
    }

    // -- Transactions -------------------------------------------------------

    /// Apply every updater in `tx` in a single write.
    pub fn transaction(&self, tx: Transaction) {
        if tx.is_empty() {
            return;
        }
        self.write(|state, event| {
            event.entities = tx.apply(&mut state.entities);
        });
    }

    // -- Conversation context -----------------------------------------------

    /// Import the statuses of a fetched context and link them around `focus`.
    pub fn import_context(&self, focus: &str, context: ContextPayload) {
        let links = |payloads: &[StatusPayload]| -> Vec<(String, Option<String>)> {
            payloads
                .iter()
                .map(|p| (p.id.clone(), p.in_reply_to_id.clone()))
                .collect()
        };
        let ancestors = links(&context.ancestors);
        let descendants = links(&context.descendants);

        self.write(|state, event| {
            let mut payloads = context.ancestors;
            payloads.extend(context.descendants);
            let accepted: HashSet<String> =
                StatusPayload::import_into(payloads, state, event).into_iter().collect();
            let keep = |v: Vec<(String, Option<String>)>| -> Vec<(String, Option<String>)> {
                v.into_iter().filter(|(id, _)| accepted.contains(id)).collect()
            };
            state
                .context
                .import_context(focus, &keep(ancestors), &keep(descendants));
            event.context = true;
        });
    }

    pub fn ancestors(&self, id: &str) -> Vec<ThreadEntry> {
        self.read(|s| s.context.ancestors(id))
    }

    pub fn descendants(&self, id: &str) -> Vec<ThreadEntry> {
        self.read(|s| s.context.descendants(id))
    }

    pub fn thread(&self, id: &str) -> Vec<ThreadEntry> {
        self.read(|s| s.context.thread(id))
    }

    /// Gap positions in a linearized thread of status ids, using each
    /// stored status's `in_reply_to_id` (see [`crate::thread::find_gaps`]).
    pub fn thread_gaps(&self, ids: &[String]) -> Vec<usize> {
        self.read(|s| {
            let items: Vec<(&str, Option<&str>)> = ids
                .iter()
                .map(|id| {
                    let parent = s
                        .entities
                        .get::<Status>(id)
                        .and_then(|st| st.in_reply_to_id.as_deref());
                    (id.as_str(), parent)
                })
                .collect();
            crate::thread::find_gaps(&items)
        })
    }

    // -- Pending posts ------------------------------------------------------

    pub fn add_pending(&self, idempotency_key: String, params: crate::api::types::StatusParams) {
        self.write(|state, event| {
            state.pending.insert(idempotency_key, params);
            event.pending = true;
        });
    }

    pub fn remove_pending(&self, idempotency_key: &str) -> Option<PendingStatus> {
        self.write(|state, event| {
            let removed = state.pending.remove(idempotency_key);
            event.pending = removed.is_some();
            removed
        })
    }
}

fn apply_list_import(
    state: &mut CacheState,
    event: &mut CacheEvent,
    kind: EntityKind,
    ids: &[String],
    import: ListImport,
) {
    let list = state.lists.entry(kind, &import.key);
    if import.overwrite {
        list.replace_ids(ids);
    } else {
        list.insert_ids(ids, import.position);
    }
    if let Some(meta) = import.meta {
        list.state.merge(meta);
    }
    event.lists.push((kind, import.key));
}
