//! Paginated list loading on top of [`EntityCache`].
//!
//! Only one fetch per `(kind, list)` runs at a time. The in-flight flag is
//! checked and set in a single cache write right before the request goes
//! out, so a caller working from an older snapshot cannot start a duplicate.

use std::future::Future;
use std::sync::Arc;

use crate::api::pagination::with_limit;
use crate::api::types::{Account, StatusPayload};
use crate::api::{ApiClientError, Page, SocialApi};
use crate::config::AppConfig;
use crate::store::entity::EntityKind;
use crate::store::list::{ListKey, ListStatePatch, Position};
use crate::store::{EntityCache, Importable, ListImport};
use crate::thread::ThreadEntry;

/// A payload type that list endpoints return.
pub trait Paged: Importable + Sized {
    fn get_page<A: SocialApi>(
        api: &A,
        path: &str,
    ) -> impl Future<Output = Result<Page<Self>, ApiClientError>> + Send;
}

impl Paged for StatusPayload {
    fn get_page<A: SocialApi>(
        api: &A,
        path: &str,
    ) -> impl Future<Output = Result<Page<Self>, ApiClientError>> + Send {
        api.get_status_page(path)
    }
}

impl Paged for Account {
    fn get_page<A: SocialApi>(
        api: &A,
        path: &str,
    ) -> impl Future<Output = Result<Page<Self>, ApiClientError>> + Send {
        api.get_account_page(path)
    }
}

/// Which page of a list to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    /// The first page; replaces whatever the list held.
    First,
    /// The page after the last one loaded, appended.
    Next,
    /// Items newer than the first one loaded, prepended.
    Newer,
}

#[derive(Debug)]
pub enum FetchOutcome {
    /// Number of accepted top-level entities.
    Fetched(usize),
    /// A fetch for this list was already running; nothing was sent.
    InFlight,
    /// No cursor for the requested direction.
    Exhausted,
    /// Data is younger than the stale time.
    Fresh,
    Failed(ApiClientError),
}

pub struct ListFetcher<A> {
    api: Arc<A>,
    cache: EntityCache,
    page_size: u32,
    stale_time: chrono::Duration,
}

impl<A: SocialApi> ListFetcher<A> {
    pub fn new(api: Arc<A>, cache: EntityCache, config: &AppConfig) -> Self {
        Self {
            api,
            cache,
            page_size: config.page_size(),
            stale_time: config.stale_time(),
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub async fn fetch<I: Paged>(&self, key: &ListKey, request: PageRequest) -> FetchOutcome {
        let kind = I::KIND;
        let Some(state) = self.cache.try_begin_fetch(kind, key) else {
            tracing::debug!(%kind, list = %key, "fetch already in flight, skipping");
            return FetchOutcome::InFlight;
        };
        let guard = FetchGuard::new(&self.cache, kind, key);

        let first_page = || with_limit(&key.endpoint(), self.page_size);
        let path = match request {
            PageRequest::First => first_page(),
            PageRequest::Next => match state.next {
                Some(next) => next,
                None => return FetchOutcome::Exhausted,
            },
            PageRequest::Newer => state.prev.unwrap_or_else(first_page),
        };

        let outcome = match I::get_page(self.api.as_ref(), &path).await {
            Ok(page) => {
                let (import, items) = page_import(key, request, page);
                let ids = self.cache.fetch_entities_success(items, import);
                tracing::debug!(%kind, list = %key, count = ids.len(), "page imported");
                FetchOutcome::Fetched(ids.len())
            }
            Err(error) => {
                tracing::warn!(%kind, list = %key, error = %error, "list fetch failed");
                self.cache.fetch_entities_fail(kind, key, error.to_string());
                FetchOutcome::Failed(error)
            }
        };
        guard.settle();
        outcome
    }

    /// Fetch the first page only if the list is missing, invalid, or stale.
    pub async fn fetch_if_stale<I: Paged>(&self, key: &ListKey) -> FetchOutcome {
        if !self.cache.should_fetch(I::KIND, key, self.stale_time) {
            return FetchOutcome::Fresh;
        }
        self.fetch::<I>(key, PageRequest::First).await
    }

    pub async fn fetch_statuses(&self, key: &ListKey, request: PageRequest) -> FetchOutcome {
        self.fetch::<StatusPayload>(key, request).await
    }

    pub async fn fetch_accounts(&self, key: &ListKey, request: PageRequest) -> FetchOutcome {
        self.fetch::<Account>(key, request).await
    }

    /// Load a status and its context, then return the assembled thread.
    pub async fn fetch_thread(&self, status_id: &str) -> Result<Vec<ThreadEntry>, ApiClientError> {
        let status = self.api.get_status(status_id).await?;
        self.cache.import_statuses(vec![status], None);
        let context = self.api.get_context(status_id).await?;
        self.cache.import_context(status_id, context);
        Ok(self.cache.thread(status_id))
    }

    pub async fn fetch_relationships(&self, account_ids: &[String]) -> Result<(), ApiClientError> {
        if account_ids.is_empty() {
            return Ok(());
        }
        let relationships = self.api.get_relationships(account_ids).await?;
        self.cache.import_entities(relationships, None);
        Ok(())
    }
}

/// Clears the list's `fetching` flag unless the fetch settled normally, so
/// an early return or a dropped fetch future cannot leave the list locked.
struct FetchGuard<'a> {
    cache: &'a EntityCache,
    kind: EntityKind,
    key: &'a ListKey,
    settled: bool,
}

impl<'a> FetchGuard<'a> {
    fn new(cache: &'a EntityCache, kind: EntityKind, key: &'a ListKey) -> Self {
        Self {
            cache,
            kind,
            key,
            settled: false,
        }
    }

    /// The list state already records how the fetch ended.
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::debug!(kind = %self.kind, list = %self.key, "fetch ended without a response");
        self.cache.patch_list(
            self.kind,
            self.key,
            ListStatePatch {
                fetching: Some(false),
                ..Default::default()
            },
        );
    }
}

/// Where a page lands and which cursors it moves. A `Next` page only moves
/// `next`; a `Newer` page only moves `prev`, and only when it has one.
fn page_import<T>(key: &ListKey, request: PageRequest, page: Page<T>) -> (ListImport, Vec<T>) {
    let mut meta = ListStatePatch {
        partial: Some(page.partial),
        ..Default::default()
    };
    if let Some(total) = page.total {
        meta.total_count = Some(Some(total));
    }

    let import = ListImport::new(key.clone());
    let import = match request {
        PageRequest::First => {
            meta.next = Some(page.next);
            meta.prev = Some(page.prev);
            import.overwrite(true)
        }
        PageRequest::Next => {
            meta.next = Some(page.next);
            import.at(Position::End)
        }
        PageRequest::Newer => {
            if page.prev.is_some() {
                meta.prev = Some(page.prev);
            }
            import.at(Position::Start)
        }
    };

    (import.with_meta(meta), page.items)
}
