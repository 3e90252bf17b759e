//! Optimistic mutations.
//!
//! Every mutation is a pair of transactions, a forward effect and its
//! inverse, plus one request. [`MutationCoordinator`] applies the forward
//! effect before the request is sent and the inverse if it fails, so a
//! failed mutation leaves the affected entities as they were.

pub mod admin;
pub mod favourite;
pub mod follow;
pub mod post;
pub mod reactions;
pub mod reblog;

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::api::{ApiClientError, SocialApi};
use crate::auth::Session;
use crate::store::EntityCache;
use crate::store::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Favourite,
    Unfavourite,
    Reblog,
    Unreblog,
    Follow,
    Unfollow,
    React,
    Unreact,
    Verify,
    Unverify,
    Suggest,
    Unsuggest,
    Post,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Favourite => "favourite",
            MutationKind::Unfavourite => "unfavourite",
            MutationKind::Reblog => "reblog",
            MutationKind::Unreblog => "unreblog",
            MutationKind::Follow => "follow",
            MutationKind::Unfollow => "unfollow",
            MutationKind::React => "react",
            MutationKind::Unreact => "unreact",
            MutationKind::Verify => "verify",
            MutationKind::Unverify => "unverify",
            MutationKind::Suggest => "suggest",
            MutationKind::Unsuggest => "unsuggest",
            MutationKind::Post => "post",
        };
        f.write_str(name)
    }
}

/// How a mutation ended.
#[derive(Debug)]
pub enum MutationOutcome {
    /// No signed-in user: nothing was applied or sent.
    Unauthenticated,
    /// Nothing to do (target unknown, or already in the requested state).
    NoOp,
    /// The server accepted the request.
    Committed,
    /// The request failed and the optimistic effect was undone.
    RolledBack(ApiClientError),
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed)
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, MutationOutcome::RolledBack(_))
    }
}

/// Caller hooks. When `on_error` is set the failure is handed to it instead
/// of only being logged.
#[derive(Default)]
pub struct MutationCallbacks {
    pub on_success: Option<Box<dyn FnOnce() + Send>>,
    pub on_error: Option<Box<dyn FnOnce(&ApiClientError) + Send>>,
}

impl MutationCallbacks {
    pub fn on_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(&ApiClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for MutationCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

type InFlightSet = Mutex<HashSet<(MutationKind, String)>>;

pub struct MutationCoordinator<A> {
    api: Arc<A>,
    cache: EntityCache,
    session: Session,
    reconcile: bool,
    in_flight: InFlightSet,
}

impl<A: SocialApi> MutationCoordinator<A> {
    pub fn new(api: Arc<A>, cache: EntityCache, session: Session) -> Self {
        Self {
            api,
            cache,
            session,
            reconcile: true,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether to re-import the server's copy of the entity on success.
    pub fn with_reconcile(mut self, reconcile: bool) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn api(&self) -> &A {
        &self.api
    }

    /// Whether a `kind` mutation on `target` is still waiting on the server.
    pub fn is_pending(&self, kind: MutationKind, target: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(kind, target.to_owned()))
    }

    /// Apply `forward`, await `request`, then reconcile or apply `inverse`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn run<T>(
        &self,
        kind: MutationKind,
        target: &str,
        forward: Transaction,
        inverse: Transaction,
        request: impl Future<Output = Result<T, ApiClientError>> + Send,
        reconcile: impl FnOnce(&EntityCache, T) + Send,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        if !self.session.is_authenticated() {
            tracing::debug!(%kind, target, "skipping mutation without a session");
            return MutationOutcome::Unauthenticated;
        }

        let _in_flight = InFlight::begin(&self.in_flight, kind, target);
        self.cache.transaction(forward);

        match request.await {
            Ok(value) => {
                if self.reconcile {
                    reconcile(&self.cache, value);
                }
                if let Some(on_success) = callbacks.and_then(|c| c.on_success) {
                    on_success();
                }
                MutationOutcome::Committed
            }
            Err(error) => {
                self.cache.transaction(inverse);
                match callbacks.and_then(|c| c.on_error) {
                    Some(on_error) => on_error(&error),
                    None => {
                        tracing::warn!(%kind, target, error = %error, "mutation failed, rolled back")
                    }
                }
                MutationOutcome::RolledBack(error)
            }
        }
    }
}

/// Marks a mutation as in flight until dropped.
struct InFlight<'a> {
    set: &'a InFlightSet,
    key: (MutationKind, String),
}

impl<'a> InFlight<'a> {
    fn begin(set: &'a InFlightSet, kind: MutationKind, target: &str) -> Self {
        let key = (kind, target.to_owned());
        set.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        Self { set, key }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::poll;

    use super::*;
    use crate::store::entity::Status;
    use crate::testing::{MockApi, status_payload};

    fn seeded(api: MockApi) -> (MutationCoordinator<MockApi>, Arc<MockApi>) {
        let mut payload = status_payload("1", "author");
        payload.favourites_count = 5;
        let api = Arc::new(api.with_status(payload.clone()));
        let cache = EntityCache::new();
        cache.import_statuses(vec![payload], None);
        let coordinator =
            MutationCoordinator::new(Arc::clone(&api), cache, Session::authenticated("me"));
        (coordinator, api)
    }

    #[tokio::test]
    async fn unauthenticated_mutation_does_nothing() {
        let api = Arc::new(MockApi::new());
        let cache = EntityCache::new();
        cache.import_statuses(vec![status_payload("1", "author")], None);
        let coordinator = MutationCoordinator::new(Arc::clone(&api), cache, Session::anonymous());

        let outcome = coordinator.favourite("1", None).await;

        assert!(matches!(outcome, MutationOutcome::Unauthenticated));
        assert!(api.calls().is_empty());
        let status = coordinator.cache().select_entity::<Status>("1").unwrap();
        assert!(!status.favourited);
    }

    #[tokio::test]
    async fn pending_flag_tracks_in_flight_request() {
        let (coordinator, api) = seeded(MockApi::new().gated());
        let mut fut = pin!(coordinator.favourite("1", None));

        assert!(poll!(fut.as_mut()).is_pending());
        assert!(coordinator.is_pending(MutationKind::Favourite, "1"));

        api.release();
        assert!(fut.await.is_committed());
        assert!(!coordinator.is_pending(MutationKind::Favourite, "1"));
    }

    #[tokio::test]
    async fn error_callback_receives_failure() {
        let (coordinator, _api) = seeded(MockApi::new().failing("favourite"));
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        let outcome = coordinator
            .favourite(
                "1",
                Some(MutationCallbacks::default().on_error(move |_| flag.store(true, Ordering::SeqCst))),
            )
            .await;

        assert!(outcome.is_rolled_back());
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn success_callback_runs_after_commit() {
        let (coordinator, _api) = seeded(MockApi::new());
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        coordinator
            .favourite(
                "1",
                Some(MutationCallbacks::default().on_success(move || flag.store(true, Ordering::SeqCst))),
            )
            .await;

        assert!(called.load(Ordering::SeqCst));
    }
}
