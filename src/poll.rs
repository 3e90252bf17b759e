//! Interval pollers.
//!
//! A poller re-runs one fetch on a fixed interval until it is stopped,
//! dropped, or its relevance check fails. Relevance is evaluated right
//! before every cycle against live state. Stopping takes effect between
//! cycles; a request already sent is allowed to land.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::SocialApi;
use crate::api::types::StatusPayload;
use crate::fetch::{ListFetcher, PageRequest};
use crate::store::entity::EntityKind;
use crate::store::list::ListKey;

pub struct Poller {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl Poller {
    /// Run `cycle` every `interval`, first after one interval has passed.
    pub fn spawn<R, C, Fut>(interval: Duration, relevant: R, mut cycle: C) -> Self
    where
        R: Fn() -> bool + Send + 'static,
        C: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let stop_child = stop.child_token();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_child.cancelled() => break,
                    _ = ticker.tick() => {
                        if !relevant() {
                            tracing::debug!("poller no longer relevant");
                            break;
                        }
                        cycle().await;
                    }
                }
            }

            tracing::debug!("poller stopped");
        });

        Self { stop, task }
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to exit.
    pub async fn finished(&mut self) {
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "poller task ended abnormally");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Refetch a timeline's first page while the server still reports it as
/// partial (being assembled).
pub fn poll_partial_timeline<A: SocialApi>(
    fetcher: Arc<ListFetcher<A>>,
    key: ListKey,
    interval: Duration,
) -> Poller {
    let cache = fetcher.cache().clone();
    let relevant_key = key.clone();
    Poller::spawn(
        interval,
        move || cache.select_list_state(EntityKind::Statuses, &relevant_key).partial,
        move || {
            let fetcher = Arc::clone(&fetcher);
            let key = key.clone();
            async move {
                fetcher
                    .fetch::<StatusPayload>(&key, PageRequest::First)
                    .await;
            }
        },
    )
}

/// Pull newer items into a timeline on every tick.
pub fn poll_newer<A: SocialApi>(
    fetcher: Arc<ListFetcher<A>>,
    key: ListKey,
    interval: Duration,
) -> Poller {
    Poller::spawn(
        interval,
        || true,
        move || {
            let fetcher = Arc::clone(&fetcher);
            let key = key.clone();
            async move {
                fetcher
                    .fetch::<StatusPayload>(&key, PageRequest::Newer)
                    .await;
            }
        },
    )
}
