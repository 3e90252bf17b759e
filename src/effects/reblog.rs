use crate::api::SocialApi;
use crate::effects::{MutationCallbacks, MutationCoordinator, MutationKind, MutationOutcome};
use crate::store::entity::Status;
use crate::store::transaction::Transaction;

pub fn reblog_effect(status_id: &str) -> Transaction {
    Transaction::new().update::<Status>(status_id, |s| Status {
        reblogged: true,
        reblogs_count: s.reblogs_count.saturating_add(1),
        ..s.clone()
    })
}

pub fn unreblog_effect(status_id: &str) -> Transaction {
    Transaction::new().update::<Status>(status_id, |s| Status {
        reblogged: false,
        reblogs_count: s.reblogs_count.saturating_sub(1),
        ..s.clone()
    })
}

impl<A: SocialApi> MutationCoordinator<A> {
    /// The server answers with the new reblog wrapping the original; both
    /// are imported on success.
    pub async fn reblog(
        &self,
        status_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        self.run(
            MutationKind::Reblog,
            status_id,
            reblog_effect(status_id),
            unreblog_effect(status_id),
            self.api().reblog(status_id),
            |cache, status| {
                cache.import_statuses(vec![status], None);
            },
            callbacks,
        )
        .await
    }

    pub async fn unreblog(
        &self,
        status_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        self.run(
            MutationKind::Unreblog,
            status_id,
            unreblog_effect(status_id),
            reblog_effect(status_id),
            self.api().unreblog(status_id),
            |cache, status| {
                cache.import_statuses(vec![status], None);
            },
            callbacks,
        )
        .await
    }
}
