use crate::api::SocialApi;
use crate::api::types::{Account, Relationship};
use crate::effects::{MutationCallbacks, MutationCoordinator, MutationKind, MutationOutcome};
use crate::store::transaction::Transaction;

/// Relationships are keyed by the target account id, like the account.
pub fn follow_effect(account_id: &str) -> Transaction {
    Transaction::new()
        .update::<Account>(account_id, |a| Account {
            followers_count: a.followers_count.saturating_add(1),
            ..a.clone()
        })
        .update::<Relationship>(account_id, |r| Relationship {
            following: true,
            ..r.clone()
        })
}

pub fn unfollow_effect(account_id: &str) -> Transaction {
    Transaction::new()
        .update::<Account>(account_id, |a| Account {
            followers_count: a.followers_count.saturating_sub(1),
            ..a.clone()
        })
        .update::<Relationship>(account_id, |r| Relationship {
            following: false,
            ..r.clone()
        })
}

impl<A: SocialApi> MutationCoordinator<A> {
    pub async fn follow(
        &self,
        account_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        self.run(
            MutationKind::Follow,
            account_id,
            follow_effect(account_id),
            unfollow_effect(account_id),
            self.api().follow(account_id),
            |cache, relationship| {
                cache.import_entities(vec![relationship], None);
            },
            callbacks,
        )
        .await
    }

    pub async fn unfollow(
        &self,
        account_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        self.run(
            MutationKind::Unfollow,
            account_id,
            unfollow_effect(account_id),
            follow_effect(account_id),
            self.api().unfollow(account_id),
            |cache, relationship| {
                cache.import_entities(vec![relationship], None);
            },
            callbacks,
        )
        .await
    }
}
