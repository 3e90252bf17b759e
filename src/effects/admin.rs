//! Moderator actions on accounts: the `verified` tag and suggested follows.
//!
//! The admin endpoints address accounts by nickname (`acct`), so the target
//! must already be in the cache.

use crate::api::SocialApi;
use crate::api::types::{Account, AccountPleroma};
use crate::effects::{MutationCallbacks, MutationCoordinator, MutationKind, MutationOutcome};
use crate::store::transaction::Transaction;

pub const VERIFIED_TAG: &str = "verified";

fn with_pleroma(account: &Account, f: impl FnOnce(&mut AccountPleroma)) -> Account {
    let mut pleroma = account.pleroma.clone().unwrap_or_default();
    f(&mut pleroma);
    Account {
        pleroma: Some(pleroma),
        ..account.clone()
    }
}

pub fn verify_effect(account_id: &str) -> Transaction {
    Transaction::new().update::<Account>(account_id, |a| {
        with_pleroma(a, |p| {
            if !p.tags.iter().any(|t| t == VERIFIED_TAG) {
                p.tags.push(VERIFIED_TAG.to_owned());
            }
        })
    })
}

pub fn unverify_effect(account_id: &str) -> Transaction {
    Transaction::new().update::<Account>(account_id, |a| {
        with_pleroma(a, |p| p.tags.retain(|t| t != VERIFIED_TAG))
    })
}

pub fn suggest_effect(account_id: &str) -> Transaction {
    Transaction::new().update::<Account>(account_id, |a| with_pleroma(a, |p| p.is_suggested = true))
}

pub fn unsuggest_effect(account_id: &str) -> Transaction {
    Transaction::new().update::<Account>(account_id, |a| with_pleroma(a, |p| p.is_suggested = false))
}

impl<A: SocialApi> MutationCoordinator<A> {
    fn nickname(&self, account_id: &str) -> Option<Vec<String>> {
        let account = self.cache().select_entity::<Account>(account_id);
        if account.is_none() {
            tracing::debug!(account_id, "admin action on uncached account skipped");
        }
        account.map(|a| vec![a.acct.clone()])
    }

    pub async fn verify(
        &self,
        account_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        let Some(nicknames) = self.nickname(account_id) else {
            return MutationOutcome::NoOp;
        };
        let tags = vec![VERIFIED_TAG.to_owned()];
        self.run(
            MutationKind::Verify,
            account_id,
            verify_effect(account_id),
            unverify_effect(account_id),
            self.api().tag_users(&nicknames, &tags),
            |_, ()| {},
            callbacks,
        )
        .await
    }

    pub async fn unverify(
        &self,
        account_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        let Some(nicknames) = self.nickname(account_id) else {
            return MutationOutcome::NoOp;
        };
        let tags = vec![VERIFIED_TAG.to_owned()];
        self.run(
            MutationKind::Unverify,
            account_id,
            unverify_effect(account_id),
            verify_effect(account_id),
            self.api().untag_users(&nicknames, &tags),
            |_, ()| {},
            callbacks,
        )
        .await
    }

    pub async fn suggest(
        &self,
        account_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        let Some(nicknames) = self.nickname(account_id) else {
            return MutationOutcome::NoOp;
        };
        self.run(
            MutationKind::Suggest,
            account_id,
            suggest_effect(account_id),
            unsuggest_effect(account_id),
            self.api().set_suggested(&nicknames, true),
            |_, ()| {},
            callbacks,
        )
        .await
    }

    pub async fn unsuggest(
        &self,
        account_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        let Some(nicknames) = self.nickname(account_id) else {
            return MutationOutcome::NoOp;
        };
        self.run(
            MutationKind::Unsuggest,
            account_id,
            unsuggest_effect(account_id),
            suggest_effect(account_id),
            self.api().set_suggested(&nicknames, false),
            |_, ()| {},
            callbacks,
        )
        .await
    }
}
