use crate::api::SocialApi;
use crate::effects::{MutationCallbacks, MutationCoordinator, MutationKind, MutationOutcome};
use crate::store::entity::Status;
use crate::store::transaction::Transaction;

pub fn favourite_effect(status_id: &str) -> Transaction {
    Transaction::new().update::<Status>(status_id, |s| Status {
        favourited: true,
        favourites_count: s.favourites_count.saturating_add(1),
        ..s.clone()
    })
}

pub fn unfavourite_effect(status_id: &str) -> Transaction {
    Transaction::new().update::<Status>(status_id, |s| Status {
        favourited: false,
        favourites_count: s.favourites_count.saturating_sub(1),
        ..s.clone()
    })
}

impl<A: SocialApi> MutationCoordinator<A> {
    pub async fn favourite(
        &self,
        status_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        self.run(
            MutationKind::Favourite,
            status_id,
            favourite_effect(status_id),
            unfavourite_effect(status_id),
            self.api().favourite(status_id),
            |cache, status| {
                cache.import_statuses(vec![status], None);
            },
            callbacks,
        )
        .await
    }

    pub async fn unfavourite(
        &self,
        status_id: &str,
        callbacks: Option<MutationCallbacks>,
    ) -> MutationOutcome {
        self.run(
            MutationKind::Unfavourite,
            status_id,
            unfavourite_effect(status_id),
            favourite_effect(status_id),
            self.api().unfavourite(status_id),
            |cache, status| {
                cache.import_statuses(vec![status], None);
            },
            callbacks,
        )
        .await
    }
}
