use crate::api::types::StatusParams;
use crate::api::{ApiClientError, SocialApi};
use crate::auth::AuthError;
use crate::effects::{InFlight, MutationCoordinator, MutationKind};
use crate::pending::new_idempotency_key;
use crate::store::ListImport;
use crate::store::entity::Status;
use crate::store::list::{ListKey, Position};
use crate::store::transaction::Transaction;

pub fn reply_effect(parent_id: &str) -> Transaction {
    Transaction::new().update::<Status>(parent_id, |s| Status {
        replies_count: s.replies_count.saturating_add(1),
        ..s.clone()
    })
}

pub fn unreply_effect(parent_id: &str) -> Transaction {
    Transaction::new().update::<Status>(parent_id, |s| Status {
        replies_count: s.replies_count.saturating_sub(1),
        ..s.clone()
    })
}

impl<A: SocialApi> MutationCoordinator<A> {
    /// Post a status and return its id.
    ///
    /// The post is recorded as pending under a fresh idempotency key until
    /// the server answers. On success the new status is imported at the top
    /// of the home timeline.
    pub async fn create_status(&self, params: StatusParams) -> Result<String, ApiClientError> {
        if !self.session().is_authenticated() {
            return Err(AuthError::NotSignedIn.into());
        }

        let key = new_idempotency_key();
        let _in_flight = InFlight::begin(&self.in_flight, MutationKind::Post, &key);
        let parent = params.in_reply_to_id.clone();

        self.cache().add_pending(key.clone(), params.clone());
        if let Some(parent) = &parent {
            self.cache().transaction(reply_effect(parent));
        }

        let result = self.api().create_status(&params, &key).await;
        self.cache().remove_pending(&key);

        match result {
            Ok(payload) => {
                let ids = self.cache().import_statuses(
                    vec![payload],
                    Some(ListImport::new(ListKey::HomeTimeline).at(Position::Start)),
                );
                ids.into_iter().next().ok_or_else(|| {
                    ApiClientError::Deserialize("server returned a status without an account".into())
                })
            }
            Err(error) => {
                if let Some(parent) = &parent {
                    self.cache().transaction(unreply_effect(parent));
                }
                tracing::warn!(idempotency_key = %key, error = %error, "post failed");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::pin;
    use std::sync::Arc;

    use futures::poll;

    use super::*;
    use crate::auth::Session;
    use crate::store::EntityCache;
    use crate::store::entity::EntityKind;
    use crate::testing::{MockApi, status_payload};

    fn reply_params() -> StatusParams {
        StatusParams {
            status: "hello".into(),
            in_reply_to_id: Some("parent".into()),
            ..Default::default()
        }
    }

    fn setup(api: MockApi) -> (MutationCoordinator<MockApi>, Arc<MockApi>, EntityCache) {
        let api = Arc::new(api);
        let cache = EntityCache::new();
        cache.import_statuses(vec![status_payload("parent", "author")], None);
        let coordinator = MutationCoordinator::new(Arc::clone(&api), cache.clone(), Session::authenticated("me"));
        (coordinator, api, cache)
    }

    #[tokio::test]
    async fn pending_record_lives_until_response() {
        let (coordinator, api, cache) = setup(MockApi::new().gated());
        let mut fut = pin!(coordinator.create_status(reply_params()));

        assert!(poll!(fut.as_mut()).is_pending());
        cache.read(|s| {
            let replies = s.pending.replies_to("parent");
            assert_eq!(replies.len(), 1);
            assert_eq!(replies[0].1.params.status, "hello");
        });
        assert_eq!(cache.select_entity::<Status>("parent").unwrap().replies_count, 1);

        api.release();
        let id = fut.await.unwrap();

        cache.read(|s| assert!(s.pending.is_empty()));
        assert_eq!(
            cache.select_list_ids(EntityKind::Statuses, &ListKey::HomeTimeline),
            vec![id.clone()]
        );
        let posted = cache.select_entity::<Status>(&id).unwrap();
        assert_eq!(posted.in_reply_to_id.as_deref(), Some("parent"));
        assert_eq!(cache.descendants("parent").len(), 1);
    }

    #[tokio::test]
    async fn failed_post_clears_record_and_reply_count() {
        let (coordinator, _api, cache) = setup(MockApi::new().failing("post"));

        assert!(coordinator.create_status(reply_params()).await.is_err());

        cache.read(|s| assert!(s.pending.is_empty()));
        assert_eq!(cache.select_entity::<Status>("parent").unwrap().replies_count, 0);
        assert!(cache.select_list_ids(EntityKind::Statuses, &ListKey::HomeTimeline).is_empty());
    }

    #[tokio::test]
    async fn anonymous_session_cannot_post() {
        let api = Arc::new(MockApi::new());
        let coordinator = MutationCoordinator::new(Arc::clone(&api), EntityCache::new(), Session::anonymous());
        let err = coordinator.create_status(reply_params()).await.unwrap_err();
        assert!(matches!(err, ApiClientError::Auth(AuthError::NotSignedIn)));
        assert!(api.calls().is_empty());
    }
}
