use std::future::Future;

use reqwest::Method;
use serde::Serialize;

use crate::api::types::{Account, Relationship};
use crate::api::{ApiClientError, MastodonClient, Page};

/// Account, relationship and admin endpoints.
pub trait AccountApi {
    fn verify_credentials(
        &self,
    ) -> impl Future<Output = Result<Account, ApiClientError>> + Send;

    fn get_account(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Account, ApiClientError>> + Send;

    fn get_account_page(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Page<Account>, ApiClientError>> + Send;

    fn get_relationships(
        &self,
        account_ids: &[String],
    ) -> impl Future<Output = Result<Vec<Relationship>, ApiClientError>> + Send;

    fn follow(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Relationship, ApiClientError>> + Send;

    fn unfollow(
        &self,
        account_id: &str,
    ) -> impl Future<Output = Result<Relationship, ApiClientError>> + Send;

    /// Admin: add `tags` to the accounts with these nicknames.
    fn tag_users(
        &self,
        nicknames: &[String],
        tags: &[String],
    ) -> impl Future<Output = Result<(), ApiClientError>> + Send;

    /// Admin: remove `tags` from the accounts with these nicknames.
    fn untag_users(
        &self,
        nicknames: &[String],
        tags: &[String],
    ) -> impl Future<Output = Result<(), ApiClientError>> + Send;

    /// Admin: mark or unmark accounts as suggested follows.
    fn set_suggested(
        &self,
        nicknames: &[String],
        suggested: bool,
    ) -> impl Future<Output = Result<(), ApiClientError>> + Send;
}

#[derive(Serialize)]
struct TagRequest<'a> {
    nicknames: &'a [String],
    tags: &'a [String],
}

#[derive(Serialize)]
struct NicknamesRequest<'a> {
    nicknames: &'a [String],
}

impl AccountApi for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account, ApiClientError> {
        let req = self.request(Method::GET, "/api/v1/accounts/verify_credentials")?;
        self.send_authed(req).await
    }

    async fn get_account(&self, account_id: &str) -> Result<Account, ApiClientError> {
        self.get_json(&format!("/api/v1/accounts/{account_id}"))
            .await
    }

    async fn get_account_page(&self, path: &str) -> Result<Page<Account>, ApiClientError> {
        self.get_page(path).await
    }

    async fn get_relationships(
        &self,
        account_ids: &[String],
    ) -> Result<Vec<Relationship>, ApiClientError> {
        let query: Vec<(&str, &str)> = account_ids.iter().map(|id| ("id[]", id.as_str())).collect();
        let req = self
            .request(Method::GET, "/api/v1/accounts/relationships")?
            .query(&query);
        self.send_authed(req).await
    }

    async fn follow(&self, account_id: &str) -> Result<Relationship, ApiClientError> {
        self.post_json(&format!("/api/v1/accounts/{account_id}/follow"))
            .await
    }

    async fn unfollow(&self, account_id: &str) -> Result<Relationship, ApiClientError> {
        self.post_json(&format!("/api/v1/accounts/{account_id}/unfollow"))
            .await
    }

    async fn tag_users(&self, nicknames: &[String], tags: &[String]) -> Result<(), ApiClientError> {
        let req = self
            .request(Method::PUT, "/api/v1/pleroma/admin/users/tag")?
            .json(&TagRequest { nicknames, tags });
        self.send_authed_unit(req).await
    }

    async fn untag_users(&self, nicknames: &[String], tags: &[String]) -> Result<(), ApiClientError> {
        let req = self
            .request(Method::DELETE, "/api/v1/pleroma/admin/users/tag")?
            .json(&TagRequest { nicknames, tags });
        self.send_authed_unit(req).await
    }

    async fn set_suggested(&self, nicknames: &[String], suggested: bool) -> Result<(), ApiClientError> {
        let path = if suggested {
            "/api/v1/pleroma/admin/users/suggest"
        } else {
            "/api/v1/pleroma/admin/users/unsuggest"
        };
        let req = self
            .request(Method::PATCH, path)?
            .json(&NicknamesRequest { nicknames });
        self.send_authed_unit(req).await
    }
}
