use std::future::Future;

use reqwest::Method;

use crate::api::types::{ContextPayload, StatusParams, StatusPayload};
use crate::api::{ApiClientError, MastodonClient, Page, encode_segment};

/// Status endpoints.
pub trait StatusApi {
    fn get_status(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn get_context(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContextPayload, ApiClientError>> + Send;

    /// One page of a status list; `path` is a first-page endpoint or a
    /// cursor URL from a previous page.
    fn get_status_page(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Page<StatusPayload>, ApiClientError>> + Send;

    fn create_status(
        &self,
        params: &StatusParams,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn favourite(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn unfavourite(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn reblog(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn unreblog(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn react(
        &self,
        id: &str,
        emoji: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;

    fn unreact(
        &self,
        id: &str,
        emoji: &str,
    ) -> impl Future<Output = Result<StatusPayload, ApiClientError>> + Send;
}

impl StatusApi for MastodonClient {
    async fn get_status(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.get_json(&format!("/api/v1/statuses/{id}")).await
    }

    async fn get_context(&self, id: &str) -> Result<ContextPayload, ApiClientError> {
        self.get_json(&format!("/api/v1/statuses/{id}/context"))
            .await
    }

    async fn get_status_page(&self, path: &str) -> Result<Page<StatusPayload>, ApiClientError> {
        self.get_page(path).await
    }

    async fn create_status(
        &self,
        params: &StatusParams,
        idempotency_key: &str,
    ) -> Result<StatusPayload, ApiClientError> {
        let req = self
            .request(Method::POST, "/api/v1/statuses")?
            .header("Idempotency-Key", idempotency_key)
            .json(params);
        self.send_authed(req).await
    }

    async fn favourite(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.post_json(&format!("/api/v1/statuses/{id}/favourite"))
            .await
    }

    async fn unfavourite(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.post_json(&format!("/api/v1/statuses/{id}/unfavourite"))
            .await
    }

    async fn reblog(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.post_json(&format!("/api/v1/statuses/{id}/reblog"))
            .await
    }

    async fn unreblog(&self, id: &str) -> Result<StatusPayload, ApiClientError> {
        self.post_json(&format!("/api/v1/statuses/{id}/unreblog"))
            .await
    }

    async fn react(&self, id: &str, emoji: &str) -> Result<StatusPayload, ApiClientError> {
        let path = reaction_path(id, emoji);
        let req = self.request(Method::PUT, &path)?;
        self.send_authed(req).await
    }

    async fn unreact(&self, id: &str, emoji: &str) -> Result<StatusPayload, ApiClientError> {
        let path = reaction_path(id, emoji);
        let req = self.request(Method::DELETE, &path)?;
        self.send_authed(req).await
    }
}

fn reaction_path(id: &str, emoji: &str) -> String {
    format!(
        "/api/v1/pleroma/statuses/{id}/reactions/{}",
        encode_segment(emoji)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_path_encodes_emoji() {
        assert_eq!(
            reaction_path("9", "🔥"),
            "/api/v1/pleroma/statuses/9/reactions/%F0%9F%94%A5"
        );
    }
}
