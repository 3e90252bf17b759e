pub mod accounts;
pub mod pagination;
pub mod statuses;
pub mod types;

pub use accounts::AccountApi;
pub use statuses::StatusApi;

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::auth::AuthError;
use crate::auth::credentials::Credentials;
use pagination::parse_link_header;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },
    #[error("API error (status {status}): {detail}")]
    ApiError { status: u16, detail: String },
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("deserialization error: {0}")]
    Deserialize(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Everything the cache needs from a server. Implemented by
/// [`MastodonClient`] and by the in-crate test double.
pub trait SocialApi: StatusApi + AccountApi + Send + Sync + 'static {}

impl<T> SocialApi for T where T: StatusApi + AccountApi + Send + Sync + 'static {}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub prev: Option<String>,
    /// From `X-Total-Count`, when the server sends it.
    pub total: Option<u64>,
    /// The server answered 206: the list is still being assembled.
    pub partial: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next: None,
            prev: None,
            total: None,
            partial: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Encode everything but unreserved characters, for path segments.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub(crate) fn encode_segment(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT_ENCODE_SET).to_string()
}

// ---------------------------------------------------------------------------
// API client
// ---------------------------------------------------------------------------

pub struct MastodonClient {
    http_client: reqwest::Client,
    base: Url,
    access_token: Option<String>,
}

impl MastodonClient {
    pub fn new(base: Url, access_token: Option<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base,
            access_token,
        }
    }

    pub fn from_credentials(creds: &Credentials) -> Result<Self, ApiClientError> {
        let instance = if creds.instance.contains("://") {
            creds.instance.clone()
        } else {
            format!("https://{}", creds.instance)
        };
        Ok(Self::new(Url::parse(&instance)?, creds.access_token.clone()))
    }

    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Resolve `path` against the instance root. Absolute URLs (such as
    /// `Link` header targets) pass through.
    pub(crate) fn url(&self, path: &str) -> Result<Url, ApiClientError> {
        Ok(self.base.join(path)?)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Issue a GET request and deserialize the body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        let url = self.url(path)?;
        let resp = self.authorize(self.http_client.get(url)).send().await?;
        Self::handle_response(resp).await
    }

    /// Issue a request that needs a signed-in user and deserialize the body.
    pub(crate) async fn send_authed<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiClientError> {
        if self.access_token.is_none() {
            return Err(AuthError::MissingToken.into());
        }
        let resp = self.authorize(builder).send().await?;
        Self::handle_response(resp).await
    }

    /// Like [`Self::send_authed`] for endpoints whose body carries nothing.
    pub(crate) async fn send_authed_unit(&self, builder: RequestBuilder) -> Result<(), ApiClientError> {
        if self.access_token.is_none() {
            return Err(AuthError::MissingToken.into());
        }
        let resp = self.authorize(builder).send().await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    pub(crate) async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        let url = self.url(path)?;
        self.send_authed(self.http_client.post(url)).await
    }

    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<RequestBuilder, ApiClientError> {
        Ok(self.http_client.request(method, self.url(path)?))
    }

    /// Fetch one page of a list endpoint. Elements that fail to decode are
    /// dropped with a warning instead of failing the page.
    pub(crate) async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Page<T>, ApiClientError> {
        let url = self.url(path)?;
        let resp = self.authorize(self.http_client.get(url)).send().await?;
        let resp = Self::check_status(resp).await?;

        let headers = resp.headers();
        let links = headers
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        let total = headers
            .get("x-total-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let partial = resp.status() == StatusCode::PARTIAL_CONTENT;

        let values: Vec<serde_json::Value> = Self::decode(resp).await?;
        let items = decode_lenient(values);

        Ok(Page {
            items,
            next: links.next,
            prev: links.prev,
            total,
            partial,
        })
    }

    /// Map rate limiting and non-2xx statuses to errors.
    async fn check_status(resp: Response) -> Result<Response, ApiClientError> {
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = resp
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            return Err(ApiClientError::RateLimited { reset_at });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiClientError::ApiError {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiClientError> {
        let body = resp.text().await?;
        serde_json::from_str::<T>(&body)
            .map_err(|e| ApiClientError::Deserialize(format!("{e}: {body}")))
    }

    async fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T, ApiClientError> {
        let resp = Self::check_status(resp).await?;
        Self::decode(resp).await
    }
}

fn decode_lenient<T: DeserializeOwned>(values: Vec<serde_json::Value>) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<T>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable list element");
                None
            }
        })
        .collect()
}

/// Mastodon errors look like `{"error": "..."}`; fall back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Account;

    #[test]
    fn lenient_decoding_drops_bad_elements() {
        let values = vec![
            serde_json::json!({ "id": "1", "acct": "a" }),
            serde_json::json!({ "nope": true }),
            serde_json::json!({ "id": "2", "acct": "b" }),
        ];
        let accounts: Vec<Account> = decode_lenient(values);
        let ids: Vec<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn error_detail_prefers_error_field() {
        assert_eq!(error_detail(r#"{"error":"Record not found"}"#), "Record not found");
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn emoji_segment_is_percent_encoded() {
        assert_eq!(encode_segment("🔥"), "%F0%9F%94%A5");
        assert_eq!(encode_segment("blobcat"), "blobcat");
    }

    #[test]
    fn urls_resolve_against_instance() {
        let client = MastodonClient::from_credentials(&Credentials {
            instance: "example.social".into(),
            access_token: None,
        })
        .unwrap();
        assert_eq!(
            client.url("/api/v1/timelines/home").unwrap().as_str(),
            "https://example.social/api/v1/timelines/home"
        );
        assert_eq!(
            client
                .url("https://example.social/api/v1/timelines/home?max_id=9")
                .unwrap()
                .as_str(),
            "https://example.social/api/v1/timelines/home?max_id=9"
        );
    }
}
