//! HTTP implementation of the [`Backend`] trait.
//!
//! Thin `reqwest` client over the backend's JSON REST routes. Every request
//! carries the session's bearer credential; responses are decoded into the
//! `pairchat-proto` contracts and anything else is surfaced as an
//! [`ApiError`].

use std::time::Duration;

use serde::Serialize;

use pairchat_proto::connection::{Connection, ConnectionId, ConnectionStatus};
use pairchat_proto::message::{Message, MessageId, UserId};

use super::{ApiError, Backend};

/// Default timeout applied to every REST request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    receiver_id: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct RequestConnectionBody<'a> {
    addressee_id: &'a str,
}

#[derive(Debug, Serialize)]
struct RespondConnectionBody<'a> {
    connection_id: &'a str,
    action: &'a str,
}

/// REST [`Backend`] implementation.
pub struct RestBackend {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl RestBackend {
    /// Creates a client for the backend at `base_url`, authenticating every
    /// request with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Checks the response status, extracting the backend's `detail` field
    /// from error bodies when present.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(rejection(status.as_u16(), &body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

/// Builds a [`ApiError::Rejected`] from a status code and raw error body,
/// pulling out the `detail` field the backend uses for error messages.
fn rejection(status: u16, body: &str) -> ApiError {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        detail: String,
    }
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map_or_else(|_| body.to_string(), |e| e.detail);
    ApiError::Rejected { status, detail }
}

impl Backend for RestBackend {
    async fn fetch_history(
        &self,
        other: &UserId,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        self.get_json(&format!("/messages/history/{other}?limit={limit}"))
            .await
    }

    async fn send_message(&self, receiver: &UserId, body: &str) -> Result<Message, ApiError> {
        self.post_json(
            "/messages",
            &SendMessageBody {
                receiver_id: receiver.as_str(),
                body,
            },
        )
        .await
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), ApiError> {
        // The backend returns a status wrapper we have no use for.
        let _: serde_json::Value = self
            .post_json(&format!("/messages/read/{id}"), &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn list_connections(
        &self,
        status: Option<ConnectionStatus>,
    ) -> Result<Vec<Connection>, ApiError> {
        let path = status.map_or_else(
            || "/connections".to_string(),
            |s| format!("/connections?status={s}"),
        );
        self.get_json(&path).await
    }

    async fn request_connection(&self, target: &UserId) -> Result<Connection, ApiError> {
        self.post_json(
            "/connections",
            &RequestConnectionBody {
                addressee_id: target.as_str(),
            },
        )
        .await
    }

    async fn accept_connection(&self, id: &ConnectionId) -> Result<Connection, ApiError> {
        self.post_json(
            "/connections/respond",
            &RespondConnectionBody {
                connection_id: id.as_str(),
                action: "accept",
            },
        )
        .await
    }
}
