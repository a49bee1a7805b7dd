//! HTTP client for the SmartStudy session endpoints.
//!
//! Implements [`SessionApi`] over reqwest. The manager bounds each call with its
//! own timeout, so the client only maps transport, status, and payload failures
//! onto [`RemoteError`].

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use reqwest::{Client, StatusCode};
use smartstudy_protocol::{
    end_session_path, parse_session, start_session_path, ErrorBody, StudySessionRecord,
    MAX_RESPONSE_BYTES,
};
use study_core::config::API_URL_ENV;
use study_core::{RemoteError, SessionApi, StudyConfig};

const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone)]
pub struct HttpSessionApi {
    client: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpSessionApi {
    pub fn new(base_url: Option<String>, token: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("smartstudy/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Falling back to default HTTP client");
                Client::new()
            });
        Self::with_client(client, base_url, token)
    }

    fn with_client(client: Client, base_url: Option<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            token,
        }
    }

    pub fn from_config(config: &StudyConfig) -> Self {
        Self::new(config.api_base_url.clone(), config.token.clone())
    }

    async fn post(&self, path_and_query: &str) -> Result<StudySessionRecord, RemoteError> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            RemoteError::NotConfigured(format!(
                "set api_base_url in config.json or {}",
                API_URL_ENV
            ))
        })?;
        let url = format!("{}{}", base, path_and_query);
        let request_id = make_request_id();

        let mut request = self
            .client
            .post(&url)
            .header(REQUEST_ID_HEADER, request_id.as_str());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(%url, %request_id, "Sending session request");
        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        let status = response.status();
        let body = read_capped(response).await?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                detail: error_detail(status, &body),
            });
        }
        parse_session(&body).map_err(|info| RemoteError::Decode(info.to_string()))
    }
}

#[async_trait]
impl SessionApi for HttpSessionApi {
    async fn start_session(&self, material_id: i64) -> Result<StudySessionRecord, RemoteError> {
        self.post(&format!(
            "{}?material_id={}",
            start_session_path(),
            material_id
        ))
        .await
    }

    async fn end_session(&self, session_id: i64) -> Result<StudySessionRecord, RemoteError> {
        self.post(&end_session_path(session_id)).await
    }
}

/// Reads the body, refusing anything past [`MAX_RESPONSE_BYTES`] before it is
/// buffered.
async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>, RemoteError> {
    let too_large = || {
        RemoteError::Decode(format!(
            "response exceeds {} bytes",
            MAX_RESPONSE_BYTES
        ))
    };
    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| RemoteError::Transport(err.to_string()))?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Prefers the API's `detail`; falls back to the status reason.
fn error_detail(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .map(|body| body.message())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

fn make_request_id() -> String {
    let mut random = rand::thread_rng();
    format!(
        "req-{}-{:x}",
        Utc::now().timestamp_millis(),
        random.next_u64()
    )
}
