use crate::models::RawTimestamp;
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("authorization rejected ({0})")]
    Unauthorized(StatusCode),

    #[error("click source returned {0}")]
    Status(StatusCode),

    #[error("click source request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid click source url: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("click source url '{0}' cannot carry a path")]
    OpaqueBaseUrl(Url),

    #[error("invalid link '{0}'")]
    InvalidSubject(String),
}

/// Short codes are single path segments; `.` and `..` would walk the backend's path.
pub fn is_valid_subject(subject: &str) -> bool {
    !subject.is_empty() && subject != "." && subject != ".." && !subject.contains('/')
}

/// Backend that knows the raw click history of a shortened link.
#[async_trait]
pub trait ClickSource: Send + Sync {
    /// Returns click instants in no particular order, possibly none.
    async fn fetch_timestamps(&self, subject: &str, token: &str) -> Result<Vec<RawTimestamp>, SourceError>;
}

/// Shortener REST API: `GET {base}/me/links/{short}/redirects`.
#[derive(Clone)]
pub struct HttpClickSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpClickSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SourceError::OpaqueBaseUrl(base_url));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn redirects_url(&self, subject: &str) -> Result<Url, SourceError> {
        if !is_valid_subject(subject) {
            return Err(SourceError::InvalidSubject(subject.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::OpaqueBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["me", "links", subject, "redirects"]);
        Ok(url)
    }
}

#[async_trait]
impl ClickSource for HttpClickSource {
    async fn fetch_timestamps(&self, subject: &str, token: &str) -> Result<Vec<RawTimestamp>, SourceError> {
        let response = self
            .client
            .get(self.redirects_url(subject)?)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Unauthorized(status));
        }
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }

        Ok(response.json().await?)
    }
}
