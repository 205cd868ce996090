use crate::errors::AppError;
use crate::models::{Granularity, StatsView};
use crate::source::is_valid_subject;
use crate::state::{AppState, LinkKey};
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{future, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub granularity: Option<String>,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn get_series(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Query(query): Query<SeriesQuery>,
    headers: HeaderMap,
) -> Result<Json<StatsView>, AppError> {
    let key = link_key(subject, &headers)?;
    let granularity = match query.granularity.as_deref() {
        Some(value) => value.parse()?,
        None => Granularity::Minute,
    };

    let orchestrator = state.orchestrator(&key).await;
    let views = orchestrator.observe(&key.subject, &key.token, granularity).await;
    let generation = views.borrow().generation;

    Ok(Json(orchestrator.settled(generation).await))
}

/// Refetches the caller's last request for this link.
pub async fn refresh_series(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatsView>, AppError> {
    let key = link_key(subject, &headers)?;
    let not_requested = || AppError::not_found(format!("no stats requested yet for '{}'", key.subject));
    let orchestrator = state.existing(&key).await.ok_or_else(not_requested)?;
    let generation = orchestrator.refresh().await.ok_or_else(not_requested)?;

    Ok(Json(orchestrator.settled(generation).await))
}

/// Streams the caller's views of this link as they change.
pub async fn stream_series(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let key = link_key(subject, &headers)?;
    let orchestrator = state.orchestrator(&key).await;
    let stream = orchestrator.stream().filter_map(|view| {
        let event = match Event::default().event("stats").json_data(&view) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(err) => {
                warn!("failed to encode stats event: {err}");
                None
            }
        };
        future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn link_key(subject: String, headers: &HeaderMap) -> Result<LinkKey, AppError> {
    let token = bearer_token(headers)?;
    if !is_valid_subject(&subject) {
        return Err(AppError::bad_request(format!("invalid link '{subject}'")));
    }
    Ok(LinkKey::new(subject, token))
}

fn bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized("missing bearer token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn link_key_rejects_path_walking_subjects() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));

        assert_eq!(link_key("abc".into(), &headers).unwrap(), LinkKey::new("abc", "t"));
        for subject in ["..", "../../users", "a/b"] {
            let err = link_key(subject.into(), &headers).unwrap_err();
            assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        }
    }
}
