//! Body extractors that undo the security envelope.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRef, FromRequest, Request};
use axum::http::header::CONTENT_ENCODING;
use serde::de::DeserializeOwned;
use vigil_core::security::gunzip;
use vigil_core::VigilError;

use super::{ApiError, AppState};

/// JSON body that arrived inside the envelope: optionally gzip-compressed,
/// optionally RSA-encrypted. The signature was already checked by
/// [`verify_integrity`](super::middleware::verify_integrity).
#[derive(Debug)]
pub struct SealedJson<T>(pub T);

/// JSON body that may be gzip-compressed but is never encrypted.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

async fn read_body<S: Send + Sync>(req: Request, state: &S) -> Result<(Bytes, bool), ApiError> {
    let compressed = req
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));

    let body = Bytes::from_request(req, state)
        .await
        .map_err(|e| VigilError::MalformedPayload { reason: e.body_text() })?;
    Ok((body, compressed))
}

fn decode<T: DeserializeOwned>(plain: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(plain)
        .map_err(|e| ApiError(VigilError::MalformedPayload { reason: e.to_string() }))
}

#[async_trait]
impl<S, T> FromRequest<S> for SealedJson<T>
where
    S: Send + Sync,
    AppState: FromRef<S>,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let (body, compressed) = read_body(req, state).await?;
        let plain = app.envelope.unwrap_verified(&body, compressed)?;
        decode(&plain).map(Self)
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (body, compressed) = read_body(req, state).await?;
        if compressed {
            decode(&gunzip(&body)?).map(Self)
        } else {
            decode(&body).map(Self)
        }
    }
}
