//! Trust and integrity checks, applied before any handler runs.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use vigil_core::{VigilError, HASH_HEADER, REAL_IP_HEADER};

use super::{ApiError, AppState};

/// Upper bound on a buffered request body.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reject requests whose declared origin is outside the trusted subnet.
pub async fn check_origin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(subnet) = &state.trusted_subnet {
        subnet.check(header(req.headers(), REAL_IP_HEADER))?;
    }
    Ok(next.run(req).await)
}

/// Verify the body signature against the exact bytes received.
///
/// The body is buffered and handed on unchanged; bodyless requests have
/// nothing to sign and pass through.
pub async fn verify_integrity(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.envelope.signer().is_enabled() {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| VigilError::MalformedPayload { reason: e.to_string() })?;

    if !bytes.is_empty() {
        state.envelope.verify(&bytes, header(&parts.headers, HASH_HEADER))?;
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
