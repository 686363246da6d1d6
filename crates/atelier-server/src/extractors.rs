//! Request extractors.

use crate::responses::ApiResponse;
use atelier_core::{AtelierError, ErrorResponse, UserId};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Header carrying the submitting user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The caller's user id, taken from the `X-User-Id` header.
///
/// Authentication happens upstream; this service trusts the header.
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

/// Rejection for a missing or malformed `X-User-Id`.
pub struct CallerIdRejection(AtelierError);

impl IntoResponse for CallerIdRejection {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
        let body = Json(ApiResponse::<()>::error(ErrorResponse::from_error(&self.0)));
        (status, body).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = CallerIdRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CallerIdRejection(AtelierError::Unauthorized(
                    "Missing X-User-Id header".to_string(),
                ))
            })?;

        UserId::parse(raw).map(CallerId).map_err(|_| {
            CallerIdRejection(AtelierError::validation(format!(
                "X-User-Id is not a valid id: {raw}"
            )))
        })
    }
}
