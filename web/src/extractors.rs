//! Request extractors for the gateways.
//!
//! [`GatewayJson`] is `axum::Json` with the rejection mapped onto
//! [`GatewayError`], so a request that never reaches a handler — malformed
//! JSON, a type mismatch, a body the size limit truncated — still answers
//! with the structured `{ "error": <code>, "message": <text> }` body: 400
//! for bodies that do not parse, 413 when the body limit was exceeded.

use crate::error::GatewayError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;

/// `Json<T>` with gateway-shaped rejections.
pub struct GatewayJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for GatewayJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(GatewayError::from(rejection)),
        }
    }
}
