//! Axum middleware for bearer token authentication.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::{field, info_span, warn, Instrument};

use crate::api::error::ApiError;
use crate::auth::auth_service::AuthService;

pub type AuthServiceState = Arc<AuthService>;

/// Authenticate the request and attach an [`crate::auth::AuthContext`] extension.
pub async fn authenticate(
    State(auth_service): State<AuthServiceState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let correlation_id = uuid::Uuid::new_v4();
    let span = info_span!(
        "auth_middleware.authenticate",
        http.method = %method,
        http.path = %path,
        principal_id = field::Empty,
        correlation_id = %correlation_id
    );

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    match auth_service.authenticate(&header).instrument(span.clone()).await {
        Ok(context) => {
            span.record("principal_id", field::display(&context.principal_id));
            request.extensions_mut().insert(context);
            Ok(next.run(request).instrument(span).await)
        }
        Err(err) => {
            warn!(parent: &span, %correlation_id, error = %err, "authentication failed");
            Err(ApiError::from(err))
        }
    }
}
