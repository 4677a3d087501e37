//! Sign-in handlers: login, status, logout, and kubeconfig.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use meshgate_access::Kubeconfig;
use meshgate_auth::{LogoutOutcome, SignInOutcome};
use meshgate_core::error::ErrorKind;

use crate::dto::response::{ApiResponse, LogoutResponse, SignInResponse};
use crate::error::ApiError;
use crate::extractors::MeshIdentity;
use crate::state::AppState;

/// POST /api/v1alpha1/login
///
/// `200` when access is active, `202` with `Retry-After` while it is
/// being provisioned.
pub async fn login(
    State(state): State<AppState>,
    identity: MeshIdentity,
) -> Result<Response, ApiError> {
    let rule = state.capabilities.resolve(&identity)?;
    let outcome = state
        .signin
        .sign_in_with_rule(identity.username(), &rule)
        .await?;

    let response = match outcome {
        SignInOutcome::Ready(view) => {
            (StatusCode::OK, Json(ApiResponse::ok(SignInResponse::from(view)))).into_response()
        }
        SignInOutcome::NotReady { view, retry_after } => {
            let mut response = (
                StatusCode::ACCEPTED,
                Json(ApiResponse::ok(SignInResponse::from(view))),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    };

    Ok(response)
}

/// GET /api/v1alpha1/login
pub async fn status(
    State(state): State<AppState>,
    identity: MeshIdentity,
) -> Result<Json<ApiResponse<SignInResponse>>, ApiError> {
    let view = state.signin.status(identity.username()).await?;
    Ok(Json(ApiResponse::ok(SignInResponse::from(view))))
}

/// POST /api/v1alpha1/logout
///
/// `202` when revocation was requested but not observed in time.
pub async fn logout(
    State(state): State<AppState>,
    identity: MeshIdentity,
) -> Result<(StatusCode, Json<ApiResponse<LogoutResponse>>), ApiError> {
    let outcome = state.signin.logout(identity.username()).await?;
    let status = match outcome {
        LogoutOutcome::Pending => StatusCode::ACCEPTED,
        LogoutOutcome::SignedOut | LogoutOutcome::AlreadySignedOut => StatusCode::OK,
    };

    Ok((
        status,
        Json(ApiResponse::ok(LogoutResponse::new(identity.username(), outcome))),
    ))
}

/// GET /api/v1alpha1/kubeconfig
pub async fn kubeconfig(
    State(state): State<AppState>,
    identity: MeshIdentity,
) -> Result<Json<Kubeconfig>, ApiError> {
    let credentials = state
        .credentials
        .materialize(identity.username())
        .await
        .map_err(|e| {
            let retry = e.is(ErrorKind::NotReady);
            let err = ApiError::from(e);
            if retry {
                err.with_retry_after(state.config.reconciler.retry_after())
            } else {
                err
            }
        })?;

    Ok(Json(credentials.to_kubeconfig()))
}
