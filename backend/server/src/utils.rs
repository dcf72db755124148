use std::{future::Future, sync::Arc, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tokio::time::sleep;
use tracing::warn;

use crate::{database::Store, error::AppError, state::AppState};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Only for idempotent reads. Backoff doubles after each failed attempt.
pub async fn retry_read<T, F, Fut>(policy: RetryPolicy, mut read: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut delay = policy.backoff;
    let mut attempt = 1;

    loop {
        match read().await {
            Err(AppError::BackendUnavailable(e)) if attempt < policy.attempts => {
                warn!("Read failed, attempt {attempt}/{}: {e}", policy.attempts);

                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Signed-in user as forwarded by the identity proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub email: String,
}

impl Identity {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let uid = header(headers, USER_ID_HEADER).ok_or(AppError::Unauthorized)?;

        Ok(Self {
            display_name: header(headers, USER_NAME_HEADER).unwrap_or_else(|| uid.clone()),
            email: header(headers, USER_EMAIL_HEADER).unwrap_or_default(),
            uid,
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Identity::from_headers(&parts.headers)
    }
}

/// Caller holding the admin key.
#[derive(Clone, Copy, Debug)]
pub struct Operator;

impl<S: Store> FromRequestParts<Arc<AppState<S>>> for Operator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match (token, state.config.admin_key.as_deref()) {
            (Some(token), Some(key)) if token == key => Ok(Operator),
            _ => Err(AppError::Unauthorized),
        }
    }
}
