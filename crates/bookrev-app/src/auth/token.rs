use std::{
    collections::HashSet,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::{FromRequestParts, Request},
    response::{IntoResponse as _, Response},
};
use bookrev_types::claim::{ApiClaim, Authorization as _, Role};
use futures::future::BoxFuture;
use headers::{authorization::Bearer, Authorization, HeaderMapExt as _};
use http::request::Parts;
use tower::{Layer, Service};
use tracing::debug;

/// Claim of the authenticated caller, as validated by [`TokenLayer`]
impl FromRequestParts<AppState> for ApiClaim {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ApiClaim>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Numeric id of the calling user
pub fn caller_id(claim: &ApiClaim) -> ApiResult<i64> {
    claim.user_id().ok_or_else(|| {
        debug!("Token subject {} is not user id", claim.sub);
        ApiError::Unauthorized
    })
}

/// Validates bearer token, if present, and makes its claim available to handlers.
/// Requests without token pass through, requests with invalid token are rejected.
#[derive(Clone)]
pub struct TokenLayer {
    state: AppState,
}

impl TokenLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for TokenLayer {
    type Service = TokenService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenService {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TokenService<S> {
    inner: S,
    state: AppState,
}

impl<S> Service<Request> for TokenService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        if let Some(Authorization(bearer)) = req.headers().typed_get::<Authorization<Bearer>>() {
            match self.state.tokens().validate::<ApiClaim>(bearer.token()) {
                Ok(claim) => {
                    req.extensions_mut().insert(claim);
                }
                Err(e) => {
                    debug!("Invalid token: {e}");
                    let response = ApiError::Unauthorized.into_response();
                    return Box::pin(async move { Ok(response) });
                }
            }
        }
        Box::pin(self.inner.call(req))
    }
}

/// Lets through only callers having at least one of given roles
#[derive(Clone)]
pub struct RequiredRolesLayer {
    roles: Arc<HashSet<Role>>,
}

impl RequiredRolesLayer {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: Arc::new(roles.into_iter().collect()),
        }
    }
}

impl<S> Layer<S> for RequiredRolesLayer {
    type Service = RequiredRoles<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequiredRoles {
            inner,
            roles: self.roles.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequiredRoles<S> {
    inner: S,
    roles: Arc<HashSet<Role>>,
}

impl<S> Service<Request> for RequiredRoles<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let rejection = match req.extensions().get::<ApiClaim>() {
            None => Some(ApiError::Unauthorized),
            Some(claim) if !claim.has_any_role(self.roles.iter()) => {
                debug!("User {} lacks required roles {:?}", claim.sub, self.roles);
                Some(ApiError::Forbidden("Insufficient privileges".to_string()))
            }
            Some(_) => None,
        };
        match rejection {
            Some(error) => {
                let response = error.into_response();
                Box::pin(async move { Ok(response) })
            }
            None => Box::pin(self.inner.call(req)),
        }
    }
}
