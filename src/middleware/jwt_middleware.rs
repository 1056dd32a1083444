/// JWT Authentication Middleware
///
/// Validates the bearer token from the Authorization header and injects the
/// resulting `Principal` into request extensions for route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::TokenValidator;
use crate::error::{AppError, AuthError};

const BEARER_PREFIX: &str = "Bearer ";

/// Authentication gate for a scope.
///
/// `required` rejects anything without a valid token. `optional` lets every
/// request through and only attaches a `Principal` when the token is valid.
pub struct JwtMiddleware {
    validator: TokenValidator,
    required: bool,
}

impl JwtMiddleware {
    pub fn required(validator: TokenValidator) -> Self {
        Self {
            validator,
            required: true,
        }
    }

    pub fn optional(validator: TokenValidator) -> Self {
        Self {
            validator,
            required: false,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            validator: self.validator.clone(),
            required: self.required,
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    validator: TokenValidator,
    required: bool,
}

/// Token from `Authorization: Bearer <token>`; `None` when absent or not Bearer
fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let validator = self.validator.clone();
        let required = self.required;

        Box::pin(async move {
            let token = match bearer_token(&req) {
                Some(token) => token,
                None if required => {
                    tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
                    return Err(AppError::Auth(AuthError::MissingToken).into());
                }
                None => return service.call(req).await,
            };

            match validator.authenticate(&token).await {
                Ok(principal) => {
                    tracing::debug!(
                        user_id = %principal.user_id,
                        role = %principal.role,
                        "JWT validated successfully"
                    );
                    req.extensions_mut().insert(principal);
                }
                Err(e) if required => {
                    tracing::warn!(path = %req.path(), kind = e.kind().code(), "JWT validation failed");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::debug!(kind = e.kind().code(), "Proceeding anonymously");
                }
            }

            service.call(req).await
        })
    }
}
