use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use serde::Serialize;
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::auth::claims::AccessClaims;
use crate::error::{AppError, AuthError};
use crate::models::{EmailValidationStatus, Role};

/// Authenticated caller, attached to the request by `JwtMiddleware`.
///
/// Handlers take `Principal` for protected routes (401 when absent) or
/// `Option<Principal>` behind the optional middleware.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub email_validation_status: EmailValidationStatus,
}

impl Principal {
    /// Role gate. Admins pass every gate; users only the `User` gate.
    pub fn require_role(&self, required: Role) -> Result<(), AppError> {
        match (required, self.role) {
            (Role::User, _) | (Role::Admin, Role::Admin) => Ok(()),
            (Role::Admin, Role::User) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    required_role = %required,
                    "Role check failed"
                );
                Err(AppError::Auth(AuthError::InsufficientRole))
            }
        }
    }
}

impl TryFrom<AccessClaims> for Principal {
    type Error = AppError;

    fn try_from(claims: AccessClaims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.user_id()?,
            username: claims.username,
            email: claims.email,
            role: claims.role,
            email_validation_status: claims.email_validation_status,
        })
    }
}

impl FromRequest for Principal {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Principal>()
                .cloned()
                .ok_or(AppError::Auth(AuthError::MissingToken)),
        )
    }
}
