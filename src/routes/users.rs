use actix_web::{web, HttpResponse};

use crate::auth::{AuthService, ChangePasswordRequest, Principal};
use crate::error::AppError;
use crate::response::ApiResponse;

/// GET /api/users/me
pub async fn current_user(
    principal: Principal,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let profile = auth.profile(principal.user_id).await?;
    Ok(ApiResponse::ok("User retrieved", profile))
}

/// PUT /api/users/me/password
pub async fn change_password(
    principal: Principal,
    body: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.change_password(&principal, body.into_inner()).await?;
    Ok(ApiResponse::message(
        "Password changed, all sessions have been signed out",
    ))
}

/// DELETE /api/users/me
pub async fn delete_account(principal: Principal) -> Result<HttpResponse, AppError> {
    tracing::info!(user_id = %principal.user_id, "Account deletion requested");
    Err(AppError::NotImplemented("account deletion".to_string()))
}
