/// Authentication Routes
///
/// Registration, login, token refresh, email verification, password
/// recovery and the optional session lookup. Handlers only translate HTTP to
/// `AuthService` calls; every rule lives in the service.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{
    AuthService, LoginRequest, Principal, RecoverPasswordRequest, RegisterRequest,
    ResetPasswordRequest,
};
use crate::error::AppError;
use crate::response::ApiResponse;

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct RecoveryTokenStatus {
    pub token_valid: bool,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Principal>,
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid username/email or weak password
/// - 409: email or username already registered
/// - 503: timed out
pub async fn register(
    body: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let registered = auth.register(body.into_inner()).await?;
    Ok(ApiResponse::created(
        "Registration successful, check your email to confirm your address",
        registered,
    ))
}

/// POST /auth/login
///
/// # Errors
/// - 401: invalid credentials or unconfirmed email
/// - 503: timed out
pub async fn login(
    body: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.login(body.into_inner()).await?;
    tracing::info!(user_id = %pair.user_id, "Tokens issued");

    Ok(ApiResponse::ok("Login successful", pair))
}

/// POST /auth/refresh
///
/// The presented refresh token is single use.
pub async fn refresh(
    body: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let pair = auth.refresh(&body.refresh_token).await?;
    Ok(ApiResponse::ok("Token refreshed", pair))
}

/// GET /auth/verify-email?token=...
pub async fn verify_email(
    query: web::Query<TokenQuery>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.verify_email(&query.token).await?;
    Ok(ApiResponse::message("Email address confirmed"))
}

/// POST /auth/recover-password
///
/// Same answer for known and unknown addresses.
pub async fn recover_password(
    body: web::Json<RecoverPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.recover_password(body.into_inner()).await?;
    Ok(ApiResponse::message(
        "If the address is registered, a recovery email is on its way",
    ))
}

/// GET /auth/reset-password?token=...
///
/// Target of the recovery email link. Reports whether the token can still
/// be redeemed; the new password is submitted with POST.
pub async fn check_recovery_token(
    query: web::Query<TokenQuery>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.check_recovery_token(&query.token).await?;
    Ok(ApiResponse::ok(
        "Recovery token is valid, submit a new password",
        RecoveryTokenStatus { token_valid: true },
    ))
}

/// POST /auth/reset-password
pub async fn reset_password(
    body: web::Json<ResetPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.reset_password(body.into_inner()).await?;
    Ok(ApiResponse::message("Password has been reset, please log in again"))
}

/// GET /auth/session (optional authentication)
pub async fn session(principal: Option<Principal>) -> HttpResponse {
    let response = SessionResponse {
        authenticated: principal.is_some(),
        user: principal,
    };
    ApiResponse::ok("Session state", response)
}

/// POST /api/auth/logout
///
/// Bumps the token version, so every token the caller holds dies.
pub async fn logout(
    principal: Principal,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.logout(&principal).await?;
    Ok(ApiResponse::message("Logged out"))
}
