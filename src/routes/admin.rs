use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::auth::{AuthService, Principal, SetRoleRequest};
use crate::error::AppError;
use crate::models::Role;
use crate::response::ApiResponse;

/// GET /api/admin/users/{id}
pub async fn get_user(
    principal: Principal,
    path: web::Path<Uuid>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    principal.require_role(Role::Admin)?;

    let profile = auth.profile(path.into_inner()).await?;
    Ok(ApiResponse::ok("User retrieved", profile))
}

/// PUT /api/admin/users/{id}/role
pub async fn set_role(
    principal: Principal,
    path: web::Path<Uuid>,
    body: web::Json<SetRoleRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    principal.require_role(Role::Admin)?;

    let role: Role = body.role.parse()?;
    let user_id = path.into_inner();
    let profile = auth.set_role(user_id, role).await?;

    tracing::info!(
        admin_id = %principal.user_id,
        user_id = %user_id,
        role = %role,
        "Admin changed user role"
    );

    Ok(ApiResponse::ok("Role updated", profile))
}
