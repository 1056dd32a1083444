use actix_web::dev::Server;
use actix_web::{error::InternalError, middleware::Logger, web, App, HttpResponse, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthService, TokenValidator};
use crate::configuration::Settings;
use crate::email_client::EmailSender;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    change_password, check_recovery_token, current_user, delete_account, get_user, health_check,
    login, logout, recover_password, refresh, register, reset_password, session, set_role,
    verify_email,
};
use crate::store::CredentialStore;

/// Access log line. `%U` is the path only: query strings can carry tokens.
const ACCESS_LOG_FORMAT: &str = r#"%a "%U" %s %b %T"#;

/// Turn extractor failures (bad JSON, bad query, bad path) into 400 envelopes
fn bad_request<E: std::fmt::Display>(err: E) -> actix_web::Error {
    let app_error = AppError::Validation(ValidationError::MalformedBody(err.to_string()));
    let response = HttpResponse::from_error(app_error);
    InternalError::from_response(err.to_string(), response).into()
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn CredentialStore>,
    email_sender: Arc<dyn EmailSender>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let auth_service = AuthService::new(Arc::clone(&store), email_sender, &settings);
    let validator = TokenValidator::new(
        store,
        auth_service.issuer().clone(),
        settings.timeouts.token_version,
    );
    let auth_service = web::Data::new(auth_service);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::new(ACCESS_LOG_FORMAT))
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(auth_service.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _| bad_request(err)))
            .app_data(web::QueryConfig::default().error_handler(|err, _| bad_request(err)))
            .app_data(web::PathConfig::default().error_handler(|err, _| bad_request(err)))

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/verify-email", web::get().to(verify_email))
                    .route("/recover-password", web::post().to(recover_password))
                    .service(
                        web::resource("/reset-password")
                            .route(web::get().to(check_recovery_token))
                            .route(web::post().to(reset_password)),
                    )
                    .service(
                        web::resource("/session")
                            .wrap(JwtMiddleware::optional(validator.clone()))
                            .route(web::get().to(session)),
                    ),
            )

            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::required(validator.clone()))
                    .route("/auth/logout", web::post().to(logout))
                    .service(
                        web::resource("/users/me")
                            .route(web::get().to(current_user))
                            .route(web::delete().to(delete_account)),
                    )
                    .route("/users/me/password", web::put().to(change_password))
                    .route("/admin/users/{id}", web::get().to(get_user))
                    .route("/admin/users/{id}/role", web::put().to(set_role)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
