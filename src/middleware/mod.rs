/// Middleware module
///
/// Bearer-token authentication for protected and optionally
/// authenticated scopes.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
