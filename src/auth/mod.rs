/// Authentication module
///
/// Password hashing, token issuance and validation, refresh rotation,
/// emailed token redemption and the service that ties them together.

mod claims;
mod email_tokens;
mod jwt;
mod password;
mod principal;
mod refresh_token;
mod service;
mod validator;

pub use claims::{AccessClaims, EmailTokenClaims, EmailTokenPurpose, RefreshClaims};
pub use email_tokens::{RecoverPasswordRequest, ResetPasswordRequest};
pub use jwt::TokenIssuer;
pub use password::{validate_password_strength, PasswordHasher};
pub use principal::Principal;
pub use service::{
    AuthService, ChangePasswordRequest, LoginRequest, RegisterRequest, RegisteredUser,
    SetRoleRequest, TokenPair,
};
pub use validator::TokenValidator;
