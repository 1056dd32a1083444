mod admin;
mod auth;
mod health_check;
mod users;

pub use admin::{get_user, set_role};
pub use auth::{
    check_recovery_token, login, logout, recover_password, refresh, register, reset_password,
    session, verify_email,
};
pub use health_check::health_check;
pub use users::{change_password, current_user, delete_account};
