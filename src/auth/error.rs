use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("No active RTM authorization for user '{user_id}'")]
    #[diagnostic(
        code(rtm_bridge::auth::unauthenticated),
        help("Link the Remember The Milk account again to obtain a fresh token.")
    )]
    Unauthenticated { user_id: String },
}

pub type AuthResult<T> = Result<T, AuthError>;
