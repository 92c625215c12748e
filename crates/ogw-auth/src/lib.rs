//! ogw-auth
//!
//! Token lifecycle and the login gate.
//!
//! A token is valid only while it is the most recent row for its user: any
//! later login supersedes all earlier tokens. Validation re-derives the
//! expected current token for the presented value's user and compares —
//! a mismatch means a newer token exists and the presented one is dead.

mod gate;
mod token;

pub use gate::{login, Credentials};
pub use token::TokenService;

use ogw_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// db, login or password absent from both the request and its headers.
    #[error("either of the following are missing [db, username, password]")]
    MissingCredentials,

    #[error("login, password or db invalid")]
    AccessDenied,

    #[error("{0}")]
    AccessError(String),

    #[error("the database name is not valid: {0}")]
    InvalidDatabase(String),

    /// Session authentication succeeded but produced no user id.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("missing access token in request header")]
    TokenMissing,

    #[error("token seems to have expired or invalid")]
    TokenInvalid,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccessDenied => AuthError::AccessDenied,
            StoreError::AccessError(msg) => AuthError::AccessError(msg),
            StoreError::UnknownDatabase(db) => AuthError::InvalidDatabase(db),
            other => AuthError::Store(other),
        }
    }
}
