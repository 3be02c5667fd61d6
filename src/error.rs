use thiserror::Error;

use crate::identity::Role;

#[derive(Error, Debug)]
pub enum FogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Identity already resolved")]
    IdentityAlreadyResolved,

    #[error("Role {0} cannot assign its own identity")]
    NotAuthoritative(Role),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FogError>;
