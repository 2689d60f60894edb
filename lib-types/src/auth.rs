//! Caller identity
//!
//! Session issuance and signature checks live in the transport layer. The core
//! only sees the outcome: an anonymous caller or an [`AuthenticatedUser`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::UserId;

/// A user whose session has already been verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    user_id: UserId,
}

impl AuthenticatedUser {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Identity attached to an incoming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(AuthenticatedUser),
}

/// Rejection for operations that need an authenticated user
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unauthorized: operation requires an authenticated user")]
pub struct Unauthorized;

impl Caller {
    /// Caller for an already verified user id
    pub fn user(user_id: UserId) -> Self {
        Caller::User(AuthenticatedUser::new(user_id))
    }

    /// Require an authenticated user
    pub fn require(&self) -> Result<AuthenticatedUser, Unauthorized> {
        match self {
            Caller::User(user) => Ok(*user),
            Caller::Anonymous => Err(Unauthorized),
        }
    }
}

impl From<AuthenticatedUser> for Caller {
    fn from(user: AuthenticatedUser) -> Self {
        Caller::User(user)
    }
}
