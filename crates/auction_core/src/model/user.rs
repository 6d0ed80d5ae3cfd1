//! User domain model.
//!
//! # Invariants
//! - `name` is never blank.
//! - `email` has a `local@domain` shape. It is not unique across users.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid email regex"));

/// Stable identifier of a user.
pub type UserId = Uuid;

/// Validation errors for user invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    BlankName,
    InvalidEmail(String),
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "user name must not be blank"),
            Self::InvalidEmail(email) => write!(f, "invalid user email `{email}`"),
        }
    }
}

impl Error for UserValidationError {}

/// A person who owns auctions and places bids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl User {
    /// Creates a user with a generated id.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name, email)
    }

    /// Creates a user with a caller-provided id.
    pub fn with_id(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn validate(&self) -> Result<(), UserValidationError> {
        if self.name.trim().is_empty() {
            return Err(UserValidationError::BlankName);
        }
        if !EMAIL_RE.is_match(&self.email) {
            return Err(UserValidationError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{User, UserValidationError};

    #[test]
    fn accepts_plain_addresses() {
        assert!(User::new("Joao da Silva", "joao@dasilva.com.br")
            .validate()
            .is_ok());
        assert!(User::new("David", "x@x.com").validate().is_ok());
    }

    #[test]
    fn rejects_blank_name_and_malformed_email() {
        assert_eq!(
            User::new("   ", "x@x.com").validate(),
            Err(UserValidationError::BlankName)
        );
        assert!(matches!(
            User::new("David", "david at x.com").validate(),
            Err(UserValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            User::new("David", "@x.com").validate(),
            Err(UserValidationError::InvalidEmail(_))
        ));
    }
}
