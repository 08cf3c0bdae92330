use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use serde::Serialize;

use crate::models::{DatabaseID, PasswordHash};

/// A user of the application. Each user owns zero or more expenses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    id: DatabaseID,
    username: String,
    email: EmailAddress,
    // The hash must never leave the server, so it is excluded from JSON.
    #[serde(skip_serializing)]
    password_hash: PasswordHash,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: DatabaseID,
        username: String,
        email: EmailAddress,
        password_hash: PasswordHash,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            username,
            email,
            password_hash,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> DatabaseID {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// The data for creating a new user.
///
/// The id is assigned at insertion time, and both timestamps start out as
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: EmailAddress,
    pub password_hash: PasswordHash,
    pub created_at: DateTime<Utc>,
}
