use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;

/// Account role, stored as the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Passenger,
    Rider,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Passenger => "passenger",
            Role::Rider => "rider",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-specific part of an account. A passenger owns a permanent
/// one-time code, a rider owns a driving license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum UserKind {
    Passenger {
        #[serde(rename = "otp")]
        one_time_code: i32,
    },
    Rider {
        license: String,
    },
}

impl UserKind {
    pub fn role(&self) -> Role {
        match self {
            UserKind::Passenger { .. } => Role::Passenger,
            UserKind::Rider { .. } => Role::Rider,
        }
    }

    pub fn one_time_code(&self) -> Option<i32> {
        match self {
            UserKind::Passenger { one_time_code } => Some(*one_time_code),
            UserKind::Rider { .. } => None,
        }
    }

    pub fn license(&self) -> Option<&str> {
        match self {
            UserKind::Rider { license } => Some(license),
            UserKind::Passenger { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String, // Argon2 hash, never serialized
    pub kind: UserKind,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn role(&self) -> Role {
        self.kind.role()
    }
}

/// Flat `users` row as stored in Postgres.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: Role,
    pub license: Option<String>,
    pub otp: Option<i32>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let kind = match (r.role, r.otp, r.license) {
            (Role::Passenger, Some(one_time_code), None) => UserKind::Passenger { one_time_code },
            (Role::Rider, None, Some(license)) => UserKind::Rider { license },
            (role, _, _) => {
                return Err(StoreError::Corrupt(format!(
                    "user {} has fields inconsistent with role {role}",
                    r.id
                )))
            }
        };
        Ok(User {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            password_hash: r.password_hash,
            kind,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Account ready to be inserted; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub kind: UserKind,
}

/// Fields a profile update may touch. `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub license: Option<String>,
}

/// Account as returned to clients, without the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(flatten)]
    pub kind: UserKind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            phone: u.phone,
            kind: u.kind,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
