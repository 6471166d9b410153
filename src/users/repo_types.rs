use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Raw password plus its confirmation, as submitted. Never persisted.
#[derive(Clone, Deserialize)]
pub struct PasswordInput {
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "passwordConfirm")]
    pub password_confirm: String,
}

impl PasswordInput {
    pub fn new(password: impl Into<String>, password_confirm: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            password_confirm: password_confirm.into(),
        }
    }
}

impl fmt::Debug for PasswordInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordInput(..)")
    }
}

/// Registration input.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub career: Option<String>,
    pub semester: Option<i32>,
    pub photo: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// User record as the services see it.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub career: Option<String>,
    pub semester: Option<i32>,
    pub photo: Option<String>,
    pub role: Role,
    /// Argon2 PHC string; `None` when the read did not select it.
    pub password: Option<String>,
    pub active: bool,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    /// Bumped by every stored write; an update must present the current value.
    pub version: i64,
    pending_password: Option<PasswordInput>,
    is_new: bool,
}

impl User {
    /// Builds an unsaved record with the submitted password staged.
    pub fn from_new(input: NewUser, now: OffsetDateTime) -> Self {
        let NewUser {
            name,
            last_name,
            email,
            career,
            semester,
            photo,
            password,
            password_confirm,
        } = input;
        Self {
            id: Uuid::new_v4(),
            name,
            last_name,
            email: normalize_email(&email),
            career,
            semester,
            photo,
            role: Role::default(),
            password: None,
            active: true,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: now,
            version: 0,
            pending_password: Some(PasswordInput::new(password, password_confirm)),
            is_new: true,
        }
    }

    /// Stages a new raw password for the next write.
    pub fn set_password(&mut self, input: PasswordInput) {
        self.pending_password = Some(input);
    }

    /// True when the next write must hash a new credential.
    pub fn password_is_modified(&self) -> bool {
        self.pending_password.is_some()
    }

    pub fn pending_password(&self) -> Option<&PasswordInput> {
        self.pending_password.as_ref()
    }

    /// Drops the staged raw password and its confirmation.
    pub(crate) fn clear_pending_password(&mut self) {
        self.pending_password = None;
    }

    /// True until the record has been inserted.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.is_new = false;
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub career: Option<String>,
    pub semester: Option<i32>,
    pub photo: Option<String>,
    pub role: String,
    pub password: Option<String>,
    pub active: bool,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub version: i64,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            last_name: r.last_name,
            email: r.email,
            career: r.career,
            semester: r.semester,
            photo: r.photo,
            role: r.role.parse()?,
            password: r.password,
            active: r.active,
            password_changed_at: r.password_changed_at,
            password_reset_token: r.password_reset_token,
            password_reset_expires: r.password_reset_expires,
            created_at: r.created_at,
            version: r.version,
            pending_password: None,
            is_new: false,
        })
    }
}
