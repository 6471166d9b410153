use uuid::Uuid;

use crate::users::repo_types::{normalize_email, Role, User};

/// Every read-style operation a store exposes. Each one is scoped by
/// [`UserFilter::visibility_applies`] before it touches data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOp {
    FindOne,
    FindMany,
    Count,
    UpdateMany,
}

impl ReadOp {
    pub const ALL: [ReadOp; 4] = [
        ReadOp::FindOne,
        ReadOp::FindMany,
        ReadOp::Count,
        ReadOp::UpdateMany,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReadOp::FindOne => "find_one",
            ReadOp::FindMany => "find_many",
            ReadOp::Count => "count",
            ReadOp::UpdateMany => "update_many",
        }
    }
}

/// Selection criteria for user reads. Inactive accounts are excluded unless
/// [`UserFilter::including_inactive`] was called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    id: Option<Uuid>,
    email: Option<String>,
    reset_token: Option<String>,
    role: Option<Role>,
    include_inactive: bool,
    select_password: bool,
}

impl UserFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_email(email: &str) -> Self {
        Self {
            email: Some(normalize_email(email)),
            ..Self::default()
        }
    }

    /// Matches on the stored reset-token digest, not the plaintext.
    pub fn by_reset_token(digest: impl Into<String>) -> Self {
        Self {
            reset_token: Some(digest.into()),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn including_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }

    /// Loads the password hash, which reads leave out otherwise.
    pub fn with_password(mut self) -> Self {
        self.select_password = true;
        self
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn reset_token(&self) -> Option<&str> {
        self.reset_token.as_deref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn selects_password(&self) -> bool {
        self.select_password
    }

    /// Whether `op` must add the `active != false` condition.
    pub fn visibility_applies(&self, op: ReadOp) -> bool {
        match op {
            ReadOp::FindOne | ReadOp::FindMany | ReadOp::Count | ReadOp::UpdateMany => {
                !self.include_inactive
            }
        }
    }

    /// In-process evaluation, used by the memory store.
    pub fn matches(&self, op: ReadOp, user: &User) -> bool {
        if self.visibility_applies(op) && !user.active {
            return false;
        }
        self.id.map_or(true, |id| user.id == id)
            && self.email.as_deref().map_or(true, |e| user.email == e)
            && self
                .reset_token
                .as_deref()
                .map_or(true, |t| user.password_reset_token.as_deref() == Some(t))
            && self.role.map_or(true, |r| user.role == r)
    }
}

/// Field changes applied by `update_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub active: Option<bool>,
    pub role: Option<Role>,
}

impl UserPatch {
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.role.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(active) = self.active {
            user.active = active;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::NewUser;
    use time::OffsetDateTime;

    fn user(active: bool) -> User {
        let mut u = User::from_new(
            NewUser {
                email: "Bo@Example.com".into(),
                ..Default::default()
            },
            OffsetDateTime::now_utc(),
        );
        u.active = active;
        u
    }

    #[test]
    fn default_filter_hides_inactive_for_every_read_op() {
        let inactive = user(false);
        for op in ReadOp::ALL {
            assert!(UserFilter::all().visibility_applies(op), "{}", op.as_str());
            assert!(!UserFilter::all().matches(op, &inactive), "{}", op.as_str());
        }
    }

    #[test]
    fn explicit_override_sees_inactive() {
        let inactive = user(false);
        let filter = UserFilter::all().including_inactive();
        for op in ReadOp::ALL {
            assert!(filter.matches(op, &inactive));
        }
    }

    #[test]
    fn email_filter_is_case_insensitive() {
        let u = user(true);
        assert!(UserFilter::by_email(" BO@example.COM").matches(ReadOp::FindOne, &u));
        assert!(!UserFilter::by_email("other@example.com").matches(ReadOp::FindOne, &u));
    }

    #[test]
    fn password_is_not_selected_by_default() {
        assert!(!UserFilter::all().selects_password());
        assert!(UserFilter::all().with_password().selects_password());
    }

    #[test]
    fn reset_token_filter_requires_a_stored_digest() {
        let mut u = user(true);
        assert!(!UserFilter::by_reset_token("abc").matches(ReadOp::FindOne, &u));
        u.password_reset_token = Some("abc".into());
        assert!(UserFilter::by_reset_token("abc").matches(ReadOp::FindOne, &u));
    }
}
