use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AccountResult, ValidationErrors};
use crate::users::repo_types::{PasswordInput, User};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_password(input: &PasswordInput, errs: &mut ValidationErrors) {
    if input.password.is_empty() {
        errs.add("password", "Password is required");
    } else if input.password.chars().count() < MIN_PASSWORD_LEN {
        errs.add(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }

    if input.password_confirm.is_empty() {
        errs.add("passwordConfirm", "Password confirmation is required");
    } else if input.password_confirm != input.password {
        errs.add("passwordConfirm", "Passwords do not match");
    }
}

/// Checks everything a write of `user` must satisfy, including a staged password.
pub fn validate_user(user: &User) -> AccountResult<()> {
    let mut errs = ValidationErrors::default();

    if user.name.trim().is_empty() {
        errs.add("name", "Name is required");
    }
    if user.last_name.trim().is_empty() {
        errs.add("lastName", "Last name is required");
    }
    if user.email.is_empty() {
        errs.add("email", "Email is required");
    } else if !is_valid_email(&user.email) {
        errs.add("email", "Invalid email");
    }
    if let Some(input) = user.pending_password() {
        check_password(input, &mut errs);
    } else if user.is_new() && user.password.is_none() {
        errs.add("password", "Password is required");
    }

    errs.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccountError;
    use crate::users::repo_types::NewUser;
    use time::OffsetDateTime;

    fn user_with(password: &str, confirm: &str) -> User {
        User::from_new(
            NewUser {
                name: "Ana".into(),
                last_name: "Ruiz".into(),
                email: "ana@example.com".into(),
                password: password.into(),
                password_confirm: confirm.into(),
                ..Default::default()
            },
            OffsetDateTime::now_utc(),
        )
    }

    fn field_errors(res: AccountResult<()>) -> ValidationErrors {
        match res {
            Err(AccountError::Validation(errs)) => errs,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn email_regex() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@b"));
    }

    #[test]
    fn accepts_matching_passwords() {
        assert!(validate_user(&user_with("Secret123", "Secret123")).is_ok());
    }

    #[test]
    fn rejects_mismatched_confirmation() {
        let errs = field_errors(validate_user(&user_with("Secret123", "Mismatch1")));
        assert_eq!(errs.get("passwordConfirm"), Some("Passwords do not match"));
        assert!(errs.get("password").is_none());
    }

    #[test]
    fn rejects_short_password() {
        let errs = field_errors(validate_user(&user_with("short", "short")));
        assert!(errs.get("password").unwrap().contains("at least 8"));
    }

    #[test]
    fn reports_every_missing_field() {
        let user = User::from_new(NewUser::default(), OffsetDateTime::now_utc());
        let errs = field_errors(validate_user(&user));
        for field in ["name", "lastName", "email", "password", "passwordConfirm"] {
            assert!(errs.get(field).is_some(), "missing error for {field}");
        }
    }

    #[test]
    fn rejects_malformed_email() {
        let mut user = user_with("Secret123", "Secret123");
        user.email = "nope".into();
        let errs = field_errors(validate_user(&user));
        assert_eq!(errs.get("email"), Some("Invalid email"));
    }
}
