use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::auth::{
    dto::RegisterRequest,
    password::{hash_secret, validate_password, verify_dummy, verify_secret},
    repo::CredentialStore,
    repo_types::{NewUser, User},
};
use crate::error::{bounded, AppError, AppResult};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{field} is required."))),
    }
}

/// Like `required`, but keeps the value verbatim; whitespace in secrets is
/// significant.
pub(crate) fn required_secret(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required.")))
}

/// Registration and credential checks.
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    io_timeout: std::time::Duration,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>, io_timeout: std::time::Duration) -> Self {
        Self { store, io_timeout }
    }

    #[instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> AppResult<User> {
        let name = required(req.name, "name")?;
        let surname = required(req.surname, "surname")?;
        let user_name = required(req.user_name, "userName")?;
        let email = normalize_email(&required(req.email, "email")?);
        let password = required_secret(req.password, "password")?;

        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::Validation("Invalid email.".into()));
        }
        validate_password(&password)?;

        let password_hash = hash_secret(&password)?;
        let created = bounded(
            self.io_timeout,
            self.store.create_user(NewUser {
                email,
                user_name,
                password_hash,
                name,
                surname,
                birth_date: req.birth_date,
            }),
        )
        .await?;

        let user = created.ok_or_else(|| {
            warn!("email already registered");
            AppError::Conflict("Email already exists.".into())
        })?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Unknown email and wrong password are indistinguishable to the caller.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(AppError::Validation("Invalid email.".into()));
        }

        let Some(user) = bounded(self.io_timeout, self.store.find_user_by_email(&email)).await?
        else {
            verify_dummy(password);
            warn!("login with unknown email");
            return Err(AppError::Unauthorized);
        };

        if !verify_secret(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login with invalid password");
            return Err(AppError::Unauthorized);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }
}
