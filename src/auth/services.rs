//! Identity operations: registration, authentication and profile updates.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{RegisterRequest, UpdateUserRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
        repo::UserStore,
        repo_types::{NewUser, ProfileChanges, Role, User, UserKind},
    },
    error::{AppError, AppResult, StoreError, UniqueField},
    otp,
    state::AppState,
};

/// Upper bound on draws when allocating a passenger's one-time code.
pub const MAX_CODE_ATTEMPTS: usize = 50;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref LICENSE_RE: Regex = Regex::new(r"^[A-Za-z0-9-]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_license(license: &str) -> bool {
    LICENSE_RE.is_match(license)
}

/// Trimmed, non-empty value or `None`.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, message: &str) -> AppResult<String> {
    present(value).ok_or_else(|| AppError::validation(message))
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password is required with 6 characters",
        ));
    }
    Ok(())
}

fn check_license(license: &str) -> AppResult<()> {
    if !is_valid_license(license) {
        return Err(AppError::validation(
            "Please enter a valid driving license number",
        ));
    }
    Ok(())
}

pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<User> {
    let name = required(req.name, "name is required")?;
    let email = required(req.email, "email is required")?.to_lowercase();
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    let phone = required(req.phone, "phone number is required")?;
    let password = req
        .password
        .ok_or_else(|| AppError::validation("password is required with 6 characters"))?;
    check_password(&password)?;
    let role = req.role.unwrap_or(Role::Passenger);
    let license = match role {
        Role::Rider => {
            let license = required(req.license, "license is required for riders")?;
            check_license(&license)?;
            Some(license)
        }
        Role::Passenger => None,
    };

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::conflict("email already exists"));
    }

    let password_hash = hash_password(&password)?;
    let id = Uuid::new_v4();
    let make = |kind: UserKind| NewUser {
        id,
        name: name.clone(),
        email: email.clone(),
        phone: phone.clone(),
        password_hash: password_hash.clone(),
        kind,
    };

    let user = match license {
        Some(license) => state.users.create(make(UserKind::Rider { license })).await?,
        None => {
            create_with_unique_code(state.users.as_ref(), MAX_CODE_ATTEMPTS, otp::generate, |code| {
                make(UserKind::Passenger { one_time_code: code })
            })
            .await?
        }
    };

    info!(user_id = %user.id, email = %user.email, role = %user.role(), "user registered");
    Ok(user)
}

/// Insert a passenger, drawing codes until one is free. A code taken between
/// the check and the insert is caught by the store's unique constraint and
/// redrawn. Fails with `Internal` after `attempts` draws.
pub(crate) async fn create_with_unique_code(
    users: &dyn UserStore,
    attempts: usize,
    mut next_code: impl FnMut() -> i32,
    make: impl Fn(i32) -> NewUser,
) -> AppResult<User> {
    for attempt in 1..=attempts {
        let code = next_code();
        if users.code_taken(code).await? {
            debug!(attempt, "one-time code collision");
            continue;
        }
        match users.create(make(code)).await {
            Err(StoreError::Duplicate(UniqueField::OneTimeCode)) => {
                debug!(attempt, "one-time code taken concurrently");
            }
            other => return other.map_err(Into::into),
        }
    }
    error!(attempts, "could not allocate a unique one-time code");
    Err(AppError::Internal(anyhow::anyhow!(
        "no unique one-time code after {attempts} attempts"
    )))
}

/// Check credentials and issue a signed token.
pub async fn authenticate(
    state: &AppState,
    email: Option<String>,
    password: Option<String>,
) -> AppResult<(String, User)> {
    let (Some(email), Some(password)) = (present(email), password) else {
        return Err(AppError::validation("Please provide email and password"));
    };
    let email = email.to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::not_found("User Not Found"));
    };

    if !verify_password(&password, &user.password_hash)? {
        warn!(%email, user_id = %user.id, "login invalid password");
        return Err(AppError::auth("Invalid email or password"));
    }

    let token = JwtKeys::from(&state.config.jwt).sign(user.id, user.role())?;
    info!(user_id = %user.id, "user logged in");
    Ok((token, user))
}

/// Update name, password and (for riders) license. Nothing is written when
/// any supplied field is invalid.
pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateUserRequest,
) -> AppResult<User> {
    if let Some(password) = &req.password {
        check_password(password)?;
    }

    let Some(user) = state.users.find_by_id(user_id).await? else {
        return Err(AppError::not_found("User Not Found"));
    };

    let license = match user.role() {
        Role::Rider => present(req.license),
        Role::Passenger => None,
    };
    if let Some(license) = &license {
        check_license(license)?;
    }

    let password_hash = req.password.as_deref().map(hash_password).transpose()?;
    let changes = ProfileChanges {
        name: present(req.name),
        password_hash,
        license,
    };

    let updated = state
        .users
        .update_profile(user_id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("User Not Found"))?;
    info!(user_id = %updated.id, "profile updated");
    Ok(updated)
}
