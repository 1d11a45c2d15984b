//! User registration, sign-in and saved shipping addresses.

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use common::{DirectionId, Role, UserId};
use serde::Deserialize;
use store::{Direction, DirectionPatch, NewDirection, NewUser, User, UserPatch, UserStore};

use crate::error::DomainError;
use crate::services::{Mailer, welcome_email};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Name given to a direction saved without one.
pub const DEFAULT_DIRECTION_NAME: &str = "desdeSesion";

/// Registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct Signup {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    /// Only `retail` is accepted; other tiers are assigned by an admin.
    #[serde(default)]
    pub role: Option<Role>,
}

/// A shipping address as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectionInput {
    #[serde(default)]
    pub name: Option<String>,
    pub street: String,
    pub city: String,
    pub province: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Hashes a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, DomainError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DomainError::PasswordHash(e.to_string()))
}

/// Checks a password against a stored PHC hash string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, DomainError> {
    let parsed = PasswordHash::new(hash).map_err(|e| DomainError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Lower-cases and sanity-checks an email address.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation(format!("invalid email: {email}")));
    }
    Ok(email)
}

/// Users and their directions.
#[derive(Clone)]
pub struct UserService<S: UserStore> {
    store: S,
    mailer: Arc<dyn Mailer>,
}

impl<S: UserStore> UserService<S> {
    pub fn new(store: S, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Registers a user and sends a welcome email.
    ///
    /// New accounts are always retail. A failed welcome email is logged and
    /// does not undo the registration.
    #[tracing::instrument(skip(self, signup), fields(email = %signup.email))]
    pub async fn signup(&self, signup: Signup) -> Result<User, DomainError> {
        let email = normalize_email(&signup.email)?;
        if signup.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if signup.name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        if let Some(role) = signup.role
            && role != Role::Retail
        {
            return Err(DomainError::validation(format!(
                "role {role} can only be assigned by an admin"
            )));
        }

        let user = self
            .store
            .insert_user(NewUser {
                email,
                password_hash: hash_password(&signup.password)?,
                name: signup.name.trim().to_string(),
                phone: signup.phone,
                role: Role::Retail,
            })
            .await?;
        metrics::counter!("users_registered_total", "role" => user.role.as_str()).increment(1);

        match welcome_email(&user) {
            Ok(email) => {
                if let Err(e) = self.mailer.send(email).await {
                    tracing::warn!(user_id = %user.id, error = %e, "failed to send welcome email");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to render welcome email"),
        }

        Ok(user)
    }

    /// Authenticates by email and password.
    ///
    /// Unknown emails and wrong passwords fail identically.
    #[tracing::instrument(skip(self, password))]
    pub async fn signin(&self, email: &str, password: &str) -> Result<User, DomainError> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(DomainError::InvalidCredentials);
        };
        if !verify_password(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "wrong password");
            return Err(DomainError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Lists every non-admin user, newest first.
    pub async fn list(&self) -> Result<Vec<User>, DomainError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn get(&self, id: UserId) -> Result<User, DomainError> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| DomainError::not_found("User", id))
    }

    pub async fn update(&self, id: UserId, patch: UserPatch) -> Result<User, DomainError> {
        if let Some(name) = &patch.name
            && name.trim().is_empty()
        {
            return Err(DomainError::validation("name must not be empty"));
        }
        Ok(self.store.update_user(id, patch).await?)
    }

    // -- Directions --

    pub async fn create_direction(
        &self,
        user_id: UserId,
        input: DirectionInput,
    ) -> Result<Direction, DomainError> {
        for (field, value) in [
            ("street", &input.street),
            ("city", &input.city),
            ("province", &input.province),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("{field} must not be empty")));
            }
        }
        let name = input
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIRECTION_NAME.to_string());
        Ok(self
            .store
            .insert_direction(NewDirection {
                user_id,
                name,
                street: input.street,
                city: input.city,
                province: input.province,
                postal_code: input.postal_code,
                phone: input.phone,
            })
            .await?)
    }

    pub async fn list_directions(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<Direction>, DomainError> {
        Ok(self.store.list_directions(owner).await?)
    }

    pub async fn get_direction(&self, id: DirectionId) -> Result<Direction, DomainError> {
        self.store
            .get_direction(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Direction", id))
    }

    pub async fn update_direction(
        &self,
        id: DirectionId,
        patch: DirectionPatch,
    ) -> Result<Direction, DomainError> {
        Ok(self.store.update_direction(id, patch).await?)
    }

    pub async fn delete_direction(&self, id: DirectionId) -> Result<(), DomainError> {
        Ok(self.store.delete_direction(id).await?)
    }
}
