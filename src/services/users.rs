//! Authentication and reader management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use validator::Validate;

use crate::{
    config::{AuthConfig, PasswordConfig},
    error::{AppError, AppResult},
    models::{NewUser, ReaderInput, RegisterInput, Role, User, UserClaims},
    repository::{Store, UnitOfWork},
    services::clock::Clock,
};

const TICKET_DIGITS: usize = 8;
const TEMP_PASSWORD_DIGITS: usize = 6;

/// Random string of ASCII digits, leading zeros allowed
fn random_digits(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[derive(Clone)]
pub struct UsersService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    auth: AuthConfig,
    passwords: PasswordConfig,
}

impl UsersService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, auth: AuthConfig, passwords: PasswordConfig) -> Self {
        Self {
            store,
            clock,
            auth,
            passwords,
        }
    }

    /// Exact match on email or ticket number; `None` for an empty identifier
    pub async fn find_user_by_identifier(&self, identifier: &str) -> AppResult<Option<User>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }

        let mut uow = self.store.begin().await?;
        let user = uow.find_user_by_identifier(identifier).await?;
        uow.commit().await?;
        Ok(user)
    }

    pub async fn check_user_exists(&self, email: &str) -> AppResult<bool> {
        let mut uow = self.store.begin().await?;
        let exists = uow.find_user_by_email(email).await?.is_some();
        uow.commit().await?;
        Ok(exists)
    }

    /// Get user by ID
    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        let mut uow = self.store.begin().await?;
        let user = uow.get_user(id).await?;
        uow.commit().await?;
        user.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Register a reader on behalf of staff.
    /// Returns the user and the plaintext temporary password, which is not kept anywhere.
    pub async fn create_reader(&self, input: &ReaderInput) -> AppResult<(User, String)> {
        input.validate().map_err(|e| AppError::Validation(e.to_string()))?;

        let temp_password = random_digits(TEMP_PASSWORD_DIGITS);
        let password_hash = self.hash_password(&temp_password)?;

        let user = self
            .insert_with_ticket(&input.email, &input.full_name, Role::User, password_hash)
            .await?;

        tracing::info!("Users: created reader {} with ticket {:?}", user.id, user.ticket_number);
        Ok((user, temp_password))
    }

    /// Self-service registration
    pub async fn register(&self, input: &RegisterInput) -> AppResult<User> {
        input.validate().map_err(|e| AppError::Validation(e.to_string()))?;

        let password_hash = self.hash_password(&input.password)?;
        let user = self
            .insert_with_ticket(&input.email, &input.full_name, Role::User, password_hash)
            .await?;

        tracing::info!("Users: registered user {}", user.id);
        Ok(user)
    }

    /// Check credentials and issue a JWT. Returns the token and the user.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let invalid = || AppError::Authentication("Invalid email or password".to_string());

        let mut uow = self.store.begin().await?;
        let user = uow.find_user_by_email(email.trim()).await?;
        uow.commit().await?;

        let user = user.ok_or_else(invalid)?;
        if !user.is_active || !self.verify_password(&user, password)? {
            tracing::warn!("Users: failed login for {}", email);
            return Err(invalid());
        }

        let token = self.create_token(&user)?;
        Ok((token, user))
    }

    /// Decode and check a bearer token
    pub fn verify_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.auth.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    pub fn token_lifetime_secs(&self) -> i64 {
        self.auth.jwt_expiration_hours as i64 * 3600
    }

    /// Make sure the configured administrator account exists
    pub async fn ensure_admin(&self, email: &str, full_name: &str, password: &str) -> AppResult<User> {
        let mut uow = self.store.begin().await?;
        let existing = uow.find_user_by_email(email).await?;
        uow.commit().await?;

        if let Some(user) = existing {
            if !user.is_admin() {
                tracing::warn!("Users: configured admin {} exists without admin role", email);
            }
            return Ok(user);
        }

        let password_hash = self.hash_password(password)?;
        let user = self
            .insert_with_ticket(email, full_name, Role::Admin, password_hash)
            .await?;

        tracing::info!("Users: created administrator {}", user.email);
        Ok(user)
    }

    /// Hash a password using Argon2id with the configured cost
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let params = Params::new(
            self.passwords.memory_kib,
            self.passwords.iterations,
            self.passwords.parallelism,
            None,
        )
        .map_err(|e| AppError::Internal(format!("Invalid password hashing parameters: {}", e)))?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        if let Some(ref hash) = user.password_hash {
            let parsed_hash = PasswordHash::new(hash)
                .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
            return Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok());
        }

        Ok(false)
    }

    fn create_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + self.token_lifetime_secs(),
            iat: now,
        };
        claims
            .create_token(&self.auth.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Insert a user with a fresh ticket number in one unit of work
    async fn insert_with_ticket(
        &self,
        email: &str,
        full_name: &str,
        role: Role,
        password_hash: String,
    ) -> AppResult<User> {
        let email = email.trim();

        let mut uow = self.store.begin().await?;
        if uow.find_user_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("A user with this email already exists".to_string()));
        }
        let ticket_number = Self::unique_ticket(&mut *uow).await?;

        let user = uow
            .insert_user(&NewUser {
                email: email.to_string(),
                full_name: full_name.trim().to_string(),
                role,
                ticket_number: Some(ticket_number),
                password_hash: Some(password_hash),
                created_at: self.clock.today(),
            })
            .await?;
        uow.commit().await?;
        Ok(user)
    }

    /// Draw 8-digit ticket numbers until one is unused
    async fn unique_ticket(uow: &mut dyn UnitOfWork) -> AppResult<String> {
        loop {
            let ticket = random_digits(TICKET_DIGITS);
            if !uow.ticket_exists(&ticket).await? {
                return Ok(ticket);
            }
        }
    }
}
