use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::ledger::{LedgerError, UserStore};
use crate::models::UserId;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Login already taken")]
    LoginTaken,

    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] LedgerError),
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }
}

/// Register / login request body
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: UserId,
}

pub struct UserAuthService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
    token_ttl: Duration,
}

impl UserAuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: String, token_ttl: Duration) -> Self {
        Self {
            users,
            jwt_secret,
            token_ttl,
        }
    }

    /// Register a new user with a zero balance and sign them in
    pub async fn register(&self, req: Credentials) -> Result<AuthResponse, AuthError> {
        let login = req.login.trim();
        if login.is_empty() || req.password.is_empty() {
            return Err(AuthError::InvalidInput(
                "login and password are required".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        let user_id = self
            .users
            .create_user(login, &password_hash)
            .await?
            .ok_or(AuthError::LoginTaken)?;

        tracing::info!(user_id, login, "User registered");
        Ok(AuthResponse {
            token: self.issue_token(user_id)?,
            user_id,
        })
    }

    /// Verify the password and issue a JWT
    pub async fn login(&self, req: Credentials) -> Result<AuthResponse, AuthError> {
        let creds = self
            .users
            .find_credentials(req.login.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&creds.password_hash)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        Ok(AuthResponse {
            token: self.issue_token(creds.user_id)?,
            user_id: creds.user_id,
        })
    }

    pub fn issue_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + self.token_ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?)
    }

    /// Verify JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}
