use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{validate_username, Profile, SessionToken, PASSWORD_MIN_LEN},
    storage::Store,
};

const CONNECT_STATE_PURPOSE: &str = "spotify_connect";
const CONNECT_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user_id
    pub iss: String, // issuer
    pub exp: i64,    // expiry
    pub iat: i64,    // issued at
}

/// Signed OAuth `state`: binds the Spotify callback to the user who started it.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConnectState {
    pub sub: String,
    pub purpose: String,
    pub nonce: String,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct AuthService {
    store: Arc<dyn Store>,
    config: Arc<Config>,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> AppResult<(Profile, SessionToken)> {
        let email = normalize_email(email)?;
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(AppError::Validation(format!(
                "password must be at least {} characters",
                PASSWORD_MIN_LEN
            )));
        }
        let username = validate_username(username).map_err(AppError::Validation)?;

        let password_hash = hash(password, self.config.jwt.bcrypt_cost)
            .map_err(|e| anyhow::anyhow!("Hash error: {}", e))?;

        let (user, profile) = self
            .store
            .create_account(&email, &password_hash, username)
            .await?;
        tracing::info!("Account created: {}", user.id);

        let session = self.issue_session(user.id)?;
        Ok((profile, session))
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<(Profile, SessionToken)> {
        let email = normalize_email(email).map_err(|_| AppError::InvalidCredentials)?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify(password, &user.password_hash)
            .map_err(|e| anyhow::anyhow!("Verify error: {}", e))?
        {
            return Err(AppError::InvalidCredentials);
        }

        let profile = self
            .store
            .get_profile(user.id)
            .await?
            .ok_or(AppError::ProfileNotFound)?;

        let session = self.issue_session(user.id)?;
        Ok((profile, session))
    }

    // Token validation
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let key = DecodingKey::from_secret(self.config.jwt.secret.as_bytes());
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.jwt.issuer]);

        let token_data = decode::<Claims>(token, &key, &validation)?;
        Ok(token_data.claims)
    }

    pub fn issue_session(&self, user_id: Uuid) -> AppResult<SessionToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.jwt.session_ttl.as_secs() as i64);

        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.config.jwt.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let key = EncodingKey::from_secret(self.config.jwt.secret.as_bytes());
        let access_token = encode(&Header::default(), &claims, &key)?;

        Ok(SessionToken {
            access_token,
            expires_at,
        })
    }

    pub fn issue_connect_state(&self, user_id: Uuid) -> AppResult<String> {
        let now = Utc::now();
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();

        let claims = ConnectState {
            sub: user_id.to_string(),
            purpose: CONNECT_STATE_PURPOSE.to_string(),
            nonce,
            iss: self.config.jwt.issuer.clone(),
            exp: (now + Duration::minutes(CONNECT_STATE_TTL_MINUTES)).timestamp(),
            iat: now.timestamp(),
        };

        let key = EncodingKey::from_secret(&self.state_secret());
        Ok(encode(&Header::default(), &claims, &key)?)
    }

    /// User id carried by a connect `state`, if it is authentic and unexpired.
    pub fn verify_connect_state(&self, state: &str) -> AppResult<Uuid> {
        let key = DecodingKey::from_secret(&self.state_secret());
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.jwt.issuer]);

        let claims = decode::<ConnectState>(state, &key, &validation)?.claims;
        if claims.purpose != CONNECT_STATE_PURPOSE {
            return Err(AppError::InvalidToken);
        }
        Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
    }

    // Separate key so a state token can never pass as a session and vice versa.
    fn state_secret(&self) -> Vec<u8> {
        format!("{}:{}", self.config.jwt.secret, CONNECT_STATE_PURPOSE).into_bytes()
    }
}

fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation("a valid email is required".to_string())),
    }
}
