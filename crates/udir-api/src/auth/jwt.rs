//! JWT token issuance and validation
//!
//! Implements signed, time-bounded tokens with HMAC signing. The service is
//! generic over the claims it carries: callers decide what the payload means
//! and must check its discriminant before trusting it.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use udir_core::{AuthConfig, ConfigError};
use uuid::Uuid;

/// Registered claims wrapped around the caller's payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<C> {
    /// Token issuer
    pub iss: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// JWT ID - unique token identifier
    pub jti: String,
    #[serde(flatten)]
    pub claims: C,
}

/// Token validation errors
#[derive(Debug, Error)]
pub enum TokenError {
    /// Bad encoding, signature, issuer, algorithm or payload
    #[error("Invalid token: {0}")]
    Malformed(String),

    #[error("Token has expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Source of the current Unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// JWT Configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing (should be at least 256 bits)
    pub secret: String,
    /// Signature algorithm
    pub algorithm: Algorithm,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        let auth = AuthConfig::default();
        Self {
            secret: auth.jwt_secret,
            algorithm: Algorithm::HS256,
            issuer: auth.issuer,
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    /// Build from application config, rejecting algorithms a shared secret cannot drive
    pub fn from_auth_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            secret: config.jwt_secret.clone(),
            algorithm: parse_algorithm(&config.jwt_algorithm)?,
            issuer: config.issuer.clone(),
        })
    }
}

/// Parse a symmetric signature algorithm name
pub fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    match name.trim().to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(ConfigError::InvalidValue {
            key: "JWT_ALGORITHM".to_string(),
            value: name.to_string(),
        }),
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Claims recovered from a token whose signature and expiry were checked
#[derive(Debug, Clone)]
pub struct Validated<C> {
    pub claims: C,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Issues and validates signed tokens with one process-wide key
#[derive(Clone)]
pub struct TokenService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(config: JwtConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            config,
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Sign `claims` with an expiry of now + `ttl_secs`
    pub fn issue<C: Serialize>(&self, claims: C, ttl_secs: u64) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        let envelope = Envelope {
            iss: self.config.issuer.clone(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
            claims,
        };

        let token = encode(
            &Header::new(self.config.algorithm),
            &envelope,
            &self.encoding_key,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti: envelope.jti,
            issued_at: envelope.iat,
            expires_at: envelope.exp,
        })
    }

    /// Verify signature and issuer, then require `now <= exp`
    pub fn validate<C: DeserializeOwned>(&self, token: &str) -> Result<Validated<C>, TokenError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // Expiry is checked below against the injected clock, with no leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let token_data = decode::<Envelope<C>>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let envelope = token_data.claims;

        if self.clock.now() > envelope.exp {
            return Err(TokenError::Expired);
        }

        Ok(Validated {
            claims: envelope.claims,
            jti: envelope.jti,
            issued_at: envelope.iat,
            expires_at: envelope.exp,
        })
    }
}
