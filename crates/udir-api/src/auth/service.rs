//! Authentication service layer
//!
//! Orchestrates login, role authorization, password recovery, password reset,
//! password change and registration on top of the credential hasher, the token
//! service and the user directory gateway.

use super::jwt::{Clock, JwtConfig, TokenError, TokenService};
use super::models::{RecoveryClaims, SessionClaims, TokenClaims, UserInfo};
use super::password::{validate_password_strength, CredentialHasher, PasswordConfig, PasswordError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use udir_core::{
    normalize_email, AppConfig, ConfigError, Credential, DirectoryError, EventAction, EventSink,
    Profile, ProfileShape, Role, UserDirectory, UserEvent, UserId, UserRecord, UserStatus,
    PARTITIONS,
};
use utoipa::ToSchema;
use validator::Validate;

/// Authentication errors
///
/// `InvalidCredentials` deliberately covers both an unknown email and a wrong
/// password.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("User not found")]
    NotFound,

    #[error("Invalid token")]
    TokenMalformed,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not valid for this operation")]
    WrongTokenKind,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("User directory unavailable")]
    DependencyUnavailable,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::NotFound => "NOT_FOUND",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::WrongTokenKind => "WRONG_TOKEN_KIND",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(_) => AuthError::TokenMalformed,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<DirectoryError> for AuthError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(_) => AuthError::DependencyUnavailable,
            DirectoryError::NotFound => AuthError::NotFound,
            DirectoryError::Duplicate => AuthError::EmailTaken,
            DirectoryError::Corrupt(msg) => AuthError::Internal(format!("Corrupt user record: {msg}")),
        }
    }
}

/// User login request
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub claims: SessionClaims,
}

/// User registration request
#[derive(Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,

    #[validate(email, length(max = 254))]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,

    #[schema(value_type = String, example = "student")]
    pub role: Role,

    /// Required for students
    #[validate(length(min = 1, max = 100))]
    pub major: Option<String>,

    /// Required for professors
    #[validate(length(min = 1, max = 100))]
    pub department: Option<String>,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("major", &self.major)
            .field("department", &self.department)
            .finish()
    }
}

impl RegisterRequest {
    /// Build the role-specific profile the partition expects
    fn profile(&self) -> Result<Profile, AuthError> {
        match self.role.partition().shape {
            ProfileShape::Major => self
                .major
                .clone()
                .map(|major| Profile::Student { major })
                .ok_or_else(|| AuthError::Validation("major is required for students".to_string())),
            ProfileShape::Department => self
                .department
                .clone()
                .map(|department| Profile::Professor { department })
                .ok_or_else(|| {
                    AuthError::Validation("department is required for professors".to_string())
                }),
            ProfileShape::Bare => Ok(Profile::Administrator),
        }
    }
}

/// Password recovery token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecoveryResponse {
    pub recovery_token: String,
    pub expires_in: u64,
}

/// Why an authorization check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    TokenMalformed,
    TokenExpired,
    WrongTokenKind,
    WrongRole,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenMalformed => "token_malformed",
            Self::TokenExpired => "token_expired",
            Self::WrongTokenKind => "wrong_token_kind",
            Self::WrongRole => "wrong_role",
        }
    }
}

/// Outcome of [`AuthService::authorize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzResult {
    Granted(SessionClaims),
    Denied(DenialReason),
}

impl AuthzResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Tunables of the authentication flows
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub session_ttl_secs: u64,
    pub recovery_ttl_secs: u64,
    pub single_use_recovery: bool,
    pub directory_timeout: Duration,
}

impl From<&AppConfig> for AuthSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            session_ttl_secs: config.auth.session_ttl_secs,
            recovery_ttl_secs: config.auth.recovery_ttl_secs,
            single_use_recovery: config.auth.single_use_recovery,
            directory_timeout: Duration::from_millis(config.directory.timeout_ms),
        }
    }
}

/// Authentication service
pub struct AuthService {
    tokens: TokenService,
    hasher: CredentialHasher,
    directory: Arc<dyn UserDirectory>,
    events: Arc<dyn EventSink>,
    settings: AuthSettings,
    /// Verified against when the email is unknown, so both paths cost one hash check
    dummy_credential: Credential,
    /// Recovery token IDs already spent, with their expiry
    consumed_recovery: Mutex<HashMap<String, u64>>,
    /// Held across the uniqueness check and the insert of a registration
    registration: tokio::sync::Mutex<()>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        tokens: TokenService,
        hasher: CredentialHasher,
        directory: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
        settings: AuthSettings,
    ) -> Result<Self, PasswordError> {
        let dummy_credential = hasher.hash("udir-dummy-password")?;

        Ok(Self {
            tokens,
            hasher,
            directory,
            events,
            settings,
            dummy_credential,
            consumed_recovery: Mutex::new(HashMap::new()),
            registration: tokio::sync::Mutex::new(()),
        })
    }

    /// Build the service from application configuration
    pub fn from_config(
        config: &AppConfig,
        directory: Arc<dyn UserDirectory>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let jwt_config = JwtConfig::from_auth_config(&config.auth)?;
        let hasher = CredentialHasher::new(&PasswordConfig::from(&config.auth)).map_err(|e| {
            ConfigError::InvalidValue {
                key: "PASSWORD_*".to_string(),
                value: e.to_string(),
            }
        })?;

        Self::new(
            TokenService::with_clock(jwt_config, clock),
            hasher,
            directory,
            events,
            AuthSettings::from(config),
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "PASSWORD_*".to_string(),
            value: e.to_string(),
        })
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Login with email and password
    ///
    /// Unknown email, wrong password and inactive account all fail with the
    /// same `InvalidCredentials`.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AuthError> {
        let Some(user) = self.find_user(&request.email).await? else {
            self.verify(&request.password, &self.dummy_credential).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let password_valid = self.verify(&request.password, &user.credential).await?;
        if !password_valid || !user.is_active() {
            return Err(AuthError::InvalidCredentials);
        }

        let claims = SessionClaims {
            email: user.email.clone(),
            role: user.role(),
        };
        let issued = self
            .tokens
            .issue(TokenClaims::Session(claims.clone()), self.settings.session_ttl_secs)?;

        tracing::debug!(user_id = %user.id, role = %user.role(), "Session token issued");

        Ok(LoginResponse {
            access_token: issued.token,
            token_type: "bearer".to_string(),
            expires_in: self.settings.session_ttl_secs,
            claims,
        })
    }

    /// Check that `token` is a live session token for `required_role`
    ///
    /// Never fails: every problem with the token is reported as a denial.
    pub fn authorize(&self, token: &str, required_role: Role) -> AuthzResult {
        match self.tokens.validate::<TokenClaims>(token) {
            Ok(validated) => match validated.claims {
                TokenClaims::Session(claims) if claims.role == required_role => {
                    AuthzResult::Granted(claims)
                }
                TokenClaims::Session(_) => AuthzResult::Denied(DenialReason::WrongRole),
                TokenClaims::RecoverPassword(_) => {
                    AuthzResult::Denied(DenialReason::WrongTokenKind)
                }
            },
            Err(TokenError::Expired) => AuthzResult::Denied(DenialReason::TokenExpired),
            Err(_) => AuthzResult::Denied(DenialReason::TokenMalformed),
        }
    }

    /// Validate a session token and return its claims
    pub fn validate_session(&self, token: &str) -> Result<SessionClaims, AuthError> {
        match self.tokens.validate::<TokenClaims>(token)?.claims {
            TokenClaims::Session(claims) => Ok(claims),
            TokenClaims::RecoverPassword(_) => Err(AuthError::WrongTokenKind),
        }
    }

    /// Issue a password recovery token for an existing account
    pub async fn request_recovery(&self, email: &str) -> Result<RecoveryResponse, AuthError> {
        let user = self
            .find_user(email)
            .await?
            .filter(UserRecord::is_active)
            .ok_or(AuthError::NotFound)?;

        let issued = self.tokens.issue(
            TokenClaims::RecoverPassword(RecoveryClaims {
                email: user.email.clone(),
            }),
            self.settings.recovery_ttl_secs,
        )?;

        tracing::debug!(user_id = %user.id, "Recovery token issued");

        Ok(RecoveryResponse {
            recovery_token: issued.token,
            expires_in: self.settings.recovery_ttl_secs,
        })
    }

    /// Replace a password using a recovery token
    ///
    /// The account is located by the email inside the validated token, never
    /// by caller input.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let validated = self.tokens.validate::<TokenClaims>(token)?;
        let claims = match validated.claims {
            TokenClaims::RecoverPassword(claims) => claims,
            other => {
                tracing::debug!(kind = other.kind().as_str(), "Rejected token at password reset");
                return Err(AuthError::WrongTokenKind);
            }
        };

        validate_password_strength(new_password).map_err(AuthError::Validation)?;

        if self.settings.single_use_recovery
            && !self.claim_recovery(&validated.jti, validated.expires_at)
        {
            tracing::debug!(jti = %validated.jti, "Recovery token replayed");
            return Err(AuthError::TokenMalformed);
        }

        let result = self.replace_credential(&claims.email, new_password).await;
        match result {
            Ok(user) => {
                self.publish(UserEvent::new(user.id, user.role(), EventAction::PasswordReset))
                    .await;
                Ok(())
            }
            Err(e) => {
                if self.settings.single_use_recovery {
                    self.release_recovery(&validated.jti);
                }
                Err(e)
            }
        }
    }

    /// Change a password given the current one
    pub async fn change_password(
        &self,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self
            .find_user(email)
            .await?
            .filter(UserRecord::is_active)
            .ok_or(AuthError::NotFound)?;

        if !self.verify(old_password, &user.credential).await? {
            return Err(AuthError::InvalidCredentials);
        }

        validate_password_strength(new_password).map_err(AuthError::Validation)?;

        let credential = self.hash(new_password).await?;
        self.with_timeout(
            self.directory
                .update_credential(user.id, user.role(), credential),
        )
        .await?;

        self.publish(UserEvent::new(user.id, user.role(), EventAction::PasswordChanged))
            .await;
        Ok(())
    }

    /// Register a new user
    ///
    /// Emails are unique across all partitions, not only within the target one.
    pub async fn register(&self, request: RegisterRequest) -> Result<UserInfo, AuthError> {
        request
            .validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;
        validate_password_strength(&request.password).map_err(AuthError::Validation)?;
        let profile = request.profile()?;

        if self.find_user(&request.email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let credential = self.hash(&request.password).await?;
        let record = UserRecord {
            id: UserId::new(),
            name: request.name.trim().to_string(),
            email: normalize_email(&request.email),
            credential,
            status: UserStatus::Active,
            profile,
        };

        // Partitions only reject duplicates of their own, so the global
        // check is repeated under the lock before inserting.
        let record = {
            let _guard = self.registration.lock().await;
            if self.find_user(&record.email).await?.is_some() {
                return Err(AuthError::EmailTaken);
            }
            self.with_timeout(self.directory.insert(record)).await?
        };
        self.publish(UserEvent::new(record.id, record.role(), EventAction::Created))
            .await;

        Ok(UserInfo::from(&record))
    }

    /// Look up a user across all partitions in priority order
    pub async fn find_user(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let email = normalize_email(email);
        for partition in PARTITIONS.iter() {
            let found = self
                .with_timeout(self.directory.find_by_email(&email, partition.role))
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    async fn replace_credential(
        &self,
        email: &str,
        new_password: &str,
    ) -> Result<UserRecord, AuthError> {
        let user = self.find_user(email).await?.ok_or(AuthError::NotFound)?;
        let credential = self.hash(new_password).await?;
        self.with_timeout(
            self.directory
                .update_credential(user.id, user.role(), credential),
        )
        .await?;
        Ok(user)
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.settings.directory_timeout, call).await {
            Ok(result) => result.map_err(|e| {
                if let DirectoryError::Unavailable(reason) = &e {
                    tracing::warn!(reason = %reason, "User directory unavailable");
                }
                AuthError::from(e)
            }),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.settings.directory_timeout.as_millis() as u64,
                    "User directory call timed out"
                );
                Err(AuthError::DependencyUnavailable)
            }
        }
    }

    async fn hash(&self, plaintext: &str) -> Result<Credential, AuthError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    async fn verify(&self, plaintext: &str, credential: &Credential) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        let credential = credential.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &credential))
            .await
            .map_err(|e| AuthError::Internal(format!("Verification task failed: {e}")))
    }

    async fn publish(&self, event: UserEvent) {
        let routing_key = event.routing_key();
        match tokio::time::timeout(self.settings.directory_timeout, self.events.publish(event)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(routing_key = %routing_key, error = %e, "Failed to publish user event")
            }
            Err(_) => tracing::warn!(routing_key = %routing_key, "Publishing user event timed out"),
        }
    }

    /// Mark a recovery token as spent; false if it already was
    fn claim_recovery(&self, jti: &str, expires_at: u64) -> bool {
        let now = self.tokens.now();
        let mut consumed = self
            .consumed_recovery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        consumed.retain(|_, exp| *exp >= now);
        if consumed.contains_key(jti) {
            return false;
        }
        consumed.insert(jti.to_string(), expires_at);
        true
    }

    fn release_recovery(&self, jti: &str) {
        self.consumed_recovery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(jti);
    }
}
