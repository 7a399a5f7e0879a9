/// Credential hashing and verification using Argon2id
///
/// Implements salted one-way password hashing:
/// - Algorithm: Argon2id (memory-hard, resistant to GPU attacks)
/// - Memory: 64 MB, Iterations: 3, Parallelism: 4 by default
/// - Salt: 16 bytes random, fresh per hash
/// - Output: 32 bytes hash, stored as a PHC string
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use thiserror::Error;
use udir_core::{AuthConfig, Credential};

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),
}

/// Password hashing configuration
///
/// Increasing memory or iterations improves brute-force resistance but slows
/// down every login.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (threads, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl From<&AuthConfig> for PasswordConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            memory_cost: config.password_memory_cost,
            time_cost: config.password_time_cost,
            parallelism: config.password_parallelism,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }
}

/// One-way credential hasher
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Build a hasher, rejecting parameters Argon2 cannot use
    pub fn new(config: &PasswordConfig) -> Result<Self, PasswordError> {
        Ok(Self {
            params: config.to_params()?,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash a plaintext password with a fresh random salt
    ///
    /// Two calls with the same plaintext return different credentials; both
    /// verify against it.
    pub fn hash(&self, plaintext: &str) -> Result<Credential, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        Ok(Credential::from_phc(password_hash.to_string()))
    }

    /// Verify a plaintext password against a stored credential
    ///
    /// Recomputes the hash with the salt and parameters embedded in the
    /// credential and compares in constant time. A credential that cannot be
    /// parsed never matches.
    pub fn verify(&self, plaintext: &str, credential: &Credential) -> bool {
        let parsed_hash = match PasswordHash::new(credential.as_phc()) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(error = %e, "Stored credential is not a valid PHC string");
                return false;
            }
        };

        match self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
        {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Credential verification failed");
                false
            }
        }
    }
}

/// Validate password strength
///
/// Checks if a password meets minimum requirements:
/// - At least 8 characters
/// - At least 1 letter
/// - At least 1 digit
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if !password.chars().any(char::is_alphabetic) {
        return Err("Password must contain at least one letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_hasher() -> CredentialHasher {
    CredentialHasher::new(&PasswordConfig {
        memory_cost: 4096,
        time_cost: 1,
        parallelism: 1,
        output_len: Some(32),
    })
    .expect("valid test parameters")
}
