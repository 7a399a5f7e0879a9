//! Authentication and authorization module
//!
//! - Credential hashing with Argon2id
//! - Signed session and recovery tokens
//! - The authentication service that ties them to the user directory
//! - Middleware for session-protected routes

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

pub use jwt::{Clock, JwtConfig, ManualClock, SystemClock, TokenError, TokenService};
pub use middleware::{auth_middleware, bearer_token, AuthenticatedUser};
pub use models::{RecoveryClaims, SessionClaims, TokenClaims, TokenKind, UserInfo};
pub use password::{validate_password_strength, CredentialHasher, PasswordConfig, PasswordError};
pub use service::{
    AuthError, AuthService, AuthSettings, AuthzResult, DenialReason, LoginRequest, LoginResponse,
    RecoveryResponse, RegisterRequest,
};
