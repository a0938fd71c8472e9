//! Authentication for Covenant
//!
//! Provides:
//! - HS256 access tokens
//! - Rotating, hashed refresh tokens
//! - scrypt password hashing
//! - PKCE helpers for the OIDC exchange
//! - Registration and login

pub mod accounts;
pub mod jwt;
pub mod password;
pub mod pkce;
pub mod refresh;
mod roles;

pub use accounts::{AccountService, LoginRequest, RegisterRequest, SessionTokens};
pub use jwt::{extract_bearer, AccessClaims, TokenIssuer, ACCESS_TOKEN_TTL_SECS};
pub use password::{hash_password, verify_password};
pub use refresh::{IssuedRefreshToken, RefreshTokenManager, RotatedSession};
pub use roles::Role;
