//! OpenID Connect provider
//!
//! Authorization code + PKCE (S256 only), RS256 ID tokens signed by a
//! lazily provisioned key, userinfo and JWKS.

pub mod clients;
pub mod exchange;
pub mod signing_key;

pub use clients::OidcClientRegistry;
pub use exchange::{
    AuthorizeParams, AuthorizeSubmission, IdTokenClaims, OidcExchange, PendingAuthorization,
    TokenRequest, TokenResponse, UserInfo, AUTH_CODE_TTL_MINUTES,
};
pub use signing_key::{ActiveSigningKey, SigningKeyStore};
