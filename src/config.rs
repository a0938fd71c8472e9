//! Configuration for Covenant
//!
//! CLI arguments and environment variable handling using clap. Secrets can
//! also be supplied through a `<NAME>_FILE` path (mounted secrets); a
//! non-empty direct value wins over the file.

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::auth::accounts::DEFAULT_PUBLIC_TENANT_SLUG;
use crate::auth::jwt::MIN_SECRET_LEN;
use crate::world::WorldGuard;

/// Secret used when DEV_MODE is on and no JWT secret is configured
const DEV_JWT_SECRET: &str = "dev-only-insecure-secret-never-deploy";

/// Covenant - permit and proof broker for world services
#[derive(Parser, Debug, Clone)]
#[command(name = "covenant")]
#[command(about = "Permit issuance, confirmation proofs and token lifecycle for world services")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// File containing the MongoDB connection URI
    #[arg(long, env = "MONGODB_URI_FILE")]
    pub mongodb_uri_file: Option<PathBuf>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "covenant")]
    pub mongodb_db: String,

    /// HS256 secret for access tokens, at least 32 characters
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// File containing the JWT secret
    #[arg(long, env = "JWT_SECRET_FILE")]
    pub jwt_secret_file: Option<PathBuf>,

    /// Comma-separated worlds accepted by the guard (defaults to the canonical set)
    #[arg(long, env = "HOS_WORLD_ALLOWLIST")]
    pub world_allowlist: Option<String>,

    /// Comma-separated worlds that are temporarily closed
    #[arg(long, env = "HOS_WORLD_CLOSED")]
    pub world_closed: Option<String>,

    /// Public issuer URL for ID tokens; derived from request headers when unset
    #[arg(long, env = "HOS_PUBLIC_ISSUER")]
    pub public_issuer: Option<String>,

    /// Force the Secure cookie attribute on or off; follows x-forwarded-proto when unset
    #[arg(long, env = "COOKIE_SECURE")]
    pub cookie_secure: Option<bool>,

    /// Tenant that holds self-registered public users
    #[arg(long, env = "DEFAULT_PUBLIC_TENANT_SLUG", default_value = DEFAULT_PUBLIC_TENANT_SLUG)]
    pub public_tenant_slug: String,

    /// OIDC client provisioned on first use for localhost redirects
    #[arg(long, env = "OIDC_DEV_CLIENT_ID")]
    pub oidc_dev_client_id: Option<String>,

    /// Enable development mode (in-memory store fallback, dev JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Effective JWT secret (falls back to a fixed secret in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        read_value_or_file(self.jwt_secret.as_deref(), self.jwt_secret_file.as_deref())
            .or_else(|| self.dev_mode.then(|| DEV_JWT_SECRET.to_string()))
    }

    /// Effective MongoDB URI, if any
    pub fn mongodb_uri(&self) -> Option<String> {
        read_value_or_file(self.mongodb_uri.as_deref(), self.mongodb_uri_file.as_deref())
    }

    pub fn world_guard(&self) -> WorldGuard {
        WorldGuard::from_csv(self.world_allowlist.as_deref(), self.world_closed.as_deref())
    }

    /// Public issuer with trailing slashes removed
    pub fn public_issuer(&self) -> Option<String> {
        self.public_issuer
            .as_deref()
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.jwt_secret() {
            None => return Err("JWT_SECRET (or JWT_SECRET_FILE) is required".to_string()),
            Some(secret) if secret.chars().count() < MIN_SECRET_LEN => {
                return Err(format!(
                    "JWT_SECRET must be at least {} characters",
                    MIN_SECRET_LEN
                ));
            }
            Some(_) => {}
        }

        if !self.dev_mode && self.mongodb_uri().is_none() {
            return Err("MONGODB_URI is required outside dev mode".to_string());
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err("LOG_FORMAT must be text or json".to_string());
        }

        let slug_len = self.public_tenant_slug.len();
        if !(3..=50).contains(&slug_len) {
            return Err("DEFAULT_PUBLIC_TENANT_SLUG must be 3-50 characters".to_string());
        }

        Ok(())
    }
}

/// Non-empty direct value, else the trimmed contents of `file`
fn read_value_or_file(direct: Option<&str>, file: Option<&Path>) -> Option<String> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Some(value.to_string());
    }
    let path = file?;
    match std::fs::read_to_string(path) {
        Ok(contents) => Some(contents.trim().to_string()).filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read secret file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["covenant"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_dev_mode_supplies_secret() {
        let a = args(&["--dev-mode"]);
        assert!(a.validate().is_ok());
        assert_eq!(a.jwt_secret().as_deref(), Some(DEV_JWT_SECRET));
    }

    #[test]
    fn test_short_secret_rejected() {
        let a = args(&["--dev-mode", "--jwt-secret", "short"]);
        assert!(a.validate().unwrap_err().contains("at least"));
    }

    #[test]
    fn test_production_requires_mongo() {
        let a = args(&["--jwt-secret", &"s".repeat(40)]);
        assert!(a.validate().unwrap_err().contains("MONGODB_URI"));
    }

    #[test]
    fn test_secret_file_indirection() {
        let path = std::env::temp_dir().join(format!("covenant-secret-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, format!("{}\n", "f".repeat(40))).unwrap();

        let a = args(&["--dev-mode", "--jwt-secret-file", path.to_str().unwrap()]);
        assert_eq!(a.jwt_secret(), Some("f".repeat(40)));

        let a = args(&[
            "--jwt-secret",
            &"d".repeat(40),
            "--jwt-secret-file",
            path.to_str().unwrap(),
        ]);
        assert_eq!(a.jwt_secret(), Some("d".repeat(40)));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_public_issuer_trimmed() {
        let a = args(&["--public-issuer", "https://auth.example.com//"]);
        assert_eq!(a.public_issuer().as_deref(), Some("https://auth.example.com"));
    }
}
