//! OIDC signing key store
//!
//! Exactly one active RS256 key per deployment, provisioned lazily on first
//! use and read through an in-process cache. Two instances racing to
//! provision both generate a key, but the store's single-active constraint
//! lets only one insert commit; the loser discards its key and adopts the
//! committed row.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bson::DateTime;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::canonical::canonical_json;
use crate::clock::Clock;
use crate::db::schemas::{Metadata, SigningKeyDoc};
use crate::db::SigningKeyRepository;
use crate::types::CovenantError;

const RSA_BITS: usize = 2048;
const ALG_RS256: &str = "RS256";

/// The active key, ready to sign
pub struct ActiveSigningKey {
    pub kid: String,
    pub public_jwk: Value,
    encoding: EncodingKey,
}

impl ActiveSigningKey {
    fn from_doc(doc: &SigningKeyDoc) -> Result<Self, CovenantError> {
        let encoding = EncodingKey::from_rsa_pem(doc.private_pem.as_bytes())
            .map_err(|e| CovenantError::Internal(format!("Stored signing key unusable: {}", e)))?;
        let public_jwk = serde_json::from_str(&doc.public_jwk)
            .map_err(|e| CovenantError::Internal(format!("Stored JWK unreadable: {}", e)))?;

        Ok(Self {
            kid: doc.kid.clone(),
            public_jwk,
            encoding,
        })
    }

    /// Sign claims as an RS256 JWT with this key's `kid` header
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, CovenantError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &self.encoding)
            .map_err(|e| CovenantError::Internal(format!("Failed to sign ID token: {}", e)))
    }
}

pub struct SigningKeyStore {
    repo: Arc<dyn SigningKeyRepository>,
    cache: RwLock<Option<Arc<ActiveSigningKey>>>,
    clock: Arc<dyn Clock>,
}

impl SigningKeyStore {
    pub fn new(repo: Arc<dyn SigningKeyRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            cache: RwLock::new(None),
            clock,
        }
    }

    /// The active key, provisioning one if none exists
    pub async fn active(&self) -> Result<Arc<ActiveSigningKey>, CovenantError> {
        if let Some(key) = self.cache.read().await.as_ref() {
            return Ok(key.clone());
        }

        // Serializes provisioning within this process
        let mut cache = self.cache.write().await;
        if let Some(key) = cache.as_ref() {
            return Ok(key.clone());
        }

        let doc = match self.repo.find_active_signing_key().await? {
            Some(doc) => doc,
            None => self.provision().await?,
        };
        let key = Arc::new(ActiveSigningKey::from_doc(&doc)?);
        *cache = Some(key.clone());
        Ok(key)
    }

    /// `{"keys": [public_jwk]}`
    pub async fn jwks(&self) -> Result<Value, CovenantError> {
        let key = self.active().await?;
        Ok(json!({ "keys": [key.public_jwk.clone()] }))
    }

    async fn provision(&self) -> Result<SigningKeyDoc, CovenantError> {
        let kid = Uuid::new_v4().to_string();
        let generated = {
            let kid = kid.clone();
            tokio::task::spawn_blocking(move || generate_rsa_key(&kid))
                .await
                .map_err(|e| CovenantError::Internal(format!("Key generation task failed: {}", e)))??
        };

        let doc = SigningKeyDoc {
            id: Uuid::new_v4().to_string(),
            metadata: Metadata::stamped(DateTime::from_chrono(self.clock.now())),
            kid: kid.clone(),
            alg: ALG_RS256.to_string(),
            public_jwk: canonical_json(&generated.public_jwk),
            private_pem: generated.private_pem,
            is_active: true,
        };

        match self.repo.insert_signing_key(doc.clone()).await {
            Ok(()) => {
                info!(kid = %kid, "Provisioned OIDC signing key");
                Ok(doc)
            }
            Err(err) if err.is_duplicate() => {
                debug!(kid = %kid, "Concurrent provisioner won; adopting committed key");
                self.repo
                    .find_active_signing_key()
                    .await?
                    .ok_or_else(|| CovenantError::Database(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

struct GeneratedKey {
    public_jwk: Value,
    private_pem: String,
}

fn generate_rsa_key(kid: &str) -> Result<GeneratedKey, CovenantError> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| CovenantError::Internal(format!("RSA key generation failed: {}", e)))?;
    let pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CovenantError::Internal(format!("PEM encoding failed: {}", e)))?;

    let public_jwk = json!({
        "kty": "RSA",
        "n": URL_SAFE_NO_PAD.encode(private.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(private.e().to_bytes_be()),
        "use": "sig",
        "alg": ALG_RS256,
        "kid": kid,
    });

    Ok(GeneratedKey {
        public_jwk,
        private_pem: pem.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::db::MemoryStore;
    use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    #[tokio::test]
    async fn test_provisions_once_and_caches() {
        let store = Arc::new(MemoryStore::new());
        let keys = SigningKeyStore::new(store.clone(), Arc::new(SystemClock));

        let first = keys.active().await.unwrap();
        let second = keys.active().await.unwrap();
        assert_eq!(first.kid, second.kid);
        assert_eq!(store.signing_key_count().await, 1);

        let jwks = keys.jwks().await.unwrap();
        assert_eq!(jwks["keys"][0]["kid"], first.kid.as_str());
        assert_eq!(jwks["keys"][0]["alg"], "RS256");
        assert_eq!(jwks["keys"][0]["use"], "sig");
    }

    #[tokio::test]
    async fn test_signature_verifies_against_jwk() {
        let store = Arc::new(MemoryStore::new());
        let keys = SigningKeyStore::new(store, Arc::new(SystemClock));
        let key = keys.active().await.unwrap();

        let token = key
            .sign(&TestClaims {
                sub: "u1".into(),
                exp: chrono::Utc::now().timestamp() + 60,
            })
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(key.kid.as_str()));

        let n = key.public_jwk["n"].as_str().unwrap();
        let e = key.public_jwk["e"].as_str().unwrap();
        let decoding = DecodingKey::from_rsa_components(n, e).unwrap();
        let data =
            decode::<TestClaims>(&token, &decoding, &Validation::new(Algorithm::RS256)).unwrap();
        assert_eq!(data.claims.sub, "u1");
    }

    #[tokio::test]
    async fn test_concurrent_provisioners_converge() {
        let store = Arc::new(MemoryStore::new());
        let a = SigningKeyStore::new(store.clone(), Arc::new(SystemClock));
        let b = SigningKeyStore::new(store.clone(), Arc::new(SystemClock));

        let (ka, kb) = tokio::join!(a.active(), b.active());
        assert_eq!(ka.unwrap().kid, kb.unwrap().kid);
        assert_eq!(store.signing_key_count().await, 1);
    }
}
