//! In-memory store
//!
//! Used when `DEV_MODE` runs without MongoDB and by the test suite. Enforces
//! the same unique constraints as the MongoDB indexes, and performs the
//! proof + confirmation write under a single lock so the pair is atomic.

use async_trait::async_trait;
use bson::DateTime;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::schemas::{
    AuditEventDoc, AuthCodeDoc, ConfirmationDoc, OidcClientDoc, PermitDoc, ProofDoc,
    RefreshTokenDoc, SigningKeyDoc, TenantDoc, UserDoc,
};
use super::store::{
    AuditStore, AuthCodeStore, IdentityStore, PermitStore, RefreshTokenStore,
    SigningKeyRepository, StoreError, StoreHealth, StoreResult,
};

type CommandKey = (String, String, String);

#[derive(Default)]
struct MemoryState {
    permits: HashMap<String, PermitDoc>,
    permit_commands: HashMap<CommandKey, String>,
    confirmations: HashMap<String, ConfirmationDoc>,
    proofs: Vec<ProofDoc>,
    refresh_tokens: HashMap<String, RefreshTokenDoc>,
    auth_codes: HashMap<String, AuthCodeDoc>,
    signing_keys: Vec<SigningKeyDoc>,
    tenants: HashMap<String, TenantDoc>,
    users: Vec<UserDoc>,
    oidc_clients: HashMap<String, OidcClientDoc>,
    audit_events: Vec<AuditEventDoc>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded audit events
    pub async fn audit_event_count(&self) -> usize {
        self.state.lock().await.audit_events.len()
    }

    /// All refresh token rows, including revoked ones
    pub async fn refresh_tokens(&self) -> Vec<RefreshTokenDoc> {
        self.state.lock().await.refresh_tokens.values().cloned().collect()
    }

    /// Number of signing keys ever stored
    pub async fn signing_key_count(&self) -> usize {
        self.state.lock().await.signing_keys.len()
    }
}

fn duplicate(what: impl Into<String>) -> StoreError {
    StoreError::Duplicate(what.into())
}

#[async_trait]
impl PermitStore for MemoryStore {
    async fn insert_permit(&self, mut permit: PermitDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let key = (
            permit.actor_id.clone(),
            permit.tenant_id.clone(),
            permit.command_key.clone(),
        );
        if state.permit_commands.contains_key(&key) {
            return Err(duplicate("permits.actor_tenant_command_unique"));
        }
        if state.permits.contains_key(&permit.permit_id) {
            return Err(duplicate("permits._id"));
        }
        permit.metadata.touch(DateTime::now());
        state.permit_commands.insert(key, permit.permit_id.clone());
        state.permits.insert(permit.permit_id.clone(), permit);
        Ok(())
    }

    async fn find_permit(&self, permit_id: &str) -> StoreResult<Option<PermitDoc>> {
        Ok(self.state.lock().await.permits.get(permit_id).cloned())
    }

    async fn find_permit_by_command(
        &self,
        actor_id: &str,
        tenant_id: &str,
        command_key: &str,
    ) -> StoreResult<Option<PermitDoc>> {
        let state = self.state.lock().await;
        let key = (
            actor_id.to_string(),
            tenant_id.to_string(),
            command_key.to_string(),
        );
        Ok(state
            .permit_commands
            .get(&key)
            .and_then(|id| state.permits.get(id))
            .cloned())
    }

    async fn find_confirmation(&self, permit_id: &str) -> StoreResult<Option<ConfirmationDoc>> {
        Ok(self.state.lock().await.confirmations.get(permit_id).cloned())
    }

    async fn record_confirmation(
        &self,
        mut proof: ProofDoc,
        mut confirmation: ConfirmationDoc,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.confirmations.contains_key(&confirmation.permit_id) {
            return Err(duplicate("permit_confirms._id"));
        }
        if state.proofs.iter().any(|p| p.proof_id == proof.proof_id) {
            return Err(duplicate("proofs._id"));
        }
        let now = DateTime::now();
        proof.metadata.touch(now);
        confirmation.metadata.touch(now);
        state
            .confirmations
            .insert(confirmation.permit_id.clone(), confirmation);
        state.proofs.push(proof);
        Ok(())
    }

    async fn list_proofs(
        &self,
        tenant_id: &str,
        world: &str,
        before: Option<DateTime>,
        limit: usize,
    ) -> StoreResult<Vec<ProofDoc>> {
        let state = self.state.lock().await;
        let mut items: Vec<ProofDoc> = state
            .proofs
            .iter()
            .rev()
            .filter(|p| p.tenant_id == tenant_id && p.world == world)
            .filter(|p| before.map_or(true, |cursor| p.occurred_at < cursor))
            .cloned()
            .collect();
        // Stable sort keeps newest-inserted first among equal timestamps
        items.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert_refresh_token(&self, mut token: RefreshTokenDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == token.token_hash)
        {
            return Err(duplicate("refresh_tokens.token_hash_unique"));
        }
        token.metadata.touch(DateTime::now());
        state.refresh_tokens.insert(token.id.clone(), token);
        Ok(())
    }

    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime,
    ) -> StoreResult<Option<RefreshTokenDoc>> {
        let state = self.state.lock().await;
        Ok(state
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.is_active(now))
            .cloned())
    }

    async fn revoke_refresh_token(&self, id: &str, at: DateTime) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.refresh_tokens.get_mut(id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(at);
                token.metadata.touch(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_refresh_token_by_hash(
        &self,
        token_hash: &str,
        at: DateTime,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let token = state
            .refresh_tokens
            .values_mut()
            .find(|t| t.token_hash == token_hash && t.revoked_at.is_none());
        match token {
            Some(token) => {
                token.revoked_at = Some(at);
                token.metadata.touch(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AuthCodeStore for MemoryStore {
    async fn insert_auth_code(&self, mut code: AuthCodeDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.auth_codes.contains_key(&code.code) {
            return Err(duplicate("oidc_auth_codes._id"));
        }
        code.metadata.touch(DateTime::now());
        state.auth_codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn take_auth_code(&self, code: &str) -> StoreResult<Option<AuthCodeDoc>> {
        Ok(self.state.lock().await.auth_codes.remove(code))
    }
}

#[async_trait]
impl SigningKeyRepository for MemoryStore {
    async fn find_active_signing_key(&self) -> StoreResult<Option<SigningKeyDoc>> {
        let state = self.state.lock().await;
        Ok(state.signing_keys.iter().find(|k| k.is_active).cloned())
    }

    async fn insert_signing_key(&self, mut key: SigningKeyDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if key.is_active && state.signing_keys.iter().any(|k| k.is_active) {
            return Err(duplicate("oidc_keys.single_active_key"));
        }
        if state.signing_keys.iter().any(|k| k.kid == key.kid) {
            return Err(duplicate("oidc_keys.kid_unique"));
        }
        key.metadata.touch(DateTime::now());
        state.signing_keys.push(key);
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_tenant_by_slug(&self, slug: &str) -> StoreResult<Option<TenantDoc>> {
        let state = self.state.lock().await;
        Ok(state.tenants.values().find(|t| t.slug == slug).cloned())
    }

    async fn insert_tenant(&self, mut tenant: TenantDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.tenants.values().any(|t| t.slug == tenant.slug) {
            return Err(duplicate("tenants.slug_unique"));
        }
        tenant.metadata.touch(DateTime::now());
        state.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<UserDoc>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> StoreResult<Option<UserDoc>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.tenant_id == tenant_id && u.email == email)
            .cloned())
    }

    async fn find_user_by_email_any_tenant(&self, email: &str) -> StoreResult<Option<UserDoc>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn count_users(&self, tenant_id: &str) -> StoreResult<u64> {
        let state = self.state.lock().await;
        Ok(state.users.iter().filter(|u| u.tenant_id == tenant_id).count() as u64)
    }

    async fn insert_user(&self, mut user: UserDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .users
            .iter()
            .any(|u| u.tenant_id == user.tenant_id && u.email == user.email)
        {
            return Err(duplicate("users.tenant_email_unique"));
        }
        user.metadata.touch(DateTime::now());
        state.users.push(user);
        Ok(())
    }

    async fn find_oidc_client(&self, client_id: &str) -> StoreResult<Option<OidcClientDoc>> {
        Ok(self.state.lock().await.oidc_clients.get(client_id).cloned())
    }

    async fn insert_oidc_client(&self, mut client: OidcClientDoc) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.oidc_clients.contains_key(&client.client_id) {
            return Err(duplicate("oidc_clients.client_id_unique"));
        }
        client.metadata.touch(DateTime::now());
        state.oidc_clients.insert(client.client_id.clone(), client);
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit_event(&self, mut event: AuditEventDoc) -> StoreResult<()> {
        event.metadata.touch(event.created_at);
        self.state.lock().await.audit_events.push(event);
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Metadata;

    fn proof(id: &str, tenant: &str, world: &str, at_ms: i64) -> ProofDoc {
        ProofDoc {
            proof_id: id.into(),
            metadata: Metadata::default(),
            occurred_at: DateTime::from_millis(at_ms),
            world: world.into(),
            tenant_id: tenant.into(),
            request_id: None,
            actor_id: "u1".into(),
            kind: "permit.confirm".into(),
            subject_ref: "{}".into(),
            payload: "{}".into(),
            request_hash: "rh".into(),
            idempotency_key: "cmd-00000001".into(),
            hash: "h".into(),
        }
    }

    fn confirmation(permit_id: &str, proof_id: &str) -> ConfirmationDoc {
        ConfirmationDoc {
            permit_id: permit_id.into(),
            metadata: Metadata::default(),
            world_mutation_id: "m1".into(),
            proof_id: proof_id.into(),
            snapshot_hash: "s".into(),
            mutation_hash: "mh".into(),
            new_version: "2".into(),
            confirmed_at: "2026-01-01T00:00:00Z".into(),
            recorded_at: DateTime::from_millis(0),
        }
    }

    #[tokio::test]
    async fn test_confirmation_is_unique_per_permit() {
        let store = MemoryStore::new();
        store
            .record_confirmation(proof("p1", "t1", "marketplace", 1), confirmation("permit-1", "p1"))
            .await
            .unwrap();

        let err = store
            .record_confirmation(proof("p2", "t1", "marketplace", 2), confirmation("permit-1", "p2"))
            .await
            .unwrap_err();
        assert!(err.is_duplicate());

        // The losing proof must not have been written
        let proofs = store.list_proofs("t1", "marketplace", None, 10).await.unwrap();
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].proof_id, "p1");
    }

    #[tokio::test]
    async fn test_list_proofs_filters_and_orders() {
        let store = MemoryStore::new();
        for (i, (tenant, world)) in [
            ("t1", "marketplace"),
            ("t1", "messaging"),
            ("t2", "marketplace"),
            ("t1", "marketplace"),
            ("t1", "marketplace"),
        ]
        .iter()
        .enumerate()
        {
            let id = format!("p{}", i);
            store
                .record_confirmation(
                    proof(&id, tenant, world, i as i64 * 1000),
                    confirmation(&format!("permit-{}", i), &id),
                )
                .await
                .unwrap();
        }

        let page = store.list_proofs("t1", "marketplace", None, 2).await.unwrap();
        let ids: Vec<_> = page.iter().map(|p| p.proof_id.as_str()).collect();
        assert_eq!(ids, ["p4", "p3"]);

        let rest = store
            .list_proofs("t1", "marketplace", Some(page[1].occurred_at), 2)
            .await
            .unwrap();
        let ids: Vec<_> = rest.iter().map(|p| p.proof_id.as_str()).collect();
        assert_eq!(ids, ["p0"]);
    }

    #[tokio::test]
    async fn test_revoke_is_compare_and_set() {
        let store = MemoryStore::new();
        store
            .insert_refresh_token(RefreshTokenDoc {
                id: "rt-1".into(),
                metadata: Metadata::default(),
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                token_hash: "hash".into(),
                expires_at: DateTime::from_millis(i64::MAX / 2),
                revoked_at: None,
                rotated_from: None,
            })
            .await
            .unwrap();

        let now = DateTime::now();
        assert!(store.revoke_refresh_token("rt-1", now).await.unwrap());
        assert!(!store.revoke_refresh_token("rt-1", now).await.unwrap());
        assert!(!store.revoke_refresh_token_by_hash("hash", now).await.unwrap());
        assert!(store
            .find_active_refresh_token("hash", now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_auth_code_is_taken_once() {
        let store = MemoryStore::new();
        store
            .insert_auth_code(AuthCodeDoc {
                code: "code-1".into(),
                metadata: Metadata::default(),
                client_id: "client".into(),
                redirect_uri: "http://localhost:3000/cb".into(),
                tenant_id: "t1".into(),
                user_id: "u1".into(),
                scope: "openid".into(),
                world: "marketplace".into(),
                code_challenge: "challenge".into(),
                code_challenge_method: "S256".into(),
                expires_at: DateTime::now(),
            })
            .await
            .unwrap();

        assert!(store.take_auth_code("code-1").await.unwrap().is_some());
        assert!(store.take_auth_code("code-1").await.unwrap().is_none());
    }
}
