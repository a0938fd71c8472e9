//! MongoDB client, collection wrapper and store
//!
//! Pattern adapted from holo-host/rust/util_libs/db/src/mongodb

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::schemas::{
    AuditEventDoc, AuthCodeDoc, ConfirmationDoc, Metadata, OidcClientDoc, PermitDoc, ProofDoc,
    RefreshTokenDoc, SigningKeyDoc, TenantDoc, UserDoc, AUDIT_EVENT_COLLECTION,
    AUTH_CODE_COLLECTION, CONFIRMATION_COLLECTION, OIDC_CLIENT_COLLECTION, PERMIT_COLLECTION,
    PROOF_COLLECTION, REFRESH_TOKEN_COLLECTION, SIGNING_KEY_COLLECTION, TENANT_COLLECTION,
    USER_COLLECTION,
};
use super::store::{
    AuditStore, AuthCodeStore, IdentityStore, PermitStore, RefreshTokenStore,
    SigningKeyRepository, StoreError, StoreHealth, StoreResult,
};

/// Server error code for unique index violations
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Map a driver error, keeping the unique-constraint signal distinct
fn map_err(context: &str, err: MongoError) -> StoreError {
    if is_duplicate_key(&err) {
        StoreError::Duplicate(format!("{}: {}", context, err))
    } else {
        StoreError::Backend(format!("{} failed: {}", context, err))
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> StoreResult<Self> {
        // Never log the URI itself, it may carry credentials
        info!("Connecting to MongoDB database '{}'", db_name);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| map_err("connect", e))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| map_err("ping", e))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> StoreResult<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> StoreResult<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;
        debug!(collection = collection_name, "Indexes applied");

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> StoreResult<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| map_err("create indexes", e))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> StoreResult<()> {
        item.mut_metadata().touch(DateTime::now());

        self.inner
            .insert_one(item)
            .await
            .map_err(|e| map_err("insert", e))?;
        Ok(())
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> StoreResult<Option<T>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| map_err("find", e))
    }

    /// Find documents by filter with optional sort and limit
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<T>> {
        let mut find = self.inner.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        if let Some(limit) = limit {
            find = find.limit(limit);
        }

        let cursor = find.await.map_err(|e| map_err("find", e))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| map_err("read cursor", e))
    }

    pub async fn count(&self, filter: Document) -> StoreResult<u64> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| map_err("count", e))
    }

    /// Update one document, stamping `metadata.updated_at`
    pub async fn update_one(&self, filter: Document, set: Document) -> StoreResult<UpdateResult> {
        let mut set = set;
        set.insert("metadata.updated_at", DateTime::now());

        self.inner
            .update_one(filter, doc! { "$set": set })
            .await
            .map_err(|e| map_err("update", e))
    }

    /// Atomically find and delete one document
    pub async fn take_one(&self, filter: Document) -> StoreResult<Option<T>> {
        self.inner
            .find_one_and_delete(filter)
            .await
            .map_err(|e| map_err("find and delete", e))
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

/// MongoDB-backed [`Store`](super::Store)
///
/// Proof + confirmation writes use a multi-document transaction, which
/// requires a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    permits: MongoCollection<PermitDoc>,
    confirmations: MongoCollection<ConfirmationDoc>,
    proofs: MongoCollection<ProofDoc>,
    refresh_tokens: MongoCollection<RefreshTokenDoc>,
    auth_codes: MongoCollection<AuthCodeDoc>,
    signing_keys: MongoCollection<SigningKeyDoc>,
    tenants: MongoCollection<TenantDoc>,
    users: MongoCollection<UserDoc>,
    oidc_clients: MongoCollection<OidcClientDoc>,
    audit_events: MongoCollection<AuditEventDoc>,
}

impl MongoStore {
    /// Connect and apply every collection's indexes
    pub async fn connect(uri: &str, db_name: &str) -> StoreResult<Self> {
        let client = MongoClient::new(uri, db_name).await?;

        Ok(Self {
            permits: client.collection(PERMIT_COLLECTION).await?,
            confirmations: client.collection(CONFIRMATION_COLLECTION).await?,
            proofs: client.collection(PROOF_COLLECTION).await?,
            refresh_tokens: client.collection(REFRESH_TOKEN_COLLECTION).await?,
            auth_codes: client.collection(AUTH_CODE_COLLECTION).await?,
            signing_keys: client.collection(SIGNING_KEY_COLLECTION).await?,
            tenants: client.collection(TENANT_COLLECTION).await?,
            users: client.collection(USER_COLLECTION).await?,
            oidc_clients: client.collection(OIDC_CLIENT_COLLECTION).await?,
            audit_events: client.collection(AUDIT_EVENT_COLLECTION).await?,
            client,
        })
    }
}

#[async_trait]
impl PermitStore for MongoStore {
    async fn insert_permit(&self, permit: PermitDoc) -> StoreResult<()> {
        self.permits.insert_one(permit).await
    }

    async fn find_permit(&self, permit_id: &str) -> StoreResult<Option<PermitDoc>> {
        self.permits.find_one(doc! { "_id": permit_id }).await
    }

    async fn find_permit_by_command(
        &self,
        actor_id: &str,
        tenant_id: &str,
        command_key: &str,
    ) -> StoreResult<Option<PermitDoc>> {
        self.permits
            .find_one(doc! {
                "actor_id": actor_id,
                "tenant_id": tenant_id,
                "command_key": command_key,
            })
            .await
    }

    async fn find_confirmation(&self, permit_id: &str) -> StoreResult<Option<ConfirmationDoc>> {
        self.confirmations.find_one(doc! { "_id": permit_id }).await
    }

    async fn record_confirmation(
        &self,
        mut proof: ProofDoc,
        mut confirmation: ConfirmationDoc,
    ) -> StoreResult<()> {
        let now = DateTime::now();
        proof.metadata.touch(now);
        confirmation.metadata.touch(now);

        let mut session = self
            .client
            .inner()
            .start_session()
            .await
            .map_err(|e| map_err("start session", e))?;
        session
            .start_transaction()
            .await
            .map_err(|e| map_err("start transaction", e))?;

        let written = async {
            self.proofs
                .inner()
                .insert_one(&proof)
                .session(&mut session)
                .await
                .map_err(|e| map_err("insert proof", e))?;
            self.confirmations
                .inner()
                .insert_one(&confirmation)
                .session(&mut session)
                .await
                .map_err(|e| map_err("insert confirmation", e))?;
            Ok::<(), StoreError>(())
        }
        .await;

        if let Err(err) = written {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!(error = %abort_err, "Failed to abort confirmation transaction");
            }
            return Err(err);
        }

        session
            .commit_transaction()
            .await
            .map_err(|e| map_err("commit confirmation", e))
    }

    async fn list_proofs(
        &self,
        tenant_id: &str,
        world: &str,
        before: Option<DateTime>,
        limit: usize,
    ) -> StoreResult<Vec<ProofDoc>> {
        let mut filter = doc! { "tenant_id": tenant_id, "world": world };
        if let Some(before) = before {
            filter.insert("occurred_at", doc! { "$lt": before });
        }

        self.proofs
            .find_many(
                filter,
                Some(doc! { "occurred_at": -1 }),
                Some(limit as i64),
            )
            .await
    }
}

#[async_trait]
impl RefreshTokenStore for MongoStore {
    async fn insert_refresh_token(&self, token: RefreshTokenDoc) -> StoreResult<()> {
        self.refresh_tokens.insert_one(token).await
    }

    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime,
    ) -> StoreResult<Option<RefreshTokenDoc>> {
        self.refresh_tokens
            .find_one(doc! {
                "token_hash": token_hash,
                "revoked_at": null,
                "expires_at": { "$gt": now },
            })
            .await
    }

    async fn revoke_refresh_token(&self, id: &str, at: DateTime) -> StoreResult<bool> {
        let result = self
            .refresh_tokens
            .update_one(
                doc! { "_id": id, "revoked_at": null },
                doc! { "revoked_at": at },
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn revoke_refresh_token_by_hash(
        &self,
        token_hash: &str,
        at: DateTime,
    ) -> StoreResult<bool> {
        let result = self
            .refresh_tokens
            .update_one(
                doc! { "token_hash": token_hash, "revoked_at": null },
                doc! { "revoked_at": at },
            )
            .await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl AuthCodeStore for MongoStore {
    async fn insert_auth_code(&self, code: AuthCodeDoc) -> StoreResult<()> {
        self.auth_codes.insert_one(code).await
    }

    async fn take_auth_code(&self, code: &str) -> StoreResult<Option<AuthCodeDoc>> {
        self.auth_codes.take_one(doc! { "_id": code }).await
    }
}

#[async_trait]
impl SigningKeyRepository for MongoStore {
    async fn find_active_signing_key(&self) -> StoreResult<Option<SigningKeyDoc>> {
        self.signing_keys.find_one(doc! { "is_active": true }).await
    }

    async fn insert_signing_key(&self, key: SigningKeyDoc) -> StoreResult<()> {
        self.signing_keys.insert_one(key).await
    }
}

#[async_trait]
impl IdentityStore for MongoStore {
    async fn find_tenant_by_slug(&self, slug: &str) -> StoreResult<Option<TenantDoc>> {
        self.tenants.find_one(doc! { "slug": slug }).await
    }

    async fn insert_tenant(&self, tenant: TenantDoc) -> StoreResult<()> {
        self.tenants.insert_one(tenant).await
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<UserDoc>> {
        self.users.find_one(doc! { "_id": user_id }).await
    }

    async fn find_user_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> StoreResult<Option<UserDoc>> {
        self.users
            .find_one(doc! { "tenant_id": tenant_id, "email": email })
            .await
    }

    async fn find_user_by_email_any_tenant(&self, email: &str) -> StoreResult<Option<UserDoc>> {
        self.users.find_one(doc! { "email": email }).await
    }

    async fn count_users(&self, tenant_id: &str) -> StoreResult<u64> {
        self.users.count(doc! { "tenant_id": tenant_id }).await
    }

    async fn insert_user(&self, user: UserDoc) -> StoreResult<()> {
        self.users.insert_one(user).await
    }

    async fn find_oidc_client(&self, client_id: &str) -> StoreResult<Option<OidcClientDoc>> {
        self.oidc_clients
            .find_one(doc! { "client_id": client_id })
            .await
    }

    async fn insert_oidc_client(&self, client: OidcClientDoc) -> StoreResult<()> {
        self.oidc_clients.insert_one(client).await
    }
}

#[async_trait]
impl AuditStore for MongoStore {
    async fn insert_audit_event(&self, event: AuditEventDoc) -> StoreResult<()> {
        self.audit_events.insert_one(event).await
    }
}

#[async_trait]
impl StoreHealth for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .inner()
            .database(self.client.db_name())
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| map_err("ping", e))?;
        Ok(())
    }
}
