//! Shared application state
//!
//! Every service is wired over one backing store. The same wiring serves
//! MongoDB in production and the in-memory store in dev mode and tests.

use std::sync::Arc;
use std::time::Instant;

use crate::audit::AuditLog;
use crate::auth::{AccountService, RefreshTokenManager, TokenIssuer};
use crate::clock::Clock;
use crate::config::Args;
use crate::db::{Store, StoreHealth};
use crate::oidc::{OidcClientRegistry, OidcExchange, SigningKeyStore};
use crate::permits::{ConfirmationService, PermitService, ProofLedger};
use crate::policy::{ContractTable, TransitionPolicy};
use crate::types::CovenantError;
use crate::world::WorldGuard;

pub struct AppState {
    pub args: Args,
    pub guard: WorldGuard,
    pub permits: PermitService,
    pub confirms: ConfirmationService,
    pub ledger: ProofLedger,
    /// Contract consulted by `/v1/contract/can-transition`
    pub policy: Arc<dyn TransitionPolicy>,
    pub accounts: AccountService,
    pub oidc: OidcExchange,
    pub health: Arc<dyn StoreHealth>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire all services over `store`.
    ///
    /// Fails if the JWT secret is missing or too short.
    pub fn new<S>(args: Args, store: Arc<S>, clock: Arc<dyn Clock>) -> Result<Self, CovenantError>
    where
        S: Store + 'static,
    {
        let secret = args
            .jwt_secret()
            .ok_or_else(|| CovenantError::Config("JWT_SECRET is required".into()))?;
        let issuer = TokenIssuer::new(&secret, clock.clone())?;
        let guard = args.world_guard();

        let refresh = RefreshTokenManager::new(
            store.clone(),
            store.clone(),
            issuer.clone(),
            clock.clone(),
        );
        let audit = AuditLog::new(store.clone(), clock.clone());
        let accounts = AccountService::new(
            store.clone(),
            refresh,
            issuer.clone(),
            audit,
            clock.clone(),
            args.public_tenant_slug.clone(),
        );

        let oidc = OidcExchange::new(
            guard.clone(),
            OidcClientRegistry::new(store.clone(), args.oidc_dev_client_id.clone(), clock.clone()),
            accounts.clone(),
            store.clone(),
            store.clone(),
            Arc::new(SigningKeyStore::new(store.clone(), clock.clone())),
            issuer,
            clock.clone(),
        );

        Ok(Self {
            permits: PermitService::new(guard.clone(), store.clone(), clock.clone()),
            confirms: ConfirmationService::new(guard.clone(), store.clone(), clock),
            ledger: ProofLedger::new(guard.clone(), store.clone()),
            policy: Arc::new(ContractTable),
            accounts,
            oidc,
            health: store,
            guard,
            args,
            started_at: Instant::now(),
        })
    }
}
