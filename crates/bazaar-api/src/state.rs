//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bazaar_auth::{AuthGate, MfaService, SessionManager, TokenService};
use bazaar_core::config::AppConfig;
use bazaar_core::error::AppError;
use bazaar_database::DatabasePool;
use bazaar_database::memory::{
    MemoryMfaStore, MemoryNotificationStore, MemorySessionStore, MemoryUserStore,
};
use bazaar_database::repositories::{
    MfaRepository, NotificationRepository, SessionRepository, UserRepository,
};
use bazaar_database::store::{MfaStore, NotificationStore, SessionStore, UserStore};
use bazaar_realtime::notification::build_push_notifier;
use bazaar_realtime::{ConnectionHub, DeliveryDispatcher, HubHandle, NotificationService};

/// The persistence backends every service is built on.
#[derive(Clone)]
pub struct Stores {
    /// Session rows.
    pub sessions: Arc<dyn SessionStore>,
    /// User accounts.
    pub users: Arc<dyn UserStore>,
    /// MFA factors and backup codes.
    pub mfa: Arc<dyn MfaStore>,
    /// Notifications.
    pub notifications: Arc<dyn NotificationStore>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(db: &DatabasePool) -> Self {
        let pool = db.pool().clone();
        Self {
            sessions: Arc::new(SessionRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool.clone())),
            mfa: Arc::new(MfaRepository::new(pool.clone())),
            notifications: Arc::new(NotificationRepository::new(pool)),
        }
    }

    /// Process-local stores for tests and single-node development.
    pub fn memory() -> Self {
        Self {
            sessions: Arc::new(MemorySessionStore::new()),
            users: Arc::new(MemoryUserStore::new()),
            mfa: Arc::new(MemoryMfaStore::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
        }
    }
}

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ────────────────────────────────────────────
    /// Application configuration.
    pub config: Arc<AppConfig>,

    // ── Auth ─────────────────────────────────────────────────────
    /// Per-request token and session checks.
    pub gate: Arc<AuthGate>,
    /// Register, login, refresh and logout flows.
    pub sessions: Arc<SessionManager>,
    /// TOTP enrollment and step-up.
    pub mfa: Arc<MfaService>,

    // ── Realtime ─────────────────────────────────────────────────
    /// Handle to the connection hub task.
    pub hub: HubHandle,
    /// Notification persistence and delivery.
    pub dispatcher: Arc<DeliveryDispatcher>,
    /// Notification read state.
    pub notifications: Arc<NotificationService>,

    // ── Lifecycle ────────────────────────────────────────────────
    /// Fires when the server begins shutting down. Request tokens are
    /// children of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires every service over `stores` and spawns the connection hub.
    ///
    /// The returned join handle completes once the hub has closed every
    /// connection after `shutdown` fires.
    pub fn build(
        config: AppConfig,
        stores: Stores,
        shutdown: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), AppError> {
        let tokens = TokenService::new(&config.auth);
        let gate = AuthGate::new(
            tokens.clone(),
            Arc::clone(&stores.sessions),
            Arc::clone(&stores.users),
        );
        let sessions = SessionManager::new(
            Arc::clone(&stores.sessions),
            Arc::clone(&stores.users),
            tokens,
            config.auth.clone(),
        );
        let mfa = MfaService::new(Arc::clone(&stores.mfa), sessions.clone(), &config.mfa);

        let (hub, hub_task) = ConnectionHub::spawn(&config.realtime, shutdown.clone());
        let push = build_push_notifier(&config.push)?;
        let dispatcher = DeliveryDispatcher::new(
            Arc::clone(&stores.notifications),
            hub.clone(),
            push,
            &config.push,
        );
        let notifications = NotificationService::new(Arc::clone(&stores.notifications), hub.clone());

        let state = Self {
            config: Arc::new(config),
            gate: Arc::new(gate),
            sessions: Arc::new(sessions),
            mfa: Arc::new(mfa),
            hub,
            dispatcher: Arc::new(dispatcher),
            notifications: Arc::new(notifications),
            shutdown,
        };
        Ok((state, hub_task))
    }
}
