//! Application state: every component wired together from the durable and
//! ephemeral stores down. Built once at startup by `main.rs` and shared as
//! an `Arc<AppState>` across every HTTP handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify, RwLock};
use tracing::info;
use wager_core::model::RuntimeConfigValues;

use crate::auth::AuthService;
use crate::component::{Component, EventBus};
use crate::config::{SharedConfig, StaticConfig};
use crate::engine::RuleEngine;
use crate::hub::Hub;
use crate::idle_watcher::{IdleWatcher, IdleWatcherContext};
use crate::ledger::Ledger;
use crate::matchmaker::{Matchmaker, MatchmakerContext};
use crate::payment::poller::{PaymentPoller, PollerContext};
use crate::payment::{PaymentOrchestrator, PaymentProvider};
use crate::payout::PayoutResolver;
use crate::session_manager::{SessionManager, SessionManagerContext, SessionOps};
use crate::sms::SmsSender;
use crate::store::{DurableStore, EphemeralStore};

/// Everything an HTTP handler might need, wired once at boot.
pub struct AppState {
    pub static_config: StaticConfig,
    pub config: SharedConfig,
    pub store: DurableStore,
    pub ephemeral: EphemeralStore,
    pub ledger: Ledger,
    pub auth: AuthService,
    pub payout: PayoutResolver,
    pub orchestrator: PaymentOrchestrator,
    pub provider: Arc<dyn PaymentProvider>,
    pub sms: Arc<dyn SmsSender>,
    pub engine: Arc<dyn RuleEngine>,
    pub hub: Arc<Hub>,
    /// Wakes the matchmaker immediately after a fresh queue insert rather
    /// than making the caller wait out a full sweep period.
    pub matchmaker_notify: Arc<Notify>,
}

impl AppState {
    /// Loads runtime config, wires every component onto a shared event bus,
    /// and spawns the long-running workers. `engine` is the one rule engine
    /// this deployment serves — supplied by the caller, never built here.
    pub async fn bootstrap(
        static_config: StaticConfig,
        store: DurableStore,
        ephemeral: EphemeralStore,
        provider: Arc<dyn PaymentProvider>,
        sms: Arc<dyn SmsSender>,
        engine: Arc<dyn RuleEngine>,
    ) -> wager_core::Result<Arc<Self>> {
        let rows = store.list_runtime_config().await?;
        let config: SharedConfig = Arc::new(RwLock::new(RuntimeConfigValues::from_rows(&rows)));

        let ledger = Ledger::new(store.clone());
        let auth = AuthService::new(store.clone(), ephemeral.clone(), "254");
        let payout = PayoutResolver::new(store.clone(), ledger.clone(), config.clone());
        let orchestrator = PaymentOrchestrator::new(store.clone(), ledger.clone(), provider.clone());

        let (presence_tx, presence_rx) = mpsc::channel(256);
        let hub = Hub::new(
            store.clone(),
            ephemeral.clone(),
            engine.clone(),
            config.clone(),
            presence_tx,
            Duration::from_secs(20),
            Duration::from_secs(45),
            64,
        );
        hub.clone().spawn_bus_listener();

        let bus = EventBus::new();
        bus.attach("hub", &mut hub.clone()).await;

        let ops = SessionOps {
            store: store.clone(),
            ephemeral: ephemeral.clone(),
            payout: payout.clone(),
            engine: engine.clone(),
            config: config.clone(),
        };

        let mut session_manager_handle = SessionManager.start(SessionManagerContext {
            ops: ops.clone(),
            presence_rx,
            sweep_period_ms: static_config.idle_watch_period_ms,
        });
        bus.attach("session_manager", &mut session_manager_handle).await;

        let mut idle_watcher_handle = IdleWatcher.start(IdleWatcherContext {
            ops: ops.clone(),
            period_ms: static_config.idle_watch_period_ms,
        });
        bus.attach("idle_watcher", &mut idle_watcher_handle).await;

        let matchmaker_notify = Arc::new(Notify::new());
        let mut matchmaker_handle = Matchmaker.start(MatchmakerContext {
            store: store.clone(),
            ledger: ledger.clone(),
            sms: sms.clone(),
            notify: matchmaker_notify.clone(),
            period_ms: static_config.matchmaker_period_ms,
            game_type: static_config.game_type.clone(),
            join_base_url: static_config.join_base_url.clone(),
            config: config.clone(),
        });
        bus.attach("matchmaker", &mut matchmaker_handle).await;

        let mut poller_handle = PaymentPoller.start(PollerContext {
            store: store.clone(),
            orchestrator: orchestrator.clone(),
            period_ms: static_config.payment_poll_period_ms,
            grace_secs: static_config.payment_poll_grace_seconds,
            max_age_secs: static_config.payment_poll_max_age_seconds,
            batch_size: 50,
        });
        bus.attach("payment_poller", &mut poller_handle).await;

        info!("application state bootstrapped");

        Ok(Arc::new(Self {
            static_config,
            config,
            store,
            ephemeral,
            ledger,
            auth,
            payout,
            orchestrator,
            provider,
            sms,
            engine,
            hub,
            matchmaker_notify,
        }))
    }
}
