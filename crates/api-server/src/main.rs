//! WallTrack server binary: composition root and worker supervision.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api_server::signal_processor::SignalProcessor;
use api_server::state::AppState;
use risk_manager::circuit_breaker::CircuitBreakerService;
use risk_manager::concentration::ConcentrationChecker;
use risk_manager::position_slots::PositionSlotManager;
use risk_manager::sizing::PositionSizer;
use risk_manager::system_state::SystemStateManager;
use rust_decimal::Decimal;
use signal_engine::enrichment::{TokenEnricher, WalletEnricher};
use signal_engine::filter::SignalFilter;
use signal_engine::pipeline::SignalPipeline;
use signal_engine::scorer::SignalScorer;
use signal_engine::threshold::ThresholdGate;
use trading_engine::entry_service::EntryOrderService;
use trading_engine::executor::OrderExecutor;
use trading_engine::exit_manager::ExitManager;
use trading_engine::exit_monitor::{ExitMonitor, ExitMonitorConfig};
use trading_engine::position_service::{PositionService, DEFAULT_EXIT_STRATEGY};
use trading_engine::retry_worker::RetryWorker;
use walltrack_core::config::{AppConfig, TradingConfig};
use walltrack_core::db::{
    self, ConfigRepository, EventRepository, ExitStrategyRepository, OrderRepository,
    PositionRepository, QueueRepository, SignalRepository, SystemStateRepository,
    WalletRepository,
};
use walltrack_core::oracle::{OracleConfig, PriceOracle};
use walltrack_core::ports::{ClusterService, PriceProvider, SwapHistory, TokenFetcher, TradeClient};
use walltrack_core::stores::{
    ConfigStore, EventLog, OrderStore, PositionStore, QueueStore, SignalLog, StrategyStore,
    SystemStateStore, WalletStore,
};
use walltrack_core::types::{ExitRule, ExitRuleType, ExitStrategy, StrategyStatus};
use wallet_tracker::decay::DecayDetector;
use wallet_tracker::profiling_worker::WalletProfilingWorker;

mod providers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "walltrack=info,api_server=info,tower_http=warn,sqlx=warn,hyper=warn".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let app_config = AppConfig::from_env()?;

    let pool = db::create_pool(&app_config.database).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Repositories behind their store ports.
    let wallets: Arc<dyn WalletStore> = Arc::new(WalletRepository::new(pool.clone()));
    let orders: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(pool.clone()));
    let positions: Arc<dyn PositionStore> = Arc::new(PositionRepository::new(pool.clone()));
    let signals: Arc<dyn SignalLog> = Arc::new(SignalRepository::new(pool.clone()));
    let events: Arc<dyn EventLog> = Arc::new(EventRepository::new(pool.clone()));
    let strategies: Arc<dyn StrategyStore> = Arc::new(ExitStrategyRepository::new(pool.clone()));
    let queue_store: Arc<dyn QueueStore> = Arc::new(QueueRepository::new(pool.clone()));
    let state_store: Arc<dyn SystemStateStore> =
        Arc::new(SystemStateRepository::new(pool.clone()));
    let config_store: Arc<dyn ConfigStore> = Arc::new(ConfigRepository::new(pool.clone()));

    // Trading config: persisted row wins, defaults otherwise.
    let trading_config = match config_store.load().await? {
        Some(config) => config,
        None => {
            let config = TradingConfig::default();
            config_store.save(&config).await?;
            config
        }
    };
    trading_config.validate()?;
    let config = trading_config.shared();

    seed_default_strategy(&strategies).await?;

    // External collaborators, resolved from the environment.
    let price_providers: Vec<Arc<dyn PriceProvider>> = providers::price_providers()?;
    let trade_client: Arc<dyn TradeClient> = providers::trade_client()?;
    let token_fetcher: Arc<dyn TokenFetcher> = providers::token_fetcher()?;
    let cluster_service: Arc<dyn ClusterService> = providers::cluster_service()?;
    let swap_history: Arc<dyn SwapHistory> = providers::swap_history()?;

    let oracle = Arc::new(PriceOracle::new(price_providers, OracleConfig::default()));

    // Risk and capital control.
    let system_state = Arc::new(SystemStateManager::with_persistence(
        state_store,
        events.clone(),
    ));
    if system_state.load().await? {
        info!("system state restored from storage");
    }
    let breakers = Arc::new(CircuitBreakerService::new(
        system_state.clone(),
        events.clone(),
        config.clone(),
    ));
    let slots = Arc::new(PositionSlotManager::new(
        positions.clone(),
        queue_store,
        events.clone(),
        config.clone(),
    ));
    slots.restore().await?;
    let concentration = Arc::new(ConcentrationChecker::new(positions.clone(), config.clone()));
    let sizer = Arc::new(PositionSizer::new(config.clone(), concentration));

    // Order path.
    let executor = Arc::new(OrderExecutor::new(
        trade_client.clone(),
        orders.clone(),
        config.clone(),
    ));
    let position_service = Arc::new(PositionService::new(
        positions.clone(),
        strategies.clone(),
    ));
    let entry_service = Arc::new(EntryOrderService::new(
        system_state.clone(),
        oracle.clone(),
        sizer,
        executor.clone(),
        trade_client,
        orders.clone(),
        signals.clone(),
        positions.clone(),
        position_service,
        config.clone(),
    ));
    let exit_manager = Arc::new(ExitManager::new(
        strategies.clone(),
        positions.clone(),
        orders.clone(),
        executor.clone(),
        slots.clone(),
        breakers,
    ));
    let retry_worker = Arc::new(RetryWorker::new(
        orders.clone(),
        signals.clone(),
        positions.clone(),
        strategies.clone(),
        executor,
        entry_service.clone(),
        config.clone(),
    ));

    // Signal pipeline.
    let pipeline = Arc::new(SignalPipeline::new(
        SignalFilter::new(wallets.clone(), signals.clone(), config.clone()),
        WalletEnricher::new(wallets.clone()),
        TokenEnricher::new(token_fetcher),
        SignalScorer::new(cluster_service, config.clone()),
        ThresholdGate::new(config.clone()),
        signals.clone(),
    ));

    // Background wallet intelligence.
    let profiling_worker = Arc::new(WalletProfilingWorker::new(
        wallets.clone(),
        swap_history.clone(),
        config.clone(),
    ));
    let decay_detector = Arc::new(DecayDetector::new(
        wallets,
        swap_history,
        events,
        config.clone(),
    ));

    // Wire the channels and spawn the workers.
    let (event_tx, event_rx) = mpsc::channel(1_000);
    let cancel = CancellationToken::new();

    let processor = Arc::new(SignalProcessor::new(
        pipeline,
        slots.clone(),
        entry_service,
        signals.clone(),
    ));
    processor.register_release_callback().await;
    tokio::spawn(processor.run(event_rx, cancel.clone()));

    let exit_monitor = ExitMonitor::new(
        ExitMonitorConfig::from_env(),
        positions.clone(),
        oracle,
        exit_manager,
    );
    tokio::spawn(exit_monitor.run(cancel.clone()));

    tokio::spawn(retry_worker.clone().run(cancel.clone()));
    tokio::spawn(profiling_worker.clone().run(cancel.clone()));
    tokio::spawn(decay_sweep_loop(decay_detector, cancel.clone()));
    tokio::spawn(config_reload_loop(
        config_store,
        config.clone(),
        cancel.clone(),
    ));

    let state = AppState {
        event_tx,
        system_state,
        slots,
        orders,
        positions,
        signals,
        retry_worker,
        profiling_worker,
        config,
    };

    let router = api_server::build_router(state);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "walltrack listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    Ok(())
}

/// Ensure a default active exit strategy exists on first boot.
async fn seed_default_strategy(strategies: &Arc<dyn StrategyStore>) -> anyhow::Result<()> {
    if strategies
        .get_active_by_name(DEFAULT_EXIT_STRATEGY)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let rule = |rule_type, trigger: i64, exit: i64, priority| ExitRule {
        rule_type,
        trigger_pct: Decimal::new(trigger, 0),
        exit_pct: Decimal::new(exit, 0),
        priority,
        enabled: true,
        params: Default::default(),
    };

    let mut strategy = ExitStrategy::new(
        DEFAULT_EXIT_STRATEGY,
        vec![
            rule(ExitRuleType::StopLoss, -50, 100, 0),
            rule(ExitRuleType::TakeProfit, 50, 50, 1),
            rule(ExitRuleType::TakeProfit, 100, 50, 2),
        ],
    )?;
    strategy.status = StrategyStatus::Active;
    strategy.max_hold_hours = Some(48);
    strategy.stagnation_hours = Some(6);
    strategy.stagnation_threshold_pct = Some(Decimal::new(5, 0));
    strategies.insert(&strategy).await?;

    info!(strategy = DEFAULT_EXIT_STRATEGY, "seeded default exit strategy");
    Ok(())
}

/// Hourly decay sweep over the monitored set.
async fn decay_sweep_loop(detector: Arc<DecayDetector>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                match detector.sweep().await {
                    Ok(changed) if changed > 0 => {
                        info!(changed, "decay sweep complete");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "decay sweep failed"),
                }
            }
        }
    }
}

/// Poll the persisted trading configuration so operator edits take effect
/// without a restart.
async fn config_reload_loop(
    store: Arc<dyn ConfigStore>,
    config: walltrack_core::config::SharedConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                match store.load().await {
                    Ok(Some(loaded)) => {
                        let mut current = config.write().await;
                        *current = loaded;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "trading config reload failed"),
                }
            }
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    cancel.cancel();
}
