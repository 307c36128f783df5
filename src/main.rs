use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cryptoedge::cli::{Cli, Commands};
use cryptoedge::executor::AuthSession;
use cryptoedge::http::HttpFetcher;
use cryptoedge::persistence::PersistenceStore;
use cryptoedge::providers::{CoinGeckoSpotProvider, DeribitVolatilityProvider, PredictionMarketClient};
use cryptoedge::signing::Wallet;
use cryptoedge::{BotConfig, DryRunExecutor, LiveExecutor, OpportunityPipeline, OrderExecutor, RuntimeConfig, TradingStateMachine};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&config)?;

    if let Err(errors) = validate(&config.bot) {
        for e in &errors {
            tracing::error!("config error: {e}");
        }
        anyhow::bail!("invalid configuration, {} error(s)", errors.len());
    }

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Once => once(config).await,
        Commands::Status => status(config).await,
    }
}

fn validate(bot: &BotConfig) -> Result<(), Vec<String>> {
    let errors = bot.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Load `{config}/default.toml` (+ `{env}.toml` overlay) when `config` is a
/// directory, a single file when it's a path to one, or hardcoded defaults
/// when neither exists, so `once`/`status` work out of the box as a smoke
/// test.
fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let path = std::path::Path::new(&cli.config);
    if path.is_dir() {
        Ok(RuntimeConfig::load_from_dir(path, &cli.env)?)
    } else if path.is_file() {
        Ok(RuntimeConfig::load_from_file(path)?)
    } else {
        Ok(RuntimeConfig::default_config(true))
    }
}

/// File + console logging: an `EnvFilter` seeded from `config.logging.level`
/// (overridable via `RUST_LOG`), optional JSON formatting, non-blocking
/// daily-rolling file sink under `{data_dir}/logs`.
fn init_logging(config: &RuntimeConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_dir = std::path::Path::new(&config.data_dir()).join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cryptoedge.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leaked: the guard must outlive the process and main never returns
    // before the runtime shuts down.
    Box::leak(Box::new(guard));

    let console_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer.json())
            .with(file_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }
    Ok(())
}

struct Services {
    pipeline: OpportunityPipeline,
    store: PersistenceStore,
    executor: Arc<dyn OrderExecutor>,
}

async fn build_services(config: &RuntimeConfig) -> anyhow::Result<Services> {
    let fetcher = HttpFetcher::new(Duration::from_secs(config.http_timeout_secs))?;

    let markets = Arc::new(PredictionMarketClient::new(
        fetcher.clone(),
        config.endpoints.gamma_base_url.clone(),
        config.endpoints.clob_base_url.clone(),
    ));
    let spot = Arc::new(CoinGeckoSpotProvider::new(fetcher.clone(), config.endpoints.oracle_base_url.clone()));
    let volatility = Arc::new(DeribitVolatilityProvider::new(
        fetcher.clone(),
        config.endpoints.options_base_url.clone(),
    ));
    let pipeline = OpportunityPipeline::new(Arc::clone(&markets), spot, volatility);

    let data_dir = config.data_dir();
    let store = if config.bot.dry_run {
        PersistenceStore::paper(&data_dir)
    } else {
        PersistenceStore::real(&data_dir)
    };

    let executor: Arc<dyn OrderExecutor> = if config.bot.dry_run {
        Arc::new(DryRunExecutor::new())
    } else {
        let wallet = Wallet::from_env(137)?;
        let auth = AuthSession::derive(wallet, &fetcher, &config.endpoints.clob_base_url).await?;
        Arc::new(LiveExecutor::new(auth, markets, fetcher, config.endpoints.clob_base_url.clone()))
    };

    Ok(Services {
        pipeline,
        store,
        executor,
    })
}

async fn run(config: RuntimeConfig) -> anyhow::Result<()> {
    let services = build_services(&config).await?;
    let machine = TradingStateMachine::new(services.pipeline, services.store, services.executor, config.bot.clone());

    let (tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });

    tracing::info!(dry_run = config.bot.dry_run, "starting trading loop");
    machine.run(rx).await?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn once(config: RuntimeConfig) -> anyhow::Result<()> {
    let services = build_services(&config).await?;
    let machine = TradingStateMachine::new(services.pipeline, services.store, services.executor, config.bot.clone());

    let report = machine.run_once(chrono::Utc::now()).await?;
    println!(
        "cycle at {}: {} opportunities, {} opened, {} closed{}",
        report.cycle_started_at,
        report.opportunities_seen,
        report.positions_opened,
        report.positions_closed,
        report.error.map(|e| format!(", error: {e}")).unwrap_or_default(),
    );
    Ok(())
}

async fn status(config: RuntimeConfig) -> anyhow::Result<()> {
    let data_dir = config.data_dir();
    let store = if config.bot.dry_run {
        PersistenceStore::paper(&data_dir)
    } else {
        PersistenceStore::real(&data_dir)
    };
    let state = store.load(&config.bot, chrono::Utc::now()).await?;

    println!("running:          {}", state.is_running);
    println!("starting balance:  {}", state.starting_balance);
    println!("current balance:   {}", state.current_balance);
    println!("realized pnl:      {}", state.total_realized_pnl);
    println!("open positions:    {}", state.open_positions.len());
    println!("closed positions:  {}", state.closed_positions.len());
    println!("win / loss:        {} / {}", state.win_count, state.loss_count);
    println!("last update:       {}", state.last_update);
    if let Some(err) = &state.last_error {
        println!("last error:        {err}");
    }
    for (market_id, position) in &state.open_positions {
        println!(
            "  open {market_id}: side={:?} notional={} entry={}",
            position.side, position.notional, position.entry_price
        );
    }
    Ok(())
}

/// Waits for Ctrl+C or, on unix, SIGTERM, whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c"),
        _ = terminate => tracing::info!("received sigterm"),
    }
}
