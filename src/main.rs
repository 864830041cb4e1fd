//! CDL match notifier daemon.
//! Pulls team calendars into SQLite on a schedule and announces matches shortly before they start.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cdl_match_notifier::api::{self, AppState};
use cdl_match_notifier::config::AppConfig;
use cdl_match_notifier::ingest::providers::{IcsFeedProvider, SchedulePageProvider};
use cdl_match_notifier::ingest::scheduler::{IngestSchedulerCfg, Ingestor};
use cdl_match_notifier::ingest::types::MatchProvider;
use cdl_match_notifier::metrics::Metrics;
use cdl_match_notifier::notify::{Destination, DiscordChannel, NotificationScheduler};
use cdl_match_notifier::retention;
use cdl_match_notifier::store::Store;

/// `RUST_LOG` selects levels (default `info`); `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG / LOG_FORMAT from it apply to the subscriber.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    cfg.log_summary();

    let store = Arc::new(
        Store::open(&cfg.database_path)
            .with_context(|| format!("opening database {}", cfg.database_path.display()))?,
    );
    if let Err(e) = retention::prune(&store, Utc::now(), cfg.retention_days) {
        tracing::error!(target: "retention", error = %format!("{e:#}"), "startup prune failed");
    }

    let shutdown = CancellationToken::new();

    // --- ingestion ---
    let http = reqwest::Client::builder()
        .user_agent(concat!("cdl-match-notifier/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building HTTP client")?;
    let mut providers: Vec<Box<dyn MatchProvider>> = cfg
        .team_ids
        .iter()
        .map(|id| {
            Box::new(IcsFeedProvider::new(&cfg.ics_base_url, id.clone(), http.clone()))
                as Box<dyn MatchProvider>
        })
        .collect();
    providers.push(Box::new(SchedulePageProvider::new(cfg.schedule_page_url.clone())));

    let ingestor = Ingestor::new(
        providers,
        store.clone(),
        cfg.teams.clone(),
        !cfg.team_ids.is_empty(),
        IngestSchedulerCfg {
            interval: cfg.schedule_fetch_interval,
            retention_days: cfg.retention_days,
        },
    );
    let ingest_task = ingestor.spawn(shutdown.clone());

    // --- notifications ---
    let destination: Arc<dyn Destination> = Arc::new(
        DiscordChannel::new(cfg.discord_bot_token.clone(), cfg.discord_channel_id.clone())
            .with_api_base(cfg.discord_api_base.clone()),
    );
    let notify_task = NotificationScheduler::new(
        store.clone(),
        destination.clone(),
        cfg.notify_minutes_before,
    )
    .with_mentions(cfg.mentions.clone())
    .with_retry(cfg.retry)
    .with_shutdown(shutdown.clone())
    .spawn(cfg.notify_check_interval);

    // --- optional status server ---
    let status_task = match cfg.metrics_addr {
        Some(addr) => Some(spawn_status_server(&cfg, addr, store.clone(), destination, shutdown.clone()).await?),
        None => None,
    };

    wait_for_signal().await;
    tracing::info!("shutdown requested");
    shutdown.cancel();

    for (name, task) in [("ingest", Some(ingest_task)), ("notify", Some(notify_task)), ("status", status_task)] {
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(task = name, error = %e, "task ended abnormally");
            }
        }
    }
    tracing::info!("bye");
    Ok(())
}

async fn spawn_status_server(
    cfg: &AppConfig,
    addr: std::net::SocketAddr,
    store: Arc<Store>,
    destination: Arc<dyn Destination>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let metrics = Metrics::init(cfg.notify_minutes_before, cfg.retention_days)?;
    let router = api::create_router(AppState {
        store,
        destination_id: destination.destination_id().to_string(),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding status server on {addr}"))?;
    tracing::info!(%addr, "status server listening");

    Ok(tokio::spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = served {
            tracing::error!(error = %e, "status server failed");
        }
    }))
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
