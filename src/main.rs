use std::{future::IntoFuture, pin::pin, process, sync::Arc};

use clap::Parser;
use insights::{
    application::{
        cursor::CursorSearchService,
        error::AppError,
        ingest::IngestService,
        leaderboard::{LeaderboardReader, LeaderboardUpdater},
        pagination::CursorCodec,
        ports::{CacheStore, CounterStore, EventIndexer, EventSink, SearchPort},
        search::SearchService,
    },
    cache::{CacheConfig, MemoryCacheStore, ResultCache},
    config,
    infra::{
        elastic::ElasticsearchEngine,
        error::InfraError,
        http::{self, ApiState},
        memory::{MemoryCounterStore, MemoryEventSink, MemorySearchEngine},
        redis::RedisStore,
        telemetry,
    },
    util::clock::{Clock, SystemClock},
};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let cli_args = config::CliArgs::parse();
    let settings = config::load(&cli_args)?;

    telemetry::init(&settings.logging)?;

    match cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()))
    {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_api_state(&settings).await?;
    serve_http(&settings, state).await
}

struct SearchAdapters {
    search: Arc<dyn SearchPort>,
    indexer: Arc<dyn EventIndexer>,
}

async fn init_search(settings: &config::SearchSettings) -> Result<SearchAdapters, AppError> {
    match &settings.backend {
        config::SearchBackend::Memory => {
            info!(target = "insights::bootstrap", "using in-memory search engine");
            let engine = Arc::new(MemorySearchEngine::new());
            Ok(SearchAdapters {
                search: engine.clone(),
                indexer: engine,
            })
        }
        config::SearchBackend::Elasticsearch { url, index } => {
            let engine = Arc::new(ElasticsearchEngine::new(
                url.clone(),
                index.clone(),
                settings.request_timeout,
            )?);
            engine.ensure_index().await?;
            info!(
                target = "insights::bootstrap",
                url = %url,
                index = %index,
                "using elasticsearch search engine"
            );
            Ok(SearchAdapters {
                search: engine.clone(),
                indexer: engine,
            })
        }
    }
}

async fn init_stores(
    settings: &config::Settings,
    cache_config: &CacheConfig,
) -> Result<(Arc<dyn CacheStore>, Arc<dyn CounterStore>), AppError> {
    match settings.redis.url.as_deref() {
        Some(url) => {
            let store = Arc::new(RedisStore::connect(url).await?);
            let cache: Arc<dyn CacheStore> = store.clone();
            let counters: Arc<dyn CounterStore> = store;
            Ok((cache, counters))
        }
        None => {
            info!(
                target = "insights::bootstrap",
                capacity = cache_config.memory_capacity,
                "redis url not configured; using in-memory cache and counters"
            );
            let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new(cache_config));
            let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
            Ok((cache, counters))
        }
    }
}

fn cursor_codec(settings: &config::CursorSettings) -> CursorCodec {
    match settings.secret.as_deref() {
        Some(secret) => CursorCodec::new(secret),
        None => {
            warn!(
                target = "insights::bootstrap",
                "cursor secret not configured; cursors will not survive a restart"
            );
            CursorCodec::new(format!("{}{}", Uuid::new_v4(), Uuid::new_v4()))
        }
    }
}

async fn build_api_state(settings: &config::Settings) -> Result<ApiState, AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache_config = CacheConfig::from(&settings.cache);

    let SearchAdapters { search, indexer } = init_search(&settings.search).await?;
    let (cache_store, counters) = init_stores(settings, &cache_config).await?;
    // TODO: persist raw events durably once a document store adapter exists.
    let sink: Arc<dyn EventSink> = Arc::new(MemoryEventSink::new());

    let leaderboard = Arc::new(LeaderboardUpdater::new(
        counters.clone(),
        clock.clone(),
        settings.leaderboard.hourly_ttl_seconds.get(),
    ));

    Ok(ApiState {
        search: Arc::new(SearchService::new(
            search.clone(),
            ResultCache::new(cache_store),
            &cache_config,
            clock.clone(),
        )),
        cursor_search: Arc::new(CursorSearchService::new(
            search,
            cursor_codec(&settings.cursor),
            settings.search.snapshot_keep_alive,
        )),
        ingest: Arc::new(IngestService::new(sink, indexer, leaderboard)),
        widgets: Arc::new(LeaderboardReader::new(counters, clock)),
    })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "insights::bootstrap",
        addr = %settings.server.addr,
        "listening"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    let mut server = pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {}
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            info!(target = "insights::bootstrap", "server stopped");
        }
        Err(_) => warn!(
            target = "insights::bootstrap",
            grace_secs = settings.server.graceful_shutdown.as_secs(),
            "graceful shutdown timed out; dropping open connections"
        ),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "insights::bootstrap", "shutdown signal received");
}
