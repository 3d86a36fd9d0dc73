//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "insights";
const ENV_PREFIX: &str = "INSIGHTS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_LIVE_WINDOW_MS: u64 = 60_000;
const DEFAULT_LIVE_TTL_SECS: u64 = 5;
const DEFAULT_MEMORY_CAPACITY: usize = 1024;
const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX: &str = "error_events";
const DEFAULT_SNAPSHOT_KEEP_ALIVE_SECS: u64 = 120;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HOURLY_TTL_SECS: u64 = 7200;

/// Command-line arguments for the insights server.
#[derive(Debug, Parser)]
#[command(name = "insights", version, about = "Error event search and insights server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INSIGHTS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the base result-cache TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Select the search backend.
    #[arg(long = "search-backend", value_name = "BACKEND")]
    pub search_backend: Option<SearchBackendKind>,

    /// Override the Elasticsearch base URL.
    #[arg(long = "elasticsearch-url", value_name = "URL")]
    pub elasticsearch_url: Option<String>,

    /// Override the Elasticsearch index name.
    #[arg(long = "search-index", value_name = "NAME")]
    pub search_index: Option<String>,

    /// Use Redis for the result cache and leaderboards.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the cursor signing secret.
    #[arg(long = "cursor-secret", env = "INSIGHTS_CURSOR_SECRET", value_name = "SECRET")]
    pub cursor_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackendKind {
    Memory,
    Elasticsearch,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub search: SearchSettings,
    pub redis: RedisSettings,
    pub leaderboard: LeaderboardSettings,
    pub cursor: CursorSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub ttl_seconds: NonZeroU64,
    pub live_window: Duration,
    pub live_ttl_seconds: NonZeroU64,
    pub memory_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub snapshot_keep_alive: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum SearchBackend {
    Memory,
    Elasticsearch { url: Url, index: String },
}

#[derive(Debug, Clone, Default)]
pub struct RedisSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LeaderboardSettings {
    pub hourly_ttl_seconds: NonZeroU64,
}

#[derive(Debug, Clone, Default)]
pub struct CursorSettings {
    pub secret: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    search: RawSearchSettings,
    redis: RawRedisSettings,
    leaderboard: RawLeaderboardSettings,
    cursor: RawCursorSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(backend) = overrides.search_backend {
            self.search.backend = Some(backend);
        }
        if let Some(url) = overrides.elasticsearch_url.as_ref() {
            self.search.elasticsearch_url = Some(url.clone());
        }
        if let Some(index) = overrides.search_index.as_ref() {
            self.search.index = Some(index.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(secret) = overrides.cursor_secret.as_ref() {
            self.cursor.secret = Some(secret.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            search,
            redis,
            leaderboard,
            cursor,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            search: build_search_settings(search)?,
            redis: RedisSettings {
                url: non_empty(redis.url),
            },
            leaderboard: build_leaderboard_settings(leaderboard)?,
            cursor: CursorSettings {
                secret: non_empty(cursor.secret),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_seconds = non_zero_u64(
        cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.ttl_seconds",
    )?;
    let live_ttl_seconds = non_zero_u64(
        cache.live_ttl_seconds.unwrap_or(DEFAULT_LIVE_TTL_SECS),
        "cache.live_ttl_seconds",
    )?;
    let live_window = Duration::from_millis(cache.live_window_ms.unwrap_or(DEFAULT_LIVE_WINDOW_MS));
    let memory_capacity = NonZeroUsize::new(
        cache.memory_capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
    )
    .ok_or_else(|| LoadError::invalid("cache.memory_capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        ttl_seconds,
        live_window,
        live_ttl_seconds,
        memory_capacity,
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let backend = match search.backend.unwrap_or(SearchBackendKind::Memory) {
        SearchBackendKind::Memory => SearchBackend::Memory,
        SearchBackendKind::Elasticsearch => {
            let raw_url = non_empty(search.elasticsearch_url)
                .unwrap_or_else(|| DEFAULT_ELASTICSEARCH_URL.to_string());
            let url = Url::parse(&raw_url).map_err(|err| {
                LoadError::invalid("search.elasticsearch_url", format!("invalid url: {err}"))
            })?;
            let index = non_empty(search.index).unwrap_or_else(|| DEFAULT_INDEX.to_string());
            if index.contains(['/', ' ', '*']) {
                return Err(LoadError::invalid(
                    "search.index",
                    "index name must not contain `/`, `*` or spaces",
                ));
            }
            SearchBackend::Elasticsearch { url, index }
        }
    };

    let keep_alive = non_zero_u64(
        search
            .snapshot_keep_alive_seconds
            .unwrap_or(DEFAULT_SNAPSHOT_KEEP_ALIVE_SECS),
        "search.snapshot_keep_alive_seconds",
    )?;
    let timeout = non_zero_u64(
        search
            .request_timeout_seconds
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        "search.request_timeout_seconds",
    )?;

    Ok(SearchSettings {
        backend,
        snapshot_keep_alive: Duration::from_secs(keep_alive.get()),
        request_timeout: Duration::from_secs(timeout.get()),
    })
}

fn build_leaderboard_settings(
    leaderboard: RawLeaderboardSettings,
) -> Result<LeaderboardSettings, LoadError> {
    let hourly_ttl_seconds = non_zero_u64(
        leaderboard
            .hourly_ttl_seconds
            .unwrap_or(DEFAULT_HOURLY_TTL_SECS),
        "leaderboard.hourly_ttl_seconds",
    )?;
    Ok(LeaderboardSettings { hourly_ttl_seconds })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_seconds: Option<u64>,
    live_window_ms: Option<u64>,
    live_ttl_seconds: Option<u64>,
    memory_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    backend: Option<SearchBackendKind>,
    elasticsearch_url: Option<String>,
    index: Option<String>,
    snapshot_keep_alive_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLeaderboardSettings {
    hourly_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCursorSettings {
    secret: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[cfg(test)]
mod tests;
