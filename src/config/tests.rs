use super::*;

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert_eq!(settings.cache.ttl_seconds.get(), 60);
    assert_eq!(settings.cache.live_window, Duration::from_millis(60_000));
    assert_eq!(settings.cache.live_ttl_seconds.get(), 5);
    assert!(matches!(settings.search.backend, SearchBackend::Memory));
    assert_eq!(settings.search.snapshot_keep_alive, Duration::from_secs(120));
    assert_eq!(settings.leaderboard.hourly_ttl_seconds.get(), 7200);
    assert!(settings.redis.url.is_none());
    assert!(settings.cursor.secret.is_none());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn elasticsearch_backend_uses_default_index() {
    let mut raw = RawSettings::default();
    raw.search.backend = Some(SearchBackendKind::Elasticsearch);
    raw.search.elasticsearch_url = Some("http://search.internal:9200".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    match settings.search.backend {
        SearchBackend::Elasticsearch { url, index } => {
            assert_eq!(url.host_str(), Some("search.internal"));
            assert_eq!(index, "error_events");
        }
        SearchBackend::Memory => panic!("expected elasticsearch backend"),
    }
}

#[test]
fn invalid_elasticsearch_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.search.backend = Some(SearchBackendKind::Elasticsearch);
    raw.search.elasticsearch_url = Some("not a url".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid url rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "search.elasticsearch_url",
            ..
        }
    ));
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl rejected");
    assert!(err.to_string().contains("cache.ttl_seconds"));
}

#[test]
fn blank_secrets_and_urls_become_absent() {
    let mut raw = RawSettings::default();
    raw.redis.url = Some("   ".to_string());
    raw.cursor.secret = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.redis.url.is_none());
    assert!(settings.cursor.secret.is_none());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["insights"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "insights",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--search-backend",
        "elasticsearch",
        "--redis-url",
        "redis://127.0.0.1/",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.search_backend,
                Some(SearchBackendKind::Elasticsearch)
            );
            assert_eq!(
                serve.overrides.redis_url.as_deref(),
                Some("redis://127.0.0.1/")
            );
        }
    }
}
