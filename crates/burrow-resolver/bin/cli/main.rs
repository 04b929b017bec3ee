mod cli;

use crate::cli::{Command, FilterBackendArg, LogFormatArg, StorageBackendArg, CLI};
use anyhow::Context;
use burrow_cache::{
    BloomFilterConfig, BloomMembershipFilter, MokaAliasCache, MokaCacheConfig, RedisBloomConfig,
    RedisMembershipFilter,
};
use burrow_core::{AliasError, AliasRecord, AliasStore, MembershipFilter};
use burrow_generator::RandomGenerator;
use burrow_resolver::warmup::{warm_filter, DEFAULT_PAGE_SIZE};
use burrow_resolver::{RegistrationStats, ResolutionService, ResolverConfig, ShortenOptions};
use burrow_storage::{InMemoryAliasStore, MySqlAliasStore, PostgresAliasStore};
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use jiff::{SignedDuration, Timestamp};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

type Service = ResolutionService<
    Arc<dyn AliasStore>,
    Arc<dyn MembershipFilter>,
    MokaAliasCache,
    RandomGenerator,
>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        filter_backend = %config.filter,
        code_length = config.code_length,
        "starting burrow"
    );

    let registry = Registry::new();
    let service = build_service(&config, &registry).await?;

    let ok = match &config.command {
        Command::Shorten { url, expires_at } => {
            shorten(&service, &config.server_host, url, *expires_at).await
        }
        Command::Resolve { code } => resolve(&service, code).await,
        Command::Repl => repl(&service, &registry, &config.server_host).await?,
    };

    if let Some(stats) = service.registration_stats() {
        info!(
            inline_failures = stats.inline_failures(),
            recovered = stats.recovered(),
            abandoned = stats.abandoned(),
            pending = stats.pending(),
            "filter registration summary"
        );
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Json => builder.json().init(),
        LogFormatArg::Pretty => builder.init(),
    }
}

async fn build_service(config: &CLI, registry: &Registry) -> anyhow::Result<Service> {
    let store: Arc<dyn AliasStore> = match config.storage {
        StorageBackendArg::InMemory => Arc::new(InMemoryAliasStore::new()),
        StorageBackendArg::Postgres => {
            let write_dsn = config
                .write_dsn
                .as_deref()
                .context("write dsn is required when storage backend is postgres")?;
            let store = PostgresAliasStore::connect(write_dsn, config.read_dsn.as_deref())
                .await
                .context("connecting to postgres")?;
            store.ensure_schema().await.context("creating schema")?;
            Arc::new(store)
        }
        StorageBackendArg::Mysql => {
            let write_dsn = config
                .write_dsn
                .as_deref()
                .context("write dsn is required when storage backend is mysql")?;
            let store = MySqlAliasStore::connect(write_dsn, config.read_dsn.as_deref())
                .await
                .context("connecting to mysql")?;
            store.ensure_schema().await.context("creating schema")?;
            Arc::new(store)
        }
    };

    let filter: Arc<dyn MembershipFilter> = match config.filter {
        FilterBackendArg::Local => {
            let bloom = BloomMembershipFilter::new(
                BloomFilterConfig::builder()
                    .expected_items(usize::try_from(config.bloom_capacity).unwrap_or(usize::MAX))
                    .false_positive_rate(config.bloom_error_rate)
                    .build(),
            )?;
            warm_filter(store.as_ref(), &bloom, DEFAULT_PAGE_SIZE)
                .await
                .context("warming membership filter")?;
            Arc::new(bloom)
        }
        FilterBackendArg::Redis => {
            let redis_url = config
                .redis_url
                .as_deref()
                .context("redis url is required when filter backend is redis")?;
            let bloom_config = RedisBloomConfig::builder()
                .namespace(config.bloom_namespace.as_str())
                .error_rate(config.bloom_error_rate)
                .capacity(config.bloom_capacity)
                .build();
            Arc::new(
                RedisMembershipFilter::connect(redis_url, bloom_config)
                    .await
                    .context("connecting to redis")?,
            )
        }
    };

    let cache = MokaAliasCache::from(
        MokaCacheConfig::builder()
            .capacity_bytes(config.cache_capacity_bytes)
            .build(),
    );

    let resolver_config = ResolverConfig::builder()
        .code_length(config.code_length)
        .default_ttl(SignedDuration::from_hours(config.default_ttl_hours))
        .cache_ttl(Duration::from_secs(config.cache_ttl_secs))
        .build();

    let stats = RegistrationStats::new().context("creating registration metrics")?;
    stats
        .register(registry)
        .context("registering registration metrics")?;

    Ok(ResolutionService::new(store, filter, cache, RandomGenerator::new())
        .with_config(resolver_config)
        .with_registration_stats(stats))
}

fn print_record(record: &AliasRecord, server_host: &str) {
    println!("code:       {}", record.code);
    println!("short url:  {}", record.code.to_url(server_host));
    println!("target:     {}", record.target);
    println!("expires at: {}", record.expires_at);
}

fn print_error(err: &AliasError) {
    let kind = err.kind();
    eprintln!("error {} ({}): {}", kind.code(), kind.message(), err);
}

async fn shorten(
    service: &Service,
    server_host: &str,
    url: &str,
    expires_at: Option<Timestamp>,
) -> bool {
    match service.shorten(url, ShortenOptions { expires_at }).await {
        Ok(record) => {
            print_record(&record, server_host);
            true
        }
        Err(err) => {
            print_error(&err);
            false
        }
    }
}

async fn resolve(service: &Service, code: &str) -> bool {
    match service.resolve(code).await {
        Ok(record) => {
            println!("{}", record.target);
            true
        }
        Err(err) => {
            print_error(&err);
            false
        }
    }
}

fn export_metrics(registry: &Registry) -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .context("encoding metrics")?;
    Ok(String::from_utf8(buffer)?)
}

async fn repl(service: &Service, registry: &Registry, server_host: &str) -> anyhow::Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ok = true;

    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let succeeded = match (words.next(), words.next(), words.next()) {
            (None, _, _) => continue,
            (Some("quit" | "exit"), _, _) => break,
            (Some("shorten"), Some(url), expires_at) => {
                let expires_at = match expires_at.map(str::parse::<Timestamp>).transpose() {
                    Ok(expires_at) => expires_at,
                    Err(err) => {
                        eprintln!("invalid expiry: {err}");
                        ok = false;
                        continue;
                    }
                };
                shorten(service, server_host, url, expires_at).await
            }
            (Some("resolve"), Some(code), None) => resolve(service, code).await,
            (Some("metrics"), None, _) => {
                print!("{}", export_metrics(registry)?);
                true
            }
            _ => {
                eprintln!("usage: shorten <url> [expires-at] | resolve <code> | metrics | quit");
                false
            }
        };
        ok &= succeeded;
    }

    Ok(ok)
}
