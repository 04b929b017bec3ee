use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use std::fmt::{Display, Formatter};

pub const STORAGE_BACKEND_ENV: &str = "BURROW_STORAGE_BACKEND";
pub const WRITE_DSN_ENV: &str = "BURROW_WRITE_DSN";
pub const READ_DSN_ENV: &str = "BURROW_READ_DSN";
pub const FILTER_BACKEND_ENV: &str = "BURROW_FILTER_BACKEND";
pub const REDIS_URL_ENV: &str = "BURROW_REDIS_URL";
pub const BLOOM_NAMESPACE_ENV: &str = "BURROW_BLOOM_NAMESPACE";
pub const BLOOM_CAPACITY_ENV: &str = "BURROW_BLOOM_CAPACITY";
pub const BLOOM_ERROR_RATE_ENV: &str = "BURROW_BLOOM_ERROR_RATE";
pub const CACHE_CAPACITY_ENV: &str = "BURROW_CACHE_CAPACITY_BYTES";
pub const CACHE_TTL_ENV: &str = "BURROW_CACHE_TTL_SECS";
pub const CODE_LENGTH_ENV: &str = "BURROW_CODE_LENGTH";
pub const DEFAULT_TTL_ENV: &str = "BURROW_DEFAULT_TTL_HOURS";
pub const SERVER_HOST_ENV: &str = "BURROW_SERVER_HOST";
pub const LOG_FORMAT_ENV: &str = "BURROW_LOG_FORMAT";

pub const DEFAULT_SERVER_HOST: &str = "http://localhost:8080";

/// Upper bound for `--default-ttl-hours`, about a century.
pub const MAX_TTL_HOURS: i64 = 876_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "postgres")]
    Postgres,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterBackendArg {
    #[value(name = "local")]
    Local,
    #[value(name = "redis")]
    Redis,
}

impl Display for FilterBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterBackendArg::Local => write!(f, "local"),
            FilterBackendArg::Redis => write!(f, "redis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "burrow", about = "Create and resolve short aliases for long URLs")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(
        long,
        env = WRITE_DSN_ENV,
        required_if_eq_any([("storage", "postgres"), ("storage", "mysql")])
    )]
    pub write_dsn: Option<String>,

    /// Replica DSN for reads; defaults to the write DSN.
    #[arg(long, env = READ_DSN_ENV)]
    pub read_dsn: Option<String>,

    #[arg(
        long,
        env = FILTER_BACKEND_ENV,
        value_enum,
        default_value_t = FilterBackendArg::Local
    )]
    pub filter: FilterBackendArg,

    #[arg(long, env = REDIS_URL_ENV, required_if_eq("filter", "redis"))]
    pub redis_url: Option<String>,

    #[arg(long, env = BLOOM_NAMESPACE_ENV, default_value = "burrow:codes")]
    pub bloom_namespace: String,

    #[arg(long, env = BLOOM_CAPACITY_ENV, default_value_t = 100_000)]
    pub bloom_capacity: u64,

    #[arg(long, env = BLOOM_ERROR_RATE_ENV, default_value_t = 0.001)]
    pub bloom_error_rate: f64,

    #[arg(long, env = CACHE_CAPACITY_ENV, default_value_t = 100 * 1024 * 1024)]
    pub cache_capacity_bytes: u64,

    #[arg(long, env = CACHE_TTL_ENV, default_value_t = 600)]
    pub cache_ttl_secs: u64,

    #[arg(
        long,
        env = CODE_LENGTH_ENV,
        default_value_t = 8,
        value_parser = clap::value_parser!(u16).range(1..=32).map(usize::from)
    )]
    pub code_length: usize,

    #[arg(
        long,
        env = DEFAULT_TTL_ENV,
        default_value_t = 72,
        value_parser = clap::value_parser!(i64).range(1..=MAX_TTL_HOURS)
    )]
    pub default_ttl_hours: i64,

    /// Prefix used to render short links.
    #[arg(long, env = SERVER_HOST_ENV, default_value = DEFAULT_SERVER_HOST)]
    pub server_host: String,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an alias for a URL.
    Shorten {
        url: String,
        /// RFC 3339 expiry, e.g. 2030-01-01T00:00:00Z.
        #[arg(long)]
        expires_at: Option<Timestamp>,
    },
    /// Print the target behind a code.
    Resolve { code: String },
    /// Read `shorten <url> [expires-at]`, `resolve <code>` and `metrics` lines from stdin.
    Repl,
}
