use crate::access::FetchPolicy;
use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
    8000,
);
const DEFAULT_SERVICE_NAME: &str = "JSON uplift gateway";
const DEFAULT_PROFILES_TTL_SECS: u64 = 60;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Origins allowed by the CORS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    fn from_list(origins: Vec<String>) -> Self {
        let origins: Vec<String> = origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsOrigins::Any
        } else {
            CorsOrigins::List(origins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_bind_address: SocketAddr,
    /// Name reported by the identity endpoint
    pub service_name: String,
    /// Prefix the router is mounted under; empty or `/segment...` without a trailing slash
    pub root_path: String,
    /// Policy for document and context fetches made by the gateway
    pub remote_fetch: FetchPolicy,
    /// Policy for context dereferencing inside the engine
    pub context_fetch: FetchPolicy,
    pub cors_origins: CorsOrigins,
    pub profile_sources: Vec<String>,
    /// Artifact URL prefix to local directory
    pub artifact_mappings: IndexMap<String, PathBuf>,
    pub profiles_ttl: Duration,
    pub fetch_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind_address: DEFAULT_HTTP_BIND,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            root_path: String::new(),
            remote_fetch: FetchPolicy::Disabled,
            context_fetch: FetchPolicy::Open,
            cors_origins: CorsOrigins::Any,
            profile_sources: Vec::new(),
            artifact_mappings: IndexMap::new(),
            profiles_ttl: Duration::from_secs(DEFAULT_PROFILES_TTL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            http_bind: cli_http_bind,
            service_name: cli_service_name,
            root_path: cli_root_path,
            remote_fetch_allowed: cli_remote_fetch,
            context_fetch_whitelist: cli_context_fetch,
            cors_allow_origins: cli_cors,
            profile_sources: cli_profile_sources,
            artifact_mappings: cli_artifact_mappings,
            profiles_ttl_seconds: cli_profiles_ttl,
            fetch_timeout_secs: cli_fetch_timeout,
            shutdown_timeout_secs: cli_shutdown_timeout,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            http_bind: file_http_bind,
            service_name: file_service_name,
            root_path: file_root_path,
            remote_fetch_allowed: file_remote_fetch,
            remote_context_fetch_whitelist: file_context_fetch,
            cors_allow_origins: file_cors,
            profile_sources: file_profile_sources,
            profile_local_artifacts_mappings: file_artifact_mappings,
            profiles_ttl_seconds: file_profiles_ttl,
            fetch_timeout_secs: file_fetch_timeout,
            shutdown_timeout_secs: file_shutdown_timeout,
        } = file_config;

        let remote_fetch = match (cli_remote_fetch, file_remote_fetch) {
            (Some(raw), _) => FetchPolicy::from_allow_setting(&raw)
                .context("invalid REMOTE_FETCH_ALLOWED")?,
            (None, Some(value)) => FetchPolicy::from_allow_value(&value)
                .context("invalid remote_fetch_allowed in config file")?,
            (None, None) => FetchPolicy::Disabled,
        };

        let context_fetch = match (cli_context_fetch, file_context_fetch) {
            (Some(raw), _) => FetchPolicy::from_context_setting(&raw)
                .context("invalid REMOTE_CONTEXT_FETCH_WHITELIST")?,
            (None, Some(value)) => FetchPolicy::from_context_value(&value)
                .context("invalid remote_context_fetch_whitelist in config file")?,
            (None, None) => FetchPolicy::Open,
        };

        let artifact_mappings = match (cli_artifact_mappings, file_artifact_mappings) {
            (Some(raw), _) => parse_artifact_mappings(&raw)?,
            (None, Some(mappings)) => mappings,
            (None, None) => IndexMap::new(),
        };

        let profile_sources = cli_profile_sources
            .or(file_profile_sources)
            .unwrap_or_default()
            .into_iter()
            .map(|source| source.trim().to_string())
            .filter(|source| !source.is_empty())
            .collect();

        let cors_origins = CorsOrigins::from_list(
            cli_cors
                .or(file_cors)
                .unwrap_or_else(|| vec!["*".to_string()]),
        );

        let fetch_timeout = cli_fetch_timeout
            .or(file_fetch_timeout)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        anyhow::ensure!(fetch_timeout > 0, "fetch timeout must be at least one second");

        Ok(Self {
            http_bind_address: cli_http_bind.or(file_http_bind).unwrap_or(DEFAULT_HTTP_BIND),
            service_name: cli_service_name
                .or(file_service_name)
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            root_path: normalize_root_path(
                cli_root_path.or(file_root_path).as_deref().unwrap_or(""),
            ),
            remote_fetch,
            context_fetch,
            cors_origins,
            profile_sources,
            artifact_mappings,
            profiles_ttl: Duration::from_secs(
                cli_profiles_ttl
                    .or(file_profiles_ttl)
                    .unwrap_or(DEFAULT_PROFILES_TTL_SECS),
            ),
            fetch_timeout: Duration::from_secs(fetch_timeout),
            shutdown_timeout: Duration::from_secs(
                cli_shutdown_timeout
                    .or(file_shutdown_timeout)
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            ),
        })
    }

    /// Log the effective configuration at startup.
    pub fn log_summary(&self) {
        tracing::info!(
            bind = %self.http_bind_address,
            root_path = %self.root_path,
            remote_fetch = self.remote_fetch.type_name(),
            context_fetch = self.context_fetch.type_name(),
            cors = ?self.cors_origins,
            profile_sources = ?self.profile_sources,
            profiles_ttl_secs = self.profiles_ttl.as_secs(),
            "effective configuration"
        );
        if matches!(self.context_fetch, FetchPolicy::Open) {
            tracing::warn!("engine context fetching is open to any URL");
        }
    }
}

/// `"/api/"` becomes `"/api"`, `"/"` and `""` become `""`.
pub fn normalize_root_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_artifact_mappings(raw: &str) -> Result<IndexMap<String, PathBuf>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(IndexMap::new());
    }
    serde_json::from_str(raw).context(
        "PROFILE_LOCAL_ARTIFACTS_MAPPINGS must be a JSON object of URL prefix to directory",
    )
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "uplift-gateway",
    about = "JSON to linked data uplift gateway",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "UPLIFT_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "UPLIFT_SERVICE_NAME",
        value_name = "NAME",
        help = "Name reported by the identity endpoint"
    )]
    pub service_name: Option<String>,

    #[arg(
        long,
        env = "BACKEND_ROOT_PATH",
        value_name = "PATH",
        help = "Path prefix the API is served under"
    )]
    pub root_path: Option<String>,

    #[arg(
        long,
        env = "REMOTE_FETCH_ALLOWED",
        value_name = "PATTERNS",
        help = "Regular expression, or JSON array of them, for URLs the gateway may fetch"
    )]
    pub remote_fetch_allowed: Option<String>,

    #[arg(
        long,
        env = "REMOTE_CONTEXT_FETCH_WHITELIST",
        value_name = "JSON",
        help = "JSON array of context URLs the engine may dereference"
    )]
    pub context_fetch_whitelist: Option<String>,

    #[arg(
        long,
        env = "CORS_ALLOW_ORIGINS",
        value_name = "ORIGIN",
        value_delimiter = ',',
        help = "Comma-separated list of allowed CORS origins"
    )]
    pub cors_allow_origins: Option<Vec<String>>,

    #[arg(
        long,
        env = "PROFILE_SOURCES",
        value_name = "SOURCE",
        value_delimiter = ',',
        help = "Comma-separated profile source files, directories, globs or URLs"
    )]
    pub profile_sources: Option<Vec<String>>,

    #[arg(
        long,
        env = "PROFILE_LOCAL_ARTIFACTS_MAPPINGS",
        value_name = "JSON",
        help = "JSON object mapping artifact URL prefixes to local directories"
    )]
    pub artifact_mappings: Option<String>,

    #[arg(
        long,
        env = "PROFILES_TTL_SECONDS",
        value_name = "SECS",
        help = "Seconds a built profile registry is reused",
        value_parser = clap::value_parser!(u64)
    )]
    pub profiles_ttl_seconds: Option<u64>,

    #[arg(
        long,
        env = "UPLIFT_FETCH_TIMEOUT_SECS",
        value_name = "SECS",
        help = "Timeout for remote fetches",
        value_parser = clap::value_parser!(u64)
    )]
    pub fetch_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "UPLIFT_SHUTDOWN_TIMEOUT_SECS",
        value_name = "SECS",
        help = "Time allowed for in-flight requests on shutdown",
        value_parser = clap::value_parser!(u64)
    )]
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    http_bind: Option<SocketAddr>,
    service_name: Option<String>,
    root_path: Option<String>,
    remote_fetch_allowed: Option<Value>,
    remote_context_fetch_whitelist: Option<Value>,
    cors_allow_origins: Option<Vec<String>>,
    profile_sources: Option<Vec<String>>,
    profile_local_artifacts_mappings: Option<IndexMap<String, PathBuf>>,
    profiles_ttl_seconds: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
