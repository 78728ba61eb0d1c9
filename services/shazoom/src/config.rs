//!
//! src/config.rs  Oct 16th, 2026
//!
//! Loads the client configuration from the environment (and .env) once at
//! startup: service endpoints, catalog location, upload limits and the
//! ambient http/logging settings
//!

use std::path::PathBuf;
use std::time;

use url::Url;

use crate::errors::ShazoomError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 30000;
pub const IDENTIFY_TIMEOUT: u64 = 90000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 250;
pub const RETRY_JITTER: bool = true;
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Constants for the identification workflow
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;
pub const LOW_CONFIDENCE_PERCENT: u8 = 40;
pub const CATALOG_PREVIEW_LEN: usize = 5;

pub const DEFAULT_API_BASE: &str =
    "https://nxd6qgldf2.execute-api.eu-west-2.amazonaws.com/prod/";
pub const DEFAULT_CATALOG: &str = "./public/tracks_metadata.json";
pub const DEFAULT_PLACEHOLDER_COVER: &str = "/placeholder.svg?height=200&width=200";

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_http_scheme(url: &Url) -> Result<(), String> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme {other} for {url}"))
    }
}

/// Relative joins drop the last path segment unless the base ends in '/'
fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

fn env_flag(env: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    matches!(
        env(key).as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes")
    )
}

fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T
) -> Result<T, ShazoomError> {
    match env(key) {
        Some(v) if !v.trim().is_empty() => v.trim().parse::<T>()
            .map_err(|_| ShazoomError::Config(format!("{key} invalid: {v}"))),
        _ => Ok(default)
    }
}

///
/// Configuration for the identification service api
///
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,      // {base}/find-song, {base}/upload-url
    pub warmup: bool        // ping find-song once on start
}

fn build_api(env: &impl Fn(&str) -> Option<String>) ->
    Result<ApiConfig, ShazoomError> {

    let base_url = env("SHAZOOM_API_BASE")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

    let mut base_url = Url::parse(base_url.trim())
        .map_err(|e| ShazoomError::Config(
            format!("SHAZOOM_API_BASE invalid {e}")
        ))?;

    // plain http is only for local backends
    if env_flag(env, "SHAZOOM_ALLOW_HTTP") {
        ensure_http_scheme(&base_url).map_err(ShazoomError::Config)?;
    } else {
        ensure_https(&base_url).map_err(ShazoomError::Config)?;
    }
    ensure_trailing_slash(&mut base_url);

    let warmup = !env_flag(env, "SHAZOOM_NO_WARMUP");
    Ok( ApiConfig { base_url, warmup } )
}

/// Where the tracks metadata document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Remote(Url),
    Local(PathBuf)
}

impl CatalogSource {
    pub fn parse(s: &str) -> Result<Self, ShazoomError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ShazoomError::Config("SHAZOOM_CATALOG is empty".to_string()));
        }
        match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") =>
                Ok(CatalogSource::Remote(url)),
            Ok(url) if url.scheme() == "file" => url.to_file_path()
                .map(CatalogSource::Local)
                .map_err(|_| ShazoomError::Config(
                    format!("SHAZOOM_CATALOG invalid file url: {s}")
                )),
            _ => Ok(CatalogSource::Local(PathBuf::from(s)))
        }
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogSource::Remote(url) => write!(f, "{url}"),
            CatalogSource::Local(path) => write!(f, "{}", path.display())
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub source: CatalogSource,
    pub placeholder_cover: String,
    pub preview_len: usize
}

fn build_catalog(env: &impl Fn(&str) -> Option<String>) ->
    Result<CatalogConfig, ShazoomError> {

    let source = env("SHAZOOM_CATALOG")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATALOG.to_string());
    let source = CatalogSource::parse(&source)?;

    let placeholder_cover = env("SHAZOOM_PLACEHOLDER_COVER")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PLACEHOLDER_COVER.to_string());

    let preview_len = env_parse(env, "SHAZOOM_CATALOG_PREVIEW", CATALOG_PREVIEW_LEN)?;

    Ok( CatalogConfig { source, placeholder_cover, preview_len } )
}

///
/// Limits applied to the identification workflow
///
#[derive(Debug, Clone, Copy)]
pub struct WorkflowConfig {
    pub max_upload_bytes: u64,       // files at or above this never upload
    pub low_confidence_percent: u8   // below this a match is flagged weak
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            low_confidence_percent: LOW_CONFIDENCE_PERCENT
        }
    }
}

fn build_workflow(env: &impl Fn(&str) -> Option<String>) ->
    Result<WorkflowConfig, ShazoomError> {

    let max_upload_bytes = env_parse(env, "SHAZOOM_MAX_UPLOAD_BYTES", MAX_UPLOAD_BYTES)?;
    if max_upload_bytes == 0 {
        return Err(ShazoomError::Config(
            "SHAZOOM_MAX_UPLOAD_BYTES must be positive".to_string()
        ));
    }

    let low_confidence_percent = env_parse(
        env, "SHAZOOM_LOW_CONFIDENCE", LOW_CONFIDENCE_PERCENT
    )?;
    if low_confidence_percent > 100 {
        return Err(ShazoomError::Config(
            format!("SHAZOOM_LOW_CONFIDENCE out of range: {low_confidence_percent}")
        ));
    }

    Ok( WorkflowConfig { max_upload_bytes, low_confidence_percent } )
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER,
            retryable_statuses: RETRYABLE_STATUSES.to_vec()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    /// find-song on a cold backend outlives the regular timeout
    pub identify_timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            identify_timeout: time::Duration::from_millis(IDENTIFY_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

fn build_http(env: &impl Fn(&str) -> Option<String>) ->
    Result<HttpConfig, ShazoomError> {

    let defaults = HttpConfig::default();
    let timeout_ms = env_parse(env, "SHAZOOM_HTTP_TIMEOUT_MS", HTTP_TIMEOUT)?;
    let identify_ms = env_parse(env, "SHAZOOM_IDENTIFY_TIMEOUT_MS", IDENTIFY_TIMEOUT)?;
    let max_attempts = env_parse(env, "SHAZOOM_HTTP_RETRIES", RETRY_MAX_ATTEMPTS)?;

    Ok( HttpConfig {
        timeout: time::Duration::from_millis(timeout_ms),
        identify_timeout: time::Duration::from_millis(identify_ms),
        retry: RetryConfig { max_attempts, ..defaults.retry.clone() },
        ..defaults
    })
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "warn,shazoom=info,reqwest=warn".to_string(),
            format: LogFormat::Pretty,
            with_ansi: true,
            include_file_line: false,
            include_target: true
        }
    }
}

fn build_logging(env: &impl Fn(&str) -> Option<String>) ->
    Result<LoggingConfig, ShazoomError> {

    let mut logging = LoggingConfig::default();
    match env("SHAZOOM_LOG_FORMAT").as_deref().map(str::trim) {
        None | Some("") | Some("pretty") => {},
        Some("json") => {
            logging.format = LogFormat::Json;
            logging.with_ansi = false;
            logging.include_file_line = true;
        },
        Some(other) => return Err(ShazoomError::Config(
            format!("SHAZOOM_LOG_FORMAT invalid: {other}")
        ))
    }
    if let Some(directives) = env("SHAZOOM_LOG").filter(|s| !s.trim().is_empty()) {
        logging.filter_directives = directives;
    }
    Ok(logging)
}

///
/// AppConfig which holds everything the clients and workflow need
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub catalog: CatalogConfig,
    pub workflow: WorkflowConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, ShazoomError> {
    dotenvy::dotenv().ok();
    load_config_from(|key| std::env::var(key).ok())
}

pub fn load_config_from(env: impl Fn(&str) -> Option<String>) ->
    Result<AppConfig, ShazoomError> {

    let api      = build_api(&env)?;
    let catalog  = build_catalog(&env)?;
    let workflow = build_workflow(&env)?;
    let http     = build_http(&env)?;
    let logging  = build_logging(&env)?;

    Ok( AppConfig { api, catalog, workflow, http, logging } )
}
