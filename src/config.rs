use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, path::PathBuf, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub browser: BrowserSettings,
    pub max_upload_bytes: usize,
    pub storage_dir: String,
    pub database_url: String,
    pub s3: S3Settings,
}

/// Behaviour switches of the browser components.
#[derive(Debug, Clone, Default)]
pub struct BrowserSettings {
    pub search_policy: SearchPolicy,
    /// Include per-key failures in folder delete responses.
    pub report_delete_failures: bool,
    /// Directory for upload spool files; system temp dir when unset.
    pub spool_dir: Option<PathBuf>,
    /// Region the store uses when none is requested.
    pub default_region: Option<String>,
}

/// Connection settings for the S3 backend.
#[derive(Clone, Default)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub force_path_style: bool,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "<set>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// Which [`crate::store::ObjectStore`] implementation backs the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    S3,
    Local,
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown backend `{other}` (expected s3, local or memory)"),
        }
    }
}

/// How search decides which folders to report.
///
/// Past revisions disagreed, so both are kept and selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPolicy {
    /// Only folder markers whose own key matches.
    #[default]
    FolderMarkers,
    /// Folder markers plus every ancestor folder of a matching key whose path
    /// also matches.
    Ancestors,
}

impl FromStr for SearchPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "folder-markers" | "markers" => Ok(Self::FolderMarkers),
            "ancestors" => Ok(Self::Ancestors),
            other => bail!(
                "unknown search policy `{other}` (expected folder-markers or ancestors)"
            ),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File-browser API over a flat object store")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_BROWSER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_BROWSER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Store backend: s3, local or memory (overrides BUCKET_BROWSER_BACKEND)
    #[arg(long)]
    pub backend: Option<String>,

    /// Search folder policy: folder-markers or ancestors (overrides BUCKET_BROWSER_SEARCH_POLICY)
    #[arg(long)]
    pub search_policy: Option<String>,

    /// Report per-key failures of folder deletes
    #[arg(long)]
    pub report_delete_failures: bool,

    /// Maximum accepted upload body in bytes (overrides BUCKET_BROWSER_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Directory for temporary upload files (overrides BUCKET_BROWSER_SPOOL_DIR)
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,

    /// Payload directory for the local backend (overrides BUCKET_BROWSER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database for the local backend (overrides BUCKET_BROWSER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// S3 endpoint URL for S3-compatible services (overrides S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 region (overrides S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Use path-style S3 addressing (overrides S3_FORCE_PATH_STYLE)
    #[arg(long)]
    pub s3_path_style: Option<bool>,
}

/// Read an env var, treating empty or whitespace-only values as unset.
fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_opt(name)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|err| anyhow::anyhow!("{err}"))
                .with_context(|| format!("parsing {} value `{}`", name, value))
        })
        .transpose()
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse())
    }

    /// CLI wins over environment, environment over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let host = args
            .host
            .or_else(|| env_opt("BUCKET_BROWSER_HOST"))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = match args.port {
            Some(port) => port,
            None => env_parse("BUCKET_BROWSER_PORT")?.unwrap_or(8000),
        };
        let backend = match args.backend.or_else(|| env_opt("BUCKET_BROWSER_BACKEND")) {
            Some(value) => value.parse()?,
            None => BackendKind::default(),
        };
        let search_policy = match args
            .search_policy
            .or_else(|| env_opt("BUCKET_BROWSER_SEARCH_POLICY"))
        {
            Some(value) => value.parse()?,
            None => SearchPolicy::default(),
        };
        let report_delete_failures = args.report_delete_failures
            || env_parse::<bool>("BUCKET_BROWSER_REPORT_DELETE_FAILURES")?.unwrap_or(false);
        let max_upload_bytes = match args.max_upload_bytes {
            Some(limit) => limit,
            None => env_parse("BUCKET_BROWSER_MAX_UPLOAD_BYTES")?
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };
        let spool_dir = args
            .spool_dir
            .or_else(|| env_opt("BUCKET_BROWSER_SPOOL_DIR").map(PathBuf::from));

        let storage_dir = args
            .storage_dir
            .or_else(|| env_opt("BUCKET_BROWSER_STORAGE_DIR"))
            .unwrap_or_else(|| "./data/objects".into());
        let database_url = args
            .database_url
            .or_else(|| env_opt("BUCKET_BROWSER_DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://./data/meta/browser.db".into());

        let endpoint = args.s3_endpoint.or_else(|| env_opt("S3_ENDPOINT"));
        let configured_region = args.s3_region.or_else(|| env_opt("S3_REGION"));
        let force_path_style = match args.s3_path_style {
            Some(flag) => flag,
            None => env_parse("S3_FORCE_PATH_STYLE")?.unwrap_or(endpoint.is_some()),
        };
        let s3 = S3Settings {
            endpoint,
            region: configured_region
                .clone()
                .unwrap_or_else(|| "us-east-1".into()),
            access_key: env_opt("S3_ACCESS_KEY"),
            secret_key: env_opt("S3_SECRET_KEY"),
            force_path_style,
        };

        Ok(Self {
            host,
            port,
            backend,
            browser: BrowserSettings {
                search_policy,
                report_delete_failures,
                spool_dir,
                default_region: configured_region,
            },
            max_upload_bytes,
            storage_dir,
            database_url,
            s3,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
