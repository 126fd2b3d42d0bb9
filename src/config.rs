use crate::errors::{StorageError, StorageResult};
use clap::{Args, Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_STORJ_AUTH_URL: &str = "https://auth.storjshare.io";

/// Settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    /// Custom endpoint (MinIO, R2, ...). `None` means AWS.
    pub endpoint_url: Option<String>,
}

/// Settings for the Storj network, reached through its S3 gateway.
#[derive(Debug, Clone)]
pub struct StorjConfig {
    /// Serialized access grant shared out of band.
    pub access_grant: String,
    pub bucket: String,
    /// Auth service that trades the grant for gateway credentials.
    pub auth_url: String,
    /// Backend-level expiry hint attached to every upload.
    pub object_ttl: Option<Duration>,
}

/// Which backend to build. Chosen once at startup.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { upload_dir: PathBuf },
    S3(S3Config),
    Storj(StorjConfig),
}

impl StorageConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::S3(_) => "s3",
            Self::Storj(_) => "storj",
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub purge_interval: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Short-lived file and paste storage")]
pub struct Cli {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage files in storage
    #[command(subcommand)]
    Files(FilesCommand),
    /// Delete every expired object once and exit
    Purge,
    /// Run the periodic expiration sweeper until interrupted
    Sweep {
        /// Seconds between sweeps (overrides FILESHELF_PURGE_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    /// List files in storage
    List,
    /// Delete given file from storage
    Delete { id: String },
}

#[derive(Args, Debug, Default)]
pub struct StorageArgs {
    /// Storage backend: local, s3 or storj (overrides FILESHELF_STORAGE)
    #[arg(long, global = true)]
    pub storage: Option<String>,

    /// Directory for the local backend (overrides FILESHELF_UPLOAD_DIR)
    #[arg(long, global = true)]
    pub upload_dir: Option<PathBuf>,

    /// Bucket for the s3 backend (overrides S3_BUCKET)
    #[arg(long, global = true)]
    pub s3_bucket: Option<String>,

    /// Region for the s3 backend (overrides S3_REGION)
    #[arg(long, global = true)]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint (overrides AWS_ENDPOINT_URL)
    #[arg(long, global = true)]
    pub aws_endpoint_url: Option<String>,

    /// Bucket for the storj backend (overrides STORJ_BUCKET)
    #[arg(long, global = true)]
    pub storj_bucket: Option<String>,

    /// Expiry hint in hours passed to backends that support one
    /// (overrides FILESHELF_OBJECT_TTL_HOURS)
    #[arg(long, global = true)]
    pub object_ttl_hours: Option<u64>,
}

/// Environment lookup, injectable so merging can be tested without
/// touching the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl AppConfig {
    /// Parse CLI args + environment; the subcommand is returned separately.
    pub fn from_env_and_args() -> StorageResult<(Self, Command)> {
        let cli = Cli::parse();
        let cfg = Self::merge(&cli.storage, &ProcessEnv)?;
        Ok((cfg, cli.command))
    }

    /// CLI flags win over environment, environment wins over defaults.
    pub fn merge(args: &StorageArgs, env: &impl EnvSource) -> StorageResult<Self> {
        let backend = args
            .storage
            .clone()
            .or_else(|| env.get("FILESHELF_STORAGE"))
            .unwrap_or_else(|| "local".into());

        let object_ttl = match args.object_ttl_hours {
            Some(hours) => Some(hours),
            None => parse_env(env, "FILESHELF_OBJECT_TTL_HOURS")?,
        }
        .filter(|hours| *hours > 0)
        .map(|hours| {
            hours
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    StorageError::Config(format!("object TTL of {} hours is too large", hours))
                })
        })
        .transpose()?;

        let storage = match backend.to_ascii_lowercase().as_str() {
            "local" => StorageConfig::Local {
                upload_dir: args
                    .upload_dir
                    .clone()
                    .or_else(|| env.get("FILESHELF_UPLOAD_DIR").map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("./uploads")),
            },
            "s3" => StorageConfig::S3(S3Config {
                bucket: args
                    .s3_bucket
                    .clone()
                    .or_else(|| env.get("S3_BUCKET"))
                    .ok_or_else(|| StorageError::Config("S3_BUCKET must be set for s3 storage".into()))?,
                region: args.s3_region.clone().or_else(|| env.get("S3_REGION")),
                access_key: env.get("AWS_ACCESS_KEY"),
                secret_key: env.get("AWS_SECRET_KEY"),
                session_token: env.get("AWS_SESSION_TOKEN"),
                endpoint_url: args
                    .aws_endpoint_url
                    .clone()
                    .or_else(|| env.get("AWS_ENDPOINT_URL")),
            }),
            "storj" => StorageConfig::Storj(StorjConfig {
                access_grant: env.get("STORJ_ACCESS").ok_or_else(|| {
                    StorageError::Config("STORJ_ACCESS must be set for storj storage".into())
                })?,
                bucket: args
                    .storj_bucket
                    .clone()
                    .or_else(|| env.get("STORJ_BUCKET"))
                    .ok_or_else(|| {
                        StorageError::Config("STORJ_BUCKET must be set for storj storage".into())
                    })?,
                auth_url: env
                    .get("STORJ_AUTH_URL")
                    .unwrap_or_else(|| DEFAULT_STORJ_AUTH_URL.into()),
                object_ttl,
            }),
            other => {
                return Err(StorageError::Config(format!(
                    "unknown storage backend `{}` (expected local, s3 or storj)",
                    other
                )));
            }
        };

        let purge_interval_secs =
            parse_env::<u64>(env, "FILESHELF_PURGE_INTERVAL_SECS")?.unwrap_or(3600);
        if purge_interval_secs == 0 {
            return Err(StorageError::Config(
                "FILESHELF_PURGE_INTERVAL_SECS must be positive".into(),
            ));
        }

        Ok(Self {
            storage,
            purge_interval: Duration::from_secs(purge_interval_secs),
        })
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl EnvSource, key: &str) -> StorageResult<Option<T>> {
    match env.get(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| StorageError::Config(format!("parsing {} value `{}`", key, value))),
        None => Ok(None),
    }
}
