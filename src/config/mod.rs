use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::env;
use std::path::PathBuf;

/// Object storage connection settings
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Access key id (S3_ACCESS_KEY)
    pub access_key: Option<String>,
    /// Secret access key (S3_SECRET_ACCESS_KEY)
    pub secret_key: Option<String>,
    /// Bucket region (default: "us-east-1")
    pub region: String,
    /// Bucket holding uploaded objects (default: "uploads")
    pub bucket: String,
    /// Custom endpoint for S3-compatible services such as MinIO
    pub endpoint: Option<String>,
    /// Use path-style addressing (default: true when an endpoint is set)
    pub force_path_style: bool,
}

/// Metadata database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Full connection URL, takes precedence over the individual fields
    pub url: Option<String>,
}

impl DatabaseConfig {
    /// Connection URL handed to sea-orm
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        format!(
            "postgres://{}:{}@{}:{}/{}",
            utf8_percent_encode(&self.user, NON_ALPHANUMERIC),
            utf8_percent_encode(&self.password, NON_ALPHANUMERIC),
            self.host,
            self.port,
            self.name
        )
    }

    /// Same as `connection_url` with the password masked, for logging
    pub fn redacted_url(&self) -> String {
        match &self.url {
            Some(url) => match url::Url::parse(url) {
                Ok(mut parsed) if parsed.password().is_some() => {
                    let _ = parsed.set_password(Some("****"));
                    parsed.to_string()
                }
                _ => url.clone(),
            },
            None => format!(
                "postgres://{}:****@{}:{}/{}",
                self.user, self.host, self.port, self.name
            ),
        }
    }
}

/// Gateway configuration, resolved once at startup and never mutated
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub object_store: ObjectStoreConfig,
    pub database: DatabaseConfig,

    /// HTTP listening port (default: 3000)
    pub listen_port: u16,

    /// Lifetime of signed retrieval URLs in seconds (default: 10)
    pub signed_url_ttl_secs: u64,

    /// Directory for staged uploads (default: system temp dir)
    pub staging_dir: PathBuf,

    /// Maximum upload size in bytes (default: 100 MB)
    pub max_file_size: usize,

    /// Extra attempts for a failed object upload (default: 0)
    pub upload_max_retries: u32,

    /// HEAD the object before signing a retrieval URL (default: true)
    pub verify_object_on_resolve: bool,

    /// Seconds between reconciler sweeps (default: 300)
    pub reconcile_interval_secs: u64,

    /// Age after which a pending record is considered abandoned (default: 900)
    pub pending_grace_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            object_store: ObjectStoreConfig {
                access_key: None,
                secret_key: None,
                region: "us-east-1".to_string(),
                bucket: "uploads".to_string(),
                endpoint: None,
                force_path_style: false,
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "ingest".to_string(),
                user: "postgres".to_string(),
                password: String::new(),
                url: None,
            },
            listen_port: 3000,
            signed_url_ttl_secs: 10,
            staging_dir: env::temp_dir().join("ingest-gateway"),
            max_file_size: 100 * 1024 * 1024, // 100 MB
            upload_max_retries: 0,
            verify_object_on_resolve: true,
            reconcile_interval_secs: 300,
            pending_grace_secs: 900,
        }
    }
}

/// Shortest sweep interval; anything lower turns the reconciler into a busy loop.
pub const MIN_RECONCILE_INTERVAL_SECS: u64 = 5;

/// Shortest grace period for pending records. A sweep must never catch an
/// ingest that is still uploading.
pub const MIN_PENDING_GRACE_SECS: u64 = 60;

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v.to_lowercase() != "false" && v != "0")
}

fn at_least(key: &str, value: u64, min: u64) -> u64 {
    if value < min {
        tracing::warn!("⚠️  {}={} is below the minimum, using {}", key, value, min);
        min
    } else {
        value
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Values from a `.env` file are only visible here if `dotenvy` loaded them
    /// beforehand; it never overrides variables already present in the process
    /// environment.
    pub fn from_env() -> Self {
        let default = Self::default();

        let endpoint = env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty());
        let force_path_style = parse_flag("S3_FORCE_PATH_STYLE").unwrap_or(endpoint.is_some());

        Self {
            object_store: ObjectStoreConfig {
                access_key: env::var("S3_ACCESS_KEY").ok(),
                secret_key: env::var("S3_SECRET_ACCESS_KEY").ok(),
                region: env::var("S3_REGION").unwrap_or(default.object_store.region),
                bucket: env::var("S3_BUCKET").unwrap_or(default.object_store.bucket),
                endpoint,
                force_path_style,
            },

            database: DatabaseConfig {
                host: env::var("RDS_HOSTNAME").unwrap_or(default.database.host),
                port: parse_var("RDS_PORT").unwrap_or(default.database.port),
                name: env::var("RDS_DB_NAME").unwrap_or(default.database.name),
                user: env::var("RDS_USERNAME").unwrap_or(default.database.user),
                password: env::var("RDS_PASSWORD").unwrap_or(default.database.password),
                url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            },

            listen_port: parse_var("PORT").unwrap_or(default.listen_port),

            signed_url_ttl_secs: at_least(
                "SIGNED_URL_TTL_SECS",
                parse_var("SIGNED_URL_TTL_SECS").unwrap_or(default.signed_url_ttl_secs),
                1,
            ),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            max_file_size: parse_var("MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            upload_max_retries: parse_var("UPLOAD_MAX_RETRIES")
                .unwrap_or(default.upload_max_retries),

            verify_object_on_resolve: parse_flag("VERIFY_OBJECT_ON_RESOLVE")
                .unwrap_or(default.verify_object_on_resolve),

            reconcile_interval_secs: at_least(
                "RECONCILE_INTERVAL_SECS",
                parse_var("RECONCILE_INTERVAL_SECS").unwrap_or(default.reconcile_interval_secs),
                MIN_RECONCILE_INTERVAL_SECS,
            ),

            pending_grace_secs: at_least(
                "PENDING_GRACE_SECS",
                parse_var("PENDING_GRACE_SECS").unwrap_or(default.pending_grace_secs),
                MIN_PENDING_GRACE_SECS,
            ),
        }
    }

    /// Config for local development and tests: in-memory SQLite, temp staging
    pub fn development() -> Self {
        let mut config = Self::default();
        config.database.url = Some("sqlite::memory:".to_string());
        config.object_store.access_key = Some("minioadmin".to_string());
        config.object_store.secret_key = Some("minioadmin".to_string());
        config.object_store.endpoint = Some("http://127.0.0.1:9000".to_string());
        config.object_store.force_path_style = true;
        config
    }
}
